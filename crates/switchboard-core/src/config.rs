use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ConfigError;
use crate::ids::{RunId, ThreadId};

/// Keys the service owns in a run's configurable map.
pub const RESERVED_KEYS: [&str; 3] = ["thread_id", "model", "user_id"];

/// Per-invocation identifiers handed to the graph. Lives for one request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: RunId,
    pub thread_id: ThreadId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl RunConfig {
    /// Config for a fresh run on `thread_id` (minted when absent).
    pub fn new(thread_id: Option<ThreadId>) -> Self {
        Self {
            run_id: RunId::new(),
            thread_id: thread_id.unwrap_or_default(),
            user_id: None,
            model: None,
            extra: Map::new(),
        }
    }

    /// Config for reading a thread's state outside of a run.
    pub fn for_thread(thread_id: ThreadId) -> Self {
        Self::new(Some(thread_id))
    }

    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Attach client-supplied configuration. Fails when any key collides with
    /// [`RESERVED_KEYS`]; the offending keys are reported in sorted order.
    pub fn with_extra(mut self, extra: Map<String, Value>) -> Result<Self, ConfigError> {
        let mut clashes: Vec<String> = extra
            .keys()
            .filter(|k| RESERVED_KEYS.contains(&k.as_str()))
            .cloned()
            .collect();
        if !clashes.is_empty() {
            clashes.sort();
            return Err(ConfigError::ReservedKeys(clashes));
        }
        self.extra = extra;
        Ok(self)
    }

    /// Flat view of the configurable map as the graph sees it.
    pub fn configurable(&self) -> Map<String, Value> {
        let mut map = self.extra.clone();
        map.insert("thread_id".into(), Value::String(self.thread_id.to_string()));
        if let Some(model) = &self.model {
            map.insert("model".into(), Value::String(model.clone()));
        }
        if let Some(user_id) = &self.user_id {
            map.insert("user_id".into(), Value::String(user_id.clone()));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn new_mints_ids() {
        let a = RunConfig::new(None);
        let b = RunConfig::new(None);
        assert_ne!(a.run_id, b.run_id);
        assert_ne!(a.thread_id, b.thread_id);
    }

    #[test]
    fn new_reuses_thread_id() {
        let cfg = RunConfig::new(Some(ThreadId::from_raw("t-1")));
        assert_eq!(cfg.thread_id.as_str(), "t-1");
    }

    #[test]
    fn reserved_keys_rejected() {
        let err = RunConfig::new(None)
            .with_extra(map(json!({"user_id": "x", "temperature": 0.2, "model": "m"})))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ReservedKeys(vec!["model".into(), "user_id".into()])
        );
    }

    #[test]
    fn configurable_merges_extra_and_identity() {
        let cfg = RunConfig::new(Some(ThreadId::from_raw("t-2")))
            .with_model(Some("gpt-4o-mini".into()))
            .with_extra(map(json!({"temperature": 0.2})))
            .unwrap();
        let conf = cfg.configurable();
        assert_eq!(conf["thread_id"], "t-2");
        assert_eq!(conf["model"], "gpt-4o-mini");
        assert_eq!(conf["temperature"], 0.2);
        assert!(!conf.contains_key("user_id"));
    }
}
