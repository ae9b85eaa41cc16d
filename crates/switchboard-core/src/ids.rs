use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque string identifiers. Fresh values are bare v4 UUIDs because run ids
/// double as Langfuse trace ids; client-supplied values are kept verbatim.
macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(RunId);
opaque_id!(ThreadId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_a_uuid() {
        let id = RunId::new();
        assert!(Uuid::parse_str(id.as_str()).is_ok(), "got: {id}");
    }

    #[test]
    fn ids_are_unique() {
        let a = ThreadId::new();
        let b = ThreadId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn from_raw_preserves_client_value() {
        let id = ThreadId::from_raw("my-conversation");
        assert_eq!(id.as_str(), "my-conversation");
        assert_eq!(id.to_string(), "my-conversation");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = RunId::from_raw("847c6285-8fc9-4560-a83f-4e6285809254");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"847c6285-8fc9-4560-a83f-4e6285809254\"");
    }
}
