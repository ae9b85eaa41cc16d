pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod events;
pub mod graph;
pub mod ids;
pub mod messages;
pub mod provider;
