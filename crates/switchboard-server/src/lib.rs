//! HTTP/SSE front end: routes, bearer auth, and the reduction of engine
//! event streams into client frames.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod invoke;
pub mod run;
pub mod schema;
pub mod server;
pub mod stream;

pub use error::{ApiError, ServiceError};
pub use server::{build_router, serve, AppState, ServerConfig};
pub use stream::reducer::NodeRoles;
pub use stream::StreamOptions;
