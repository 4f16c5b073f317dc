//! HTTP JSON API
//!
//! axum router, shared state, request-context middleware and the handlers
//! for every endpoint the web client calls.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ratelimit;
pub mod routing;
pub mod session;
pub mod startup;
pub mod state;
pub mod types;

pub use error::AppError;
pub use routing::create_router;
pub use state::AppState;
