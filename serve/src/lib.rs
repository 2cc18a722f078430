//! Agent ingress: a thin axum layer over the tempo runtime.
//!
//! Ingress authenticates, builds graph input, and delegates — streaming
//! turns to the session manager, everything else to the checkpoint store or
//! the runtime context. All behaviour lives in the core crate; handlers here
//! shape HTTP.

mod auth;
mod dto;
mod routes;
mod sse;
mod state;

pub use dto::build_user_message;
pub use routes::router;
pub use sse::item_to_event;
pub use state::{build_state, AppState};
