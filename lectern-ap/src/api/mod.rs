//! HTTP API: control endpoints, status and SSE

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, run, AppContext};
