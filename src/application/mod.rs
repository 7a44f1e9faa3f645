//! Application wiring
//!
//! `GatewayEnv` assembles the shared handles once; `Application` runs the
//! HTTP server and the feedback queue worker side by side.

pub mod app;
pub mod env;

pub use app::Application;
pub use env::{GatewayEnv, KvNamespaces};
