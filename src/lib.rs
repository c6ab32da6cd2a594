//! Operator dashboard for pipeline queues.
//!
//! - `proxy`: credential-injecting HTTP proxy in front of the pipeline service.
//! - `dashboard`: queue view state machine and its text rendering.
//! - `model`: queue vocabulary shared by both sides.

pub mod config;
pub mod dashboard;
pub mod model;
pub mod proxy;
pub mod upstream;
