//! HTTP request handlers.

mod health;
pub mod v1;

pub use health::{health, livez};
