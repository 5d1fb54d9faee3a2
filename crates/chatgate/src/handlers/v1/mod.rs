//! V1 API handlers.

mod chat;
mod models;

pub use chat::chat_completions;
pub use models::list_models;
