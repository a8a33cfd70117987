//! Model backend port.

pub mod client;
pub mod types;

pub use client::ChatBackend;
pub use types::{CompletionRequest, ImageSource};
