//! Core of the LLM Telegram relay: admission control and model dispatch.
//!
//! This crate is framework-agnostic. Telegram and the HTTP model provider live
//! behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod security;
pub mod settings;

pub use errors::{Error, Result};
