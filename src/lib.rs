//! AI backend for natural-language analytics
//!
//! Turns operator questions into T-SQL against a monitoring database,
//! explains SQL in plain English, and summarizes result sets. All model
//! calls go through [`model_client::ModelClient`].

pub mod config;
pub mod error;
pub mod intent;
pub mod logging;
pub mod model_client;
pub mod models;
pub mod prompt;
pub mod repair;
pub mod safety;
pub mod schema_filter;
pub mod schema_render;
pub mod server;
pub mod service;

pub use config::Config;
pub use error::{AiError, Result};
pub use model_client::{ModelClient, OllamaClient};
pub use service::{AiService, ModelSelection};
