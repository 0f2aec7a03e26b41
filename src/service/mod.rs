//! Request orchestration
//!
//! `AiService` owns the model names and an injected `ModelClient`; each
//! operation lives in its own submodule as an `impl AiService` block.

mod analysis;
mod explanation;
mod sql_generation;

pub use analysis::{format_rows, ANALYSIS_UNAVAILABLE, UNPARSED_RECOMMENDATION};
pub use explanation::extract_key_points;
pub use sql_generation::SQL_UNAVAILABLE;

use crate::config::Config;
use crate::model_client::ModelClient;
use std::sync::Arc;

/// Which model serves each operation.
#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub sql: String,
    pub explain: String,
    pub analyze: String,
}

impl ModelSelection {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sql: config.sql_model.clone(),
            explain: config.explain_model.clone(),
            analyze: config.analyze_model.clone(),
        }
    }
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Clone)]
pub struct AiService {
    client: Arc<dyn ModelClient>,
    models: ModelSelection,
}

impl AiService {
    pub fn new(client: Arc<dyn ModelClient>, models: ModelSelection) -> Self {
        Self { client, models }
    }

    pub fn models(&self) -> &ModelSelection {
        &self.models
    }
}
