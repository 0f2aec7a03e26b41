//! Request, response and schema-metadata types
//!
//! Field names match the JSON accepted and produced by the HTTP API. Every
//! optional field may be omitted by the caller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema assumed when a table does not name one.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// Structured filters keyed by column name, in caller order.
pub type Filters = Map<String, Value>;

/// A result row keyed by column name, in caller order.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaTable {
    /// SQL schema, e.g. `dbo`. Accepts `schema` on input.
    #[serde(default, alias = "schema", skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl SchemaTable {
    pub fn schema(&self) -> &str {
        self.schema_name.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    /// `schema.table`, lowercased for matching
    pub fn qualified_key(&self) -> String {
        qualified_key(self.schema(), &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub table_schema: String,
    pub table_name: String,
    pub name: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub is_nullable: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SchemaColumn {
    pub fn table_key(&self) -> String {
        qualified_key(&self.table_schema, &self.table_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaJoin {
    pub from_table_schema: String,
    pub from_table_name: String,
    pub from_column: String,
    pub to_table_schema: String,
    pub to_table_name: String,
    pub to_column: String,
    #[serde(default = "default_join_type")]
    pub join_type: String,
}

fn default_join_type() -> String {
    "INNER".to_string()
}

impl SchemaJoin {
    pub fn from_key(&self) -> String {
        qualified_key(&self.from_table_schema, &self.from_table_name)
    }

    pub fn to_key(&self) -> String {
        qualified_key(&self.to_table_schema, &self.to_table_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Table,
    Column,
    /// Anything else the metadata store sends; never selects a table.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticTag {
    pub target_type: TargetType,
    /// Qualified identifier, e.g. `dbo.CpuPerformance`
    pub target: String,
    pub tag: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaExample {
    pub natural_language_query: String,
    pub sql_example: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Schema context supplied per request. Absent lists stay absent through filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    #[serde(default)]
    pub tables: Option<Vec<SchemaTable>>,
    #[serde(default)]
    pub columns: Option<Vec<SchemaColumn>>,
    #[serde(default)]
    pub joins: Option<Vec<SchemaJoin>>,
    #[serde(default)]
    pub tags: Option<Vec<SemanticTag>>,
    #[serde(default)]
    pub examples: Option<Vec<SchemaExample>>,
}

pub fn qualified_key(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table).to_lowercase()
}

// ---------------------------------------------------------------------------
// SQL generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlGenRequest {
    pub natural_language: String,
    /// Hint such as `last_7_days`, `24h`, `30d`
    #[serde(default)]
    pub time_range: Option<String>,
    /// Hint such as `cpu`, `memory`, `disk`
    #[serde(default)]
    pub metric_type: Option<String>,
    #[serde(default)]
    pub filters: Option<Filters>,
    #[serde(default)]
    pub metadata: Option<SchemaMetadata>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlGenResponse {
    pub generated_sql: String,
    pub reasoning: Option<String>,
    pub warnings: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// SQL explanation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainSqlRequest {
    pub sql: String,
    #[serde(default = "default_dialect")]
    pub dialect: Option<String>,
}

fn default_dialect() -> Option<String> {
    Some("tsql".to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainSqlResponse {
    pub explanation: String,
    pub key_points: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Result analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub metadata: Option<SchemaMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub analysis: String,
    pub anomalies: Option<Vec<String>>,
    pub recommendations: Option<Vec<String>>,
}
