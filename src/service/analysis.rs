use super::AiService;
use crate::error::{AiError, Result};
use crate::models::{AnalyzeRequest, AnalyzeResponse, Row};
use crate::schema_render::render_schema;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

pub const ANALYSIS_UNAVAILABLE: &str = "AI Service Unavailable. Could not analyze results.";
pub const UNPARSED_RECOMMENDATION: &str = "Could not parse specific recommendations.";

const MAX_PROMPT_ROWS: usize = 30;
const MAX_SQL_CHARS: usize = 500;

lazy_static! {
    static ref JSON_OBJECT: Regex = Regex::new(r"\{[\s\S]*\}").unwrap();
}

#[derive(Debug, Deserialize)]
struct AnalysisReply {
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    anomalies: Option<Vec<String>>,
    #[serde(default)]
    recommendations: Option<Vec<String>>,
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Pipe-delimited table of the first `max_rows` rows.
///
/// Columns come from `columns` when given, otherwise from the first row.
pub fn format_rows(rows: &[Row], columns: Option<&[String]>, max_rows: usize) -> String {
    if rows.is_empty() {
        return "No rows returned.".to_string();
    }

    let cols: Vec<String> = match columns {
        Some(cols) if !cols.is_empty() => cols.to_vec(),
        _ => rows[0].keys().cloned().collect(),
    };

    let mut lines = Vec::with_capacity(rows.len().min(max_rows) + 3);
    lines.push(cols.join(" | "));
    lines.push(
        cols.iter()
            .map(|c| "-".repeat(c.chars().count()))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in rows.iter().take(max_rows) {
        let values: Vec<String> = cols.iter().map(|c| cell(row.get(c))).collect();
        lines.push(values.join(" | "));
    }

    if rows.len() > max_rows {
        lines.push(format!("... ({} more rows not shown)", rows.len() - max_rows));
    }

    lines.join("\n")
}

fn truncate_sql(sql: &str) -> String {
    let sql = sql.trim();
    if sql.chars().count() > MAX_SQL_CHARS {
        let head: String = sql.chars().take(MAX_SQL_CHARS).collect();
        format!("{}... [truncated]", head)
    } else {
        sql.to_string()
    }
}

fn context_block(request: &AnalyzeRequest) -> String {
    let mut lines = Vec::new();
    if let Some(query) = request.query.as_deref().filter(|q| !q.trim().is_empty()) {
        lines.push(format!("User Question: {}", query));
    }
    if let Some(sql) = request.sql.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(format!("SQL Query: {}", truncate_sql(sql)));
    }
    if request.metadata.is_some() {
        lines.push(format!("Schema:\n{}", render_schema(request.metadata.as_ref())));
    }

    if lines.is_empty() {
        "No extra context.".to_string()
    } else {
        lines.join("\n")
    }
}

pub(crate) fn compose_analysis_prompt(request: &AnalyzeRequest) -> String {
    let table = format_rows(&request.rows, request.columns.as_deref(), MAX_PROMPT_ROWS);

    format!(
        "You are an expert SRE and Capacity Planner.\n\
         Analyze the database query results below and provide structured insights.\n\
         \n\
         ### Context\n\
         {context}\n\
         \n\
         ### Data (Tabular)\n\
         {table}\n\
         \n\
         ### Instructions\n\
         1. **Trend Analysis:** Look strictly at the Date/Month column. Note that data might be sorted DESC (newest first). Don't confuse \"top of list\" with \"start of time\".\n\
         2. **Anomalies:** Identify specific resources (Servers, Disks) exceeding safe thresholds (e.g. CPU > 80%, Disk < 10% free).\n\
         3. **Output Format:** You MUST return a valid JSON object.\n\
         \n\
         ### JSON Structure\n\
         {{\n\
         \x20 \"analysis\": \"A short executive summary of trends.\",\n\
         \x20 \"anomalies\": [\"Specific outliers or warnings.\"],\n\
         \x20 \"recommendations\": [\"2-4 actionable steps.\"]\n\
         }}\n\
         \n\
         ### Response (JSON Only)\n",
        context = context_block(request),
        table = table,
    )
}

fn parse_reply(raw: &str) -> Result<AnalyzeResponse> {
    let cleaned = raw.trim();
    let candidate = JSON_OBJECT
        .find(cleaned)
        .map(|m| m.as_str())
        .unwrap_or(cleaned);

    let reply: AnalysisReply = serde_json::from_str(candidate)
        .map_err(|e| AiError::MalformedOutput(format!("analysis is not the expected JSON: {}", e)))?;
    Ok(AnalyzeResponse {
        analysis: reply
            .analysis
            .unwrap_or_else(|| "No analysis provided.".to_string()),
        anomalies: Some(reply.anomalies.unwrap_or_default()),
        recommendations: Some(reply.recommendations.unwrap_or_default()),
    })
}

impl AiService {
    /// Capacity insights over tabular results.
    ///
    /// Free-text model output becomes the analysis itself; an unreachable or
    /// slow runtime yields a fixed notice rather than an error.
    pub async fn analyze_results(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse> {
        info!(rows = request.rows.len(), "analyzing results");

        let prompt = compose_analysis_prompt(request);
        let raw = match self.client.generate(&self.models.analyze, &prompt).await {
            Ok(raw) => raw,
            Err(e) if e.is_transient() => {
                warn!("analysis degraded: {}", e);
                return Ok(AnalyzeResponse {
                    analysis: ANALYSIS_UNAVAILABLE.to_string(),
                    anomalies: Some(Vec::new()),
                    recommendations: Some(vec![format!("Check AI Service connection: {}", e)]),
                });
            }
            Err(e) => return Err(e),
        };

        Ok(parse_reply(&raw).unwrap_or_else(|e| {
            warn!("returning unstructured analysis: {}", e);
            AnalyzeResponse {
                analysis: raw.trim().to_string(),
                anomalies: Some(Vec::new()),
                recommendations: Some(vec![UNPARSED_RECOMMENDATION.to_string()]),
            }
        }))
    }
}
