use super::AiService;
use crate::error::Result;
use crate::intent::QueryIntent;
use crate::models::{SqlGenRequest, SqlGenResponse};
use crate::prompt::compose_sql_prompt;
use crate::repair::finalize_sql;
use crate::safety::check_read_only;
use crate::schema_filter::filter_for_question;
use crate::schema_render::render_schema;
use tracing::{info, warn};

pub const SQL_UNAVAILABLE: &str = "AI Service Unavailable";

impl AiService {
    /// Natural language question to a single-line T-SQL query.
    ///
    /// Model connectivity problems produce an empty query with the error as a
    /// warning instead of failing the request.
    pub async fn generate_sql(&self, request: &SqlGenRequest) -> Result<SqlGenResponse> {
        let question = request.natural_language.as_str();
        info!(
            job_id = request.job_id.as_deref().unwrap_or("-"),
            user_id = request.user_id.unwrap_or_default(),
            metric_type = request.metric_type.as_deref().unwrap_or("-"),
            "generating SQL"
        );

        let filtered = filter_for_question(request.metadata.as_ref(), question);
        let schema_block = render_schema(filtered.as_ref());
        let intent = QueryIntent::extract(
            question,
            request.time_range.as_deref(),
            request.filters.as_ref(),
        );
        let prompt = compose_sql_prompt(&schema_block, question, &intent);

        let raw = match self.client.generate(&self.models.sql, &prompt).await {
            Ok(raw) => raw,
            Err(e) if e.is_transient() => {
                warn!("SQL generation degraded: {}", e);
                return Ok(SqlGenResponse {
                    generated_sql: String::new(),
                    reasoning: Some(SQL_UNAVAILABLE.to_string()),
                    warnings: Some(vec![e.to_string()]),
                });
            }
            Err(e) => return Err(e),
        };

        let generated_sql = finalize_sql(&raw, question, request.filters.as_ref());

        let mut warnings = Vec::new();
        if let Err(violation) = check_read_only(&generated_sql) {
            warn!("unsafe SQL generated: {}", violation);
            warnings.push(violation.to_string());
        }

        Ok(SqlGenResponse {
            generated_sql,
            reasoning: None,
            warnings: Some(warnings),
        })
    }
}
