use super::AiService;
use crate::error::Result;
use crate::models::{ExplainSqlRequest, ExplainSqlResponse};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

lazy_static! {
    static ref LIST_MARKER: Regex = Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+)$").unwrap();
}

fn dialect_label(dialect: Option<&str>) -> String {
    match dialect.map(str::trim).filter(|d| !d.is_empty()) {
        None => "SQL Server (T-SQL)".to_string(),
        Some(d) if d.eq_ignore_ascii_case("tsql") || d.eq_ignore_ascii_case("t-sql") => {
            "SQL Server (T-SQL)".to_string()
        }
        Some(d) => d.to_string(),
    }
}

pub(crate) fn compose_explain_prompt(sql: &str, dialect: Option<&str>) -> String {
    format!(
        "You are an expert {dialect} database engineer.\n\
         Explain the following SQL query in clear, concise plain English.\n\
         \n\
         Requirements:\n\
         - Describe what the query does overall.\n\
         - Mention key filters, joins, and aggregations.\n\
         - Mention important ORDER BY / TOP behavior.\n\
         - Avoid excessive technical jargon.\n\
         - Do NOT restate the entire SQL.\n\
         \n\
         SQL query:\n\
         {sql}",
        dialect = dialect_label(dialect),
        sql = sql.trim()
    )
}

/// Bullet and numbered lines of an explanation, markers removed.
pub fn extract_key_points(explanation: &str) -> Option<Vec<String>> {
    let points: Vec<String> = explanation
        .lines()
        .filter_map(|line| LIST_MARKER.captures(line))
        .map(|caps| caps[1].trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    if points.is_empty() {
        None
    } else {
        Some(points)
    }
}

impl AiService {
    /// Plain English explanation of `sql`. Model errors are returned as-is.
    pub async fn explain_sql(&self, request: &ExplainSqlRequest) -> Result<ExplainSqlResponse> {
        info!(dialect = request.dialect.as_deref().unwrap_or("tsql"), "explaining SQL");

        let prompt = compose_explain_prompt(&request.sql, request.dialect.as_deref());
        let raw = self.client.generate(&self.models.explain, &prompt).await?;
        let explanation = raw.trim().to_string();

        Ok(ExplainSqlResponse {
            key_points: extract_key_points(&explanation),
            explanation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::StubClient;
    use super::*;
    use crate::error::AiError;

    fn request(sql: &str, dialect: Option<&str>) -> ExplainSqlRequest {
        ExplainSqlRequest {
            sql: sql.to_string(),
            dialect: dialect.map(String::from),
        }
    }

    #[test]
    fn test_prompt_names_dialect() {
        assert!(compose_explain_prompt("SELECT 1", Some("tsql")).starts_with(
            "You are an expert SQL Server (T-SQL) database engineer."
        ));
        assert!(compose_explain_prompt("SELECT 1", Some("postgres"))
            .starts_with("You are an expert postgres database engineer."));
        assert!(compose_explain_prompt("  SELECT 1;  ", None).ends_with("SQL query:\nSELECT 1;"));
    }

    #[test]
    fn test_key_points() {
        let text = "This query ranks servers.\n\n- Filters to the last 7 days\n2. Orders by average CPU\n* \n";
        assert_eq!(
            extract_key_points(text),
            Some(vec![
                "Filters to the last 7 days".to_string(),
                "Orders by average CPU".to_string()
            ])
        );
        assert_eq!(extract_key_points("One paragraph only."), None);
    }

    #[tokio::test]
    async fn test_explain_uses_explain_model() {
        let (service, stub) = StubClient::service(Ok(
            "  This query selects the top 10 servers by average CPU utilization.\n".to_string(),
        ));
        let response = service
            .explain_sql(&request("SELECT TOP 10 DeviceName FROM t", Some("tsql")))
            .await
            .unwrap();
        assert_eq!(
            response.explanation,
            "This query selects the top 10 servers by average CPU utilization."
        );
        assert_eq!(response.key_points, None);
        assert_eq!(stub.calls()[0].0, "llama3.1:8b");
    }

    #[tokio::test]
    async fn test_explain_does_not_degrade() {
        let (service, _) = StubClient::service(Err(AiError::ModelTimeout("60s".to_string())));
        let result = service.explain_sql(&request("SELECT 1", None)).await;
        assert!(matches!(result, Err(AiError::ModelTimeout(_))));
    }
}
