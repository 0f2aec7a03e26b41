//! Prompt Composer for SQL generation
//!
//! The prompt ends with a bare `SELECT` so completion models continue the
//! statement; the extractor in `repair` restores the keyword when the model
//! omits it.

use crate::intent::QueryIntent;

const HARD_REQUIREMENTS: &str = "\
HARD REQUIREMENTS:
- **Schema:** ONLY use columns from the provided Schema.
- **No Joins:** Do NOT join tables unless explicitly asked for multiple metrics (e.g. \"CPU and Memory\").
- **No Aliases:** Use FULL table names (e.g. `dbo.MemoryPerformance.DataValue`). Do NOT use aliases like `t1` or `mp`.
- **No CTEs:** Do NOT use `WITH` clauses. Use standard SELECT.
- **Structure:** SELECT list must match GROUP BY.
- **Syntax:** Use `TOP n`, `DATEADD`, `GETDATE()`. NO `interval`.";

pub fn compose_sql_prompt(schema_block: &str, question: &str, intent: &QueryIntent) -> String {
    format!(
        "### Instructions\n\
         Convert the user's question into a valid T-SQL query.\n\
         \n\
         {requirements}\n\
         \n\
         ### Schema\n\
         {schema}\n\
         \n\
         ### Question\n\
         {question}\n\
         \n\
         ### Execution Plan\n\
         1. {time}\n\
         2. {grouping}\n\
         3. {aggregation}\n\
         4. {filter}\n\
         \n\
         ### Query\n\
         SELECT",
        requirements = HARD_REQUIREMENTS,
        schema = schema_block,
        question = question,
        time = intent.time_filter_clause(),
        grouping = intent.grouping_clause(),
        aggregation = intent.aggregation_clause(),
        filter = intent.mandatory_filter_clause(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_render::NO_METADATA;

    #[test]
    fn test_sections_in_order() {
        let intent = QueryIntent::extract("monthly peak cpu in 2024", None, None);
        let prompt = compose_sql_prompt(NO_METADATA, "monthly peak cpu in 2024", &intent);

        let positions: Vec<usize> = [
            "HARD REQUIREMENTS:",
            "### Schema\nNo explicit metadata provided.",
            "### Question\nmonthly peak cpu in 2024",
            "1. FILTER RULE: Use `YEAR(DataCollectionDate) IN (2024)`.",
            "2. GROUPING RULE: GROUP BY",
            "3. AGGREGATION: Use MAX(DataValue).",
            "4. MANDATORY FILTER: Filter by DeviceName if mentioned.",
            "### Query\nSELECT",
        ]
        .iter()
        .map(|needle| prompt.find(needle).unwrap_or_else(|| panic!("missing {:?}", needle)))
        .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.ends_with("SELECT"));
    }

    #[test]
    fn test_deterministic() {
        let intent = QueryIntent::extract("cpu today", Some("24h"), None);
        assert_eq!(
            compose_sql_prompt("Tables:", "cpu today", &intent),
            compose_sql_prompt("Tables:", "cpu today", &intent)
        );
    }
}
