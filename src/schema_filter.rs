//! Metadata Relevance Filter
//!
//! Narrows a full schema description down to the tables a question is about,
//! using the semantic tags attached to tables. The narrower schema keeps the
//! model from reaching for unrelated tables.
//!
//! The filter fails open: whenever it cannot pick at least one known table it
//! hands back the metadata it was given.

use crate::models::{SchemaMetadata, SemanticTag, TargetType};
use std::collections::HashSet;
use tracing::debug;

/// Vocabulary too broad to pick a table on its own.
pub const GENERIC_TAGS: &[&str] = &[
    "server",
    "host",
    "machine",
    "device",
    "usage",
    "utilization",
    "load",
    "stats",
];

fn is_generic(tag: &str) -> bool {
    GENERIC_TAGS.contains(&tag)
}

/// Filter `metadata` to the tables relevant to `question`.
///
/// Absent metadata stays absent.
pub fn filter_for_question(
    metadata: Option<&SchemaMetadata>,
    question: &str,
) -> Option<SchemaMetadata> {
    metadata.map(|m| filter_metadata(m, question))
}

pub fn filter_metadata(metadata: &SchemaMetadata, question: &str) -> SchemaMetadata {
    let tags = match metadata.tags.as_deref() {
        Some(tags) if !tags.is_empty() => tags,
        _ => return metadata.clone(),
    };

    let relevant = relevant_tables(tags, question);
    if relevant.is_empty() {
        debug!("No table tags matched the question, keeping full schema");
        return metadata.clone();
    }

    let tables: Vec<_> = metadata
        .tables
        .iter()
        .flatten()
        .filter(|t| relevant.contains(&t.qualified_key()))
        .cloned()
        .collect();

    // Tags pointed at tables the schema does not describe
    if tables.is_empty() {
        debug!(
            "Tagged tables {:?} not present in schema, keeping full schema",
            relevant
        );
        return metadata.clone();
    }

    let columns = metadata.columns.as_ref().map(|cols| {
        cols.iter()
            .filter(|c| relevant.contains(&c.table_key()))
            .cloned()
            .collect()
    });

    // Both endpoints must survive
    let joins = metadata.joins.as_ref().map(|joins| {
        joins
            .iter()
            .filter(|j| relevant.contains(&j.from_key()) && relevant.contains(&j.to_key()))
            .cloned()
            .collect()
    });

    debug!(
        "Schema narrowed to {} table(s): {:?}",
        tables.len(),
        tables.iter().map(|t| t.qualified_key()).collect::<Vec<_>>()
    );

    SchemaMetadata {
        tables: Some(tables),
        columns,
        joins,
        tags: metadata.tags.clone(),
        examples: metadata.examples.clone(),
    }
}

/// Lowercased `schema.table` names selected by the tags that occur in `question`.
///
/// Generic tags only count when no specific tag occurs in the question.
pub fn relevant_tables(tags: &[SemanticTag], question: &str) -> HashSet<String> {
    let question = question.to_lowercase();

    let matched: Vec<(&SemanticTag, bool)> = tags
        .iter()
        .filter_map(|t| {
            let tag = t.tag.to_lowercase();
            question.contains(&tag).then(|| (t, is_generic(&tag)))
        })
        .collect();

    let has_specific_match = matched.iter().any(|(_, generic)| !generic);

    matched
        .into_iter()
        .filter(|(_, generic)| !(has_specific_match && *generic))
        .filter(|(t, _)| t.target_type == TargetType::Table)
        .map(|(t, _)| t.target.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SchemaColumn, SchemaJoin, SchemaTable};

    fn table(name: &str) -> SchemaTable {
        SchemaTable {
            schema_name: Some("dbo".to_string()),
            name: name.to_string(),
            description: Some(format!("{} samples", name)),
        }
    }

    fn column(table: &str, name: &str) -> SchemaColumn {
        SchemaColumn {
            table_schema: "dbo".to_string(),
            table_name: table.to_string(),
            name: name.to_string(),
            data_type: Some("float".to_string()),
            is_nullable: None,
            description: None,
        }
    }

    fn join(from: &str, to: &str) -> SchemaJoin {
        SchemaJoin {
            from_table_schema: "dbo".to_string(),
            from_table_name: from.to_string(),
            from_column: "DeviceId".to_string(),
            to_table_schema: "dbo".to_string(),
            to_table_name: to.to_string(),
            to_column: "DeviceId".to_string(),
            join_type: "INNER".to_string(),
        }
    }

    fn tag(target: &str, tag: &str) -> SemanticTag {
        SemanticTag {
            target_type: TargetType::Table,
            target: target.to_string(),
            tag: tag.to_string(),
            weight: 1.0,
        }
    }

    fn perf_metadata() -> SchemaMetadata {
        SchemaMetadata {
            tables: Some(vec![
                table("CpuPerformance"),
                table("MemoryPerformance"),
                table("Devices"),
            ]),
            columns: Some(vec![
                column("CpuPerformance", "DataValue"),
                column("MemoryPerformance", "DataValue"),
                column("Devices", "DeviceName"),
            ]),
            joins: Some(vec![
                join("CpuPerformance", "Devices"),
                join("MemoryPerformance", "Devices"),
                join("CpuPerformance", "MemoryPerformance"),
            ]),
            tags: Some(vec![
                tag("dbo.CpuPerformance", "cpu"),
                tag("dbo.MemoryPerformance", "memory"),
                tag("dbo.Devices", "server"),
            ]),
            examples: None,
        }
    }

    #[test]
    fn test_specific_tag_narrows_schema() {
        let filtered = filter_metadata(&perf_metadata(), "Show CPU for last week");
        let tables = filtered.tables.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "CpuPerformance");
        assert_eq!(filtered.columns.unwrap().len(), 1);
        assert!(filtered.joins.unwrap().is_empty());
        assert_eq!(filtered.tags.unwrap().len(), 3);
    }

    #[test]
    fn test_generic_tag_suppressed_by_specific_match() {
        let meta = perf_metadata();
        let relevant = relevant_tables(meta.tags.as_ref().unwrap(), "memory usage per server");
        assert!(relevant.contains("dbo.memoryperformance"));
        assert!(!relevant.contains("dbo.devices"));
    }

    #[test]
    fn test_generic_tag_used_when_question_is_vague() {
        let meta = perf_metadata();
        let relevant = relevant_tables(meta.tags.as_ref().unwrap(), "show server stats");
        assert_eq!(relevant.len(), 1);
        assert!(relevant.contains("dbo.devices"));
    }

    #[test]
    fn test_joins_need_both_endpoints() {
        let filtered = filter_metadata(&perf_metadata(), "cpu and memory trends");
        let joins = filtered.joins.unwrap();
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].from_table_name, "CpuPerformance");
        assert_eq!(joins[0].to_table_name, "MemoryPerformance");
    }

    #[test]
    fn test_fail_open_when_no_tag_matches() {
        let meta = perf_metadata();
        assert_eq!(filter_metadata(&meta, "disk latency"), meta);
    }

    #[test]
    fn test_fail_open_when_tagged_table_missing_from_schema() {
        let mut meta = perf_metadata();
        meta.tags = Some(vec![tag("dbo.DiskPerformance", "disk")]);
        assert_eq!(filter_metadata(&meta, "disk latency"), meta);
    }

    #[test]
    fn test_no_tags_returns_input() {
        let mut meta = perf_metadata();
        meta.tags = None;
        assert_eq!(filter_metadata(&meta, "cpu"), meta);
        meta.tags = Some(vec![]);
        assert_eq!(filter_metadata(&meta, "cpu"), meta);
        assert!(filter_for_question(None, "cpu").is_none());
    }

    #[test]
    fn test_column_tags_do_not_select_tables() {
        let mut meta = perf_metadata();
        meta.tags = Some(vec![SemanticTag {
            target_type: TargetType::Column,
            target: "dbo.CpuPerformance.DataValue".to_string(),
            tag: "cpu".to_string(),
            weight: 1.0,
        }]);
        assert_eq!(filter_metadata(&meta, "cpu"), meta);
    }

    #[test]
    fn test_absent_lists_stay_absent() {
        let mut meta = perf_metadata();
        meta.columns = None;
        meta.joins = None;
        let filtered = filter_metadata(&meta, "cpu");
        assert!(filtered.columns.is_none());
        assert!(filtered.joins.is_none());
        assert_eq!(filtered.tables.unwrap().len(), 1);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let mut meta = perf_metadata();
        meta.tags = Some(vec![tag("DBO.CPUPERFORMANCE", "CPU")]);
        let filtered = filter_metadata(&meta, "average cpu");
        assert_eq!(filtered.tables.unwrap()[0].name, "CpuPerformance");
    }

    #[test]
    fn test_filter_is_idempotent() {
        for question in ["cpu and memory", "server stats", "memory usage", "nothing"] {
            let once = filter_metadata(&perf_metadata(), question);
            let twice = filter_metadata(&once, question);
            assert_eq!(once, twice, "question: {}", question);
        }
    }
}
