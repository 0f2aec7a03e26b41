use crate::models::SchemaMetadata;

pub const NO_METADATA: &str = "No explicit metadata provided.";

/// Render tables and columns as the compact schema block used in prompts.
///
/// Joins, tags and examples are not rendered.
pub fn render_schema(metadata: Option<&SchemaMetadata>) -> String {
    let metadata = match metadata {
        Some(m) => m,
        None => return NO_METADATA.to_string(),
    };

    let mut lines: Vec<String> = Vec::new();

    if let Some(tables) = metadata.tables.as_deref().filter(|t| !t.is_empty()) {
        lines.push("Tables:".to_string());
        for t in tables {
            lines.push(format!(
                "- {}.{}: {}",
                t.schema(),
                t.name,
                t.description.as_deref().unwrap_or("")
            ));
        }
    }

    if let Some(columns) = metadata.columns.as_deref().filter(|c| !c.is_empty()) {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Columns:".to_string());
        for c in columns {
            lines.push(format!(
                "- {}.{}.{} ({})",
                c.table_schema,
                c.table_name,
                c.name,
                c.data_type.as_deref().unwrap_or("unknown")
            ));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SchemaColumn, SchemaTable};

    #[test]
    fn test_absent_metadata() {
        assert_eq!(render_schema(None), NO_METADATA);
    }

    #[test]
    fn test_tables_then_columns() {
        let meta = SchemaMetadata {
            tables: Some(vec![
                SchemaTable {
                    schema_name: None,
                    name: "CpuPerformance".to_string(),
                    description: Some("CPU samples per device".to_string()),
                },
                SchemaTable {
                    schema_name: Some("perf".to_string()),
                    name: "Disk".to_string(),
                    description: None,
                },
            ]),
            columns: Some(vec![SchemaColumn {
                table_schema: "dbo".to_string(),
                table_name: "CpuPerformance".to_string(),
                name: "DataValue".to_string(),
                data_type: None,
                is_nullable: Some(false),
                description: None,
            }]),
            ..Default::default()
        };

        assert_eq!(
            render_schema(Some(&meta)),
            "Tables:\n\
             - dbo.CpuPerformance: CPU samples per device\n\
             - perf.Disk: \n\
             \n\
             Columns:\n\
             - dbo.CpuPerformance.DataValue (unknown)"
        );
    }

    #[test]
    fn test_empty_metadata_renders_nothing() {
        assert_eq!(render_schema(Some(&SchemaMetadata::default())), "");
    }
}
