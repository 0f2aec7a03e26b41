use ai_backend::models::{
    AnalyzeRequest, ExplainSqlRequest, Filters, Row, SchemaMetadata, SqlGenRequest,
};
use ai_backend::{logging, AiService, Config, ModelSelection, OllamaClient};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "ai-backend")]
#[command(about = "Natural-language SQL generation, explanation and result analysis")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate T-SQL for a question
    Generate {
        question: String,

        /// Time range hint, e.g. last_7_days or 24h
        #[arg(long)]
        time_range: Option<String>,

        /// Metric hint, e.g. cpu or memory
        #[arg(long)]
        metric_type: Option<String>,

        /// Equality filters as a JSON object, e.g. '{"Region":"East"}'
        #[arg(long)]
        filters: Option<String>,

        /// Schema metadata JSON file
        #[arg(short, long)]
        metadata: Option<PathBuf>,
    },
    /// Explain a SQL statement
    Explain {
        sql: String,

        #[arg(long, default_value = "tsql")]
        dialect: String,
    },
    /// Analyze result rows from a JSON file (array of objects)
    Analyze {
        rows: PathBuf,

        /// Question the rows answer
        #[arg(short, long)]
        query: Option<String>,

        /// SQL that produced the rows
        #[arg(long)]
        sql: Option<String>,

        /// Column order, comma separated
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,

        /// Schema metadata JSON file
        #[arg(short, long)]
        metadata: Option<PathBuf>,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn read_metadata(path: Option<&Path>) -> Result<Option<SchemaMetadata>> {
    path.map(read_json::<SchemaMetadata>).transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;
    logging::init(&config.log_level);

    let client = OllamaClient::from_config(&config)?;
    info!(runtime = client.endpoint(), "using model runtime");
    let service = AiService::new(Arc::new(client), ModelSelection::from_config(&config));

    let output = match args.command {
        Command::Generate {
            question,
            time_range,
            metric_type,
            filters,
            metadata,
        } => {
            let filters: Option<Filters> = filters
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("--filters must be a JSON object")?;
            let request = SqlGenRequest {
                natural_language: question,
                time_range,
                metric_type,
                filters,
                metadata: read_metadata(metadata.as_deref())?,
                ..Default::default()
            };
            serde_json::to_string_pretty(&service.generate_sql(&request).await?)?
        }
        Command::Explain { sql, dialect } => {
            let request = ExplainSqlRequest {
                sql,
                dialect: Some(dialect),
            };
            serde_json::to_string_pretty(&service.explain_sql(&request).await?)?
        }
        Command::Analyze {
            rows,
            query,
            sql,
            columns,
            metadata,
        } => {
            let rows: Vec<Row> = read_json(&rows)?;
            let request = AnalyzeRequest {
                rows,
                columns,
                query,
                sql,
                metadata: read_metadata(metadata.as_deref())?,
            };
            serde_json::to_string_pretty(&service.analyze_results(&request).await?)?
        }
    };

    println!("{}", output);
    Ok(())
}
