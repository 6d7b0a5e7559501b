//! Quiver CLI application.

use crate::cli::{CliArgs, CollectionAction, Command};
use crate::config::QuiverConfig;
use crate::{config_handlers, handlers};
use quiver_core::{Error, Result};
use quiver_eval::{Metric, RankedConfiguration};
use quiver_retrieval::RetrievalOutcome;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ============================================================================
// QuiverApp
// ============================================================================

/// The CLI application: loaded configuration plus command dispatch.
pub struct QuiverApp {
    config: Arc<QuiverConfig>,
    version: String,
}

impl QuiverApp {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let config = QuiverConfig::load(args.config.as_deref())?;
        Ok(Self::new(config))
    }

    /// Create an application around an already-loaded configuration.
    pub fn new(config: QuiverConfig) -> Self {
        Self {
            config: Arc::new(config),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &QuiverConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` env var if set, otherwise defaults based on verbosity
    /// flags. Records from the `log` facade used by the library crates are
    /// forwarded to the same subscriber.
    pub fn init_logging(&self, verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // Ignore error if a subscriber is already set (e.g. in tests).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Run the CLI with the given arguments.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);

        match args.command {
            Some(Command::Ingest { file, targets }) => {
                self.ingest(Path::new(&file), &targets).await
            }
            Some(Command::Query {
                text,
                top_k,
                modules,
                filters,
                json,
            }) => {
                let filter = handlers::parse_filters(&filters)?;
                let outcome =
                    handlers::handle_query(&self.config, &text, top_k, &modules, filter.as_ref())
                        .await?;
                print_outcome(&outcome, json)
            }
            Some(Command::Evaluate {
                file,
                top_k,
                metrics,
                compare,
                primary,
                json,
            }) => {
                let metrics = metrics
                    .iter()
                    .map(|m| m.parse())
                    .collect::<Result<Vec<Metric>>>()?;
                let primary: Metric = primary.parse()?;
                let ranked = handlers::handle_evaluate(
                    &self.config,
                    Path::new(&file),
                    top_k,
                    &metrics,
                    compare,
                    primary,
                )
                .await?;
                print_ranked(&ranked, primary, json)
            }
            Some(Command::Collection(cmd)) => match cmd.command {
                CollectionAction::Info { backend } => {
                    match handlers::handle_collection_info(&self.config, &backend).await? {
                        Some(info) => {
                            println!("backend:    {backend}");
                            println!("collection: {}", info.name);
                            println!("metric:     {}", info.metric);
                            match info.dimension {
                                Some(d) => println!("dimension:  {d}"),
                                None => println!("dimension:  (not yet fixed)"),
                            }
                            println!("records:    {}", info.record_count);
                        }
                        None => println!("Collection for backend '{backend}' does not exist"),
                    }
                    Ok(())
                }
                CollectionAction::Delete { backend } => {
                    handlers::handle_collection_delete(&self.config, &backend).await?;
                    println!("Deleted collection for backend '{backend}'");
                    Ok(())
                }
            },
            Some(Command::Config(config_cmd)) => {
                config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
            }
            Some(Command::Version) => {
                println!("quiver {}", self.version);
                Ok(())
            }
            None => {
                println!("quiver {} - use --help for usage", self.version);
                Ok(())
            }
        }
    }

    async fn ingest(&self, file: &Path, targets: &[String]) -> Result<()> {
        let documents = handlers::load_documents(file)?;
        let total = documents.len();
        let reports = handlers::handle_ingest(&self.config, documents, targets).await?;

        let mut failed = 0;
        for entry in &reports {
            println!(
                "{}: {} succeeded, {} failed",
                entry.target,
                entry.report.succeeded.len(),
                entry.report.failed.len()
            );
            for record in &entry.report.failed {
                eprintln!("  {}: {}", record.id, record.error);
            }
            failed += entry.report.failed.len();
        }

        if failed > 0 {
            return Err(Error::operation(format!(
                "{failed} record(s) across {} target(s) failed out of {total} documents",
                reports.len()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Output
// ============================================================================

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_outcome(outcome: &RetrievalOutcome, json: bool) -> Result<()> {
    if json {
        return print_json(outcome);
    }
    for (rank, hit) in outcome.hits.iter().enumerate() {
        let text = hit
            .payload
            .as_ref()
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .map(|t| preview(t, 60))
            .unwrap_or_default();
        println!("{:>3}. {:<24} {:.5}  {}", rank + 1, hit.id, hit.score, text);
    }
    if outcome.hits.is_empty() {
        println!("No results");
    }
    for degraded in &outcome.degraded {
        eprintln!(
            "warning: module '{}' degraded: {}",
            degraded.module, degraded.reason
        );
    }
    Ok(())
}

fn print_ranked(ranked: &[RankedConfiguration], primary: Metric, json: bool) -> Result<()> {
    if json {
        return print_json(&ranked);
    }
    for entry in ranked {
        let means: Vec<String> = entry
            .report
            .means
            .iter()
            .map(|(metric, value)| format!("{metric}={value:.4}"))
            .collect();
        println!(
            "{:<16} {primary}={:.4}  [{}]",
            entry.name,
            entry.score,
            means.join(" ")
        );
        let degraded = entry.report.degraded_queries();
        if degraded > 0 {
            eprintln!("warning: '{}' degraded on {degraded} queries", entry.name);
        }
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::CliArgs;
    use clap::Parser;
    use quiver_vector::EngineConfig;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir) -> String {
        let mut config = QuiverConfig::default();
        config.backends[0].engine = EngineConfig::Memory {
            path: Some(dir.path().join("vectors.json").to_string_lossy().into_owned()),
        };
        config.backends[0].embedding.dimension = Some(16);
        config.lexical[0].path =
            Some(dir.path().join("keywords").to_string_lossy().into_owned());

        let path = dir.path().join("config.toml");
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn app_for(config_path: &str) -> QuiverApp {
        let args = CliArgs::parse_from(["quiver", "--config", config_path]);
        QuiverApp::from_args(&args).unwrap()
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdefghij", 4), "abcd...");
        assert_eq!(preview("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn test_init_logging_variants() {
        let app = QuiverApp::new(QuiverConfig::default());
        // Should not panic
        app.init_logging(false, false);
        app.init_logging(true, false);
        app.init_logging(false, true);
    }

    #[tokio::test]
    async fn test_run_version_and_no_command() {
        let app = QuiverApp::new(QuiverConfig::default());
        assert!(app.run(CliArgs::parse_from(["quiver", "version"])).await.is_ok());
        assert!(app.run(CliArgs::parse_from(["quiver"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_ingest_query_evaluate() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(&dir);
        let app = app_for(&config_path);

        let docs = dir.path().join("docs.jsonl");
        std::fs::write(
            &docs,
            concat!(
                r#"{"id": "a", "text": "rust borrow checker", "metadata": {"lang": "en"}}"#,
                "\n",
                r#"{"id": "b", "text": "python asyncio loop", "metadata": {"lang": "en"}}"#,
                "\n",
            ),
        )
        .unwrap();
        let queries = dir.path().join("queries.json");
        std::fs::write(
            &queries,
            r#"[{"query": "rust borrow checker", "relevant_ids": ["a"]}]"#,
        )
        .unwrap();

        let docs = docs.to_str().unwrap();
        let queries = queries.to_str().unwrap();
        let runs: Vec<Vec<&str>> = vec![
            vec!["ingest", docs],
            vec!["query", "borrow checker", "-k", "2"],
            vec!["query", "asyncio", "--filter", "lang=en", "--json"],
            vec![
                "evaluate",
                queries,
                "--compare",
                "--metric",
                "retrieval_mrr",
                "--primary",
                "mrr",
            ],
            vec!["collection", "info", "default"],
            vec!["collection", "delete", "default"],
        ];
        for command in runs {
            let argv = ["quiver", "--config", config_path.as_str()]
                .into_iter()
                .chain(command);
            let result = app.run(CliArgs::parse_from(argv)).await;
            assert!(result.is_ok(), "{result:?}");
        }
    }

    #[tokio::test]
    async fn test_run_reports_bad_input() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(&dir);
        let app = app_for(&config_path);

        let missing = CliArgs::parse_from(["quiver", "ingest", "/nonexistent/docs.jsonl"]);
        assert!(app.run(missing).await.is_err());

        let bad_metric = CliArgs::parse_from(["quiver", "evaluate", "q.json", "--metric", "map"]);
        let err = app.run(bad_metric).await.unwrap_err();
        assert!(err.to_string().contains("Unknown metric"));
    }

    #[test]
    fn test_from_args_with_file() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(&dir);
        let app = app_for(&config_path);
        assert_eq!(app.config().backends[0].embedding.dimension, Some(16));
    }
}
