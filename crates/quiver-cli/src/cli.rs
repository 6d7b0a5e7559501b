//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand};

// ============================================================================
// CLI argument types
// ============================================================================

/// Hybrid vector retrieval, ingestion and evaluation.
#[derive(Parser, Debug)]
#[command(name = "quiver", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "QUIVER_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed and index documents from a JSON or JSONL file.
    Ingest {
        /// Documents: `{"id": .., "text": .., "metadata": {..}}` per record.
        file: String,

        /// Backend or lexical index to write to (repeatable; default all).
        #[arg(short, long = "target")]
        targets: Vec<String>,
    },

    /// Run a query through the configured retrieval modules.
    Query {
        /// Query text.
        text: String,

        /// Number of fused results.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Restrict to these modules (repeatable; default all).
        #[arg(short, long = "module")]
        modules: Vec<String>,

        /// Payload equality filter `key=value` (repeatable).
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Score retrieval quality against a labelled query set.
    Evaluate {
        /// Query set: `{"query": .., "relevant_ids": [..]}` per record.
        file: String,

        /// Cutoff for every metric.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Metrics to compute (repeatable; default all).
        #[arg(short, long = "metric")]
        metrics: Vec<String>,

        /// Also evaluate each module alone and rank all configurations.
        #[arg(long)]
        compare: bool,

        /// Metric that ranks configurations in `--compare` mode.
        #[arg(long, default_value = "ndcg")]
        primary: String,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Collection operations.
    Collection(CollectionCommand),

    /// Configuration operations.
    Config(ConfigCommand),

    /// Print version information.
    Version,
}

/// Collection-specific subcommands.
#[derive(Parser, Debug)]
pub struct CollectionCommand {
    /// Collection subcommand to execute.
    #[command(subcommand)]
    pub command: CollectionAction,
}

/// Available collection subcommands.
#[derive(Subcommand, Debug)]
pub enum CollectionAction {
    /// Show a backend's collection metric, dimension and size.
    Info {
        /// Backend name.
        backend: String,
    },

    /// Delete a backend's collection and all its records.
    Delete {
        /// Backend name.
        backend: String,
    },
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as TOML.
    Show,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_default() {
        let args = CliArgs::parse_from(["quiver"]);
        assert!(args.config.is_none() || std::env::var("QUIVER_CONFIG").is_ok());
        assert!(!args.verbose);
        assert!(!args.quiet);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_args_flags() {
        let args = CliArgs::parse_from(["quiver", "-v", "--config", "/tmp/q.toml"]);
        assert!(args.verbose);
        assert_eq!(args.config.as_deref(), Some("/tmp/q.toml"));

        let args = CliArgs::parse_from(["quiver", "-q"]);
        assert!(args.quiet);
    }

    #[test]
    fn test_ingest_command() {
        let args = CliArgs::parse_from(["quiver", "ingest", "docs.jsonl", "-t", "kb", "-t", "kw"]);
        match args.command {
            Some(Command::Ingest { file, targets }) => {
                assert_eq!(file, "docs.jsonl");
                assert_eq!(targets, vec!["kb", "kw"]);
            }
            other => panic!("expected ingest, got {other:?}"),
        }
    }

    #[test]
    fn test_query_command() {
        let args = CliArgs::parse_from([
            "quiver", "query", "rank fusion", "-k", "5", "--module", "bm25", "--filter",
            "lang=en", "--json",
        ]);
        match args.command {
            Some(Command::Query {
                text,
                top_k,
                modules,
                filters,
                json,
            }) => {
                assert_eq!(text, "rank fusion");
                assert_eq!(top_k, Some(5));
                assert_eq!(modules, vec!["bm25"]);
                assert_eq!(filters, vec!["lang=en"]);
                assert!(json);
            }
            other => panic!("expected query, got {other:?}"),
        }
    }

    #[test]
    fn test_evaluate_command() {
        let args = CliArgs::parse_from([
            "quiver", "evaluate", "q.jsonl", "--metric", "f1", "--metric", "mrr", "--compare",
        ]);
        match args.command {
            Some(Command::Evaluate {
                file,
                top_k,
                metrics,
                compare,
                primary,
                json,
            }) => {
                assert_eq!(file, "q.jsonl");
                assert!(top_k.is_none());
                assert_eq!(metrics, vec!["f1", "mrr"]);
                assert!(compare);
                assert_eq!(primary, "ndcg");
                assert!(!json);
            }
            other => panic!("expected evaluate, got {other:?}"),
        }
    }

    #[test]
    fn test_collection_commands() {
        let args = CliArgs::parse_from(["quiver", "collection", "info", "kb"]);
        assert!(matches!(
            args.command,
            Some(Command::Collection(CollectionCommand {
                command: CollectionAction::Info { ref backend }
            })) if backend == "kb"
        ));

        let args = CliArgs::parse_from(["quiver", "collection", "delete", "kb"]);
        assert!(matches!(
            args.command,
            Some(Command::Collection(CollectionCommand {
                command: CollectionAction::Delete { .. }
            }))
        ));
    }

    #[test]
    fn test_config_commands() {
        let args = CliArgs::parse_from(["quiver", "config", "init", "--file", "/tmp/q.toml", "--force"]);
        match args.command {
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Init { file, force },
            })) => {
                assert_eq!(file.as_deref(), Some("/tmp/q.toml"));
                assert!(force);
            }
            other => panic!("expected config init, got {other:?}"),
        }
    }

    #[test]
    fn test_version_command() {
        let args = CliArgs::parse_from(["quiver", "version"]);
        assert!(matches!(args.command, Some(Command::Version)));
    }
}
