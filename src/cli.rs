//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};

/// Bulk-download models and their files from a model-hosting API.
#[derive(Parser, Debug)]
#[command(name = "civitai-dl")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to the TOML config file
    #[arg(long)]
    pub config: Option<String>,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Root directory files are saved under
    #[arg(long)]
    pub save_path: Option<String>,

    /// Path to the SQLite state store
    #[arg(long)]
    pub database_path: Option<String>,

    /// Free-text search query
    #[arg(long)]
    pub query: Option<String>,

    /// Maximum number of files to enqueue for this run
    #[arg(long)]
    pub limit: Option<u32>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Removes a version's State Store entry.
    Delete {
        /// The model version id to forget.
        version_id: u64,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_args_parse_with_no_overrides() {
        let args = Args::try_parse_from(["civitai-dl"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.concurrency.is_none());
        assert!(args.command.is_none());
    }

    #[test]
    fn verbose_flag_increments_count() {
        let args = Args::try_parse_from(["civitai-dl", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn concurrency_out_of_range_is_rejected() {
        let result = Args::try_parse_from(["civitai-dl", "-c", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn delete_subcommand_parses_version_id() {
        let args = Args::try_parse_from(["civitai-dl", "delete", "12345"]).unwrap();
        assert!(matches!(args.command, Some(Command::Delete { version_id: 12345 })));
    }

    #[test]
    fn query_and_limit_overrides_parse() {
        let args = Args::try_parse_from(["civitai-dl", "--query", "anime", "--limit", "5"]).unwrap();
        assert_eq!(args.query.as_deref(), Some("anime"));
        assert_eq!(args.limit, Some(5));
    }
}
