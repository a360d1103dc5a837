#![forbid(unsafe_code)]

mod cmd;
mod output;
mod trace;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use meeple_core::config::{load_project_config, load_user_config};
use meeple_core::error::{ErrorCode, RetrievalError};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "meeple: hybrid lexical + semantic retrieval",
    long_about = None
)]
struct Cli {
    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Alias for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Project root holding `meeple.toml` (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(next_help_heading = "Indexing")]
    Build(cmd::build::BuildArgs),

    #[command(next_help_heading = "Query")]
    Search(cmd::search::SearchArgs),

    #[command(next_help_heading = "Query")]
    Eval(cmd::eval::EvalArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    meeple completions bash\n\n    # Generate zsh completions\n    meeple completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose || env::var("DEBUG").is_ok() {
        "meeple=debug,info"
    } else {
        "meeple=info,warn"
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("MEEPLE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, quiet)));

    let format = env::var("MEEPLE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let user_config = load_user_config().unwrap_or_else(|err| {
        warn!("ignoring unreadable user config: {err:#}");
        meeple_core::config::UserConfig::default()
    });
    let output = resolve_output_mode(cli.format, cli.json, user_config.output.as_deref());

    let project_root = match cli.root {
        Some(ref root) => root.clone(),
        None => env::current_dir().context("failed to resolve current directory")?,
    };

    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        return cmd::completions::run_completions(args.shell, &mut command);
    }

    let config = match load_project_config(&project_root) {
        Ok(config) => config,
        Err(err) => {
            let code = err
                .downcast_ref::<RetrievalError>()
                .map_or(ErrorCode::ConfigParseError, RetrievalError::code);
            render_error(
                output,
                &CliError {
                    message: format!("{err:#}"),
                    suggestion: code.hint().map(str::to_string),
                    error_code: Some(code.code().to_string()),
                },
            )?;
            return Err(err);
        }
    };
    debug!(root = %project_root.display(), ?config, "loaded project config");

    match cli.command {
        Commands::Build(ref args) => {
            cmd::build::run_build(args, &config, output, &project_root)
        }
        Commands::Search(ref args) => {
            cmd::search::run_search(args, &config, output, &project_root)
        }
        Commands::Eval(ref args) => cmd::eval::run_eval(args, &config, output, &project_root),
        Commands::Completions(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_before_and_after_subcommand() {
        let cli = Cli::parse_from(["meeple", "--json", "search", "dice"]);
        assert!(cli.json);
        let cli = Cli::parse_from(["meeple", "search", "dice", "--json"]);
        assert!(cli.json);
    }

    #[test]
    fn format_flag_parses() {
        let cli = Cli::parse_from(["meeple", "search", "dice", "--format", "text"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn search_flags_parse() {
        let cli = Cli::parse_from([
            "meeple", "search", "dice trading", "-k", "5", "--kb", "20", "--kv", "30", "--alpha",
            "0.7", "--indices", "idx",
        ]);
        let Commands::Search(args) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.query, "dice trading");
        assert_eq!(args.k, Some(5));
        assert_eq!(args.kb, Some(20));
        assert_eq!(args.kv, Some(30));
        assert_eq!(args.alpha, Some(0.7));
        assert_eq!(args.indices, Some(PathBuf::from("idx")));
    }

    #[test]
    fn build_requires_corpus() {
        assert!(Cli::try_parse_from(["meeple", "build"]).is_err());
        let cli = Cli::parse_from(["meeple", "build", "--corpus", "games.jsonl", "--model", "hashing-v1-64"]);
        assert!(matches!(cli.command, Commands::Build(_)));
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["meeple", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Commands::Completions(cmd::completions::CompletionsArgs {
                shell: clap_complete::Shell::Bash,
            })
        ));
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["meeple", "build", "--corpus", "c.jsonl"],
            vec!["meeple", "search", "q"],
            vec!["meeple", "eval", "--gold", "g.jsonl"],
            vec!["meeple", "completions", "zsh"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "Failed to parse: {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn quiet_wins_over_verbose_for_default_filter() {
        assert_eq!(default_filter(true, true), "error");
        assert_eq!(default_filter(false, true), "error");
    }

    #[test]
    fn clap_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
