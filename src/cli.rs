//! Command-line interface definitions for Vault Digest.
//!
//! Global options can also be supplied through environment variables; the
//! LLM API key in particular is normally read from `PERPLEXITY_API_KEY`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Vault Digest application.
///
/// # Examples
///
/// ```sh
/// # Summarize 30 random homepage articles
/// vault_digest run
///
/// # Every article in two categories, with console progress
/// vault_digest run --tags Sales,AI --preview
///
/// # Status API for the web front end
/// vault_digest serve --bind 127.0.0.1:5001
///
/// # Publish the latest results
/// vault_digest deploy --netlify
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, global = true, env = "VAULT_DIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for caches, reports and the website
    #[arg(
        short,
        long,
        global = true,
        env = "VAULT_DIGEST_OUTPUT_DIR",
        default_value = "scraped_data"
    )]
    pub output_dir: PathBuf,

    /// API key for the chat-completion endpoint
    #[arg(long, global = true, env = "PERPLEXITY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect, summarize and render a digest
    Run(RunArgs),

    /// List category tags
    Tags {
        /// Discover tags from the live site instead of the built-in list
        #[arg(long)]
        live: bool,
    },

    /// Serve the control panel, status API and generated website
    Serve {
        /// Address to listen on
        #[arg(long, env = "VAULT_DIGEST_BIND", default_value = "127.0.0.1:5001")]
        bind: String,

        /// Folder `/generate_static_site` assembles the site in
        #[arg(long, default_value = "netlify_site")]
        site_dir: PathBuf,
    },

    /// Prepare a static site folder from the latest results
    Deploy {
        /// Folder to assemble the site in
        #[arg(long, default_value = "netlify_site")]
        site_dir: PathBuf,

        /// Also publish it with the Netlify CLI
        #[arg(long)]
        netlify: bool,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Visible browser and console progress
    #[arg(long)]
    pub preview: bool,

    /// Number of random homepage articles to process
    #[arg(long, default_value_t = 30)]
    pub limit: usize,

    /// Comma-separated category tabs to collect instead of sampling the
    /// homepage; `All` selects every tab
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Skip collection and re-process the cached `articles.json`
    #[arg(long, conflicts_with = "tags")]
    pub reuse_cache: bool,

    /// Repeat the run forever with this many minutes between starts
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_minutes: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "vault_digest",
            "--output-dir",
            "./out",
            "run",
            "--tags",
            "Sales,ABM & GTM",
            "--preview",
        ]);

        assert_eq!(cli.output_dir, PathBuf::from("./out"));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.preview);
        assert_eq!(args.tags, vec!["Sales", "ABM & GTM"]);
        assert_eq!(args.limit, 30);
        assert_eq!(args.interval_minutes, None);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["vault_digest", "run"]);
        assert_eq!(cli.output_dir, PathBuf::from("scraped_data"));
        assert!(!cli.verbose);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.tags.is_empty());
        assert!(!args.reuse_cache);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["vault_digest", "serve", "-v", "--bind", "0.0.0.0:8080"]);
        assert!(cli.verbose);
        match cli.command {
            Command::Serve { bind, site_dir } => {
                assert_eq!(bind, "0.0.0.0:8080");
                assert_eq!(site_dir, PathBuf::from("netlify_site"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cli_deploy() {
        let cli = Cli::parse_from(["vault_digest", "deploy", "--netlify"]);
        match cli.command {
            Command::Deploy { site_dir, netlify } => {
                assert_eq!(site_dir, PathBuf::from("netlify_site"));
                assert!(netlify);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_zero_interval() {
        assert!(Cli::try_parse_from(["vault_digest", "run", "--interval-minutes", "0"]).is_err());
    }
}
