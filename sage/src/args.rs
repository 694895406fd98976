use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sage_config::Vendor;

/// Sage completion orchestrator
#[derive(Debug, Parser)]
#[command(name = "sage", about = "Send completions across model vendors with automatic fallback")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "sage.toml", env = "SAGE_CONFIG")]
    pub config: PathBuf,

    /// Log filter directive, overriding the configured level
    #[arg(long, env = "SAGE_LOG")]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a prompt and print the reply
    Complete(CompleteArgs),

    /// List models offered by configured providers
    Models {
        /// Only query this provider
        #[arg(long)]
        provider: Option<Vendor>,
    },

    /// Check that every configured credential is accepted
    Validate,

    /// Show configured providers
    Providers,

    /// List configured local models and whether they load
    Local {
        /// Try loading each model and report the outcome
        #[arg(long)]
        check: bool,
    },
}

#[derive(Debug, clap::Args)]
pub struct CompleteArgs {
    /// Prompt text
    #[arg(required = true)]
    pub prompt: Vec<String>,

    /// Model id (e.g. "gpt-4o", "claude-sonnet-4-20250514", "local:llama")
    #[arg(short, long)]
    pub model: Option<String>,

    /// System instruction
    #[arg(short, long)]
    pub system: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Maximum output tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Print tokens as they arrive
    #[arg(long)]
    pub stream: bool,

    /// Report which providers failed before the reply
    #[arg(long, conflicts_with = "stream")]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_complete_with_model() {
        let args = Args::try_parse_from(["sage", "complete", "--model", "local:llama", "--stream", "hello", "there"])
            .unwrap();
        match args.command {
            Command::Complete(complete) => {
                assert_eq!(complete.model.as_deref(), Some("local:llama"));
                assert!(complete.stream);
                assert_eq!(complete.prompt, vec!["hello".to_owned(), "there".to_owned()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_provider_tag() {
        let args = Args::try_parse_from(["sage", "models", "--provider", "openrouter"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Models {
                provider: Some(Vendor::OpenRouter)
            }
        ));
    }
}
