use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Declare, validate and render the Novella infrastructure stack
#[derive(Parser, Debug)]
#[command(name = "novella-infra")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the stack template and deployment plan
    Synth {
        /// Path to the configuration file
        #[arg(short, long, default_value = "novella-infra.toml")]
        config: PathBuf,

        /// Enable verbose output
        #[arg(short, long, default_value = "false")]
        verbose: bool,

        /// Rewrite the outputs even when nothing changed
        #[arg(short, long, default_value = "false")]
        force: bool,
    },

    /// Build and validate the stack without writing anything
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "novella-infra.toml")]
        config: PathBuf,

        /// Enable verbose output
        #[arg(short, long, default_value = "false")]
        verbose: bool,
    },

    /// Print the resources in deployment order, grouped into waves
    Graph {
        /// Path to the configuration file
        #[arg(short, long, default_value = "novella-infra.toml")]
        config: PathBuf,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the configuration file
        #[arg(short, long, default_value = "novella-infra.toml")]
        output: PathBuf,

        /// Overwrite existing configuration file
        #[arg(short, long, default_value = "false")]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Synth { verbose, .. } | Commands::Validate { verbose, .. } => *verbose,
            Commands::Graph { .. } | Commands::Init { .. } => false,
        }
    }
}
