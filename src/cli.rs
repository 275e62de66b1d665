//! Command-line interface definition for the plugin runtime IO server
//!
//! This module defines the CLI structure using clap's derive API,
//! providing a `serve` command to run the IO server and a `health` command
//! to smoke-test a running HTTP-install instance.

use clap::{Parser, Subcommand};

/// Plugin runtime IO server and session multiplexer
#[derive(Parser, Debug, Clone)]
#[command(name = "plugin-runtime")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the configured install method (local, remote, aws_lambda)
    #[arg(long)]
    pub install_method: Option<String>,

    /// Override the embedded HTTP server port (aws_lambda install method)
    #[arg(long)]
    pub port: Option<u16>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the plugin runtime binary
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the IO server, driving the configured transport
    Serve,

    /// Check the health endpoint of a running HTTP-install instance
    Health {
        /// Base URL of the running instance (e.g. http://localhost:8080)
        #[arg(long, default_value = "http://localhost:8080")]
        base_url: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            install_method: None,
            port: None,
            command: Commands::Serve,
        }
    }
}
