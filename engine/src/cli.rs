//! CLI interface for Legal Mind
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Legal Mind: multi-persona legal and policy analysis
///
/// Routes a question to specialist personas (policy, compliance, research,
/// comparative law), chains their answers, and has a coordinator merge them.
#[derive(Parser, Debug)]
#[command(name = "legal-mind")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), " ", env!("BUILD_TIMESTAMP"), ")"))]
#[command(about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a single legal question
    Ask {
        /// The question to analyze
        query: String,

        /// Continue an existing session instead of opening a new one
        #[arg(short, long, value_name = "ID")]
        session: Option<String>,

        /// Show every persona's answer with its own score
        #[arg(short, long)]
        verbose: bool,
    },

    /// Start an interactive consultation
    Chat {
        /// Resume an existing session
        #[arg(short, long, value_name = "ID")]
        session: Option<String>,
    },

    /// List the configured personas in priority order
    Personas,

    /// List open sessions
    Sessions {
        /// Number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show every turn of a session
    History {
        /// Session ID
        session_id: String,
    },

    /// Close a session for good
    Discard {
        /// Session ID
        session_id: String,
    },

    /// Check provider reachability and show the active setup
    Status,

    /// Score a piece of text with the quality heuristic
    Score {
        /// File to score (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Question the text answers
        #[arg(short, long)]
        query: Option<String>,
    },
}
