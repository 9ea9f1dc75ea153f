//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Plaint - Classify, answer and search customer complaints
#[derive(Parser)]
#[command(name = "plaint")]
#[command(about = "Self-hosted customer complaint intake service", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "complaints.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher when
    /// PLAINT_DB_KEY is set. Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Built-in category profile (appliances, telecom)
    ///
    /// Defaults to PLAINT_PROFILE, then "appliances".
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Category profile TOML file (takes precedence over --profile)
    #[arg(long, global = true)]
    pub profile_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires an API key (PLAINT_API_KEYS) or a
        /// request from a trusted network (PLAINT_TRUSTED_NETWORKS).
        #[arg(long)]
        no_auth: bool,

        /// Directory containing static files to serve (e.g., ui/dist)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Classify a complaint text and write a reply
    Analyze {
        /// Complaint text
        text: String,

        /// Store the complaint with its category and reply
        #[arg(long)]
        save: bool,

        /// User id recorded with a saved complaint
        #[arg(long)]
        user: Option<String>,
    },

    /// Manage stored complaints (list, show, delete, reply)
    Complaints {
        #[command(subcommand)]
        action: Option<ComplaintsAction>,
    },

    /// Show complaint counts per category
    Stats,

    /// Generate demo complaints from the profile
    Simulate {
        /// Number of complaints to generate (1-1000)
        #[arg(short, long, default_value = "10")]
        count: usize,

        /// Random seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Import complaints from a JSON or CSV file
    Import {
        /// File to import (.json or .csv)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Manage the prompt library
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

#[derive(Subcommand)]
pub enum ComplaintsAction {
    /// List complaints
    List {
        /// Filter: natural language, expression or shorthand (e.g. "category:冰箱")
        #[arg(short, long)]
        query: Option<String>,

        /// Number of complaints to skip
        #[arg(long, default_value = "0")]
        skip: i64,

        /// Maximum number of complaints to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show a single complaint
    Show {
        /// Complaint ID
        id: i64,
    },

    /// Delete a complaint
    Delete {
        /// Complaint ID
        id: i64,
    },

    /// Set the reply of a complaint
    Reply {
        /// Complaint ID
        id: i64,
        /// Reply text
        text: String,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all prompts and their override status
    List,

    /// Show the content of a prompt
    Show {
        /// Prompt ID (classify_complaint, generate_reply, parse_query)
        prompt_id: String,
    },
}
