pub mod config;
pub mod context;
pub mod query;
pub mod session;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

#[derive(Parser)]
#[command(name = "ragsession")]
#[command(about = "Session-aware query repair for retrieval-augmented QA")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ~/.ragsession/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ensure a session exists, starting fresh unless --keep is given
    Init {
        session_id: String,
        /// Keep existing state instead of starting over
        #[arg(long)]
        keep: bool,
    },
    /// Replace a session's history with messages from a JSON file
    Switch {
        session_id: String,
        /// JSON array of {id, user_query, rag_answer, created_at}
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Show a session's summaries and turns
    Show { session_id: String },
    /// Run only query repair and print the result
    Repair { session_id: String, query: String },
    /// Answer a query against a static context file
    Query {
        query: String,
        /// Session to repair against
        #[arg(short, long)]
        session: Option<String>,
        /// Skip query repair entirely
        #[arg(long)]
        eval: bool,
        /// Contexts handed to the answer generator
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// JSON array of {text, file?, page?} documents
        #[arg(short, long)]
        contexts: Option<PathBuf>,
    },
    /// Remove expired sessions
    Sweep {
        /// Keep running maintenance on the configured interval until Ctrl-C
        #[arg(long)]
        daemon: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print a value by dotted key, e.g. session.ttl_hours
    Get { key: String },
    /// Set a value by dotted key
    Set { key: String, value: String },
    /// Reset a value to its default
    Unset { key: String },
    /// List all values
    List,
    /// Print the config file path
    Path,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let rt = Runtime::new()?;
        let config_path = self.config;

        rt.block_on(async {
            match self.command {
                Commands::Init { session_id, keep } => {
                    session::handle_init_command(config_path, session_id, keep).await
                }
                Commands::Switch { session_id, file } => {
                    session::handle_switch_command(config_path, session_id, file).await
                }
                Commands::Show { session_id } => {
                    session::handle_show_command(config_path, session_id).await
                }
                Commands::Repair { session_id, query } => {
                    query::handle_repair_command(config_path, session_id, query).await
                }
                Commands::Query {
                    query,
                    session,
                    eval,
                    top_k,
                    contexts,
                } => {
                    query::handle_query_command(config_path, query, session, eval, top_k, contexts)
                        .await
                }
                Commands::Sweep { daemon } => session::handle_sweep_command(config_path, daemon).await,
                Commands::Config { command } => match command {
                    ConfigCommands::Get { key } => config::handle_config_get(config_path, key).await,
                    ConfigCommands::Set { key, value } => {
                        config::handle_config_set(config_path, key, value).await
                    }
                    ConfigCommands::Unset { key } => {
                        config::handle_config_unset(config_path, key).await
                    }
                    ConfigCommands::List => config::handle_config_list(config_path).await,
                    ConfigCommands::Path => config::handle_config_path(config_path).await,
                },
            }
        })
    }
}
