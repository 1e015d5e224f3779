use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::backend::BackendKind;

#[derive(Parser, Debug)]
#[command(name = "compaction-harness")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Drive scripted conversations against an agent backend to observe context compaction")]
#[command(long_about = "Runs fixed message sequences through one conversation session per compaction config, \
records per-turn replies and token usage, and compares prompt-token consumption between configs.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to harness.yaml
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Backend to drive (overrides the config file)
    #[arg(short, long, global = true, value_enum)]
    pub backend: Option<BackendArg>,

    /// YAML file with additional scenarios
    #[arg(short, long, global = true, value_name = "FILE")]
    pub scenarios: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Numbered menu (default); failed runs are reported and the menu continues, exit status stays 0
    Menu,

    /// List available scenarios
    List,

    /// Run scenarios by number, non-interactively
    Run {
        #[arg(value_name = "ID", required = true)]
        ids: Vec<usize>,
    },

    /// Run every scenario
    RunAll,

    /// Interactive chat in a single session
    Chat {
        /// Completed turns between compactions
        #[arg(long)]
        interval: Option<u32>,

        /// Recent turns kept verbatim across a compaction
        #[arg(long)]
        overlap: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// Agent framework API server (applies compaction)
    AgentServer,
    /// Gemini REST API directly (no compaction)
    Gemini,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::AgentServer => BackendKind::AgentServer,
            BackendArg::Gemini => BackendKind::Gemini,
        }
    }
}

impl Cli {
    /// The subcommand to run; no subcommand means the menu.
    pub fn selected_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Menu)
    }
}
