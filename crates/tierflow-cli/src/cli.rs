use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Output format for CLI commands
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    #[allow(dead_code)]
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

#[derive(Parser)]
#[command(name = "tierflow")]
#[command(version, about = "Tierflow - streaming agent workflows with tiered memory")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory holding .tierflow/ state
    #[arg(long, global = true, env = "TIERFLOW_PROJECT", default_value = ".")]
    pub project: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Run a workflow file (YAML or JSON)
    Run(RunArgs),

    /// Invoke one model with a prompt
    Ask(AskArgs),

    /// Invoke one workflow agent, optionally overriding its settings
    Invoke(InvokeArgs),

    /// Mid-tier memory operations
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },
}

/// Execution mode override for `run`
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Sequential,
    Parallel,
}

/// How outputs awaiting a store decision are resolved
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OnAsk {
    /// Leave them unstored
    #[default]
    Skip,
    /// Store in the mid tier and the long tier
    Confirm,
    /// Store in the mid tier only
    ConfirmMid,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageArg {
    #[default]
    Auto,
    Ask,
    Never,
}

#[derive(Args)]
pub struct RunArgs {
    /// Workflow file
    pub workflow: PathBuf,

    /// Override the workflow's execution mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Resolution for outputs the classifier could not decide
    #[arg(long, value_enum, default_value = "skip")]
    pub on_ask: OnAsk,
}

#[derive(Args)]
pub struct AskArgs {
    /// Model reference, "<backend>:<model-id>"
    pub model: String,

    /// Prompt text
    pub prompt: String,

    /// Storage policy for the output
    #[arg(long, value_enum, default_value = "auto")]
    pub storage: StorageArg,

    /// Agent name the output is recorded under
    #[arg(long, default_value = "cli")]
    pub agent: String,

    /// Resolution for outputs the classifier could not decide
    #[arg(long, value_enum, default_value = "skip")]
    pub on_ask: OnAsk,
}

#[derive(Args)]
pub struct InvokeArgs {
    /// Workflow file declaring the agent
    pub workflow: PathBuf,

    /// Agent name
    pub agent: String,

    /// Input substituted for {{input}}
    pub input: String,

    /// Replace the agent's model reference
    #[arg(long)]
    pub model: Option<String>,

    /// Replace the agent's storage policy
    #[arg(long, value_enum)]
    pub storage: Option<StorageArg>,

    /// Replace the agent's prompt template
    #[arg(long)]
    pub prompt: Option<String>,

    /// Resolution for outputs the classifier could not decide
    #[arg(long, value_enum, default_value = "skip")]
    pub on_ask: OnAsk,
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// List mid-tier keys
    List {
        /// Only keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Print the value stored under a key
    Get { key: String },

    /// Store a value under a key
    Put {
        key: String,
        value: String,

        /// Expire after this many seconds
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Show an agent's recent outputs, newest first
    History {
        agent: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Remove expired entries
    Sweep,
}
