use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tandem",
    version,
    about = "Agent orchestration core: shell tools, approvals, diffs and prompts"
)]
pub struct Cli {
    /// Path to config file (replaces the project config lookup)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Project root directory
    #[arg(short = 'C', long, global = true)]
    pub project_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Tokenize and classify a shell command without running it
    Classify {
        /// The command line, quoted as one argument
        command: String,
    },
    /// Run one shell tool call through the approval gate and diff tracker
    Exec {
        /// The command line, quoted as one argument
        command: String,

        /// File to snapshot before running (relative to the project root); repeatable
        #[arg(long = "track", value_name = "PATH")]
        track: Vec<PathBuf>,

        /// Approve without prompting
        #[arg(short, long)]
        yes: bool,

        /// Shell command timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Assemble the outgoing chat messages for a transcript JSON file
    Prompt {
        /// JSON array of transcript items
        transcript: PathBuf,

        /// Model family id to report
        #[arg(short, long)]
        model: Option<String>,
    },
}
