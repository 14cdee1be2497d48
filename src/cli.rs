use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Assemble context bundles from selected repository files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directories to browse (defaults to CWD). Each becomes its own root in
    /// the workspace.
    #[arg(value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Comma-separated file suffixes to use as the whitelist instead of the
    /// saved/default patterns (extension only, no dot).
    #[arg(long, value_delimiter = ',', value_name = "EXTENSIONS")]
    pub types: Vec<String>,

    /// Include files ignored by .gitignore
    #[arg(long)]
    pub include_ignored: bool,

    /// Glob patterns to preselect files, relative to each root. Repeatable.
    #[arg(long, value_name = "PATTERN")]
    pub preselect: Vec<String>,

    /// Skip the interactive browser: select via --preselect and assemble
    /// immediately.
    #[arg(long)]
    pub headless: bool,

    /// Print the bundle to stdout instead of copying it to the clipboard.
    #[arg(long)]
    pub dry_run: bool,

    /// State file for persisted selections, collapse sets, whitelist and
    /// prompts (defaults to the user state dir).
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Named prompts from the library to append, in the given order.
    /// Repeatable.
    #[arg(long, value_name = "NAME")]
    pub prompt: Vec<String>,

    /// Free-form instructions appended as the final bundle section.
    #[arg(long, value_name = "TEXT")]
    pub instructions: Option<String>,

    /// Read the instructions section from a file instead.
    #[arg(long, value_name = "FILE", conflicts_with = "instructions")]
    pub instructions_file: Option<PathBuf>,

    /// Snapshot a directory into an in-memory root (contents frozen at
    /// startup, like an upload). Repeatable.
    #[arg(long, value_name = "DIR")]
    pub ingest: Vec<PathBuf>,

    /// Write the dependency graph with force-directed positions as JSON and
    /// exit.
    #[arg(long, value_name = "FILE")]
    pub graph_out: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the reusable prompt library
    Prompt {
        #[command(subcommand)]
        action: PromptAction,
    },
    /// Manage the selectability whitelist
    Whitelist {
        #[command(subcommand)]
        action: WhitelistAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum PromptAction {
    /// Add or overwrite a prompt
    Add {
        name: String,
        /// Prompt body; reads stdin when omitted.
        #[arg(long, value_name = "TEXT")]
        text: Option<String>,
    },
    /// List prompt names
    List,
    /// Remove a prompt
    Remove { name: String },
}

#[derive(Subcommand, Debug)]
pub enum WhitelistAction {
    /// Add a pattern (suffix literal like ".rs" or a glob like "Makefile*")
    Add { pattern: String },
    /// Show the active patterns
    List,
    /// Remove a pattern
    Remove { pattern: String },
    /// Restore the default pattern set
    Reset,
}
