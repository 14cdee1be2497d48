mod analyze;
mod app;
mod assemble;
mod cli;
mod clipboard;
mod errors;
mod fetch;
mod graph;
mod layout;
mod persist;
mod prompts;
mod scan;
mod schedule;
mod selection;
mod tree;
mod tui;
mod utils;
mod whitelist;
mod workspace;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    // Clipboard daemon mode is an early exit and must run before anything
    // else touches the terminal.
    if clipboard::maybe_run_daemon()? {
        return Ok(());
    }

    let cli_args = cli::Cli::parse();
    app::run(cli_args)
}
