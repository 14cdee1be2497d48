mod app_logic;
mod app_state;
mod event_handler;
mod ui_renderer;

use std::io::{self, Stdout};
use std::sync::mpsc;

use anyhow::Result;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::{CrosstermBackend, Terminal};
use tokio::runtime::Runtime;

use app_logic::TuiApp;
use event_handler::handle_events;
use ui_renderer::ui_frame;

use crate::assemble::Bundle;
use crate::graph::DependencyGraph;
use crate::prompts::Prompt;
use crate::workspace::{DirId, Workspace};

/// Runs the interactive browser over the workspace. Returns the confirmed
/// bundle, or `None` when the user quit without confirming. The bundle
/// returned is rebuilt after the last keypress, so late toggles inside the
/// coalescing window are never lost.
pub fn run(
    workspace: &mut Workspace,
    runtime: &Runtime,
    graph_rx: mpsc::Receiver<(DirId, DependencyGraph)>,
    prompts: Vec<Prompt>,
    instructions: String,
) -> Result<Option<Bundle>> {
    let mut app = TuiApp::new(workspace, runtime, graph_rx, prompts, instructions);

    let mut terminal = init_terminal()?;
    let loop_result: Result<()> = (|| {
        while !app.quit {
            app.pump();
            terminal.draw(|frame| ui_frame(frame, &mut app))?;
            handle_events(&mut app)?;
        }
        Ok(())
    })();
    // Restore the terminal even when the loop errored out.
    restore_terminal(terminal)?;
    loop_result?;

    if app.confirmed {
        Ok(Some(app.final_bundle()))
    } else {
        Ok(None)
    }
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor().map_err(Into::into)
}
