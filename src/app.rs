use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result, bail};
use globset::{GlobBuilder, GlobSetBuilder};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::analyze;
use crate::assemble::{Assembler, Bundle};
use crate::cli::{Cli, Command, PromptAction, WhitelistAction};
use crate::clipboard;
use crate::graph::DependencyGraph;
use crate::layout::{self, Position};
use crate::persist::{self, INSTRUCTIONS_KEY, StateStore, WHITELIST_KEY};
use crate::prompts::{Prompt, PromptLibrary};
use crate::tui;
use crate::whitelist::Whitelist;
use crate::workspace::{DirId, SourceKind, Workspace};

const LAYOUT_ITERATIONS: usize = 300;

pub fn run(cli: Cli) -> Result<()> {
    init_tracing();
    let mut store = StateStore::load(persist::state_path_or_default(cli.state.as_deref()));

    if let Some(command) = &cli.command {
        return run_subcommand(command, &mut store);
    }

    let whitelist = store
        .get::<Vec<String>>(WHITELIST_KEY)
        .map(|patterns| Whitelist::new(&patterns))
        .unwrap_or_default();
    let mut workspace = Workspace::new(whitelist);
    let roots: Vec<PathBuf> = if cli.roots.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        cli.roots.clone()
    };
    for root in &roots {
        workspace
            .add_path_directory(root, cli.include_ignored)
            .with_context(|| format!("cannot browse {}", root.display()))?;
    }
    for dir in &cli.ingest {
        workspace
            .ingest_folder(dir)
            .with_context(|| format!("cannot ingest {}", dir.display()))?;
    }

    // --types overrides the persisted patterns for this session.
    if !cli.types.is_empty() {
        let patterns: Vec<String> = cli
            .types
            .iter()
            .map(|t| format!(".{}", t.trim_start_matches('.')))
            .collect();
        workspace.set_whitelist(Whitelist::new(&patterns));
    }

    if let Some(out) = &cli.graph_out {
        return export_graph(&workspace, out);
    }

    restore_persisted(&mut workspace, &store);
    apply_preselect(&mut workspace, &cli.preselect)?;

    let instructions = match (&cli.instructions, &cli.instructions_file) {
        (Some(text), _) => text.clone(),
        (None, Some(file)) => std::fs::read_to_string(file)
            .with_context(|| format!("cannot read instructions from {}", file.display()))?,
        (None, None) => store.get::<String>(INSTRUCTIONS_KEY).unwrap_or_default(),
    };
    let library = PromptLibrary::load(&store);
    let prompts: Vec<Prompt> = library.select(&cli.prompt).into_iter().cloned().collect();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let bundle = if cli.headless {
        let prompt_refs: Vec<&Prompt> = prompts.iter().collect();
        Some(runtime.block_on(Assembler::new().build(&workspace, &prompt_refs, &instructions)))
    } else {
        let initial_ids: Vec<DirId> = workspace.dirs.iter().map(|d| d.id.clone()).collect();
        let graph_rx = spawn_analyzers(&workspace);
        let result = tui::run(&mut workspace, &runtime, graph_rx, prompts, instructions.clone())?;
        // Directories dropped inside the browser lose their persisted keys.
        for id in initial_ids {
            if workspace.directory(&id).is_none() {
                store.clear_dir(&id);
            }
        }
        result
    };

    match bundle {
        Some(bundle) => deliver(&workspace, &bundle, cli.dry_run)?,
        None => println!("Aborted, nothing copied."),
    }

    save_session(&mut store, &workspace, &cli, &instructions);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn restore_persisted(workspace: &mut Workspace, store: &StateStore) {
    let Workspace {
        dirs, whitelist, ..
    } = workspace;
    for dir in dirs.iter_mut() {
        let selected = store.load_dir_selection(&dir.id);
        if !selected.is_empty() {
            dir.selection.set_selected_paths(selected);
            dir.selection.attach(&dir.tree, whitelist);
        }
        dir.collapsed = store
            .load_dir_collapsed(&dir.id)
            .into_iter()
            .filter(|p| dir.tree.contains(p))
            .collect();
    }
}

/// Preselect globs match paths relative to each directory root; files the
/// whitelist rejects stay unselected (the toggle is a no-op for them).
fn apply_preselect(workspace: &mut Workspace, patterns: &[String]) -> Result<()> {
    if patterns.is_empty() {
        return Ok(());
    }
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(false)
            .build()
            .with_context(|| format!("invalid preselect pattern '{pat}'"))?;
        builder.add(glob);
    }
    let set = builder.build().context("preselect patterns failed to compile")?;

    let Workspace {
        dirs, whitelist, ..
    } = workspace;
    for dir in dirs.iter_mut() {
        let Some(root) = dir.tree.root() else {
            continue;
        };
        let base = dir.tree.node(root).path.clone();
        for path in dir.tree.file_paths() {
            let rel = path.strip_prefix(&base).unwrap_or(&path);
            if set.is_match(rel) {
                dir.toggle_file(whitelist, &path, true);
            }
        }
    }
    Ok(())
}

/// One analyzer thread per filesystem-backed directory. Results come back
/// over a channel the TUI drains once per tick; a thread outliving the app
/// just finds the receiver gone.
fn spawn_analyzers(workspace: &Workspace) -> mpsc::Receiver<(DirId, DependencyGraph)> {
    let (tx, rx) = mpsc::channel();
    for dir in &workspace.dirs {
        let SourceKind::PathBacked { root, .. } = &dir.source else {
            continue;
        };
        let tx = tx.clone();
        let id = dir.id.clone();
        let root = root.clone();
        let tree = dir.tree.clone();
        thread::spawn(move || {
            let graph = analyze::analyze_directory(&root, &tree);
            let _ = tx.send((id, graph));
        });
    }
    rx
}

#[derive(Serialize)]
struct GraphExport {
    graph: DependencyGraph,
    positions: HashMap<PathBuf, Position>,
}

/// Analyzes every filesystem-backed directory, lays the merged graph out and
/// writes it as JSON.
fn export_graph(workspace: &Workspace, out: &std::path::Path) -> Result<()> {
    let mut graph = DependencyGraph::new();
    for dir in &workspace.dirs {
        if let SourceKind::PathBacked { root, .. } = &dir.source {
            graph.extend(analyze::analyze_directory(root, &dir.tree));
        }
    }
    let positions = layout::spawn_layout(graph.clone(), LAYOUT_ITERATIONS)
        .recv()
        .context("layout worker died")?;
    let export = GraphExport { graph, positions };
    let json = serde_json::to_string_pretty(&export).context("graph export serialization")?;
    std::fs::write(out, json).with_context(|| format!("cannot write {}", out.display()))?;
    println!("Wrote dependency graph to {}", out.display());
    Ok(())
}

fn deliver(workspace: &Workspace, bundle: &Bundle, dry_run: bool) -> Result<()> {
    if bundle.text.is_empty() {
        println!("Nothing selected, bundle is empty.");
        return Ok(());
    }
    for path in &bundle.failed {
        eprintln!("warning: could not read {}", path.display());
    }
    if dry_run {
        print!("{}", bundle.text);
        return Ok(());
    }
    clipboard::copy_text_to_clipboard(bundle.text.clone())?;
    let files: usize = workspace
        .selections()
        .iter()
        .map(|(_, files)| files.len())
        .sum();
    println!(
        "Copied {files} file(s) to the clipboard (≈ {} tokens).",
        bundle.token_estimate
    );
    Ok(())
}

fn save_session(store: &mut StateStore, workspace: &Workspace, cli: &Cli, instructions: &str) {
    for dir in &workspace.dirs {
        let selected = dir.selected_files(&workspace.whitelist);
        store.save_dir(&dir.id, &selected, &dir.collapsed);
    }
    store.set(WHITELIST_KEY, &workspace.whitelist.patterns().to_vec());
    if cli.instructions.is_some() || cli.instructions_file.is_some() {
        store.set(INSTRUCTIONS_KEY, &instructions.to_string());
    }
    if let Err(e) = store.save() {
        warn!(error = %e, "failed to persist session state");
    }
}

fn run_subcommand(command: &Command, store: &mut StateStore) -> Result<()> {
    match command {
        Command::Prompt { action } => {
            let mut library = PromptLibrary::load(store);
            match action {
                PromptAction::Add { name, text } => {
                    let body = match text {
                        Some(t) => t.clone(),
                        None => std::io::read_to_string(std::io::stdin())
                            .context("reading prompt body from stdin")?,
                    };
                    library.upsert(name, body);
                    library.save(store);
                    println!("Saved prompt '{name}'.");
                }
                PromptAction::List => {
                    for prompt in library.all() {
                        println!("{}", prompt.name);
                    }
                }
                PromptAction::Remove { name } => {
                    if !library.remove(name) {
                        bail!("no prompt named '{name}'");
                    }
                    library.save(store);
                    println!("Removed prompt '{name}'.");
                }
            }
        }
        Command::Whitelist { action } => {
            let mut patterns = store
                .get::<Vec<String>>(WHITELIST_KEY)
                .unwrap_or_else(Whitelist::default_patterns);
            match action {
                WhitelistAction::Add { pattern } => {
                    if !patterns.contains(pattern) {
                        patterns.push(pattern.clone());
                    }
                    store.set(WHITELIST_KEY, &patterns);
                    println!("Added '{pattern}'.");
                }
                WhitelistAction::List => {
                    for pattern in &patterns {
                        println!("{pattern}");
                    }
                }
                WhitelistAction::Remove { pattern } => {
                    let before = patterns.len();
                    patterns.retain(|p| p != pattern);
                    if patterns.len() == before {
                        bail!("pattern not present: '{pattern}'");
                    }
                    store.set(WHITELIST_KEY, &patterns);
                    println!("Removed '{pattern}'.");
                }
                WhitelistAction::Reset => {
                    store.set(WHITELIST_KEY, &Whitelist::default_patterns());
                    println!("Whitelist reset to defaults.");
                }
            }
        }
    }
    store.save().context("failed to save state")?;
    Ok(())
}
