use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::mpsc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use super::app_state::{AppMode, Row};
use crate::assemble::{Assembler, Bundle};
use crate::graph::{self, DependencyGraph};
use crate::prompts::Prompt;
use crate::scan;
use crate::schedule::BuildScheduler;
use crate::selection::TriState;
use crate::tree::{NodeId, TreeModel};
use crate::workspace::{DirId, Directory, SourceKind, Workspace};

pub struct TuiApp<'a> {
    pub(super) workspace: &'a mut Workspace,
    runtime: &'a Runtime,
    graph_rx: mpsc::Receiver<(DirId, DependencyGraph)>,
    pub(super) scheduler: BuildScheduler,
    pub(super) assembler: Assembler,
    pub(super) prompts: Vec<Prompt>,
    pub(super) instructions: String,
    pub(super) bundle: Option<Bundle>,
    /// Unselected files imported by the selection, with importer counts.
    /// Purely advisory; rendered as a marker next to the file.
    pub(super) advisory: HashMap<PathBuf, usize>,
    pub(super) rows: Vec<Row>,
    pub(super) cursor: usize,
    pub(super) scroll_offset: usize,
    pub(super) list_viewport_height: usize,
    pub(super) quit: bool,
    pub(super) confirmed: bool,
    pub(super) mode: AppMode,
    pub(super) filter_input: String,
    /// Byte offset into `filter_input`, always on a char boundary.
    pub(super) filter_cursor_pos: usize,
}

impl<'a> TuiApp<'a> {
    pub fn new(
        workspace: &'a mut Workspace,
        runtime: &'a Runtime,
        graph_rx: mpsc::Receiver<(DirId, DependencyGraph)>,
        prompts: Vec<Prompt>,
        instructions: String,
    ) -> Self {
        let mut app = TuiApp {
            workspace,
            runtime,
            graph_rx,
            scheduler: BuildScheduler::default(),
            assembler: Assembler::new(),
            prompts,
            instructions,
            bundle: None,
            advisory: HashMap::new(),
            rows: Vec::new(),
            cursor: 0,
            scroll_offset: 0,
            list_viewport_height: 0,
            quit: false,
            confirmed: false,
            mode: AppMode::Normal,
            filter_input: String::new(),
            filter_cursor_pos: 0,
        };
        app.rebuild_rows();
        // Restored selections should produce a bundle without a keypress.
        app.scheduler.notify();
        app
    }

    /// Once-per-tick housekeeping: absorb dependency graphs from analyzer
    /// threads and run the coalesced build when its window has elapsed.
    pub(super) fn pump(&mut self) {
        while let Ok((id, graph)) = self.graph_rx.try_recv() {
            if let Some(dir) = self.workspace.directory_mut(&id) {
                debug!(dir = %id, files = graph.len(), "dependency graph arrived");
                dir.graph = graph;
                self.scheduler.notify();
            }
        }
        if self.scheduler.due() {
            self.recompute_advisory();
            let prompts: Vec<&Prompt> = self.prompts.iter().collect();
            let bundle =
                self.runtime
                    .block_on(self.assembler.build(self.workspace, &prompts, &self.instructions));
            self.bundle = Some(bundle);
        }
    }

    /// One last synchronous build, regardless of the coalescing window.
    pub(super) fn final_bundle(&mut self) -> Bundle {
        let prompts: Vec<&Prompt> = self.prompts.iter().collect();
        self.runtime
            .block_on(self.assembler.build(self.workspace, &prompts, &self.instructions))
    }

    fn recompute_advisory(&mut self) {
        self.advisory.clear();
        for dir in &self.workspace.dirs {
            let selected: BTreeSet<PathBuf> = dir
                .selected_files(&self.workspace.whitelist)
                .into_iter()
                .collect();
            for (dep, importers) in graph::cross_reference(&selected, &dir.graph) {
                self.advisory.insert(dep, importers.len());
            }
        }
    }

    /// Re-projects the trees into the flat row list. Collapsed folders hide
    /// their subtree; with a filter active, only nodes whose name (or a
    /// descendant's name) matches are kept.
    pub(super) fn rebuild_rows(&mut self) {
        let lower = self.filter_input.to_lowercase();
        let filter = (!lower.is_empty()).then_some(lower.as_str());
        let mut rows = Vec::new();
        for (dir_idx, dir) in self.workspace.dirs.iter().enumerate() {
            if let Some(root) = dir.tree.root() {
                collect_rows(dir, dir_idx, root, 0, filter, &mut rows);
            }
        }
        self.rows = rows;
        if self.rows.is_empty() {
            self.cursor = 0;
        } else {
            self.cursor = self.cursor.min(self.rows.len() - 1);
        }
    }

    pub(super) fn current_row(&self) -> Option<Row> {
        self.rows.get(self.cursor).copied()
    }

    pub(super) fn move_cursor(&mut self, delta: i32) {
        if self.rows.is_empty() {
            return;
        }
        let len = self.rows.len() as i32;
        self.cursor = (self.cursor as i32 + delta).rem_euclid(len) as usize;
    }

    pub(super) fn toggle_current(&mut self) {
        let Some(row) = self.current_row() else {
            return;
        };
        let Workspace {
            dirs, whitelist, ..
        } = &mut *self.workspace;
        let dir = &mut dirs[row.dir];
        let node = dir.tree.node(row.node);
        let path = node.path.clone();
        let changed = if node.is_folder() {
            let on = dir.selection.state(&dir.tree, whitelist, row.node) != TriState::Selected;
            dir.toggle_folder(whitelist, &path, on)
        } else {
            let on = !dir.selection.file_selected(&path);
            dir.toggle_file(whitelist, &path, on)
        };
        if changed {
            self.scheduler.notify();
        }
    }

    pub(super) fn toggle_fold(&mut self) {
        let Some(row) = self.current_row() else {
            return;
        };
        let Workspace {
            dirs, whitelist, ..
        } = &mut *self.workspace;
        let dir = &mut dirs[row.dir];
        let node = dir.tree.node(row.node);
        if !node.is_folder() {
            return;
        }
        let path = node.path.clone();
        if dir.is_collapsed(&path) {
            dir.expand(whitelist, &path);
        } else {
            dir.collapse(&path);
        }
        self.rebuild_rows();
    }

    pub(super) fn expand_all(&mut self) {
        let Workspace {
            dirs, whitelist, ..
        } = &mut *self.workspace;
        for dir in dirs.iter_mut() {
            let mut paths: Vec<PathBuf> = dir.collapsed.iter().cloned().collect();
            paths.sort();
            for path in paths {
                dir.expand(whitelist, &path);
            }
        }
        self.rebuild_rows();
    }

    /// Collapses every folder except the directory roots themselves.
    pub(super) fn collapse_all(&mut self) {
        for dir in &mut self.workspace.dirs {
            let folders: Vec<PathBuf> = dir
                .tree
                .ids()
                .filter(|&id| dir.tree.node(id).is_folder() && Some(id) != dir.tree.root())
                .map(|id| dir.tree.node(id).path.clone())
                .collect();
            for path in folders {
                dir.collapse(&path);
            }
        }
        self.rebuild_rows();
    }

    /// Files only: a collapsed subtree is not visible, so it is not touched.
    pub(super) fn select_all_visible(&mut self) {
        self.set_visible_files(true);
    }

    pub(super) fn deselect_all_visible(&mut self) {
        self.set_visible_files(false);
    }

    fn set_visible_files(&mut self, value: bool) {
        let rows = self.rows.clone();
        let Workspace {
            dirs, whitelist, ..
        } = &mut *self.workspace;
        let mut changed = false;
        for row in rows {
            let dir = &mut dirs[row.dir];
            let node = dir.tree.node(row.node);
            if node.is_folder() {
                continue;
            }
            let path = node.path.clone();
            changed |= dir.toggle_file(whitelist, &path, value);
        }
        if changed {
            self.scheduler.notify();
        }
    }

    /// Drops the current row's directory from the workspace entirely.
    pub(super) fn remove_current_dir(&mut self) {
        let Some(row) = self.current_row() else {
            return;
        };
        let id = self.workspace.dirs[row.dir].id.clone();
        self.workspace.remove_directory(&id);
        self.rebuild_rows();
        self.scheduler.notify();
    }

    /// Rescans the current row's directory from disk. Selection intent is
    /// keyed by path and survives the tree swap.
    pub(super) fn refresh_current_dir(&mut self) {
        let Some(row) = self.current_row() else {
            return;
        };
        let Workspace {
            dirs, whitelist, ..
        } = &mut *self.workspace;
        let dir = &mut dirs[row.dir];
        let SourceKind::PathBacked {
            root,
            include_ignored,
        } = &dir.source
        else {
            return;
        };
        match scan::load_tree(root, *include_ignored) {
            Ok(tree) => {
                dir.refresh_tree(tree, whitelist);
                self.rebuild_rows();
                self.scheduler.notify();
            }
            Err(e) => warn!(dir = %dir.id, error = %e, "rescan failed, keeping old tree"),
        }
    }

    pub(super) fn ensure_cursor_in_viewport(&mut self) {
        if self.rows.is_empty() || self.list_viewport_height == 0 {
            self.scroll_offset = 0;
            return;
        }
        let height = self.list_viewport_height;
        if self.cursor < self.scroll_offset {
            self.scroll_offset = self.cursor;
        } else if self.cursor >= self.scroll_offset + height {
            self.scroll_offset = self.cursor.saturating_sub(height - 1);
        }
        if self.rows.len() <= height {
            self.scroll_offset = 0;
        } else {
            self.scroll_offset = self.scroll_offset.min(self.rows.len() - height);
        }
    }

    pub(super) fn handle_normal_mode_input(&mut self, key_event: KeyEvent) {
        match key_event.code {
            KeyCode::Char('/') => {
                self.mode = AppMode::Filtering;
            }
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            KeyCode::Char('y') => {
                self.confirmed = true;
                self.quit = true;
            }
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1),
            KeyCode::Char(' ') | KeyCode::Enter => self.toggle_current(),
            KeyCode::Char('o') | KeyCode::Tab => self.toggle_fold(),
            KeyCode::Char('*') => self.expand_all(),
            KeyCode::Char('-') => self.collapse_all(),
            KeyCode::Char('a') => {
                if key_event.modifiers.is_empty() || key_event.modifiers == KeyModifiers::CONTROL {
                    self.select_all_visible();
                }
            }
            KeyCode::Char('d') => {
                if key_event.modifiers.is_empty() {
                    self.deselect_all_visible();
                }
            }
            KeyCode::Char('r') => self.refresh_current_dir(),
            KeyCode::Char('x') => self.remove_current_dir(),
            _ => {}
        }
    }

    pub(super) fn handle_filtering_mode_input(&mut self, key_event: KeyEvent) {
        match key_event.code {
            KeyCode::Enter => {
                self.mode = AppMode::Normal;
            }
            KeyCode::Esc => {
                self.mode = AppMode::Normal;
                self.filter_input.clear();
                self.filter_cursor_pos = 0;
                self.rebuild_rows();
            }
            KeyCode::Char(c) => {
                self.filter_input.insert(self.filter_cursor_pos, c);
                self.filter_cursor_pos += c.len_utf8();
                self.rebuild_rows();
            }
            KeyCode::Backspace => {
                if let Some(prev) = self.filter_input[..self.filter_cursor_pos].chars().next_back()
                {
                    self.filter_cursor_pos -= prev.len_utf8();
                    self.filter_input.remove(self.filter_cursor_pos);
                    self.rebuild_rows();
                }
            }
            KeyCode::Left => {
                if let Some(prev) = self.filter_input[..self.filter_cursor_pos].chars().next_back()
                {
                    self.filter_cursor_pos -= prev.len_utf8();
                }
            }
            KeyCode::Right => {
                if let Some(next) = self.filter_input[self.filter_cursor_pos..].chars().next() {
                    self.filter_cursor_pos += next.len_utf8();
                }
            }
            _ => {}
        }
    }
}

fn collect_rows(
    dir: &Directory,
    dir_idx: usize,
    id: NodeId,
    depth: usize,
    filter: Option<&str>,
    rows: &mut Vec<Row>,
) {
    if let Some(needle) = filter {
        if !subtree_matches(&dir.tree, id, needle) {
            return;
        }
    }
    rows.push(Row {
        dir: dir_idx,
        node: id,
        depth,
    });
    let node = dir.tree.node(id);
    if node.is_folder() && !dir.is_collapsed(&node.path) {
        for &child in &node.children {
            collect_rows(dir, dir_idx, child, depth + 1, filter, rows);
        }
    }
}

fn subtree_matches(tree: &TreeModel, id: NodeId, needle: &str) -> bool {
    let node = tree.node(id);
    if node.name.to_lowercase().contains(needle) {
        return true;
    }
    node.children
        .iter()
        .any(|&c| subtree_matches(tree, c, needle))
}
