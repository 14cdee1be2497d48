use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::tree::{NodeId, NodeKind, TreeModel};
use crate::whitelist::Whitelist;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    Unselected,
    Mixed,
    Selected,
}

impl TriState {
    fn definite(value: bool) -> TriState {
        if value {
            TriState::Selected
        } else {
            TriState::Unselected
        }
    }

    /// `Some(bool)` for Selected/Unselected, `None` for Mixed.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            TriState::Selected => Some(true),
            TriState::Unselected => Some(false),
            TriState::Mixed => None,
        }
    }
}

/// Single source of truth for selection in one directory. Files carry a
/// boolean leaf intent (sparse set of selected paths); folder tri-states are
/// a derived cache, recomputed bottom-up from descendants. The view layer
/// only ever reads from here.
///
/// Keys are paths, not node ids, so intent survives a whole-tree refresh.
#[derive(Debug, Default)]
pub struct SelectionStore {
    selected: HashSet<PathBuf>,
    folder_state: HashMap<PathBuf, TriState>,
    // Selectable descendant file count per folder. A folder with zero is
    // permanently Unselected and excluded from its parent's derivation.
    selectable: HashMap<PathBuf, usize>,
    // Collapsed subtrees whose root was force-set by a folder toggle but
    // whose hidden contents have not been rewritten yet. Cleared on expand.
    stale: HashSet<PathBuf>,
}

impl SelectionStore {
    pub fn new() -> Self {
        SelectionStore::default()
    }

    /// Rebinds the store to a (possibly new) tree: recomputes selectable
    /// counts and every folder tri-state. Leaf intent for paths that vanished
    /// is kept; it simply stops counting until the path comes back.
    pub fn attach(&mut self, tree: &TreeModel, whitelist: &Whitelist) {
        self.selectable.clear();
        self.stale.retain(|p| tree.contains(p));
        self.materialize_stale(tree, whitelist);
        self.folder_state.retain(|p, _| tree.contains(p));

        // Children precede nothing: arena order has parents first, so a
        // reverse scan sees every child before its parent.
        let mut counts: Vec<usize> = vec![0; tree.len()];
        for id in tree.ids().rev() {
            let node = tree.node(id);
            let own = match node.kind {
                NodeKind::File => usize::from(whitelist.is_selectable(&node.name)),
                NodeKind::Folder => {
                    let sum = node.children.iter().map(|&c| counts[c]).sum();
                    self.selectable.insert(node.path.clone(), sum);
                    sum
                }
            };
            counts[id] = own;
        }
        for id in tree.ids().rev() {
            if tree.node(id).is_folder() {
                let state = self.derive_folder(tree, whitelist, id);
                self.folder_state.insert(tree.node(id).path.clone(), state);
            }
        }
    }

    /// Rebinding ends the visibility deferral: a folder toggled while
    /// collapsed still carries its forced boolean only in `folder_state`, and
    /// the rederivation below would discard it. Write that intent through the
    /// subtree first. An enclosing stale folder wins over a nested one.
    fn materialize_stale(&mut self, tree: &TreeModel, whitelist: &Whitelist) {
        let roots: Vec<PathBuf> = self
            .stale
            .iter()
            .filter(|p| !p.ancestors().skip(1).any(|a| self.stale.contains(a)))
            .cloned()
            .collect();
        for path in roots {
            let Some(id) = tree.lookup(&path) else {
                continue;
            };
            let forced = self.folder_state.get(&path).copied().and_then(TriState::as_bool);
            if let Some(value) = forced {
                self.write_subtree_intent(tree, whitelist, id, value);
            }
        }
        self.stale.clear();
    }

    fn write_subtree_intent(
        &mut self,
        tree: &TreeModel,
        whitelist: &Whitelist,
        folder: NodeId,
        value: bool,
    ) {
        for &child in &tree.node(folder).children {
            let node = tree.node(child);
            match node.kind {
                NodeKind::File => {
                    if whitelist.is_selectable(&node.name) {
                        if value {
                            self.selected.insert(node.path.clone());
                        } else {
                            self.selected.remove(&node.path);
                        }
                    }
                }
                NodeKind::Folder => self.write_subtree_intent(tree, whitelist, child, value),
            }
        }
    }

    pub fn file_selected(&self, path: &Path) -> bool {
        self.selected.contains(path)
    }

    pub fn folder_selectable_count(&self, path: &Path) -> usize {
        self.selectable.get(path).copied().unwrap_or(0)
    }

    pub fn is_stale(&self, path: &Path) -> bool {
        self.stale.contains(path)
    }

    /// Tri-state of any node. Files are a projected boolean; non-selectable
    /// files are always Unselected.
    pub fn state(&self, tree: &TreeModel, whitelist: &Whitelist, id: NodeId) -> TriState {
        let node = tree.node(id);
        match node.kind {
            NodeKind::File => TriState::definite(
                whitelist.is_selectable(&node.name) && self.selected.contains(&node.path),
            ),
            NodeKind::Folder => self
                .folder_state
                .get(&node.path)
                .copied()
                .unwrap_or(TriState::Unselected),
        }
    }

    /// Selected selectable files, in tree (display) order. Subtrees behind a
    /// stale flag have no leaf intent written yet; their folder's forced
    /// boolean stands in for it, so the answer matches what expansion would
    /// materialize.
    pub fn selected_files(&self, tree: &TreeModel, whitelist: &Whitelist) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Some(root) = tree.root() {
            self.collect_selected(tree, whitelist, root, None, &mut out);
        }
        out
    }

    fn collect_selected(
        &self,
        tree: &TreeModel,
        whitelist: &Whitelist,
        id: NodeId,
        forced: Option<bool>,
        out: &mut Vec<PathBuf>,
    ) {
        let node = tree.node(id);
        match node.kind {
            NodeKind::File => {
                if !whitelist.is_selectable(&node.name) {
                    return;
                }
                let on = forced.unwrap_or_else(|| self.selected.contains(&node.path));
                if on {
                    out.push(node.path.clone());
                }
            }
            NodeKind::Folder => {
                // An enclosing stale force wins: nested folders cannot have
                // been retoggled while hidden.
                let forced = forced.or_else(|| {
                    if self.stale.contains(&node.path) {
                        self.folder_state
                            .get(&node.path)
                            .copied()
                            .and_then(TriState::as_bool)
                    } else {
                        None
                    }
                });
                for &child in &node.children {
                    self.collect_selected(tree, whitelist, child, forced, out);
                }
            }
        }
    }

    /// Overwrites leaf intent wholesale (persistence restore). Callers follow
    /// up with `attach` to rebuild the derived cache.
    pub fn set_selected_paths(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.selected = paths.into_iter().collect();
    }

    /// Sets one file's intent and recomputes ancestor tri-states up to the
    /// root. Silent no-op for folders, unknown paths, and non-selectable
    /// files. Returns whether anything changed.
    pub fn toggle_file(
        &mut self,
        tree: &TreeModel,
        whitelist: &Whitelist,
        path: &Path,
        value: bool,
    ) -> bool {
        let Some(id) = tree.lookup(path) else {
            return false;
        };
        let node = tree.node(id);
        if node.is_folder() || !whitelist.is_selectable(&node.name) {
            return false;
        }
        let changed = if value {
            self.selected.insert(node.path.clone())
        } else {
            self.selected.remove(&node.path)
        };
        if changed {
            self.recompute_ancestors(tree, whitelist, id);
        }
        changed
    }

    /// Two-phase folder toggle. The folder's own state becomes the boolean
    /// immediately; the boolean then flows to every currently visible
    /// descendant. Descendants hidden behind a collapsed folder are left
    /// untouched and the collapsed folder is marked stale instead, which
    /// keeps the whole operation O(visible nodes). Ancestors are rederived
    /// afterwards. Folders with no selectable descendants are untoggleable.
    pub fn toggle_folder(
        &mut self,
        tree: &TreeModel,
        whitelist: &Whitelist,
        collapsed: &HashSet<PathBuf>,
        path: &Path,
        value: bool,
    ) -> bool {
        let Some(id) = tree.lookup(path) else {
            return false;
        };
        let node = tree.node(id);
        if !node.is_folder() || self.folder_selectable_count(&node.path) == 0 {
            return false;
        }
        self.folder_state
            .insert(node.path.clone(), TriState::definite(value));
        if collapsed.contains(&node.path) {
            self.stale.insert(node.path.clone());
        } else {
            self.stale.remove(&node.path);
            self.propagate_visible(tree, whitelist, collapsed, id, value);
        }
        self.recompute_ancestors(tree, whitelist, id);
        true
    }

    /// LazyVisibilitySync: called right after `path` leaves the collapsed
    /// set. If the subtree was force-set while hidden and the folder still
    /// carries a definite boolean, that boolean is now written through the
    /// newly visible region; nested collapsed folders stay deferred.
    pub fn sync_on_expand(
        &mut self,
        tree: &TreeModel,
        whitelist: &Whitelist,
        collapsed: &HashSet<PathBuf>,
        path: &Path,
    ) {
        if !self.stale.remove(path) {
            return;
        }
        let Some(id) = tree.lookup(path) else {
            return;
        };
        let state = self
            .folder_state
            .get(path)
            .copied()
            .unwrap_or(TriState::Unselected);
        if let Some(value) = state.as_bool() {
            self.propagate_visible(tree, whitelist, collapsed, id, value);
        }
    }

    fn propagate_visible(
        &mut self,
        tree: &TreeModel,
        whitelist: &Whitelist,
        collapsed: &HashSet<PathBuf>,
        folder: NodeId,
        value: bool,
    ) {
        for &child in &tree.node(folder).children {
            let node = tree.node(child);
            match node.kind {
                NodeKind::File => {
                    if whitelist.is_selectable(&node.name) {
                        if value {
                            self.selected.insert(node.path.clone());
                        } else {
                            self.selected.remove(&node.path);
                        }
                    }
                }
                NodeKind::Folder => {
                    if self.folder_selectable_count(&node.path) == 0 {
                        continue;
                    }
                    self.folder_state
                        .insert(node.path.clone(), TriState::definite(value));
                    if collapsed.contains(&node.path) {
                        self.stale.insert(node.path.clone());
                    } else {
                        self.propagate_visible(tree, whitelist, collapsed, child, value);
                    }
                }
            }
        }
    }

    /// Rederives every folder on the path from `from`'s parent up to the
    /// root. Ancestors of anything toggleable are expanded (you can only
    /// touch visible nodes), so none of them can be stale and the cached
    /// states of their collapsed children are trustworthy intent.
    fn recompute_ancestors(&mut self, tree: &TreeModel, whitelist: &Whitelist, from: NodeId) {
        for anc in tree.ancestors(from) {
            let state = self.derive_folder(tree, whitelist, anc);
            self.folder_state.insert(tree.node(anc).path.clone(), state);
        }
    }

    /// Pure bottom-up derivation from the immediate children's current
    /// states. Non-selectable files and zero-count folders are excluded from
    /// the count entirely.
    fn derive_folder(&self, tree: &TreeModel, whitelist: &Whitelist, id: NodeId) -> TriState {
        let mut any_child = false;
        let mut any_selected = false;
        let mut all_selected = true;
        for &child in &tree.node(id).children {
            let node = tree.node(child);
            let child_state = match node.kind {
                NodeKind::File => {
                    if !whitelist.is_selectable(&node.name) {
                        continue;
                    }
                    TriState::definite(self.selected.contains(&node.path))
                }
                NodeKind::Folder => {
                    if self.folder_selectable_count(&node.path) == 0 {
                        continue;
                    }
                    self.folder_state
                        .get(&node.path)
                        .copied()
                        .unwrap_or(TriState::Unselected)
                }
            };
            any_child = true;
            match child_state {
                TriState::Selected => any_selected = true,
                TriState::Unselected => all_selected = false,
                TriState::Mixed => {
                    any_selected = true;
                    all_selected = false;
                }
            }
        }
        if !any_child {
            TriState::Unselected
        } else if all_selected {
            TriState::Selected
        } else if any_selected {
            TriState::Mixed
        } else {
            TriState::Unselected
        }
    }
}
