use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::Result;
use crate::graph::DependencyGraph;
use crate::scan;
use crate::selection::SelectionStore;
use crate::tree::{self, TreeModel};
use crate::whitelist::Whitelist;

/// Stable directory identity: the canonical root for path-backed directories,
/// a caller-chosen name for in-memory ones. Survives tree refreshes, which is
/// what lets selection be keyed independently of tree object identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirId(pub String);

impl std::fmt::Display for DirId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Contents resolved from the filesystem at assembly time.
    PathBacked {
        root: PathBuf,
        include_ignored: bool,
    },
    /// Contents frozen in the blob store at ingestion time.
    InMemory,
}

/// Blob store for uploaded / in-memory directories, keyed by (dir, path).
/// Writes are idempotent, so late-arriving content can never corrupt a later
/// build.
#[derive(Debug, Default)]
pub struct ContentStore {
    blobs: HashMap<(DirId, PathBuf), String>,
}

impl ContentStore {
    pub fn put(&mut self, dir: &DirId, path: PathBuf, content: String) {
        self.blobs.insert((dir.clone(), path), content);
    }

    pub fn get(&self, dir: &DirId, path: &Path) -> Option<&String> {
        self.blobs.get(&(dir.clone(), path.to_path_buf()))
    }

    pub fn clear_dir(&mut self, dir: &DirId) {
        self.blobs.retain(|(d, _), _| d != dir);
    }

    pub fn clear(&mut self) {
        self.blobs.clear();
    }
}

#[derive(Debug)]
pub struct Directory {
    pub id: DirId,
    pub source: SourceKind,
    pub tree: TreeModel,
    pub selection: SelectionStore,
    pub collapsed: HashSet<PathBuf>,
    /// Arrives asynchronously and independently of the tree; empty until then.
    pub graph: DependencyGraph,
}

impl Directory {
    fn new(id: DirId, source: SourceKind, tree: TreeModel, whitelist: &Whitelist) -> Self {
        let mut selection = SelectionStore::new();
        selection.attach(&tree, whitelist);
        Directory {
            id,
            source,
            tree,
            selection,
            collapsed: HashSet::new(),
            graph: DependencyGraph::new(),
        }
    }

    pub fn toggle_file(&mut self, whitelist: &Whitelist, path: &Path, value: bool) -> bool {
        self.selection.toggle_file(&self.tree, whitelist, path, value)
    }

    pub fn toggle_folder(&mut self, whitelist: &Whitelist, path: &Path, value: bool) -> bool {
        self.selection
            .toggle_folder(&self.tree, whitelist, &self.collapsed, path, value)
    }

    /// Expanding removes the collapse marker first, then lets the selection
    /// store materialize any deferred writes into the newly visible region.
    pub fn expand(&mut self, whitelist: &Whitelist, path: &Path) {
        if self.collapsed.remove(path) {
            self.selection
                .sync_on_expand(&self.tree, whitelist, &self.collapsed, path);
        }
    }

    /// Collapse is a pure visibility change; no selection work happens.
    pub fn collapse(&mut self, path: &Path) {
        if self
            .tree
            .lookup(path)
            .is_some_and(|id| self.tree.node(id).is_folder())
        {
            self.collapsed.insert(path.to_path_buf());
        }
    }

    pub fn is_collapsed(&self, path: &Path) -> bool {
        self.collapsed.contains(path)
    }

    /// Whole-model swap; selection intent is keyed by path and survives.
    pub fn refresh_tree(&mut self, tree: TreeModel, whitelist: &Whitelist) {
        self.collapsed.retain(|p| tree.contains(p));
        self.tree = tree;
        self.selection.attach(&self.tree, whitelist);
    }

    pub fn selected_files(&self, whitelist: &Whitelist) -> Vec<PathBuf> {
        self.selection.selected_files(&self.tree, whitelist)
    }
}

/// The session object: an ordered list of directories plus the shared blob
/// store and whitelist. Passed by reference to everything that needs it;
/// there are no module-level globals anywhere.
#[derive(Debug)]
pub struct Workspace {
    pub dirs: Vec<Directory>,
    pub store: ContentStore,
    pub whitelist: Whitelist,
}

impl Workspace {
    pub fn new(whitelist: Whitelist) -> Self {
        Workspace {
            dirs: Vec::new(),
            store: ContentStore::default(),
            whitelist,
        }
    }

    /// Registers a filesystem-backed directory and loads its tree.
    pub fn add_path_directory(&mut self, root: &Path, include_ignored: bool) -> Result<DirId> {
        let canonical = scan::validate_root(root)?;
        let id = DirId(canonical.to_string_lossy().into_owned());
        let tree = scan::load_tree(&canonical, include_ignored)?;
        debug!(id = %id, nodes = tree.len(), "registered directory");
        self.dirs.push(Directory::new(
            id.clone(),
            SourceKind::PathBacked {
                root: canonical,
                include_ignored,
            },
            tree,
            &self.whitelist,
        ));
        Ok(id)
    }

    /// Registers an in-memory directory from (relative path, content) pairs,
    /// freezing the contents in the blob store.
    pub fn add_memory_directory(
        &mut self,
        name: &str,
        files: Vec<(PathBuf, String)>,
    ) -> DirId {
        let id = DirId(name.to_string());
        let rel_paths: Vec<PathBuf> = files.iter().map(|(p, _)| p.clone()).collect();
        let tree = tree::tree_from_file_paths(PathBuf::from(name), &rel_paths);
        for (rel, content) in files {
            self.store.put(&id, PathBuf::from(name).join(rel), content);
        }
        self.dirs.push(Directory::new(
            id.clone(),
            SourceKind::InMemory,
            tree,
            &self.whitelist,
        ));
        id
    }

    /// Folder ingestion: snapshots a directory from disk into an in-memory
    /// one (the "upload" path when there is no zip in play). Unreadable or
    /// non-UTF-8 files are skipped with a warning.
    pub fn ingest_folder(&mut self, root: &Path) -> Result<DirId> {
        let canonical = scan::validate_root(root)?;
        let name = canonical
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| canonical.to_string_lossy().into_owned());
        let mut files = Vec::new();
        for entry in WalkDir::new(&canonical).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&canonical)
                .unwrap_or(entry.path())
                .to_path_buf();
            match std::fs::read_to_string(entry.path()) {
                Ok(content) => files.push((rel, content)),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping file during ingest"),
            }
        }
        Ok(self.add_memory_directory(&name, files))
    }

    pub fn directory(&self, id: &DirId) -> Option<&Directory> {
        self.dirs.iter().find(|d| &d.id == id)
    }

    pub fn directory_mut(&mut self, id: &DirId) -> Option<&mut Directory> {
        self.dirs.iter_mut().find(|d| &d.id == id)
    }

    /// Removes the directory and its blobs; removing the last one wipes the
    /// whole store. Persisted keys are the caller's problem (the state store
    /// owns them).
    pub fn remove_directory(&mut self, id: &DirId) {
        self.dirs.retain(|d| &d.id != id);
        if self.dirs.is_empty() {
            self.store.clear();
        } else {
            self.store.clear_dir(id);
        }
    }

    /// Re-derives selectability everywhere after a whitelist edit.
    pub fn set_whitelist(&mut self, whitelist: Whitelist) {
        self.whitelist = whitelist;
        for dir in &mut self.dirs {
            dir.selection.attach(&dir.tree, &self.whitelist);
        }
    }

    /// (directory, selected files) in registration order, empty selections
    /// included so callers can decide what to skip.
    pub fn selections(&self) -> Vec<(&Directory, Vec<PathBuf>)> {
        self.dirs
            .iter()
            .map(|d| (d, d.selected_files(&self.whitelist)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws() -> Workspace {
        Workspace::new(Whitelist::new(&[".txt".to_string()]))
    }

    #[test]
    fn memory_directory_round_trip() {
        let mut w = ws();
        let id = w.add_memory_directory(
            "upload",
            vec![
                (PathBuf::from("a.txt"), "alpha".to_string()),
                (PathBuf::from("sub/b.txt"), "beta".to_string()),
            ],
        );
        let dir = w.directory(&id).unwrap();
        assert_eq!(dir.source, SourceKind::InMemory);
        assert_eq!(dir.tree.file_paths().len(), 2);
        assert_eq!(
            w.store.get(&id, Path::new("upload/sub/b.txt")).unwrap(),
            "beta"
        );
    }

    #[test]
    fn removal_clears_blobs() {
        let mut w = ws();
        let id = w.add_memory_directory("u", vec![(PathBuf::from("a.txt"), "x".into())]);
        w.remove_directory(&id);
        assert!(w.directory(&id).is_none());
        assert!(w.store.get(&id, Path::new("u/a.txt")).is_none());
    }

    #[test]
    fn removing_last_directory_wipes_the_store() {
        let mut w = ws();
        let kept = w.add_memory_directory("kept", vec![(PathBuf::from("a.txt"), "x".into())]);
        let gone = w.add_memory_directory("gone", vec![(PathBuf::from("b.txt"), "y".into())]);
        w.remove_directory(&gone);
        assert!(w.store.get(&kept, Path::new("kept/a.txt")).is_some());

        w.remove_directory(&kept);
        assert!(w.dirs.is_empty());
        assert!(w.store.get(&kept, Path::new("kept/a.txt")).is_none());
    }

    #[test]
    fn whitelist_change_rederives_states() {
        let mut w = ws();
        let id = w.add_memory_directory(
            "u",
            vec![
                (PathBuf::from("a.txt"), String::new()),
                (PathBuf::from("b.bin"), String::new()),
            ],
        );
        {
            let wl = Whitelist::new(&[".txt".to_string()]);
            let dir = w.directory_mut(&id).unwrap();
            dir.toggle_folder(&wl, Path::new("u"), true);
        }
        assert_eq!(w.selections()[0].1.len(), 1);

        // Widening the whitelist makes b.bin count; the folder is now Mixed
        // and the selected set unchanged.
        w.set_whitelist(Whitelist::new(&[".txt".to_string(), ".bin".to_string()]));
        let selections = w.selections();
        let (dir, selected) = &selections[0];
        assert_eq!(selected.len(), 1);
        let root = dir.tree.root().unwrap();
        assert_eq!(
            dir.selection.state(&dir.tree, &w.whitelist, root),
            crate::selection::TriState::Mixed
        );
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut w = ws();
        w.add_memory_directory("second", vec![(PathBuf::from("b.txt"), String::new())]);
        w.add_memory_directory("first", vec![(PathBuf::from("a.txt"), String::new())]);
        let ids: Vec<_> = w.dirs.iter().map(|d| d.id.0.clone()).collect();
        assert_eq!(ids, vec!["second", "first"]);
    }
}
