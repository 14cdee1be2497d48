use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Folder,
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl TreeNode {
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }
}

/// Immutable snapshot of one directory's hierarchy. Nodes live in an arena
/// addressed by index, with a `path -> id` map for O(1) lookup; a refresh
/// replaces the whole model rather than mutating it in place.
///
/// Parents always precede their children in the arena, so a single reverse
/// scan visits every child before its parent.
#[derive(Debug, Clone, Default)]
pub struct TreeModel {
    nodes: Vec<TreeNode>,
    index: HashMap<PathBuf, NodeId>,
    root: Option<NodeId>,
}

impl TreeModel {
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn lookup(&self, path: &Path) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Ids in arena order (parents before children).
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = NodeId> + use<> {
        0..self.nodes.len()
    }

    /// Walks up to the root, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.nodes[id].parent;
        while let Some(p) = cur {
            out.push(p);
            cur = self.nodes[p].parent;
        }
        out
    }

    /// File paths in tree (display) order.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.collect_files(root, &mut out);
        }
        out
    }

    fn collect_files(&self, id: NodeId, out: &mut Vec<PathBuf>) {
        let node = &self.nodes[id];
        match node.kind {
            NodeKind::File => out.push(node.path.clone()),
            NodeKind::Folder => {
                for &child in &node.children {
                    self.collect_files(child, out);
                }
            }
        }
    }
}

/// Folders before files, then natural (numeric-aware, case-insensitive) order.
pub fn natural_node_cmp(a: &TreeNode, b: &TreeNode) -> Ordering {
    match (a.kind, b.kind) {
        (NodeKind::Folder, NodeKind::File) => Ordering::Less,
        (NodeKind::File, NodeKind::Folder) => Ordering::Greater,
        _ => natural_name_cmp(&a.name, &b.name),
    }
}

pub fn natural_name_cmp(a: &str, b: &str) -> Ordering {
    alphanumeric_sort::compare_str(&a.to_lowercase(), &b.to_lowercase())
}

pub struct TreeBuilder {
    nodes: Vec<TreeNode>,
    index: HashMap<PathBuf, NodeId>,
    root: Option<NodeId>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        TreeBuilder {
            nodes: Vec::new(),
            index: HashMap::new(),
            root: None,
        }
    }

    pub fn add_root(&mut self, path: PathBuf) -> NodeId {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let id = self.push(TreeNode {
            path,
            name,
            kind: NodeKind::Folder,
            children: Vec::new(),
            parent: None,
        });
        self.root = Some(id);
        id
    }

    /// Callers must add parents before children (arena ordering invariant).
    pub fn add_child(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> NodeId {
        let path = self.nodes[parent].path.join(name);
        let id = self.push(TreeNode {
            path,
            name: name.to_string(),
            kind,
            children: Vec::new(),
            parent: Some(parent),
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn lookup(&self, path: &Path) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    fn push(&mut self, node: TreeNode) -> NodeId {
        let id = self.nodes.len();
        self.index.insert(node.path.clone(), id);
        self.nodes.push(node);
        id
    }

    /// Sorts every child list (folders first, natural order) and seals the
    /// model.
    pub fn finish(mut self) -> TreeModel {
        let snapshot = self.nodes.clone();
        for node in &mut self.nodes {
            node.children
                .sort_by(|&a, &b| natural_node_cmp(&snapshot[a], &snapshot[b]));
        }
        TreeModel {
            nodes: self.nodes,
            index: self.index,
            root: self.root,
        }
    }
}

/// Builds a model from relative file paths (used for in-memory directories,
/// where there is no filesystem to walk). Intermediate folders are created on
/// demand under a synthetic root.
pub fn tree_from_file_paths(root: PathBuf, files: &[PathBuf]) -> TreeModel {
    let mut builder = TreeBuilder::new();
    let root_id = builder.add_root(root.clone());
    for rel in files {
        let mut parent = root_id;
        let components: Vec<_> = rel.components().collect();
        for (i, comp) in components.iter().enumerate() {
            let name = comp.as_os_str().to_string_lossy();
            let is_last = i + 1 == components.len();
            let child_path = builder.nodes[parent].path.join(name.as_ref());
            parent = match builder.lookup(&child_path) {
                Some(id) => id,
                None => builder.add_child(
                    parent,
                    &name,
                    if is_last { NodeKind::File } else { NodeKind::Folder },
                ),
            };
        }
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TreeModel {
        let mut b = TreeBuilder::new();
        let root = b.add_root(PathBuf::from("/r"));
        b.add_child(root, "zeta.txt", NodeKind::File);
        let sub = b.add_child(root, "sub", NodeKind::Folder);
        b.add_child(root, "File10.txt", NodeKind::File);
        b.add_child(root, "file2.txt", NodeKind::File);
        b.add_child(sub, "inner.txt", NodeKind::File);
        b.finish()
    }

    #[test]
    fn children_sorted_folders_first_natural() {
        let tree = sample();
        let root = tree.root().unwrap();
        let names: Vec<_> = tree
            .node(root)
            .children
            .iter()
            .map(|&c| tree.node(c).name.clone())
            .collect();
        assert_eq!(names, vec!["sub", "file2.txt", "File10.txt", "zeta.txt"]);
    }

    #[test]
    fn path_index_and_ancestors() {
        let tree = sample();
        let inner = tree.lookup(Path::new("/r/sub/inner.txt")).unwrap();
        let ancestors: Vec<_> = tree
            .ancestors(inner)
            .into_iter()
            .map(|id| tree.node(id).path.clone())
            .collect();
        assert_eq!(
            ancestors,
            vec![PathBuf::from("/r/sub"), PathBuf::from("/r")]
        );
    }

    #[test]
    fn file_paths_in_display_order() {
        let tree = sample();
        assert_eq!(
            tree.file_paths(),
            vec![
                PathBuf::from("/r/sub/inner.txt"),
                PathBuf::from("/r/file2.txt"),
                PathBuf::from("/r/File10.txt"),
                PathBuf::from("/r/zeta.txt"),
            ]
        );
    }

    #[test]
    fn from_file_paths_creates_intermediate_folders() {
        let tree = tree_from_file_paths(
            PathBuf::from("upload"),
            &[PathBuf::from("a/b/c.txt"), PathBuf::from("a/d.txt")],
        );
        assert!(tree.contains(Path::new("upload/a")));
        assert!(tree.contains(Path::new("upload/a/b")));
        let b = tree.lookup(Path::new("upload/a/b")).unwrap();
        assert_eq!(tree.node(b).kind, NodeKind::Folder);
        assert_eq!(tree.file_paths().len(), 2);
    }
}
