use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::tree::{NodeKind, TreeBuilder, TreeModel};

/// Canonicalizes and sanity-checks a user-supplied root before any walking
/// happens. Rejections surface as `PathRejected` / `NotFoundOrPermission`,
/// never as a panic deeper in.
pub fn validate_root(requested: &Path) -> Result<PathBuf> {
    if !requested.exists() {
        return Err(Error::PathRejected(format!(
            "path does not exist: {}",
            requested.display()
        )));
    }
    let resolved = requested.canonicalize().map_err(|e| Error::NotFoundOrPermission {
        path: requested.to_path_buf(),
        source: e,
    })?;
    if !resolved.is_dir() {
        return Err(Error::PathRejected(format!(
            "not a directory: {}",
            resolved.display()
        )));
    }
    Ok(resolved)
}

/// Walks `root` into a fresh `TreeModel`, honoring gitignore rules unless
/// `include_ignored` is set. Children come out folders-before-files in
/// natural order (the builder sorts on finish).
pub fn load_tree(root: &Path, include_ignored: bool) -> Result<TreeModel> {
    let root = validate_root(root)?;
    debug!(root = %root.display(), "loading directory tree");

    let mut builder = TreeBuilder::new();
    builder.add_root(root.clone());

    let mut walker = WalkBuilder::new(&root);
    if include_ignored {
        walker.git_ignore(false).ignore(false);
    }

    for result in walker.build() {
        let dirent = match result {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "skipping entry during scan");
                continue;
            }
        };
        let path = dirent.into_path();
        if path == root {
            continue;
        }
        let Some(parent_id) = path.parent().and_then(|p| builder.lookup(p)) else {
            // Parent was skipped (unreadable or ignored); drop the subtree.
            continue;
        };
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let kind = if path.is_dir() {
            NodeKind::Folder
        } else {
            NodeKind::File
        };
        builder.add_child(parent_id, &name, kind);
    }

    let tree = builder.finish();
    debug!(nodes = tree.len(), "tree loaded");
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn rejects_missing_and_non_directory_roots() {
        assert!(matches!(
            validate_root(Path::new("/definitely/not/here")),
            Err(Error::PathRejected(_))
        ));
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            validate_root(&file),
            Err(Error::PathRejected(_))
        ));
    }

    #[test]
    fn loads_nested_tree_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("sub/c.txt"), "c").unwrap();

        let tree = load_tree(dir.path(), false).unwrap();
        let root = tree.root().unwrap();
        let names: Vec<_> = tree
            .node(root)
            .children
            .iter()
            .map(|&c| tree.node(c).name.clone())
            .collect();
        assert_eq!(names, vec!["sub", "a.txt", "b.txt"]);
    }

    #[test]
    fn honors_gitignore_unless_included() {
        let dir = tempfile::tempdir().unwrap();
        // An ignore file is enough; no git repo required for the walker.
        fs::write(dir.path().join(".ignore"), "skipped.txt\n").unwrap();
        fs::write(dir.path().join("skipped.txt"), "x").unwrap();
        fs::write(dir.path().join("kept.txt"), "x").unwrap();

        let tree = load_tree(dir.path(), false).unwrap();
        let names: Vec<_> = tree.file_paths();
        assert!(names.iter().all(|p| !p.ends_with("skipped.txt")));

        let tree = load_tree(dir.path(), true).unwrap();
        assert!(tree.file_paths().iter().any(|p| p.ends_with("skipped.txt")));
    }
}
