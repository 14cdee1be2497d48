use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::fetch;
use crate::prompts::Prompt;
use crate::tree::{NodeId, TreeModel};
use crate::utils::approx_tokens;
use crate::workspace::{Directory, SourceKind, Workspace};

/// The assembled artifact: four fixed sections (file map, file contents,
/// prompts, user instructions), plus the paths whose content could not be
/// resolved in this build. Failures never block the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub text: String,
    pub failed: Vec<PathBuf>,
    pub token_estimate: usize,
}

/// Builds bundles. Holds the path-keyed content cache for path-backed files;
/// writes into it are idempotent, so results from a superseded build are
/// harmless when they land late.
#[derive(Debug, Default)]
pub struct Assembler {
    cache: HashMap<PathBuf, String>,
}

impl Assembler {
    pub fn new() -> Self {
        Assembler::default()
    }

    /// Pure function of (selection state, content cache, prompts,
    /// instructions): identical inputs produce an identical bundle, aside
    /// from which failed entries transient faults contribute.
    pub async fn build(
        &mut self,
        workspace: &Workspace,
        prompts: &[&Prompt],
        instructions: &str,
    ) -> Bundle {
        let selections = workspace.selections();
        let mut failed = Vec::new();

        // One batched round trip for every path-backed file in this build.
        let disk_paths: Vec<PathBuf> = selections
            .iter()
            .filter(|(dir, _)| matches!(dir.source, SourceKind::PathBacked { .. }))
            .flat_map(|(_, files)| files.iter().cloned())
            .collect();
        if !disk_paths.is_empty() {
            for (path, result) in fetch::read_batch(disk_paths).await {
                match result {
                    Ok(content) => {
                        self.cache.insert(path, content);
                    }
                    Err(_) => {
                        // A failed path must render empty this build, even if
                        // an earlier build cached its content.
                        self.cache.remove(&path);
                        failed.push(path);
                    }
                }
            }
        }

        let mut sections: Vec<String> = Vec::new();

        let maps: Vec<String> = selections
            .iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(dir, files)| render_file_map(dir, files))
            .collect();
        sections.extend(maps);

        let mut content_blocks: Vec<String> = Vec::new();
        for (dir, files) in &selections {
            for path in files {
                let content = match &dir.source {
                    SourceKind::PathBacked { .. } => self.cache.get(path).cloned(),
                    SourceKind::InMemory => workspace.store.get(&dir.id, path).cloned(),
                };
                let content = match content {
                    Some(c) => c,
                    None => {
                        // In-memory misses are failures too; disk failures
                        // were already recorded above. Either way the block
                        // is emitted empty.
                        if !failed.contains(path) {
                            failed.push(path.clone());
                        }
                        String::new()
                    }
                };
                content_blocks.push(format!(
                    "File: {}\n```{}\n{}\n```",
                    path.display(),
                    language_tag(path),
                    content.trim_end_matches('\n'),
                ));
            }
        }
        if !content_blocks.is_empty() {
            sections.push(format!(
                "<file_contents>\n{}\n</file_contents>",
                content_blocks.join("\n\n")
            ));
        }

        for (i, prompt) in prompts.iter().enumerate() {
            let ordinal = i + 1;
            sections.push(format!(
                "<meta prompt {ordinal} = \"{}\">\n{}\n</meta prompt {ordinal}>",
                prompt.name, prompt.text
            ));
        }

        if !instructions.trim().is_empty() {
            sections.push(format!(
                "<user_instructions>\n{}\n</user_instructions>",
                instructions.trim_end()
            ));
        }

        failed.sort();
        let mut text = sections.join("\n\n");
        if !text.is_empty() {
            text.push('\n');
        }
        debug!(
            bytes = text.len(),
            failed = failed.len(),
            "bundle assembled"
        );
        let token_estimate = approx_tokens(&text);
        Bundle {
            text,
            failed,
            token_estimate,
        }
    }
}

/// One `<file_map>` block: the directory root followed by an ASCII tree
/// restricted to the selected files and their ancestor folders, in tree
/// (natural, folders-first) order.
fn render_file_map(dir: &Directory, selected: &[PathBuf]) -> String {
    let tree = &dir.tree;
    let mut keep: HashSet<NodeId> = HashSet::new();
    for path in selected {
        if let Some(id) = tree.lookup(path) {
            keep.insert(id);
            keep.extend(tree.ancestors(id));
        }
    }

    let mut lines = Vec::new();
    let root_label = match &dir.source {
        SourceKind::PathBacked { root, .. } => root.display().to_string(),
        SourceKind::InMemory => dir.id.0.clone(),
    };
    lines.push(root_label);
    if let Some(root) = tree.root() {
        render_children(tree, &keep, root, "", &mut lines);
    }
    format!("<file_map>\n{}\n</file_map>", lines.join("\n"))
}

fn render_children(
    tree: &TreeModel,
    keep: &HashSet<NodeId>,
    id: NodeId,
    prefix: &str,
    lines: &mut Vec<String>,
) {
    let kept: Vec<NodeId> = tree
        .node(id)
        .children
        .iter()
        .copied()
        .filter(|c| keep.contains(c))
        .collect();
    for (i, child) in kept.iter().enumerate() {
        let node = tree.node(*child);
        let last = i + 1 == kept.len();
        let connector = if last { "└─ " } else { "├─ " };
        let name = if node.is_folder() {
            format!("{}/", node.name)
        } else {
            node.name.clone()
        };
        lines.push(format!("{prefix}{connector}{name}"));
        if node.is_folder() {
            let child_prefix = format!("{prefix}{}", if last { "   " } else { "│  " });
            render_children(tree, keep, *child, &child_prefix, lines);
        }
    }
}

/// Best-effort language id from the extension; unknown extensions get an
/// untagged fence.
fn language_tag(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("rs") => "rust",
        Some("py") => "python",
        Some("js" | "jsx") => "javascript",
        Some("ts" | "tsx") => "typescript",
        Some("c" | "h") => "c",
        Some("cpp" | "hpp" | "cc" | "hxx") => "cpp",
        Some("go") => "go",
        Some("java") => "java",
        Some("rb") => "ruby",
        Some("sh" | "bash") => "bash",
        Some("md" | "markdown") => "markdown",
        Some("toml") => "toml",
        Some("json") => "json",
        Some("yaml" | "yml") => "yaml",
        Some("html" | "htm") => "html",
        Some("css") => "css",
        Some("sql") => "sql",
        Some("txt") | None => "",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whitelist::Whitelist;
    use std::fs;

    fn txt_workspace() -> Workspace {
        Workspace::new(Whitelist::new(&[".txt".to_string(), ".rs".to_string()]))
    }

    fn select_all(workspace: &mut Workspace, dir_index: usize) {
        let wl = Whitelist::new(workspace.whitelist.patterns());
        let dir = &mut workspace.dirs[dir_index];
        let root = dir.tree.node(dir.tree.root().unwrap()).path.clone();
        dir.toggle_folder(&wl, &root, true);
    }

    #[tokio::test]
    async fn scenario_d_one_map_block_per_selected_directory() {
        let mut w = txt_workspace();
        w.add_memory_directory("beta", vec![(PathBuf::from("b.txt"), "B".into())]);
        w.add_memory_directory("alpha", vec![(PathBuf::from("a.txt"), "A".into())]);
        w.add_memory_directory("empty", vec![(PathBuf::from("c.txt"), "C".into())]);
        select_all(&mut w, 0);
        select_all(&mut w, 1);
        // "empty" keeps an empty selection and must not appear at all.

        let bundle = Assembler::new().build(&w, &[], "").await;
        let beta_at = bundle.text.find("<file_map>\nbeta").unwrap();
        let alpha_at = bundle.text.find("<file_map>\nalpha").unwrap();
        assert!(beta_at < alpha_at, "registration order preserved");
        assert!(!bundle.text.contains("empty"));
        assert_eq!(bundle.text.matches("<file_map>").count(), 2);
    }

    #[tokio::test]
    async fn file_map_restricted_to_selection_with_branch_chars() {
        let mut w = txt_workspace();
        w.add_memory_directory(
            "proj",
            vec![
                (PathBuf::from("sub/c.txt"), "C".into()),
                (PathBuf::from("a.txt"), "A".into()),
                (PathBuf::from("skip.txt"), "S".into()),
            ],
        );
        let wl = Whitelist::new(w.whitelist.patterns());
        let dir = &mut w.dirs[0];
        dir.toggle_file(&wl, Path::new("proj/sub/c.txt"), true);
        dir.toggle_file(&wl, Path::new("proj/a.txt"), true);

        let bundle = Assembler::new().build(&w, &[], "").await;
        assert!(bundle.text.contains("proj\n├─ sub/\n│  └─ c.txt\n└─ a.txt"));
        assert!(!bundle.text.contains("skip.txt"));
    }

    #[tokio::test]
    async fn sections_in_fixed_order_with_tags() {
        let mut w = txt_workspace();
        w.add_memory_directory("d", vec![(PathBuf::from("a.rs"), "fn a() {}".into())]);
        select_all(&mut w, 0);
        let p1 = Prompt {
            name: "style".into(),
            text: "Be terse.".into(),
        };
        let p2 = Prompt {
            name: "tests".into(),
            text: "Add tests.".into(),
        };

        let bundle = Assembler::new()
            .build(&w, &[&p1, &p2], "Fix the bug.")
            .await;
        let map = bundle.text.find("<file_map>").unwrap();
        let contents = bundle.text.find("<file_contents>").unwrap();
        let prompt1 = bundle.text.find("<meta prompt 1 = \"style\">").unwrap();
        let prompt2 = bundle.text.find("<meta prompt 2 = \"tests\">").unwrap();
        let instructions = bundle.text.find("<user_instructions>").unwrap();
        assert!(map < contents && contents < prompt1 && prompt1 < prompt2);
        assert!(prompt2 < instructions);
        assert!(bundle.text.contains("```rust\nfn a() {}\n```"));
    }

    #[tokio::test]
    async fn identical_inputs_produce_identical_bundles() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.txt"), "hello").unwrap();
        let mut w = txt_workspace();
        w.add_path_directory(dir.path(), false).unwrap();
        select_all(&mut w, 0);

        let mut assembler = Assembler::new();
        let first = assembler.build(&w, &[], "note").await;
        let second = assembler.build(&w, &[], "note").await;
        assert_eq!(first, second);
        assert_eq!(first.token_estimate, approx_tokens(&first.text));
    }

    #[tokio::test]
    async fn disk_failure_yields_empty_block_and_failed_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), "kept").unwrap();
        fs::write(dir.path().join("gone.txt"), "soon gone").unwrap();
        let mut w = txt_workspace();
        w.add_path_directory(dir.path(), false).unwrap();
        select_all(&mut w, 0);
        let gone = dir.path().canonicalize().unwrap().join("gone.txt");

        // Warm the assembler so gone.txt sits in the content cache, then
        // make the next read fail. The cached copy must not leak into the
        // bundle alongside the failed entry.
        let mut assembler = Assembler::new();
        let warm = assembler.build(&w, &[], "").await;
        assert!(warm.failed.is_empty());
        assert!(warm.text.contains("soon gone"));
        fs::remove_file(&gone).unwrap();

        let bundle = assembler.build(&w, &[], "").await;
        assert_eq!(bundle.failed, vec![gone.clone()]);
        // The failed file still gets its (empty) block; the healthy one is
        // untouched.
        assert!(bundle.text.contains("kept"));
        assert!(!bundle.text.contains("soon gone"));
        assert!(bundle.text.contains(&format!("File: {}\n```\n\n```", gone.display())));
    }

    #[tokio::test]
    async fn empty_selection_yields_empty_bundle() {
        let w = txt_workspace();
        let bundle = Assembler::new().build(&w, &[], "").await;
        assert!(bundle.text.is_empty());
        assert!(bundle.failed.is_empty());
    }
}
