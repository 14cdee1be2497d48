use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use path_clean::PathClean;
use streaming_iterator::StreamingIterator;
use tracing::{debug, info, warn};
use tree_sitter::{Language, Parser, Query, QueryCursor};

use crate::graph::DependencyGraph;
use crate::tree::TreeModel;

/// Static analysis that produces the dependency graph consumed by the
/// cross-referencer. Runs per directory, usually on a background thread;
/// every failure degrades to "fewer edges", never to an error.
pub fn analyze_directory(root: &Path, tree: &TreeModel) -> DependencyGraph {
    let start = Instant::now();
    let files = tree.file_paths();
    let mut graph = DependencyGraph::new();

    for lang in language_specs() {
        analyze_language(root, &files, &lang, &mut graph);
    }
    analyze_python(root, &files, &mut graph);

    info!(
        root = %root.display(),
        files = graph.len(),
        elapsed = ?start.elapsed(),
        "dependency analysis finished"
    );
    graph
}

struct LangSpec {
    name: &'static str,
    language: Language,
    query: &'static str,
    extensions: &'static [&'static str],
    /// Candidate suffixes tried when resolving an import to a real file.
    suffixes: &'static [&'static str],
    /// Import text -> root-relative path fragment.
    rewrite: fn(&str) -> String,
}

fn language_specs() -> Vec<LangSpec> {
    vec![
        LangSpec {
            name: "javascript",
            language: tree_sitter_javascript::LANGUAGE.into(),
            query: r#"
(import_statement source: (string (string_fragment) @path))
(call_expression
  function: (identifier) @_fn
  arguments: (arguments (string (string_fragment) @path))
  (#eq? @_fn "require"))
"#,
            extensions: &["js", "jsx", "ts", "tsx"],
            suffixes: &[
                "", ".js", ".jsx", ".ts", ".tsx", "/index.js", "/index.jsx", "/index.ts",
                "/index.tsx",
            ],
            rewrite: |import| import.trim_matches(['"', '\'']).to_string(),
        },
        LangSpec {
            name: "rust",
            language: tree_sitter_rust::LANGUAGE.into(),
            query: r#"
(mod_item name: (identifier) @path)
(use_declaration argument: [ (identifier) @path (scoped_identifier) @path ])
"#,
            extensions: &["rs"],
            suffixes: &[".rs", "/mod.rs"],
            rewrite: |import| {
                let stripped = if let Some(rest) = import.strip_prefix("self::") {
                    rest.to_string()
                } else if let Some(rest) = import.strip_prefix("super::") {
                    format!("../{rest}")
                } else {
                    import.to_string()
                };
                stripped.replace("::", "/")
            },
        },
        // Quoted includes only; <...> system headers never resolve inside
        // the root anyway.
        LangSpec {
            name: "cpp",
            language: tree_sitter_cpp::LANGUAGE.into(),
            query: r#"(preproc_include path: (string_literal (string_content) @path))"#,
            extensions: &["c", "h", "cpp", "cc", "hpp", "hxx"],
            suffixes: &["", ".h", ".hpp", ".hxx"],
            rewrite: |import| import.trim_matches('"').to_string(),
        },
    ]
}

/// Tries each candidate suffix; the resolved path must land inside the root.
fn resolve_relative(
    parent_dir: &Path,
    fragment: &str,
    root: &Path,
    suffixes: &[&str],
) -> Option<PathBuf> {
    for suffix in suffixes {
        let candidate = parent_dir.join(format!("{fragment}{suffix}")).clean();
        if candidate.is_file() && candidate.starts_with(root) {
            return Some(candidate);
        }
    }
    None
}

fn compile(language: &Language, query_src: &str, name: &str) -> Option<(Parser, Query)> {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(language) {
        warn!(language = name, error = %e, "grammar unavailable, skipping language");
        return None;
    }
    match Query::new(language, query_src) {
        Ok(q) => Some((parser, q)),
        Err(e) => {
            warn!(language = name, error = %e, "query failed to compile, skipping language");
            None
        }
    }
}

fn analyze_language(root: &Path, files: &[PathBuf], lang: &LangSpec, graph: &mut DependencyGraph) {
    let Some((mut parser, query)) = compile(&lang.language, lang.query, lang.name) else {
        return;
    };
    let candidates: Vec<_> = files
        .iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| lang.extensions.contains(&e))
        })
        .collect();
    debug!(language = lang.name, files = candidates.len(), "scanning for imports");

    for file in candidates {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let Some(parsed) = parser.parse(content.as_bytes(), None) else {
            continue;
        };
        let parent = file.parent().unwrap_or(root);

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.root_node(), content.as_bytes());
        let mut deps = Vec::new();
        while let Some(mat) = matches.next() {
            for cap in mat.captures {
                if query.capture_names()[cap.index as usize] != "path" {
                    continue;
                }
                let fragment = (lang.rewrite)(&content[cap.node.byte_range()]);
                if let Some(resolved) = resolve_relative(parent, &fragment, root, lang.suffixes) {
                    deps.push(resolved);
                }
            }
        }
        if !deps.is_empty() {
            graph.entry(file.clone()).or_default().extend(deps);
        }
    }
}

/// Python needs its own pass: relative imports encode depth in leading dots,
/// and `from . import x` splits the module across two captures.
fn analyze_python(root: &Path, files: &[PathBuf], graph: &mut DependencyGraph) {
    let language: Language = tree_sitter_python::LANGUAGE.into();
    let query_src = r#"
(import_statement (dotted_name) @module)
(import_from_statement
  module_name: [
    (dotted_name) @module
    (relative_import (dotted_name) . ) @module
  ]
)
(import_from_statement
  module_name: (relative_import) @dots
  name: [
    (dotted_name) @name
    (aliased_import name: (dotted_name) @name)
  ]
  (#match? @dots "^\.+$")
)
"#;
    let Some((mut parser, query)) = compile(&language, query_src, "python") else {
        return;
    };
    let py_files: Vec<_> = files
        .iter()
        .filter(|p| p.extension().is_some_and(|e| e == "py"))
        .collect();
    debug!(files = py_files.len(), "scanning python for imports");

    for file in py_files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let Some(parsed) = parser.parse(content.as_bytes(), None) else {
            continue;
        };
        let parent = file.parent().unwrap_or(root);
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.root_node(), content.as_bytes());
        let mut deps = Vec::new();
        while let Some(mat) = matches.next() {
            match mat.pattern_index {
                0 | 1 => {
                    for cap in mat.captures {
                        if query.capture_names()[cap.index as usize] == "module" {
                            let module = &content[cap.node.byte_range()];
                            if let Some(resolved) =
                                resolve_python_module(parent, module, root)
                            {
                                deps.push(resolved);
                            }
                        }
                    }
                }
                2 => {
                    let mut dots = None;
                    let mut names = Vec::new();
                    for cap in mat.captures {
                        let text = &content[cap.node.byte_range()];
                        match query.capture_names()[cap.index as usize] {
                            "dots" => dots = Some(text),
                            "name" => names.push(text),
                            _ => {}
                        }
                    }
                    if let Some(dots) = dots {
                        for name in names {
                            let module = format!("{dots}{name}");
                            if let Some(resolved) =
                                resolve_python_module(parent, &module, root)
                            {
                                deps.push(resolved);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        if !deps.is_empty() {
            graph.entry(file.clone()).or_default().extend(deps);
        }
    }

    expand_init_imports(graph);
}

fn resolve_python_module(parent: &Path, module: &str, root: &Path) -> Option<PathBuf> {
    let fragment = if module.starts_with('.') {
        let dots = module.find(|c| c != '.').unwrap_or(module.len());
        let ups = "../".repeat(dots.saturating_sub(1));
        format!("{ups}{}", module[dots..].replace('.', "/"))
    } else {
        module.replace('.', "/")
    };
    resolve_relative(parent, &fragment, root, &[".py", "/__init__.py"])
}

/// A dependency on an `__init__.py` implies everything that file imports,
/// transitively through further package inits.
fn expand_init_imports(graph: &mut DependencyGraph) {
    let original = graph.clone();
    for deps in graph.values_mut() {
        let inits: Vec<PathBuf> = deps.iter().filter(|d| is_init(d)).cloned().collect();
        if inits.is_empty() {
            continue;
        }
        let mut all: HashSet<PathBuf> = deps.iter().cloned().collect();
        let mut visited = HashSet::new();
        for init in inits {
            collect_transitive(&init, &original, &mut all, &mut visited);
        }
        let mut sorted: Vec<PathBuf> = all.into_iter().collect();
        sorted.sort();
        *deps = sorted;
    }
}

fn is_init(path: &Path) -> bool {
    path.file_name().is_some_and(|n| n == "__init__.py")
}

fn collect_transitive(
    init: &PathBuf,
    graph: &DependencyGraph,
    out: &mut HashSet<PathBuf>,
    visited: &mut HashSet<PathBuf>,
) {
    if !visited.insert(init.clone()) {
        return;
    }
    if let Some(deps) = graph.get(init) {
        for dep in deps {
            out.insert(dep.clone());
            if is_init(dep) {
                collect_transitive(dep, graph, out, visited);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan;
    use std::fs;

    #[test]
    fn resolves_rust_module_imports_within_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "mod helper;\nfn main() {}\n").unwrap();
        fs::write(dir.path().join("helper.rs"), "pub fn f() {}\n").unwrap();

        let tree = scan::load_tree(dir.path(), false).unwrap();
        let root = dir.path().canonicalize().unwrap();
        let graph = analyze_directory(&root, &tree);

        let deps = graph.get(&root.join("main.rs")).expect("main.rs has deps");
        assert_eq!(deps, &vec![root.join("helper.rs")]);
        // helper.rs imports nothing resolvable.
        assert!(!graph.contains_key(&root.join("helper.rs")));
    }

    #[test]
    fn resolves_python_relative_imports_and_init_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        fs::create_dir(&pkg).unwrap();
        fs::write(pkg.join("__init__.py"), "from . import util\n").unwrap();
        fs::write(pkg.join("util.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("app.py"), "import pkg\n").unwrap();

        let tree = scan::load_tree(dir.path(), false).unwrap();
        let root = dir.path().canonicalize().unwrap();
        let graph = analyze_directory(&root, &tree);

        let app_deps = graph.get(&root.join("app.py")).expect("app.py has deps");
        assert!(app_deps.contains(&pkg.canonicalize().unwrap().join("__init__.py")));
        // Init expansion pulls in util.py transitively.
        assert!(app_deps.contains(&pkg.canonicalize().unwrap().join("util.py")));
    }

    #[test]
    fn resolves_quoted_c_includes_but_not_system_headers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("main.c"),
            "#include <stdio.h>\n#include \"util.h\"\nint main(void) { return 0; }\n",
        )
        .unwrap();
        fs::write(dir.path().join("util.h"), "int util(void);\n").unwrap();

        let tree = scan::load_tree(dir.path(), false).unwrap();
        let root = dir.path().canonicalize().unwrap();
        let graph = analyze_directory(&root, &tree);

        let deps = graph.get(&root.join("main.c")).expect("main.c has deps");
        assert_eq!(deps, &vec![root.join("util.h")]);
    }

    #[test]
    fn imports_outside_the_root_are_ignored() {
        let outer = tempfile::tempdir().unwrap();
        let inner = outer.path().join("project");
        fs::create_dir(&inner).unwrap();
        fs::write(outer.path().join("secret.js"), "").unwrap();
        fs::write(
            inner.join("main.js"),
            "import x from '../secret.js';\n",
        )
        .unwrap();

        let tree = scan::load_tree(&inner, false).unwrap();
        let root = inner.canonicalize().unwrap();
        let graph = analyze_directory(&root, &tree);
        assert!(graph.is_empty());
    }
}
