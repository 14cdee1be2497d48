use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::warn;

/// Decides which files participate in selection at all. Patterns are either
/// suffix literals (".rs", "Cargo.lock") or globs with wildcards
/// ("Makefile*", "*.lock"); matching is case-insensitive and applies to the
/// file name only, never the full path. Files that match nothing are excluded
/// from every tri-state count.
#[derive(Debug)]
pub struct Whitelist {
    patterns: Vec<String>,
    set: GlobSet,
}

impl Whitelist {
    pub fn new(patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pat in patterns {
            // A bare suffix literal becomes "*<suffix>"; anything already
            // carrying a wildcard is used as-is.
            let glob_str = if pat.contains('*') {
                pat.clone()
            } else {
                format!("*{pat}")
            };
            match GlobBuilder::new(&glob_str).case_insensitive(true).build() {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!(pattern = %pat, error = %e, "skipping whitelist pattern"),
            }
        }
        let set = builder.build().unwrap_or_else(|e| {
            warn!(error = %e, "whitelist failed to compile, nothing will be selectable");
            GlobSet::empty()
        });
        Whitelist {
            patterns: patterns.to_vec(),
            set,
        }
    }

    pub fn default_patterns() -> Vec<String> {
        [
            ".rs", ".py", ".js", ".jsx", ".ts", ".tsx", ".c", ".h", ".cpp", ".hpp", ".go",
            ".java", ".rb", ".sh", ".md", ".txt", ".toml", ".json", ".yaml", ".yml", ".html",
            ".css", ".sql", "Makefile*", "Dockerfile*",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// `name` is a bare file name, not a path.
    pub fn is_selectable(&self, name: &str) -> bool {
        self.set.is_match(name)
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Whitelist::new(&Self::default_patterns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wl(patterns: &[&str]) -> Whitelist {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        Whitelist::new(&owned)
    }

    #[test]
    fn suffix_literal_matches_ending() {
        let w = wl(&[".txt"]);
        assert!(w.is_selectable("notes.txt"));
        assert!(w.is_selectable("a.b.txt"));
        assert!(!w.is_selectable("notes.bin"));
        assert!(!w.is_selectable("txt"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let w = wl(&[".RS", "makefile*"]);
        assert!(w.is_selectable("main.rs"));
        assert!(w.is_selectable("Makefile"));
        assert!(w.is_selectable("Makefile.am"));
    }

    #[test]
    fn wildcard_patterns_used_verbatim() {
        let w = wl(&["*.lock"]);
        assert!(w.is_selectable("Cargo.lock"));
        assert!(!w.is_selectable("lockfile"));
    }

    #[test]
    fn invalid_pattern_is_skipped_not_fatal() {
        let w = wl(&["[", ".rs"]);
        assert!(w.is_selectable("main.rs"));
    }
}
