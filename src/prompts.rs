use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::persist::{PROMPTS_KEY, StateStore};

/// A reusable snippet that can be appended to the bundle, wrapped with an
/// ordinal tag in selection order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prompt {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct PromptLibrary {
    prompts: Vec<Prompt>,
}

impl PromptLibrary {
    pub fn load(store: &StateStore) -> Self {
        PromptLibrary {
            prompts: store.get::<Vec<Prompt>>(PROMPTS_KEY).unwrap_or_default(),
        }
    }

    pub fn save(&self, store: &mut StateStore) {
        store.set(PROMPTS_KEY, &self.prompts);
    }

    /// Insert or overwrite by name.
    pub fn upsert(&mut self, name: &str, text: String) {
        match self.prompts.iter_mut().find(|p| p.name == name) {
            Some(p) => p.text = text,
            None => self.prompts.push(Prompt {
                name: name.to_string(),
                text,
            }),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.prompts.len();
        self.prompts.retain(|p| p.name != name);
        self.prompts.len() != before
    }

    pub fn get(&self, name: &str) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.name == name)
    }

    pub fn all(&self) -> &[Prompt] {
        &self.prompts
    }

    /// Resolves names in the given order, which fixes the ordinal tags in
    /// the bundle. Unknown names are dropped with a warning.
    pub fn select<'a>(&'a self, names: &[String]) -> Vec<&'a Prompt> {
        names
            .iter()
            .filter_map(|n| {
                let found = self.get(n);
                if found.is_none() {
                    warn!(name = %n, "unknown prompt, skipping");
                }
                found
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_overwrites_by_name() {
        let mut lib = PromptLibrary::default();
        lib.upsert("review", "v1".into());
        lib.upsert("review", "v2".into());
        assert_eq!(lib.all().len(), 1);
        assert_eq!(lib.get("review").unwrap().text, "v2");
    }

    #[test]
    fn selection_preserves_order_and_skips_unknown() {
        let mut lib = PromptLibrary::default();
        lib.upsert("a", "A".into());
        lib.upsert("b", "B".into());
        let picked = lib.select(&["b".into(), "missing".into(), "a".into()]);
        let names: Vec<_> = picked.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn persists_through_state_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::load(dir.path().join("s.json"));
        let mut lib = PromptLibrary::default();
        lib.upsert("x", "body".into());
        lib.save(&mut store);
        let again = PromptLibrary::load(&store);
        assert_eq!(again.get("x").unwrap().text, "body");
    }
}
