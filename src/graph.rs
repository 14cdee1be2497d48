use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

/// File -> files it references. Supplied by static analysis (or nothing at
/// all); the selection engine treats it as opaque data.
pub type DependencyGraph = HashMap<PathBuf, Vec<PathBuf>>;

/// Files referenced by the current selection but not themselves selected,
/// mapped to the selected files that reference them. Purely advisory: entries
/// are highlighted, never auto-selected, and a file that enters the selection
/// drops out of the result on the next recompute.
///
/// Cost is the sum of out-degrees over the selection; the rest of the graph
/// is never visited.
pub fn cross_reference(
    selected: &BTreeSet<PathBuf>,
    graph: &DependencyGraph,
) -> BTreeMap<PathBuf, BTreeSet<PathBuf>> {
    let mut implied: BTreeMap<PathBuf, BTreeSet<PathBuf>> = BTreeMap::new();
    for source in selected {
        let Some(targets) = graph.get(source) else {
            continue;
        };
        for target in targets {
            if selected.contains(target) {
                continue;
            }
            implied
                .entry(target.clone())
                .or_default()
                .insert(source.clone());
        }
    }
    implied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn scenario_c_implied_file_with_importer() {
        let mut graph = DependencyGraph::new();
        graph.insert(p("d.txt"), vec![p("e.txt")]);

        let selected: BTreeSet<_> = [p("d.txt")].into();
        let implied = cross_reference(&selected, &graph);
        assert_eq!(implied.len(), 1);
        assert_eq!(implied[&p("e.txt")], [p("d.txt")].into());

        // Selecting e.txt removes it on the next recompute, even though
        // d.txt still imports it.
        let selected: BTreeSet<_> = [p("d.txt"), p("e.txt")].into();
        let implied = cross_reference(&selected, &graph);
        assert!(implied.is_empty());
    }

    #[test]
    fn result_is_disjoint_from_selection() {
        let mut graph = DependencyGraph::new();
        graph.insert(p("a"), vec![p("b"), p("c")]);
        graph.insert(p("b"), vec![p("c"), p("d")]);
        graph.insert(p("x"), vec![p("a")]);

        let selected: BTreeSet<_> = [p("a"), p("b")].into();
        let implied = cross_reference(&selected, &graph);
        for key in implied.keys() {
            assert!(!selected.contains(key));
        }
        // c is imported by both selected files.
        assert_eq!(implied[&p("c")], [p("a"), p("b")].into());
        assert_eq!(implied[&p("d")], [p("b")].into());
        // x imports a but is not selected, so it contributes nothing.
        assert!(!implied.contains_key(&p("a")));
    }

    #[test]
    fn empty_graph_yields_nothing() {
        let selected: BTreeSet<_> = [p("a")].into();
        assert!(cross_reference(&selected, &DependencyGraph::new()).is_empty());
    }
}
