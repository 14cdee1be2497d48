use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use serde::Serialize;
use tracing::debug;

use crate::graph::DependencyGraph;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

const REPULSION: f32 = 2_000.0;
const SPRING: f32 = 0.02;
const SPRING_LENGTH: f32 = 60.0;
const COOLING: f32 = 0.95;

/// Runs the iterative spring embedder on its own worker thread and hands the
/// finished positions back over a channel. The layout is CPU-bound and would
/// otherwise stall interactive toggling; nothing is shared, results only
/// travel by message.
pub fn spawn_layout(
    graph: DependencyGraph,
    iterations: usize,
) -> mpsc::Receiver<HashMap<PathBuf, Position>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let positions = run_layout(&graph, iterations);
        // Receiver may be gone if the app quit; that is fine.
        let _ = tx.send(positions);
    });
    rx
}

/// Deterministic: nodes start on a fixed spiral keyed by sorted order, and
/// the force pass visits them in the same order every time.
fn run_layout(graph: &DependencyGraph, iterations: usize) -> HashMap<PathBuf, Position> {
    let mut nodes: BTreeSet<PathBuf> = BTreeSet::new();
    for (source, targets) in graph {
        nodes.insert(source.clone());
        nodes.extend(targets.iter().cloned());
    }
    let nodes: Vec<PathBuf> = nodes.into_iter().collect();
    let index: HashMap<&PathBuf, usize> = nodes.iter().enumerate().map(|(i, p)| (p, i)).collect();

    let mut pos: Vec<(f32, f32)> = (0..nodes.len())
        .map(|i| {
            let angle = i as f32 * 2.399_963; // golden angle
            let radius = 20.0 * ((i + 1) as f32).sqrt();
            (radius * angle.cos(), radius * angle.sin())
        })
        .collect();

    let mut edge_list: Vec<(usize, usize)> = Vec::new();
    for s in &nodes {
        if let Some(ts) = graph.get(s) {
            for t in ts {
                edge_list.push((index[s], index[t]));
            }
        }
    }

    let mut temperature = 1.0_f32;
    for _ in 0..iterations {
        let mut forces = vec![(0.0_f32, 0.0_f32); nodes.len()];
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let dx = pos[i].0 - pos[j].0;
                let dy = pos[i].1 - pos[j].1;
                let dist_sq = (dx * dx + dy * dy).max(0.01);
                let f = REPULSION / dist_sq;
                let dist = dist_sq.sqrt();
                forces[i].0 += f * dx / dist;
                forces[i].1 += f * dy / dist;
                forces[j].0 -= f * dx / dist;
                forces[j].1 -= f * dy / dist;
            }
        }
        for &(s, t) in &edge_list {
            let dx = pos[t].0 - pos[s].0;
            let dy = pos[t].1 - pos[s].1;
            let dist = (dx * dx + dy * dy).sqrt().max(0.1);
            let f = SPRING * (dist - SPRING_LENGTH);
            forces[s].0 += f * dx / dist;
            forces[s].1 += f * dy / dist;
            forces[t].0 -= f * dx / dist;
            forces[t].1 -= f * dy / dist;
        }
        for (p, f) in pos.iter_mut().zip(&forces) {
            p.0 += f.0 * temperature;
            p.1 += f.1 * temperature;
        }
        temperature *= COOLING;
    }

    debug!(nodes = nodes.len(), edges = edge_list.len(), "layout finished");
    nodes
        .into_iter()
        .zip(pos)
        .map(|(path, (x, y))| (path, Position { x, y }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn sample_graph() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.insert(p("a"), vec![p("b")]);
        g.insert(p("c"), vec![]);
        g
    }

    #[test]
    fn worker_delivers_positions_for_all_nodes() {
        let rx = spawn_layout(sample_graph(), 50);
        let positions = rx.recv().expect("worker sends one result");
        assert_eq!(positions.len(), 3);
        for pos in positions.values() {
            assert!(pos.x.is_finite() && pos.y.is_finite());
        }
    }

    #[test]
    fn connected_nodes_end_up_closer_than_disconnected() {
        let positions = run_layout(&sample_graph(), 300);
        let dist = |a: &str, b: &str| {
            let pa = positions[&p(a)];
            let pb = positions[&p(b)];
            ((pa.x - pb.x).powi(2) + (pa.y - pb.y).powi(2)).sqrt()
        };
        assert!(dist("a", "b") < dist("a", "c"));
    }

    #[test]
    fn layout_is_deterministic() {
        let first = run_layout(&sample_graph(), 100);
        let second = run_layout(&sample_graph(), 100);
        assert_eq!(first, second);
    }
}
