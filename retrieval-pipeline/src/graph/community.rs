use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::thread_rng;

use super::Adjacency;

/// Maximum local-move passes before detection gives up on convergence.
const MAX_PASSES: usize = 20;
/// Modularity resolution parameter.
const RESOLUTION: f64 = 1.0;

/// Modularity-optimizing greedy local moves over the bidirectional adjacency.
/// Returns a dense `entity id -> community id` assignment, renumbered from 0
/// by first-seen order. Node order is shuffled each pass for convergence; the
/// partition is stable modulo renumbering.
pub fn detect_communities(adjacency: &Adjacency) -> HashMap<String, i64> {
    let mut node_ids: Vec<&String> = adjacency.keys().collect();
    node_ids.sort();

    let index_of: HashMap<&str, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let n = node_ids.len();

    if n == 0 {
        return HashMap::new();
    }

    // Each node starts in its own community.
    let mut community: Vec<usize> = (0..n).collect();

    let degree: Vec<f64> = node_ids
        .iter()
        .map(|id| adjacency[*id].iter().map(|e| e.weight).sum())
        .collect();

    let total_weight: f64 = degree.iter().sum();
    let mut m = total_weight / 2.0;
    if m == 0.0 {
        m = 1.0;
    }

    let mut community_degree: Vec<f64> = degree.clone();

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = thread_rng();

    for _pass in 0..MAX_PASSES {
        order.shuffle(&mut rng);
        let mut moves = 0usize;

        for &v in &order {
            let current = community[v];

            // Aggregate edge weight from v into each neighbor community.
            let mut neighbor_weights: HashMap<usize, f64> = HashMap::new();
            for edge in &adjacency[node_ids[v]] {
                if let Some(&u) = index_of.get(edge.target.as_str()) {
                    *neighbor_weights.entry(community[u]).or_insert(0.0) += edge.weight;
                }
            }

            let mut best_community = current;
            let mut best_gain = 0.0;

            for (&candidate, &k_v_c) in &neighbor_weights {
                if candidate == current {
                    continue;
                }
                let gain = k_v_c / m
                    - RESOLUTION * degree[v] * community_degree[candidate] / (2.0 * m * m);
                if gain > best_gain {
                    best_gain = gain;
                    best_community = candidate;
                }
            }

            if best_community != current {
                community_degree[current] -= degree[v];
                community_degree[best_community] += degree[v];
                community[v] = best_community;
                moves += 1;
            }
        }

        if moves == 0 {
            break;
        }
    }

    // Renumber densely from 0 by first-seen order.
    let mut renumbered: HashMap<usize, i64> = HashMap::new();
    let mut assignment = HashMap::with_capacity(n);
    for (v, id) in node_ids.iter().enumerate() {
        let next = renumbered.len() as i64;
        let label = *renumbered.entry(community[v]).or_insert(next);
        assignment.insert((*id).clone(), label);
    }

    assignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphSnapshot;
    use common::storage::types::graph_edge::{GraphEdge, RelationshipType};

    fn edge(source: &str, target: &str) -> GraphEdge {
        GraphEdge::new(
            source.into(),
            target.into(),
            RelationshipType::SimilarA,
            "d".into(),
            1.0,
        )
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn assert_dense(assignment: &HashMap<String, i64>) {
        let max = assignment.values().copied().max().unwrap_or(-1);
        for label in 0..=max {
            assert!(
                assignment.values().any(|&l| l == label),
                "community ids must be dense, missing {label}"
            );
        }
        assert!(assignment.values().all(|&l| l >= 0));
    }

    #[test]
    fn two_pairs_form_two_communities() {
        // {a<->b, c<->d} as two directed edges each, mirroring ingested data.
        let snapshot = GraphSnapshot::from_parts(
            &ids(&["a", "b", "c", "d"]),
            &[edge("a", "b"), edge("b", "a"), edge("c", "d"), edge("d", "c")],
        );

        let assignment = detect_communities(&snapshot.adjacency);
        assert_eq!(assignment.len(), 4);
        assert_dense(&assignment);

        assert_eq!(assignment["a"], assignment["b"]);
        assert_eq!(assignment["c"], assignment["d"]);
        assert_ne!(assignment["a"], assignment["c"]);

        let distinct: std::collections::HashSet<i64> = assignment.values().copied().collect();
        assert_eq!(distinct.len(), 2);
    }

    #[test]
    fn empty_graph_yields_singleton_communities() {
        // m = 0: no move can have positive gain, every node stays alone.
        let snapshot = GraphSnapshot::from_parts(&ids(&["a", "b", "c"]), &[]);
        let assignment = detect_communities(&snapshot.adjacency);

        assert_eq!(assignment.len(), 3);
        assert_dense(&assignment);
        let distinct: std::collections::HashSet<i64> = assignment.values().copied().collect();
        assert_eq!(distinct.len(), 3, "every node must be a singleton");
    }

    #[test]
    fn no_nodes_yields_empty_assignment() {
        let snapshot = GraphSnapshot::from_parts(&[], &[]);
        assert!(detect_communities(&snapshot.adjacency).is_empty());
    }

    #[test]
    fn triangle_plus_isolated_node() {
        let snapshot = GraphSnapshot::from_parts(
            &ids(&["a", "b", "c", "solto"]),
            &[edge("a", "b"), edge("b", "c"), edge("c", "a")],
        );

        let assignment = detect_communities(&snapshot.adjacency);
        assert_dense(&assignment);
        assert_eq!(assignment["a"], assignment["b"]);
        assert_eq!(assignment["b"], assignment["c"]);
        assert_ne!(assignment["a"], assignment["solto"]);
    }

    #[test]
    fn assignment_is_stable_modulo_renumbering() {
        let snapshot = GraphSnapshot::from_parts(
            &ids(&["a", "b", "c", "d", "e", "f"]),
            &[
                edge("a", "b"),
                edge("b", "c"),
                edge("c", "a"),
                edge("d", "e"),
                edge("e", "f"),
                edge("f", "d"),
            ],
        );

        // Shuffled passes must still converge to the same partition.
        for _ in 0..5 {
            let assignment = detect_communities(&snapshot.adjacency);
            assert_eq!(assignment["a"], assignment["b"]);
            assert_eq!(assignment["a"], assignment["c"]);
            assert_eq!(assignment["d"], assignment["e"]);
            assert_eq!(assignment["d"], assignment["f"]);
            assert_ne!(assignment["a"], assignment["d"]);
        }
    }
}
