pub mod community;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            graph_edge::{GraphEdge, RelationshipType},
            graph_node::GraphNode,
        },
    },
};

/// One directed entry in the bidirectional adjacency.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborEdge {
    pub target: String,
    pub relationship_type: RelationshipType,
    pub weight: f64,
    pub description: String,
}

pub type Adjacency = HashMap<String, Vec<NeighborEdge>>;

/// An edge kept in the snapshot in its persisted direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEdge {
    pub source: String,
    pub target: String,
    pub relationship_type: RelationshipType,
    pub weight: f64,
}

/// Build-local, in-memory view of the persisted graph. Derived and discarded
/// after each pipeline run; never shared across tasks.
#[derive(Debug, Default)]
pub struct GraphSnapshot {
    pub adjacency: Adjacency,
    pub edges: Vec<SnapshotEdge>,
}

impl GraphSnapshot {
    /// Initialize `adjacency[id] = []` for every node, then add both
    /// directions for each edge. Isolated nodes keep an empty neighbor list.
    pub fn from_parts(node_ids: &[String], edges: &[GraphEdge]) -> Self {
        let mut adjacency: Adjacency = node_ids
            .iter()
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        let mut snapshot_edges = Vec::with_capacity(edges.len());

        for edge in edges {
            adjacency
                .entry(edge.source.clone())
                .or_default()
                .push(NeighborEdge {
                    target: edge.target.clone(),
                    relationship_type: edge.relationship_type,
                    weight: edge.weight,
                    description: edge.description.clone(),
                });
            adjacency
                .entry(edge.target.clone())
                .or_default()
                .push(NeighborEdge {
                    target: edge.source.clone(),
                    relationship_type: edge.relationship_type,
                    weight: edge.weight,
                    description: edge.description.clone(),
                });
            snapshot_edges.push(SnapshotEdge {
                source: edge.source.clone(),
                target: edge.target.clone(),
                relationship_type: edge.relationship_type,
                weight: edge.weight,
            });
        }

        Self {
            adjacency,
            edges: snapshot_edges,
        }
    }

    pub async fn load(db: &Arc<SurrealDbClient>) -> Result<(Self, Vec<GraphNode>), AppError> {
        let nodes: Vec<GraphNode> = db.get_all_stored_items().await?;
        let edges: Vec<GraphEdge> = db.get_all_stored_items().await?;

        let node_ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        Ok((Self::from_parts(&node_ids, &edges), nodes))
    }

    /// BFS from `entity_id`, stopping after `hops` layers. Edges are included
    /// iff both endpoints were visited.
    pub fn neighborhood(&self, entity_id: &str, hops: usize) -> SubGraph {
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<(String, usize)> = VecDeque::new();

        if self.adjacency.contains_key(entity_id) {
            visited.insert(entity_id.to_string());
            frontier.push_back((entity_id.to_string(), 0));
        }

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= hops {
                continue;
            }
            if let Some(neighbors) = self.adjacency.get(&current) {
                for neighbor in neighbors {
                    if visited.insert(neighbor.target.clone()) {
                        frontier.push_back((neighbor.target.clone(), depth + 1));
                    }
                }
            }
        }

        let edges: Vec<SnapshotEdge> = self
            .edges
            .iter()
            .filter(|e| visited.contains(&e.source) && visited.contains(&e.target))
            .cloned()
            .collect();

        let mut nodes: Vec<String> = visited.into_iter().collect();
        nodes.sort();

        SubGraph { nodes, edges }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<SnapshotEdge>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VizGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Top nodes by mention count, plus only the edges whose endpoints are both
/// kept.
pub async fn visualization(limit: usize, db: &SurrealDbClient) -> Result<VizGraph, AppError> {
    let nodes = GraphNode::top_by_mentions(limit, db).await?;
    let kept: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    let all_edges: Vec<GraphEdge> = db.get_all_stored_items().await?;
    let edges = all_edges
        .into_iter()
        .filter(|e| kept.contains(e.source.as_str()) && kept.contains(e.target.as_str()))
        .collect();

    Ok(VizGraph { nodes, edges })
}
