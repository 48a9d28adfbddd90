//! Graph sorting: run this before executing a workflow.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every connection must reference valid node IDs (both ends).
//! 3. The directed graph must be acyclic (topological sort must succeed).
//!
//! Nodes without any ordering constraint between them keep their creation
//! order, so sorting the same workflow twice always yields the same sequence.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use crate::models::{Connection, Node, Workflow};
use crate::WorkflowValidationError;

/// Order `nodes` so that every connection's source precedes its target.
///
/// Duplicate connections are ignored. A connection from a node to itself
/// is a cycle.
///
/// # Errors
/// - [`WorkflowValidationError::DuplicateNodeId`] if two nodes share an ID.
/// - [`WorkflowValidationError::UnknownNodeReference`] if a connection references a missing node.
/// - [`WorkflowValidationError::CycleDetected`] if the graph is not acyclic.
pub fn sort_nodes<'a>(
    nodes: &'a [Node],
    connections: &[Connection],
) -> Result<Vec<&'a Node>, WorkflowValidationError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(WorkflowValidationError::DuplicateNodeId(node.id.clone()));
        }
    }

    let endpoint = |id: &str, side: &'static str| {
        index
            .get(id)
            .copied()
            .ok_or_else(|| WorkflowValidationError::UnknownNodeReference {
                node_id: id.to_owned(),
                side,
            })
    };

    let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
    for connection in connections {
        let from = endpoint(&connection.from_node_id, "from")?;
        let to = endpoint(&connection.to_node_id, "to")?;
        edges.insert((from, to));
    }

    if edges.is_empty() {
        return Ok(nodes.iter().collect());
    }

    // Kahn's algorithm; the ready set is a min-heap on creation index.
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];
    for &(from, to) in &edges {
        adjacency[from].push(to);
        in_degree[to] += 1;
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut sorted: Vec<&Node> = Vec::with_capacity(nodes.len());
    while let Some(Reverse(i)) = ready.pop() {
        sorted.push(&nodes[i]);
        for &next in &adjacency[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != nodes.len() {
        return Err(WorkflowValidationError::CycleDetected);
    }

    Ok(sorted)
}

/// Validate the workflow's graph and return node IDs in execution order.
pub fn validate_dag(workflow: &Workflow) -> Result<Vec<String>, WorkflowValidationError> {
    let sorted = sort_nodes(&workflow.nodes, &workflow.connections)?;
    Ok(sorted.into_iter().map(|n| n.id.clone()).collect())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use nodes::NodeType;
    use serde_json::Value;

    fn make_node(id: &str) -> Node {
        Node::new(id, NodeType::HttpRequest, Value::Null)
    }

    fn make_workflow(ids: &[&str], edges: &[(&str, &str)]) -> Workflow {
        Workflow::new(
            "user-1",
            "test",
            ids.iter().map(|id| make_node(id)).collect(),
            edges.iter().map(|(f, t)| Connection::new(*f, *t)).collect(),
        )
    }

    fn position(sorted: &[String], id: &str) -> usize {
        sorted.iter().position(|s| s == id).unwrap()
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        // C → B → A declared in reverse creation order.
        let workflow = make_workflow(&["a", "b", "c"], &[("c", "b"), ("b", "a")]);
        assert_eq!(validate_dag(&workflow).unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn valid_diamond_dag() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let workflow = make_workflow(
            &["d", "c", "b", "a"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );

        let sorted = validate_dag(&workflow).unwrap();
        assert_eq!(sorted, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn every_connection_is_respected() {
        let edges = [("e", "a"), ("b", "a"), ("d", "c"), ("a", "c"), ("f", "e")];
        let workflow = make_workflow(&["a", "b", "c", "d", "e", "f", "g"], &edges);
        let sorted = validate_dag(&workflow).unwrap();

        assert_eq!(sorted.len(), 7);
        for (from, to) in edges {
            assert!(position(&sorted, from) < position(&sorted, to), "{from} → {to}");
        }
    }

    #[test]
    fn isolated_nodes_appear_exactly_once() {
        let workflow = make_workflow(&["solo", "a", "b"], &[("a", "b")]);
        let sorted = validate_dag(&workflow).unwrap();
        assert_eq!(sorted.iter().filter(|id| *id == "solo").count(), 1);
        assert_eq!(sorted, vec!["solo", "a", "b"]);
    }

    #[test]
    fn no_connections_keeps_creation_order() {
        let workflow = make_workflow(&["z", "y", "x"], &[]);
        assert_eq!(validate_dag(&workflow).unwrap(), vec!["z", "y", "x"]);
    }

    #[test]
    fn sorting_is_stable_across_runs() {
        let workflow = make_workflow(&["p", "q", "r", "s"], &[("s", "r")]);
        let first = validate_dag(&workflow).unwrap();
        for _ in 0..10 {
            assert_eq!(validate_dag(&workflow).unwrap(), first);
        }
        assert_eq!(first, vec!["p", "q", "s", "r"]);
    }

    #[test]
    fn duplicate_connections_are_tolerated() {
        let workflow = make_workflow(&["a", "b"], &[("a", "b"), ("a", "b")]);
        assert_eq!(validate_dag(&workflow).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let workflow = make_workflow(&["a", "a"], &[]);
        assert_eq!(
            validate_dag(&workflow),
            Err(WorkflowValidationError::DuplicateNodeId("a".into()))
        );
    }

    #[test]
    fn connection_referencing_missing_node_is_rejected() {
        let workflow = make_workflow(&["a"], &[("a", "ghost")]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(WorkflowValidationError::UnknownNodeReference { node_id, side: "to" }) if node_id == "ghost"
        ));
    }

    #[test]
    fn cycle_is_detected() {
        let workflow = make_workflow(&["a", "b", "c"], &[("a", "b"), ("b", "a"), ("b", "c")]);
        assert_eq!(validate_dag(&workflow), Err(WorkflowValidationError::CycleDetected));
    }

    #[test]
    fn self_connection_is_a_cycle() {
        let workflow = make_workflow(&["a", "b"], &[("a", "a")]);
        assert_eq!(validate_dag(&workflow), Err(WorkflowValidationError::CycleDetected));
    }
}
