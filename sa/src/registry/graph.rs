//! Dependency graph validation and ordering

use std::collections::{HashMap, HashSet};

use tracing::debug;

/// Anything with an id and a list of dependency ids
pub trait DependencyNode {
    fn node_id(&self) -> &str;
    fn node_deps(&self) -> &[String];
}

/// Check that every dependency names a node in the graph
///
/// Returns the first `(node, missing_dependency)` pair found.
pub fn find_unknown_dependency<N: DependencyNode>(nodes: &[N]) -> Option<(String, String)> {
    debug!(node_count = nodes.len(), "find_unknown_dependency: called");
    let ids: HashSet<&str> = nodes.iter().map(|n| n.node_id()).collect();
    for node in nodes {
        for dep in node.node_deps() {
            if !ids.contains(dep.as_str()) {
                debug!(node = node.node_id(), %dep, "find_unknown_dependency: found");
                return Some((node.node_id().to_string(), dep.clone()));
            }
        }
    }
    None
}

/// Detect cycles
///
/// Returns the cycle path on failure; the first and last elements are the same id.
/// Nodes are visited in slice order so the reported cycle is stable.
pub fn validate_dependency_graph<N: DependencyNode>(nodes: &[N]) -> Result<(), Vec<String>> {
    debug!(node_count = nodes.len(), "validate_dependency_graph: called");
    let node_map: HashMap<&str, &N> = nodes.iter().map(|n| (n.node_id(), n)).collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut cycle_path = Vec::new();

    for node in nodes {
        let id = node.node_id();
        if !visited.contains(id) && has_cycle_dfs(id, &node_map, &mut visited, &mut rec_stack, &mut cycle_path) {
            debug!(?cycle_path, "validate_dependency_graph: cycle detected");
            return Err(cycle_path);
        }
    }

    debug!("validate_dependency_graph: no cycles found");
    Ok(())
}

fn has_cycle_dfs<'a, N: DependencyNode>(
    node: &'a str,
    graph: &HashMap<&'a str, &'a N>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    cycle_path: &mut Vec<String>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    cycle_path.push(node.to_string());

    if let Some(record) = graph.get(node) {
        for dep_id in record.node_deps() {
            if !visited.contains(dep_id.as_str()) {
                if let Some((&dep_key, _)) = graph.get_key_value(dep_id.as_str())
                    && has_cycle_dfs(dep_key, graph, visited, rec_stack, cycle_path)
                {
                    return true;
                }
            } else if rec_stack.contains(dep_id.as_str()) {
                debug!(%node, %dep_id, "has_cycle_dfs: back edge found - cycle detected");
                // Trim the path to start at the repeated node
                if let Some(pos) = cycle_path.iter().position(|p| p == dep_id) {
                    cycle_path.drain(..pos);
                }
                cycle_path.push(dep_id.clone());
                return true;
            }
        }
    }

    rec_stack.remove(node);
    cycle_path.pop();
    false
}

/// Topologically sort nodes by dependencies
///
/// Returns indices into `nodes`, dependencies first. Ties are broken by slice
/// order, so the same input always yields the same order.
pub fn topological_sort<N: DependencyNode>(nodes: &[N]) -> Result<Vec<usize>, Vec<String>> {
    debug!(node_count = nodes.len(), "topological_sort: called");
    validate_dependency_graph(nodes)?;

    let index_map: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (n.node_id(), i)).collect();

    let mut visited = HashSet::new();
    let mut result = Vec::with_capacity(nodes.len());

    for idx in 0..nodes.len() {
        topo_dfs_idx(idx, nodes, &index_map, &mut visited, &mut result);
    }

    debug!(result_len = result.len(), "topological_sort: complete");
    Ok(result)
}

fn topo_dfs_idx<N: DependencyNode>(
    idx: usize,
    nodes: &[N],
    index_map: &HashMap<&str, usize>,
    visited: &mut HashSet<usize>,
    result: &mut Vec<usize>,
) {
    if !visited.insert(idx) {
        return;
    }

    for dep_id in nodes[idx].node_deps() {
        if let Some(&dep_idx) = index_map.get(dep_id.as_str()) {
            topo_dfs_idx(dep_idx, nodes, index_map, visited, result);
        }
    }

    result.push(idx);
}
