//! Dependency ordering for flush (Kahn's algorithm).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Orders `nodes` so every dependency precedes its dependents.
///
/// `edges` are `(dependent, dependency)` pairs; edges touching unknown
/// nodes are ignored. On a cycle, returns the nodes that could not be
/// placed.
pub fn topological_order<T: Ord + Copy>(nodes: &[T], edges: &[(T, T)]) -> Result<Vec<T>, Vec<T>> {
    let known: BTreeSet<T> = nodes.iter().copied().collect();
    let mut pending: BTreeMap<T, usize> = known.iter().map(|n| (*n, 0)).collect();
    let mut dependents: BTreeMap<T, Vec<T>> = BTreeMap::new();

    let unique: BTreeSet<(T, T)> = edges
        .iter()
        .copied()
        .filter(|(a, b)| a != b && known.contains(a) && known.contains(b))
        .collect();
    for (dependent, dependency) in &unique {
        *pending.entry(*dependent).or_default() += 1;
        dependents.entry(*dependency).or_default().push(*dependent);
    }

    let mut ready: VecDeque<T> = nodes
        .iter()
        .copied()
        .filter(|n| pending.get(n) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(known.len());
    let mut placed = BTreeSet::new();

    while let Some(node) = ready.pop_front() {
        if !placed.insert(node) {
            continue;
        }
        order.push(node);
        for dependent in dependents.get(&node).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(*dependent);
                }
            }
        }
    }

    // Self-references are ignored above; a node depending on itself alone
    // still forms a cycle.
    let self_loops: BTreeSet<T> = edges
        .iter()
        .filter(|(a, b)| a == b && known.contains(a))
        .map(|(a, _)| *a)
        .collect();

    if order.len() < known.len() || !self_loops.is_empty() {
        let residual: Vec<T> = known
            .into_iter()
            .filter(|n| !placed.contains(n) || self_loops.contains(n))
            .collect();
        return Err(residual);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_orders_dependencies_first() {
        // a -> b -> c
        let order = topological_order(&['a', 'b', 'c'], &[('a', 'b'), ('b', 'c')]).unwrap();
        assert_eq!(order, vec!['c', 'b', 'a']);
    }

    #[test]
    fn cycle_reports_residual_nodes() {
        let residual =
            topological_order(&['a', 'b', 'c', 'd'], &[('a', 'b'), ('b', 'c'), ('c', 'a')])
                .unwrap_err();
        assert_eq!(residual, vec!['a', 'b', 'c']);
    }

    #[test]
    fn independent_nodes_keep_input_order() {
        let order = topological_order(&[3, 1, 2], &[]).unwrap();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        assert_eq!(topological_order(&[1], &[(1, 1)]), Err(vec![1]));
    }
}
