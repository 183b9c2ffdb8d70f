use std::collections::{HashMap, HashSet};

use super::TransactionID;

/// Directed graph "A waits for B"; a cycle means deadlock.
pub(crate) struct WaitForGraph {
    graph: HashMap<TransactionID, HashSet<TransactionID>>,
}

impl WaitForGraph {
    pub(crate) fn new() -> Self {
        Self {
            graph: HashMap::new(),
        }
    }

    pub(crate) fn add_edge(&mut self, from: TransactionID, to: TransactionID) {
        if from == to {
            return;
        }
        self.graph
            .entry(from)
            .or_insert_with(HashSet::new)
            .insert(to);
    }

    /// Drop all outgoing edges of `tid` (it is no longer waiting).
    pub(crate) fn remove_waiter(&mut self, tid: TransactionID) {
        self.graph.remove(&tid);
    }

    /// Drop `tid` entirely: its outgoing edges and every edge pointing at
    /// it (it no longer holds anything worth waiting for).
    pub(crate) fn remove_transaction(&mut self, tid: TransactionID) {
        self.graph.remove(&tid);
        for waiters in self.graph.values_mut() {
            waiters.remove(&tid);
        }
    }

    /// Search for a cycle through `start`: is `start` reachable from one
    /// of the transactions it waits for? Returns the cycle path for
    /// diagnostics.
    pub(crate) fn find_cycle_from(&self, start: TransactionID) -> Option<Vec<TransactionID>> {
        let mut path = vec![start];
        let mut visited = HashSet::new();
        if self.dfs(start, start, &mut visited, &mut path) {
            return Some(path);
        }
        None
    }

    fn dfs(
        &self,
        current: TransactionID,
        target: TransactionID,
        visited: &mut HashSet<TransactionID>,
        path: &mut Vec<TransactionID>,
    ) -> bool {
        if !visited.insert(current) {
            return false;
        }

        if let Some(nexts) = self.graph.get(&current) {
            for &next in nexts {
                if next == target {
                    path.push(next);
                    return true;
                }
                path.push(next);
                if self.dfs(next, target, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }
}
