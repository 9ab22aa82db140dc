use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chatbus_store::UserId;
use tokio::sync::RwLock;

/// Symmetric contact adjacency.
///
/// Both directions of an edge are written under one write-lock acquisition,
/// so readers see either both or neither.  A node whose set empties is
/// removed entirely.
#[derive(Debug, Default)]
pub struct ContactGraph {
    adjacency: RwLock<HashMap<UserId, HashSet<UserId>>>,
}

impl ContactGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the `a`/`b` edge.  Idempotent.
    pub async fn link(&self, a: UserId, b: UserId) {
        let mut adjacency = self.adjacency.write().await;
        adjacency.entry(a).or_default().insert(b);
        adjacency.entry(b).or_default().insert(a);
    }

    /// Remove the `a`/`b` edge.  Returns `true` if it existed.
    pub async fn unlink(&self, a: UserId, b: UserId) -> bool {
        let mut adjacency = self.adjacency.write().await;
        let removed = detach(&mut adjacency, a, b);
        detach(&mut adjacency, b, a);
        removed
    }

    /// Remove every edge touching `a`, returning its former neighbours.
    pub async fn remove_node(&self, a: UserId) -> BTreeSet<UserId> {
        let mut adjacency = self.adjacency.write().await;
        let neighbors = adjacency.remove(&a).unwrap_or_default();
        for &other in &neighbors {
            detach(&mut adjacency, other, a);
        }
        neighbors.into_iter().collect()
    }

    pub async fn neighbors(&self, a: UserId) -> BTreeSet<UserId> {
        self.adjacency
            .read()
            .await
            .get(&a)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Ordered copy of the whole graph.
    pub async fn snapshot(&self) -> BTreeMap<UserId, BTreeSet<UserId>> {
        self.adjacency
            .read()
            .await
            .iter()
            .map(|(id, set)| (*id, set.iter().copied().collect()))
            .collect()
    }
}

fn detach(adjacency: &mut HashMap<UserId, HashSet<UserId>>, from: UserId, to: UserId) -> bool {
    let Some(set) = adjacency.get_mut(&from) else {
        return false;
    };
    let removed = set.remove(&to);
    if set.is_empty() {
        adjacency.remove(&from);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn link_is_symmetric_and_idempotent() {
        let graph = ContactGraph::new();
        graph.link(1, 2).await;
        graph.link(2, 1).await;
        graph.link(1, 2).await;

        assert_eq!(graph.neighbors(1).await, BTreeSet::from([2]));
        assert_eq!(graph.neighbors(2).await, BTreeSet::from([1]));
    }

    #[tokio::test]
    async fn unlinked_node_looks_never_linked() {
        let graph = ContactGraph::new();
        graph.link(1, 2).await;
        graph.link(1, 3).await;

        assert!(graph.unlink(2, 1).await);
        assert_eq!(graph.neighbors(1).await, BTreeSet::from([3]));
        assert!(graph.neighbors(2).await.is_empty());
        assert!(!graph.snapshot().await.contains_key(&2));

        assert!(graph.unlink(1, 3).await);
        assert!(graph.snapshot().await.is_empty());

        // Unlinking a missing edge is not an error.
        assert!(!graph.unlink(1, 3).await);
        assert!(!graph.unlink(7, 8).await);
    }

    #[tokio::test]
    async fn remove_node_detaches_every_neighbor() {
        let graph = ContactGraph::new();
        graph.link(1, 2).await;
        graph.link(1, 3).await;
        graph.link(2, 3).await;

        assert_eq!(graph.remove_node(1).await, BTreeSet::from([2, 3]));
        assert_eq!(
            graph.snapshot().await,
            BTreeMap::from([(2, BTreeSet::from([3])), (3, BTreeSet::from([2]))])
        );
    }
}
