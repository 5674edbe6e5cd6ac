//! Join Path Resolution
//!
//! Given the tables a query touches, walk each one up to its root and keep
//! the edges crossed on the way. Edges are keyed by child node, so ancestors
//! shared by several requested tables are joined once. Because node keys are
//! assigned in pre-order, ordering the collected edges by child key puts
//! every parent's join before its children's.

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::{JoinCondition, JoinKind, SchemaGraph};
use crate::error::{Result, SchemaError};

/// One join to apply: `child` onto the accumulated FROM clause
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JoinStep {
    pub parent: String,
    pub child: String,
    pub condition: JoinCondition,
    pub kind: JoinKind,
}

/// Ordered, deduplicated joins connecting a set of tables to their root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinPlan {
    pub root: String,
    pub steps: Vec<JoinStep>,
}

impl JoinPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Every table in the FROM clause, root first
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.root.as_str()).chain(self.steps.iter().map(|s| s.child.as_str()))
    }

    /// `(parent, child)` pairs in join order
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.steps
            .iter()
            .map(|s| (s.parent.as_str(), s.child.as_str()))
            .collect()
    }
}

impl SchemaGraph {
    /// Compute the joins needed to reach every named table
    ///
    /// The result does not depend on the order of `names` or on repeats.
    /// Requesting only the root yields an empty plan; an empty request is
    /// rooted at the first declared root.
    pub fn resolve<I, S>(&self, names: I) -> Result<JoinPlan>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut targets = BTreeSet::new();
        for name in names {
            targets.insert(self.lookup(name.as_ref())?);
        }

        let (root, edges) = self.resolve_indices(&targets)?;

        let steps = edges
            .into_iter()
            .map(|edge| {
                let edge = &self.graph[edge];
                JoinStep {
                    parent: self.graph[edge.parent.node_index()].name().to_string(),
                    child: self.graph[edge.child.node_index()].name().to_string(),
                    condition: edge.join.condition.clone(),
                    kind: edge.join.kind,
                }
            })
            .collect::<Vec<_>>();

        let plan = JoinPlan {
            root: self.graph[root].name().to_string(),
            steps,
        };
        tracing::debug!(
            root = %plan.root,
            requested = targets.len(),
            joins = plan.len(),
            "resolved join plan"
        );
        Ok(plan)
    }

    /// Root and ordered edges for a set of target nodes
    pub(crate) fn resolve_indices(
        &self,
        targets: &BTreeSet<NodeIndex>,
    ) -> Result<(NodeIndex, Vec<EdgeIndex>)> {
        let Some(&first_root) = self.roots.first() else {
            return Err(SchemaError::InvalidTopology("topology has no root".to_string()));
        };

        let mut collected: BTreeMap<NodeIndex, EdgeIndex> = BTreeMap::new();
        // (target, its root) of the first target walked
        let mut anchor: Option<(NodeIndex, NodeIndex)> = None;

        for &target in targets {
            let mut current = target;
            let mut joined_known_chain = false;
            while let Some(edge) = self.parent_edge(current) {
                if collected.insert(current, edge.id()).is_some() {
                    joined_known_chain = true;
                    break;
                }
                current = edge.source();
            }

            // meeting an already collected chain means sharing the anchor's root
            if joined_known_chain {
                continue;
            }

            match anchor {
                None => anchor = Some((target, current)),
                Some((first, root)) if root != current => {
                    return Err(SchemaError::DisconnectedSchema {
                        first: self.graph[first].name().to_string(),
                        first_root: self.graph[root].name().to_string(),
                        second: self.graph[target].name().to_string(),
                        second_root: self.graph[current].name().to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        let root = anchor.map(|(_, root)| root).unwrap_or(first_root);
        Ok((root, collected.into_values().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{JoinOverrides, Topology, TopologyNode};
    use crate::selectable::Table;

    /// a → (b → d, c); e is a second root
    fn forest() -> SchemaGraph {
        let a = Table::new("a")
            .with_primary_key("id")
            .foreign_key("b_id", "b", "id")
            .foreign_key("c_id", "c", "id");
        let b = Table::new("b").with_primary_key("id").foreign_key("d_id", "d", "id");
        let c = Table::new("c").with_primary_key("id");
        let d = Table::new("d").with_primary_key("id");
        let e = Table::new("e").with_primary_key("id");

        let topology = Topology::new()
            .root(TopologyNode::new(a).child(TopologyNode::new(b).leaf(d)).leaf(c))
            .root(TopologyNode::new(e));
        SchemaGraph::build(topology, &JoinOverrides::new()).unwrap()
    }

    #[test]
    fn test_root_only_is_empty() {
        let plan = forest().resolve(["a"]).unwrap();
        assert_eq!(plan.root, "a");
        assert!(plan.is_empty());
    }

    #[test]
    fn test_leaf_walks_full_path() {
        let plan = forest().resolve(["d", "d"]).unwrap();
        assert_eq!(plan.pairs(), vec![("a", "b"), ("b", "d")]);
        assert_eq!(plan.tables().collect::<Vec<_>>(), vec!["a", "b", "d"]);
    }

    #[test]
    fn test_order_independent_of_request_order() {
        let graph = forest();
        let forward = graph.resolve(["c", "d"]).unwrap();
        let backward = graph.resolve(["d", "c", "b"]).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward.pairs(), vec![("a", "b"), ("b", "d"), ("a", "c")]);
    }

    #[test]
    fn test_disconnected_roots() {
        let err = forest().resolve(["d", "e"]).unwrap_err();
        match err {
            SchemaError::DisconnectedSchema { first, first_root, second, second_root } => {
                assert_eq!((first.as_str(), first_root.as_str()), ("d", "a"));
                assert_eq!((second.as_str(), second_root.as_str()), ("e", "e"));
            }
            other => panic!("Expected DisconnectedSchema, got {:?}", other),
        }
    }

    #[test]
    fn test_second_root_alone() {
        let plan = forest().resolve(["e"]).unwrap();
        assert_eq!(plan.root, "e");
        assert!(plan.is_empty());
    }

    #[test]
    fn test_empty_request_uses_first_root() {
        let plan = forest().resolve(Vec::<&str>::new()).unwrap();
        assert_eq!(plan.root, "a");
        assert!(plan.is_empty());
    }

    #[test]
    fn test_unknown_table() {
        let err = forest().resolve(["zzz"]).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownTable { .. }));
    }
}
