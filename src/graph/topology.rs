//! Topology description and graph construction
//!
//! A [`Topology`] is the nested parent → children description a schema graph
//! is built from. It only exists as constructor input; the resulting
//! [`SchemaGraph`] is immutable.
//!
//! ```
//! use star_schema::{JoinOverrides, SchemaGraph, Table, TopologyNode};
//!
//! let sale = Table::new("sale").with_primary_key("id").foreign_key("product_id", "product", "id");
//! let product = Table::new("product").with_primary_key("id");
//!
//! let graph = SchemaGraph::build(
//!     TopologyNode::new(sale).leaf(product),
//!     &JoinOverrides::new(),
//! ).unwrap();
//! assert_eq!(graph.len(), 2);
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use super::join::{resolve_join, JoinOverrides};
use super::{DraftNode, SchemaGraph};
use crate::config::BuildConfig;
use crate::error::{Result, SchemaError};
use crate::selectable::{IntoSelectable, Selectable};

/// One selectable and the subtrees hanging below it
#[derive(Debug, Clone)]
pub struct TopologyNode {
    selectable: Arc<dyn Selectable>,
    children: Vec<TopologyNode>,
}

impl TopologyNode {
    pub fn new(selectable: impl IntoSelectable) -> Self {
        Self {
            selectable: selectable.into_selectable(),
            children: Vec::new(),
        }
    }

    /// Append a child subtree
    pub fn child(mut self, child: TopologyNode) -> Self {
        self.children.push(child);
        self
    }

    /// Append a child without children of its own
    pub fn leaf(self, selectable: impl IntoSelectable) -> Self {
        self.child(TopologyNode::new(selectable))
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = TopologyNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn name(&self) -> &str {
        self.selectable.name()
    }

    pub fn children(&self) -> &[TopologyNode] {
        &self.children
    }
}

/// Ordered forest of topology nodes; more than one root models a galaxy
#[derive(Debug, Clone, Default)]
pub struct Topology {
    roots: Vec<TopologyNode>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, root: TopologyNode) -> Self {
        self.roots.push(root);
        self
    }

    pub fn roots(&self) -> &[TopologyNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl From<TopologyNode> for Topology {
    fn from(root: TopologyNode) -> Self {
        Topology { roots: vec![root] }
    }
}

impl FromIterator<TopologyNode> for Topology {
    fn from_iter<I: IntoIterator<Item = TopologyNode>>(iter: I) -> Self {
        Topology {
            roots: iter.into_iter().collect(),
        }
    }
}

impl SchemaGraph {
    /// Build a graph with the default [`BuildConfig`]
    pub fn build(topology: impl Into<Topology>, overrides: &JoinOverrides) -> Result<Self> {
        Self::build_with(topology, overrides, &BuildConfig::default())
    }

    /// Build a graph, inferring every join without an override
    ///
    /// Construction is all-or-nothing: the first duplicate name, missing or
    /// ambiguous relation aborts the build.
    pub fn build_with(
        topology: impl Into<Topology>,
        overrides: &JoinOverrides,
        config: &BuildConfig,
    ) -> Result<Self> {
        let topology = topology.into();
        check_unique_names(&topology)?;
        let mut used = HashSet::new();

        let mut roots = Vec::with_capacity(topology.roots.len());
        for root in &topology.roots {
            let mut draft = DraftNode {
                selectable: Arc::clone(&root.selectable),
                join: None,
                children: Vec::new(),
            };
            draft.children = draft_children(root, overrides, config, &mut used)?;
            roots.push(draft);
        }

        for (parent, child) in overrides.pairs() {
            if !used.contains(&(parent.to_string(), child.to_string())) {
                tracing::warn!(parent, child, "join override does not match a declared relation; ignored");
            }
        }

        let graph = Self::freeze(roots)?;
        tracing::debug!(
            tables = graph.len(),
            joins = graph.edge_count(),
            roots = graph.roots.len(),
            "built schema graph"
        );
        Ok(graph)
    }
}

/// Every exposed name must be unique; checked before any join is inferred
fn check_unique_names(topology: &Topology) -> Result<()> {
    fn visit<'a>(node: &'a TopologyNode, seen: &mut HashSet<&'a str>) -> Result<()> {
        if !seen.insert(node.name()) {
            return Err(SchemaError::DuplicateName {
                name: node.name().to_string(),
            });
        }
        node.children.iter().try_for_each(|child| visit(child, seen))
    }

    let mut seen = HashSet::new();
    topology.roots.iter().try_for_each(|root| visit(root, &mut seen))
}

fn draft_children(
    node: &TopologyNode,
    overrides: &JoinOverrides,
    config: &BuildConfig,
    used: &mut HashSet<(String, String)>,
) -> Result<Vec<DraftNode>> {
    let mut drafts = Vec::with_capacity(node.children.len());
    for child in &node.children {
        let join_override = overrides.get(node.name(), child.name());
        if join_override.is_some() {
            used.insert((node.name().to_string(), child.name().to_string()));
        }
        let join = resolve_join(
            node.selectable.as_ref(),
            child.selectable.as_ref(),
            join_override,
            config,
        )?;
        drafts.push(DraftNode {
            selectable: Arc::clone(&child.selectable),
            join: Some(join),
            children: draft_children(child, overrides, config, used)?,
        });
    }
    Ok(drafts)
}
