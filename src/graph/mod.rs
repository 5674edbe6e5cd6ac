//! Schema Graph
//!
//! A rooted forest of table-like nodes connected by join edges, stored in a
//! petgraph `DiGraph` (parent → child). Every node except a root has exactly
//! one incoming edge, so the join path from any node back to its root is
//! unique. This is what removes the ambiguity of a relational schema where
//! several foreign keys connect the same pair of tables.
//!
//! Nodes are inserted in depth-first pre-order of the topology, so a parent
//! always has a smaller [`NodeKey`] than its children. The path resolver
//! relies on this to order joins root-to-leaf.
//!
//! Graphs are immutable once built. [`SchemaGraph::detach`],
//! [`SchemaGraph::compose`] and [`SchemaGraph::merge`] return new graphs.

pub mod join;
pub mod loader;
pub mod ops;
pub mod resolve;
pub mod topology;

pub use join::{ColumnRef, Join, JoinCondition, JoinEdge, JoinKind, JoinOverride, JoinOverrides};
pub use loader::{load_from_path, load_from_str, LoadedTopology, TopologyFile, TopologyFormat};
pub use resolve::{JoinPlan, JoinStep};
pub use topology::{Topology, TopologyNode};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SchemaError};
use crate::selectable::{Relation, Selectable};

/// Synthetic node identity, independent of the table name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(usize);

impl NodeKey {
    pub fn index(&self) -> usize {
        self.0
    }

    fn node_index(&self) -> NodeIndex {
        NodeIndex::new(self.0)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One selectable placed in a schema graph
#[derive(Debug, Clone)]
pub struct TableNode {
    key: NodeKey,
    selectable: Arc<dyn Selectable>,
}

impl TableNode {
    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn name(&self) -> &str {
        self.selectable.name()
    }

    pub fn selectable(&self) -> &Arc<dyn Selectable> {
        &self.selectable
    }

    pub fn columns(&self) -> &[String] {
        self.selectable.columns()
    }

    /// Qualified reference to one of this node's columns
    pub fn column(&self, column: &str) -> Result<ColumnRef> {
        if !self.selectable.has_column(column) {
            return Err(SchemaError::UnknownColumn {
                table: self.name().to_string(),
                column: column.to_string(),
            });
        }
        Ok(ColumnRef::new(self.name(), column))
    }
}

/// The schema join graph
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    /// Parent → child join edges; node weights stored in pre-order
    pub(crate) graph: DiGraph<TableNode, JoinEdge>,

    /// Index: exposed name -> node
    pub(crate) by_name: BTreeMap<String, NodeIndex>,

    /// Roots in declaration order
    pub(crate) roots: Vec<NodeIndex>,
}

impl SchemaGraph {
    // ========== Public API ==========

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of join edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Read-only lookup of every node by name
    pub fn tables(&self) -> BTreeMap<&str, &TableNode> {
        self.by_name
            .iter()
            .map(|(name, &idx)| (name.as_str(), &self.graph[idx]))
            .collect()
    }

    /// Node by exposed name
    pub fn table(&self, name: &str) -> Option<&TableNode> {
        self.by_name.get(name).map(|&idx| &self.graph[idx])
    }

    /// Node by key
    pub fn node(&self, key: NodeKey) -> Option<&TableNode> {
        self.graph.node_weight(key.node_index())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Roots in declaration order
    pub fn roots(&self) -> impl Iterator<Item = &TableNode> {
        self.roots.iter().map(|&idx| &self.graph[idx])
    }

    /// First declared root
    pub fn root(&self) -> Option<&TableNode> {
        self.roots.first().map(|&idx| &self.graph[idx])
    }

    /// Parent of a node; `None` for roots
    pub fn parent(&self, name: &str) -> Result<Option<&TableNode>> {
        let idx = self.lookup(name)?;
        Ok(self.parent_edge(idx).map(|edge| &self.graph[edge.source()]))
    }

    /// Edge joining a node onto its parent; `None` for roots
    pub fn parent_join(&self, name: &str) -> Result<Option<&JoinEdge>> {
        let idx = self.lookup(name)?;
        Ok(self.parent_edge(idx).map(|edge| edge.weight()))
    }

    /// Direct children in declaration order
    pub fn children(&self, name: &str) -> Result<Vec<&TableNode>> {
        let idx = self.lookup(name)?;
        Ok(self
            .child_indices(idx)
            .into_iter()
            .map(|child| &self.graph[child])
            .collect())
    }

    /// All edges, ordered by child
    pub fn edges(&self) -> impl Iterator<Item = &JoinEdge> {
        self.graph.edge_weights()
    }

    /// Nodes in depth-first pre-order
    pub fn iter(&self) -> impl Iterator<Item = &TableNode> {
        self.graph.node_weights()
    }

    /// Ancestor chain of a node, root first and the node itself last
    pub fn path(&self, name: &str) -> Result<Vec<&TableNode>> {
        let mut current = self.lookup(name)?;
        let mut path = vec![&self.graph[current]];
        while let Some(edge) = self.parent_edge(current) {
            current = edge.source();
            path.push(&self.graph[current]);
        }
        path.reverse();
        Ok(path)
    }

    /// Root of the tree a node belongs to
    pub fn root_of(&self, name: &str) -> Result<&TableNode> {
        let mut current = self.lookup(name)?;
        while let Some(edge) = self.parent_edge(current) {
            current = edge.source();
        }
        Ok(&self.graph[current])
    }

    /// SHA-256 over the canonical topology: names, relations, parents,
    /// join conditions and kinds, in pre-order
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for node in self.graph.node_weights() {
            let idx = node.key.node_index();
            let relation = match node.selectable.relation() {
                Relation::Named(name) => format!("table:{}", name),
                Relation::Derived(sql) => format!("query:{}", sql),
            };
            let parent = match self.parent_edge(idx) {
                Some(edge) => format!(
                    "{}|{}|{}",
                    self.graph[edge.source()].name(),
                    edge.weight().join.kind,
                    edge.weight().join.condition
                ),
                None => "<root>".to_string(),
            };
            hasher.update(format!("{}|{}|{}\n", node.name(), relation, parent).as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Export the join topology to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph SchemaGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8];\n");
        output.push('\n');

        for node in self.graph.node_weights() {
            let name = dot_escape(node.name());
            let label = match node.selectable.relation() {
                Relation::Named(relation) if relation != node.name() => {
                    format!("{}\\n({})", name, dot_escape(relation))
                }
                Relation::Named(_) => name.clone(),
                Relation::Derived(_) => format!("{}\\n(subquery)", name),
            };
            let shape = if self.roots.contains(&node.key.node_index()) {
                ", penwidth=2"
            } else {
                ""
            };
            output.push_str(&format!("  \"{}\" [label=\"{}\"{}];\n", name, label, shape));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            let parent = self.graph[edge.source()].name();
            let child = self.graph[edge.target()].name();
            let style = if edge.weight().join.overridden { ", style=dashed" } else { "" };
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\"{}];\n",
                dot_escape(parent),
                dot_escape(child),
                edge.weight().join.kind,
                style
            ));
        }

        output.push_str("}\n");
        output
    }

    // ========== Internals ==========

    /// Resolve a name to its node, suggesting the closest name on failure
    pub(crate) fn lookup(&self, name: &str) -> Result<NodeIndex> {
        if let Some(&idx) = self.by_name.get(name) {
            return Ok(idx);
        }
        Err(SchemaError::UnknownTable {
            name: name.to_string(),
            suggestion: self.suggest(name),
        })
    }

    fn suggest(&self, name: &str) -> Option<String> {
        use fuzzy_matcher::skim::SkimMatcherV2;
        use fuzzy_matcher::FuzzyMatcher;

        let matcher = SkimMatcherV2::default();
        let mut best: Option<(i64, &String)> = None;
        for candidate in self.by_name.keys() {
            let score = matcher
                .fuzzy_match(candidate, name)
                .or_else(|| matcher.fuzzy_match(name, candidate));
            if let Some(score) = score {
                // ties keep the alphabetically first name
                if best.map(|(b, _)| score > b).unwrap_or(true) {
                    best = Some((score, candidate));
                }
            }
        }
        best.map(|(_, candidate)| candidate.clone())
    }

    pub(crate) fn parent_edge(
        &self,
        idx: NodeIndex,
    ) -> Option<petgraph::graph::EdgeReference<'_, JoinEdge>> {
        self.graph.edges_directed(idx, Direction::Incoming).next()
    }

    pub(crate) fn child_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| edge.target())
            .collect();
        children.sort();
        children
    }

    /// Owned copy of the subtree below `idx`, with `graft` appended to the
    /// children of the node it names
    pub(crate) fn draft_subtree(
        &self,
        idx: NodeIndex,
        graft: &mut Option<(NodeIndex, DraftNode)>,
    ) -> DraftNode {
        let mut children: Vec<DraftNode> = self
            .child_indices(idx)
            .into_iter()
            .map(|child| self.draft_subtree(child, graft))
            .collect();

        if graft.as_ref().map(|(at, _)| *at == idx).unwrap_or(false) {
            if let Some((_, grafted)) = graft.take() {
                children.push(grafted);
            }
        }

        DraftNode {
            selectable: Arc::clone(&self.graph[idx].selectable),
            join: self.parent_edge(idx).map(|edge| edge.weight().join.clone()),
            children,
        }
    }

    /// Freeze a forest of drafts into a graph, assigning keys in pre-order
    pub(crate) fn freeze(roots: Vec<DraftNode>) -> Result<Self> {
        let mut schema = SchemaGraph {
            graph: DiGraph::new(),
            by_name: BTreeMap::new(),
            roots: Vec::with_capacity(roots.len()),
        };

        for root in roots {
            if root.join.is_some() {
                return Err(SchemaError::InvalidTopology(format!(
                    "root '{}' cannot carry a join",
                    root.selectable.name()
                )));
            }
            let idx = schema.insert(root, None)?;
            schema.roots.push(idx);
        }

        if schema.roots.is_empty() {
            return Err(SchemaError::InvalidTopology("topology has no root".to_string()));
        }

        Ok(schema)
    }

    fn insert(&mut self, draft: DraftNode, parent: Option<NodeIndex>) -> Result<NodeIndex> {
        let name = draft.selectable.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(SchemaError::DuplicateName { name });
        }

        let key = NodeKey(self.graph.node_count());
        let idx = self.graph.add_node(TableNode {
            key,
            selectable: draft.selectable,
        });
        self.by_name.insert(name, idx);

        match (parent, draft.join) {
            (Some(parent), Some(join)) => {
                self.graph.add_edge(
                    parent,
                    idx,
                    JoinEdge {
                        parent: NodeKey(parent.index()),
                        child: key,
                        join,
                    },
                );
            }
            (None, None) => {}
            (Some(_), None) => {
                return Err(SchemaError::InvalidTopology(format!(
                    "'{}' has a parent but no join",
                    self.graph[idx].name()
                )));
            }
            (None, Some(_)) => {
                return Err(SchemaError::InvalidTopology(format!(
                    "'{}' has a join but no parent",
                    self.graph[idx].name()
                )));
            }
        }

        for child in draft.children {
            self.insert(child, Some(idx))?;
        }

        Ok(idx)
    }
}

/// Tree node awaiting insertion into a new graph
#[derive(Debug, Clone)]
pub(crate) struct DraftNode {
    pub(crate) selectable: Arc<dyn Selectable>,
    /// Join onto the parent; `None` for roots
    pub(crate) join: Option<Join>,
    pub(crate) children: Vec<DraftNode>,
}

/// Escape text for a quoted DOT string; line breaks become `\n`
fn dot_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            c => escaped.push(c),
        }
    }
    escaped
}

impl fmt::Display for SchemaGraph {
    /// Indented tree, one line per node
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_node(graph: &SchemaGraph, f: &mut fmt::Formatter<'_>, idx: NodeIndex, depth: usize) -> fmt::Result {
            writeln!(f, "{}└─ {}", "  ".repeat(depth), graph.graph[idx].name())?;
            for child in graph.child_indices(idx) {
                write_node(graph, f, child, depth + 1)?;
            }
            Ok(())
        }

        for &root in &self.roots {
            write_node(self, f, root, 0)?;
        }
        Ok(())
    }
}
