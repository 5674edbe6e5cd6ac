//! Topology Loading
//!
//! Reads a table catalog, the nested join tree and any join overrides from a
//! JSON or TOML file and turns them into a [`Topology`] plus
//! [`JoinOverrides`] ready for [`SchemaGraph::build_with`].
//!
//! ```toml
//! [[tables]]
//! name = "sale"
//! columns = ["id", "total"]
//! primary_key = ["id"]
//! foreign_keys = [{ columns = ["product_id"], references = "product" }]
//!
//! [[tables]]
//! name = "product"
//! primary_key = ["id"]
//!
//! [[schema]]
//! table = "sale"
//!
//! [[schema.children]]
//! table = "product"
//! join = { kind = "inner" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::join::{JoinKind, JoinOverride, JoinOverrides};
use super::topology::{Topology, TopologyNode};
use super::SchemaGraph;
use crate::config::BuildConfig;
use crate::error::{Result, SchemaError};
use crate::selectable::{Alias, IntoSelectable, Selectable, Subquery, Table};

/// On-disk topology description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyFile {
    /// Physical tables that nodes may reference
    #[serde(default)]
    pub tables: Vec<Table>,

    /// Derived relations that nodes may reference
    #[serde(default)]
    pub subqueries: Vec<Subquery>,

    /// Root nodes, in declaration order
    #[serde(default)]
    pub schema: Vec<NodeDef>,
}

/// One node of the join tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    /// Catalog entry this node refers to
    pub table: String,

    /// Exposed name when it differs from the catalog name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Join onto the parent; inferred from foreign keys when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinDef>,

    #[serde(default)]
    pub children: Vec<NodeDef>,
}

impl NodeDef {
    fn exposed_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// Explicit join written next to a child node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinDef {
    /// `[parent column, child column]` pairs
    #[serde(default)]
    pub on: Vec<(String, String)>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<JoinKind>,
}

impl JoinDef {
    fn to_override(&self, parent: &str, child: &str) -> Result<JoinOverride> {
        let join = match (self.on.is_empty(), &self.expression) {
            (false, Some(_)) => {
                return Err(SchemaError::InvalidTopology(format!(
                    "join between '{}' and '{}' sets both 'on' and 'expression'",
                    parent, child
                )));
            }
            (false, None) => JoinOverride::on(self.on.iter().cloned()),
            (true, Some(expression)) => JoinOverride::expression(expression.clone()),
            (true, None) => JoinOverride::inferred(),
        };
        Ok(match self.kind {
            Some(kind) => join.kind(kind),
            None => join,
        })
    }
}

/// Serialization format of a topology file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyFormat {
    Json,
    Toml,
}

impl TopologyFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(TopologyFormat::Json),
            Some("toml") => Ok(TopologyFormat::Toml),
            _ => Err(SchemaError::InvalidTopology(format!(
                "cannot tell the format of '{}' (expected .json or .toml)",
                path.display()
            ))),
        }
    }
}

/// Topology and overrides read from a file, not yet built
#[derive(Debug, Clone)]
pub struct LoadedTopology {
    pub topology: Topology,
    pub overrides: JoinOverrides,
}

impl LoadedTopology {
    pub fn build(&self, config: &BuildConfig) -> Result<SchemaGraph> {
        SchemaGraph::build_with(self.topology.clone(), &self.overrides, config)
    }
}

/// Load a topology file, detecting the format from its extension
pub fn load_from_path(path: &Path) -> Result<LoadedTopology> {
    let format = TopologyFormat::from_path(path)?;
    let content = fs::read_to_string(path)?;
    let loaded = load_from_str(&content, format)?;
    tracing::debug!(path = %path.display(), roots = loaded.topology.roots().len(), "loaded topology");
    Ok(loaded)
}

/// Parse topology text in the given format
pub fn load_from_str(content: &str, format: TopologyFormat) -> Result<LoadedTopology> {
    let file: TopologyFile = match format {
        TopologyFormat::Json => serde_json::from_str(content)?,
        TopologyFormat::Toml => toml::from_str(content)?,
    };
    file.into_topology()
}

impl TopologyFile {
    /// Resolve catalog references into selectables and collect overrides
    pub fn into_topology(self) -> Result<LoadedTopology> {
        let catalog = Catalog::new(self.tables, self.subqueries)?;
        let mut overrides = JoinOverrides::new();

        let mut roots = Vec::with_capacity(self.schema.len());
        for root in &self.schema {
            if root.join.is_some() {
                return Err(SchemaError::InvalidTopology(format!(
                    "root '{}' cannot declare a join",
                    root.exposed_name()
                )));
            }
            roots.push(catalog.node(root, &mut overrides)?);
        }

        Ok(LoadedTopology {
            topology: roots.into_iter().collect(),
            overrides,
        })
    }
}

enum CatalogEntry {
    Table(Arc<Table>),
    Subquery(Subquery),
}

struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    fn new(tables: Vec<Table>, subqueries: Vec<Subquery>) -> Result<Self> {
        let mut entries = HashMap::with_capacity(tables.len() + subqueries.len());
        let all = tables
            .into_iter()
            .map(|t| CatalogEntry::Table(Arc::new(t.with_key_columns())))
            .chain(subqueries.into_iter().map(CatalogEntry::Subquery));

        for entry in all {
            let name = entry.name().to_string();
            if entries.insert(name.clone(), entry).is_some() {
                return Err(SchemaError::InvalidTopology(format!(
                    "'{}' is declared more than once in the catalog",
                    name
                )));
            }
        }
        Ok(Self { entries })
    }

    fn selectable(&self, def: &NodeDef) -> Result<Arc<dyn Selectable>> {
        let entry = self.entries.get(&def.table).ok_or_else(|| {
            SchemaError::InvalidTopology(format!("node refers to unknown table '{}'", def.table))
        })?;

        Ok(match (entry, &def.alias) {
            (CatalogEntry::Table(table), None) => Arc::clone(table).into_selectable(),
            (CatalogEntry::Table(table), Some(alias)) => Alias::new(Arc::clone(table), alias.clone()).into_selectable(),
            (CatalogEntry::Subquery(query), None) => query.clone().into_selectable(),
            (CatalogEntry::Subquery(query), Some(alias)) => query.alias(alias.clone()).into_selectable(),
        })
    }

    fn node(&self, def: &NodeDef, overrides: &mut JoinOverrides) -> Result<TopologyNode> {
        let mut node = TopologyNode::new(self.selectable(def)?);
        for child in &def.children {
            if let Some(join) = &child.join {
                let join_override = join.to_override(def.exposed_name(), child.exposed_name())?;
                overrides.insert(def.exposed_name(), child.exposed_name(), join_override);
            }
            node = node.child(self.node(child, overrides)?);
        }
        Ok(node)
    }
}

impl CatalogEntry {
    fn name(&self) -> &str {
        match self {
            CatalogEntry::Table(table) => &table.name,
            CatalogEntry::Subquery(query) => &query.name,
        }
    }
}

impl SchemaGraph {
    /// Load and build a topology file in one step
    pub fn from_path(path: &Path, config: &BuildConfig) -> Result<SchemaGraph> {
        load_from_path(path)?.build(config)
    }
}
