//! Structural operations producing new graphs
//!
//! - [`SchemaGraph::detach`]: a subtree as an independently rooted graph
//! - [`SchemaGraph::compose`]: one graph's root attached below a node of another
//! - [`SchemaGraph::merge`]: two graphs side by side as a galaxy (no new join)
//!
//! None of these mutate their inputs. Selectables are shared through `Arc`,
//! everything else is copied into the new graph.

use petgraph::visit::Dfs;

use super::join::{resolve_join, JoinOverride};
use super::{DraftNode, SchemaGraph};
use crate::config::BuildConfig;
use crate::error::{Result, SchemaError};

impl SchemaGraph {
    /// Graph containing exactly the subtree rooted at `name`
    ///
    /// The chosen node becomes the root and its own parent join is dropped;
    /// joins inside the subtree are kept as they are, so selecting from the
    /// detached graph produces the same join chain below that node.
    pub fn detach(&self, name: &str) -> Result<SchemaGraph> {
        let idx = self.lookup(name)?;

        let mut draft = self.draft_subtree(idx, &mut None);
        draft.join = None;

        let detached = Self::freeze(vec![draft])?;
        tracing::debug!(root = name, tables = detached.len(), "detached sub-schema");
        Ok(detached)
    }

    /// Names of every node in the subtree rooted at `name`, pre-order
    pub fn subtree(&self, name: &str) -> Result<Vec<&str>> {
        let idx = self.lookup(name)?;
        let mut names = Vec::new();
        let mut dfs = Dfs::new(&self.graph, idx);
        while let Some(node) = dfs.next(&self.graph) {
            names.push(node);
        }
        names.sort();
        Ok(names.into_iter().map(|n| self.graph[n].name()).collect())
    }

    /// Attach `other` below `attach_point` with the default [`BuildConfig`]
    pub fn compose(
        &self,
        other: &SchemaGraph,
        attach_point: &str,
        join_override: Option<JoinOverride>,
    ) -> Result<SchemaGraph> {
        self.compose_with(other, attach_point, join_override, &BuildConfig::default())
    }

    /// Attach the root of `other` as a child of `attach_point`
    ///
    /// The join between the attachment point and the attached root follows
    /// the construction rules: an override if given, otherwise the single
    /// foreign key linking the two relations.
    pub fn compose_with(
        &self,
        other: &SchemaGraph,
        attach_point: &str,
        join_override: Option<JoinOverride>,
        config: &BuildConfig,
    ) -> Result<SchemaGraph> {
        let attach = self.lookup(attach_point)?;
        self.check_disjoint(other)?;

        let other_root = match other.roots.as_slice() {
            [root] => *root,
            roots => {
                return Err(SchemaError::InvalidTopology(format!(
                    "cannot attach a schema with {} roots through a single join",
                    roots.len()
                )));
            }
        };

        let join = resolve_join(
            self.graph[attach].selectable.as_ref(),
            other.graph[other_root].selectable.as_ref(),
            join_override.as_ref(),
            config,
        )?;

        let mut grafted = other.draft_subtree(other_root, &mut None);
        grafted.join = Some(join);

        let mut graft = Some((attach, grafted));
        let roots: Vec<DraftNode> = self
            .roots
            .iter()
            .map(|&root| self.draft_subtree(root, &mut graft))
            .collect();

        let composed = Self::freeze(roots)?;
        tracing::debug!(
            attach_point,
            attached = other.graph[other_root].name(),
            tables = composed.len(),
            "composed schemas"
        );
        Ok(composed)
    }

    /// Galaxy union: the roots of both graphs, `self`'s first
    pub fn merge(&self, other: &SchemaGraph) -> Result<SchemaGraph> {
        self.check_disjoint(other)?;

        let roots: Vec<DraftNode> = self
            .roots
            .iter()
            .map(|&root| self.draft_subtree(root, &mut None))
            .chain(other.roots.iter().map(|&root| other.draft_subtree(root, &mut None)))
            .collect();

        Self::freeze(roots)
    }

    fn check_disjoint(&self, other: &SchemaGraph) -> Result<()> {
        match other.by_name.keys().find(|name| self.by_name.contains_key(*name)) {
            Some(name) => Err(SchemaError::DuplicateName { name: name.clone() }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{JoinKind, JoinOverrides, TopologyNode};
    use crate::selectable::Table;

    fn sales() -> SchemaGraph {
        let sale = Table::new("sale")
            .with_primary_key("id")
            .foreign_key("product_id", "product", "id")
            .foreign_key("store_id", "store", "id");
        let product = Table::new("product").with_primary_key("id").foreign_key("brand_id", "brand", "id");
        let brand = Table::new("brand").with_primary_key("id");
        let store = Table::new("store").with_primary_key("id").foreign_key("region_id", "region", "id");

        SchemaGraph::build(
            TopologyNode::new(sale)
                .child(TopologyNode::new(product).leaf(brand))
                .leaf(store),
            &JoinOverrides::new(),
        )
        .unwrap()
    }

    fn regions() -> SchemaGraph {
        let region = Table::new("region").with_primary_key("id").foreign_key("country_id", "country", "id");
        let country = Table::new("country").with_primary_key("id");
        SchemaGraph::build(TopologyNode::new(region).leaf(country), &JoinOverrides::new()).unwrap()
    }

    #[test]
    fn test_detach_keeps_subtree_only() {
        let graph = sales();
        let detached = graph.detach("product").unwrap();

        assert_eq!(detached.root().unwrap().name(), "product");
        assert_eq!(detached.len(), 2);
        assert!(!detached.contains("sale"));
        assert!(detached.parent("product").unwrap().is_none());
        assert_eq!(detached.resolve(["brand"]).unwrap().pairs(), vec![("product", "brand")]);

        // source untouched
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.parent("product").unwrap().unwrap().name(), "sale");
    }

    #[test]
    fn test_detach_leaf() {
        let detached = sales().detach("brand").unwrap();
        assert_eq!(detached.len(), 1);
        assert_eq!(detached.edge_count(), 0);
    }

    #[test]
    fn test_detach_unknown() {
        assert!(matches!(sales().detach("nope"), Err(SchemaError::UnknownTable { .. })));
    }

    #[test]
    fn test_subtree_names() {
        assert_eq!(sales().subtree("product").unwrap(), vec!["product", "brand"]);
        assert_eq!(sales().subtree("sale").unwrap().len(), 4);
    }

    #[test]
    fn test_compose_infers_join() {
        let composed = sales().compose(&regions(), "store", None).unwrap();

        assert_eq!(composed.len(), 6);
        let plan = composed.resolve(["country"]).unwrap();
        assert_eq!(
            plan.pairs(),
            vec![("sale", "store"), ("store", "region"), ("region", "country")]
        );
        assert_eq!(plan.steps[1].condition.to_string(), "store.region_id = region.id");
    }

    #[test]
    fn test_compose_keeps_pre_order() {
        let composed = sales().compose(&regions(), "product", Some(JoinOverride::expression("1 = 1").inner())).unwrap();
        let names: Vec<&str> = composed.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["sale", "product", "brand", "region", "country", "store"]);
        assert_eq!(composed.parent_join("region").unwrap().unwrap().kind(), JoinKind::Inner);
    }

    #[test]
    fn test_compose_rejects_shared_names() {
        let other = SchemaGraph::build(TopologyNode::new(Table::new("brand")), &JoinOverrides::new()).unwrap();
        match sales().compose(&other, "product", Some(JoinOverride::expression("true"))) {
            Err(SchemaError::DuplicateName { name }) => assert_eq!(name, "brand"),
            other => panic!("Expected DuplicateName, got {:?}", other),
        }
    }

    #[test]
    fn test_compose_missing_relation() {
        let result = sales().compose(&regions(), "brand", None);
        assert!(matches!(result, Err(SchemaError::MissingRelation { .. })));
    }

    #[test]
    fn test_merge_forms_galaxy() {
        let merged = sales().merge(&regions()).unwrap();
        let roots: Vec<&str> = merged.roots().map(|r| r.name()).collect();
        assert_eq!(roots, vec!["sale", "region"]);
        assert!(matches!(
            merged.resolve(["brand", "country"]),
            Err(SchemaError::DisconnectedSchema { .. })
        ));

        let attached = sales().merge(&regions()).unwrap();
        assert!(matches!(
            attached.compose(&regions(), "store", None),
            Err(SchemaError::DuplicateName { .. })
        ));
    }
}
