//! Table-like relations that can be placed in a schema topology
//!
//! Anything that exposes a name, a column list and (optionally) foreign keys
//! implements [`Selectable`]. Three implementations ship with the crate:
//!
//! - [`Table`]: a physical table with declared keys
//! - [`Alias`]: a second, differently named reference to a [`Table`]
//! - [`Subquery`]: a derived relation given as query text, without keys

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Foreign key declared on a relation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referencing columns on the declaring relation
    pub columns: Vec<String>,
    /// Name of the referenced relation (the physical name, never an alias)
    pub references: String,
    /// Referenced columns; empty means the referenced primary key
    #[serde(default)]
    pub referenced_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(column: impl Into<String>, references: impl Into<String>, referenced_column: impl Into<String>) -> Self {
        Self {
            columns: vec![column.into()],
            references: references.into(),
            referenced_columns: vec![referenced_column.into()],
        }
    }
}

/// What a selectable refers to in a FROM clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation<'a> {
    /// Named relation, rendered as `relation AS name` when the two differ
    Named(&'a str),
    /// Derived relation given as query text
    Derived(&'a str),
}

/// A table-like object that can become a node of a schema graph
pub trait Selectable: fmt::Debug + Send + Sync {
    /// Exposed name; unique within one schema graph
    fn name(&self) -> &str;

    /// Underlying relation
    fn relation(&self) -> Relation<'_>;

    /// Column identifiers exposed under [`Selectable::name`]
    fn columns(&self) -> &[String];

    fn primary_key(&self) -> &[String] {
        &[]
    }

    fn foreign_keys(&self) -> &[ForeignKey] {
        &[]
    }

    /// Name used when matching foreign keys: the physical relation for
    /// named relations, the exposed name for derived ones
    fn relation_name(&self) -> &str {
        match self.relation() {
            Relation::Named(name) => name,
            Relation::Derived(_) => self.name(),
        }
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns().iter().any(|c| c == column)
    }
}

// =============================================================================
// Table
// =============================================================================

/// Physical table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    pub fn with_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare a single-column primary key, adding the column if missing
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if !self.columns.contains(&column) {
            self.columns.push(column.clone());
        }
        self.primary_key = vec![column];
        self
    }

    /// Declare a single-column foreign key, adding the column if missing
    pub fn foreign_key(
        mut self,
        column: impl Into<String>,
        references: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        let key = ForeignKey::new(column, references, referenced_column);
        for column in &key.columns {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
        self.foreign_keys.push(key);
        self
    }

    /// Add key columns missing from the column list, keeping declaration order
    pub fn with_key_columns(mut self) -> Self {
        let keys: Vec<String> = self
            .primary_key
            .iter()
            .chain(self.foreign_keys.iter().flat_map(|fk| fk.columns.iter()))
            .cloned()
            .collect();
        for column in keys {
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self
    }

    /// Reference this table under another name
    pub fn alias(self: &Arc<Self>, name: impl Into<String>) -> Alias {
        Alias::new(Arc::clone(self), name)
    }
}

impl Selectable for Table {
    fn name(&self) -> &str {
        &self.name
    }

    fn relation(&self) -> Relation<'_> {
        Relation::Named(&self.name)
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }
}

// =============================================================================
// Alias
// =============================================================================

/// A table referenced under a different name
///
/// Two aliases of the same table are distinct nodes in a schema graph, which
/// is how a star schema attaches the same dimension twice (for example a
/// `location` table used for both customers and employees).
#[derive(Debug, Clone)]
pub struct Alias {
    name: String,
    table: Arc<Table>,
}

impl Alias {
    pub fn new(table: Arc<Table>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }
}

impl Selectable for Alias {
    fn name(&self) -> &str {
        &self.name
    }

    fn relation(&self) -> Relation<'_> {
        Relation::Named(&self.table.name)
    }

    fn columns(&self) -> &[String] {
        &self.table.columns
    }

    fn primary_key(&self) -> &[String] {
        &self.table.primary_key
    }

    fn foreign_keys(&self) -> &[ForeignKey] {
        &self.table.foreign_keys
    }
}

// =============================================================================
// Subquery
// =============================================================================

/// Derived relation; has no foreign keys, so joins to it must be explicit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subquery {
    pub name: String,
    pub sql: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

impl Subquery {
    pub fn new<I, S>(name: impl Into<String>, sql: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            sql: sql.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Same query exposed under another name
    pub fn alias(&self, name: impl Into<String>) -> Subquery {
        Subquery {
            name: name.into(),
            sql: self.sql.clone(),
            columns: self.columns.clone(),
        }
    }
}

impl Selectable for Subquery {
    fn name(&self) -> &str {
        &self.name
    }

    fn relation(&self) -> Relation<'_> {
        Relation::Derived(&self.sql)
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }
}

// =============================================================================
// Conversions
// =============================================================================

/// Conversion into the shared handle stored by schema graphs
pub trait IntoSelectable {
    fn into_selectable(self) -> Arc<dyn Selectable>;
}

impl IntoSelectable for Arc<dyn Selectable> {
    fn into_selectable(self) -> Arc<dyn Selectable> {
        self
    }
}

macro_rules! impl_into_selectable {
    ($($ty:ty),*) => {
        $(
            impl IntoSelectable for $ty {
                fn into_selectable(self) -> Arc<dyn Selectable> {
                    Arc::new(self)
                }
            }

            impl IntoSelectable for Arc<$ty> {
                fn into_selectable(self) -> Arc<dyn Selectable> {
                    self
                }
            }

            impl IntoSelectable for &Arc<$ty> {
                fn into_selectable(self) -> Arc<dyn Selectable> {
                    Arc::clone(self) as Arc<dyn Selectable>
                }
            }
        )*
    };
}

impl_into_selectable!(Table, Alias, Subquery);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_exposes_table_columns() {
        let location = Arc::new(
            Table::new("location")
                .with_primary_key("id")
                .with_columns(["country", "city"]),
        );
        let alias = location.alias("customer_location");

        assert_eq!(alias.name(), "customer_location");
        assert_eq!(alias.relation(), Relation::Named("location"));
        assert_eq!(alias.relation_name(), "location");
        assert!(alias.has_column("country"));
        assert_eq!(alias.primary_key(), ["id".to_string()]);
    }

    #[test]
    fn test_foreign_key_adds_column() {
        let sale = Table::new("sale")
            .with_primary_key("id")
            .foreign_key("product_id", "product", "id");

        assert_eq!(sale.columns, vec!["id", "product_id"]);
        assert_eq!(sale.foreign_keys.len(), 1);
        assert_eq!(sale.foreign_keys[0].references, "product");
    }

    #[test]
    fn test_subquery_relation_name_is_exposed_name() {
        let cte = Subquery::new("recent", "SELECT id FROM sale", ["id"]);
        let renamed = cte.alias("recent_alias");

        assert_eq!(cte.relation_name(), "recent");
        assert_eq!(renamed.relation(), Relation::Derived("SELECT id FROM sale"));
        assert!(renamed.foreign_keys().is_empty());
    }

    #[test]
    fn test_table_deserialize_defaults() {
        let table: Table = serde_json::from_str(r#"{"name": "category", "columns": ["id", "name"]}"#).unwrap();
        assert!(table.primary_key.is_empty());
        assert!(table.foreign_keys.is_empty());
        assert!(table.has_column("name"));
    }

    #[test]
    fn test_with_key_columns() {
        let table: Table = serde_json::from_str(
            r#"{"name": "sale", "columns": ["total"], "primary_key": ["id"],
                "foreign_keys": [{"columns": ["product_id"], "references": "product"}]}"#,
        )
        .unwrap();
        assert_eq!(table.with_key_columns().columns, vec!["total", "id", "product_id"]);
    }
}
