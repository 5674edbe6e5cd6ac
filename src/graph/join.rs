//! Join specifications between a parent and a child node
//!
//! A join is either inferred from the single foreign key linking two
//! relations, or supplied explicitly through a [`JoinOverride`] when the
//! relations are linked by several keys (or by none, as with subqueries).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::NodeKey;
use crate::config::BuildConfig;
use crate::error::{Result, SchemaError};
use crate::selectable::{ForeignKey, Selectable};

/// How a child is joined onto its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    #[default]
    LeftOuter,
    FullOuter,
}

impl JoinKind {
    /// SQL keyword introducing the join
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "inner"),
            JoinKind::LeftOuter => write!(f, "left_outer"),
            JoinKind::FullOuter => write!(f, "full_outer"),
        }
    }
}

/// Column qualified by the exposed name of its node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Parse `table.column`, splitting at the last dot so that
    /// schema-qualified table names (`sales.fact.total`) keep their prefix
    pub fn parse(qualified: &str) -> Option<Self> {
        let (table, column) = qualified.rsplit_once('.')?;
        if table.is_empty() || column.is_empty() {
            return None;
        }
        Some(Self::new(table, column))
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Join predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinCondition {
    /// Conjunction of equalities, parent column on the left
    Columns(Vec<(ColumnRef, ColumnRef)>),
    /// Predicate text supplied verbatim
    Expression(String),
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinCondition::Columns(pairs) => {
                for (i, (left, right)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " AND ")?;
                    }
                    write!(f, "{} = {}", left, right)?;
                }
                Ok(())
            }
            JoinCondition::Expression(text) => write!(f, "{}", text),
        }
    }
}

/// Predicate and kind of one parent → child relation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Join {
    pub condition: JoinCondition,
    pub kind: JoinKind,
    /// Whether the join came from an override rather than a foreign key
    pub overridden: bool,
}

/// Edge of a schema graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinEdge {
    pub parent: NodeKey,
    pub child: NodeKey,
    pub join: Join,
}

impl JoinEdge {
    pub fn condition(&self) -> &JoinCondition {
        &self.join.condition
    }

    pub fn kind(&self) -> JoinKind {
        self.join.kind
    }

    pub fn is_overridden(&self) -> bool {
        self.join.overridden
    }
}

// =============================================================================
// Overrides
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum OverrideCondition {
    Inferred,
    Columns(Vec<(String, String)>),
    Expression(String),
}

/// Explicit join between a declared parent and child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOverride {
    condition: OverrideCondition,
    kind: Option<JoinKind>,
}

impl JoinOverride {
    /// Equalities given as `(parent column, child column)` pairs
    pub fn on<I, P, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        Self {
            condition: OverrideCondition::Columns(
                pairs.into_iter().map(|(p, c)| (p.into(), c.into())).collect(),
            ),
            kind: None,
        }
    }

    /// Verbatim predicate text
    pub fn expression(text: impl Into<String>) -> Self {
        Self {
            condition: OverrideCondition::Expression(text.into()),
            kind: None,
        }
    }

    /// Keep foreign-key inference and only change the join kind
    pub fn inferred() -> Self {
        Self {
            condition: OverrideCondition::Inferred,
            kind: None,
        }
    }

    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn inner(self) -> Self {
        self.kind(JoinKind::Inner)
    }

    pub fn full(self) -> Self {
        self.kind(JoinKind::FullOuter)
    }
}

/// Overrides keyed by `(parent name, child name)`, iterated in key order
#[derive(Debug, Clone, Default)]
pub struct JoinOverrides {
    entries: BTreeMap<(String, String), JoinOverride>,
}

impl JoinOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, parent: impl Into<String>, child: impl Into<String>, join: JoinOverride) -> Self {
        self.insert(parent, child, join);
        self
    }

    pub fn insert(&mut self, parent: impl Into<String>, child: impl Into<String>, join: JoinOverride) {
        self.entries.insert((parent.into(), child.into()), join);
    }

    pub fn get(&self, parent: &str, child: &str) -> Option<&JoinOverride> {
        self.entries.get(&(parent.to_string(), child.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.keys().map(|(p, c)| (p.as_str(), c.as_str()))
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Work out the join between `parent` and `child`, preferring `join_override`
pub(crate) fn resolve_join(
    parent: &dyn Selectable,
    child: &dyn Selectable,
    join_override: Option<&JoinOverride>,
    config: &BuildConfig,
) -> Result<Join> {
    let Some(join_override) = join_override else {
        let condition = infer_condition(parent, child, config.infer_reverse_foreign_keys)?;
        return Ok(Join {
            condition,
            kind: config.default_join_kind,
            overridden: false,
        });
    };

    let condition = match &join_override.condition {
        OverrideCondition::Inferred => {
            infer_condition(parent, child, config.infer_reverse_foreign_keys)?
        }
        OverrideCondition::Columns(pairs) => {
            if pairs.is_empty() {
                return Err(SchemaError::InvalidTopology(format!(
                    "explicit join between '{}' and '{}' has no columns",
                    parent.name(),
                    child.name()
                )));
            }
            let mut resolved = Vec::with_capacity(pairs.len());
            for (parent_column, child_column) in pairs {
                resolved.push((
                    checked_column(parent, parent_column)?,
                    checked_column(child, child_column)?,
                ));
            }
            JoinCondition::Columns(resolved)
        }
        OverrideCondition::Expression(text) => JoinCondition::Expression(text.clone()),
    };

    Ok(Join {
        condition,
        kind: join_override.kind.unwrap_or(config.default_join_kind),
        overridden: true,
    })
}

fn checked_column(selectable: &dyn Selectable, column: &str) -> Result<ColumnRef> {
    if !selectable.has_column(column) {
        return Err(SchemaError::UnknownColumn {
            table: selectable.name().to_string(),
            column: column.to_string(),
        });
    }
    Ok(ColumnRef::new(selectable.name(), column))
}

/// Infer the join condition from the foreign keys linking two relations
///
/// Exactly one candidate key must exist. Aliases match through their
/// underlying relation, so two aliases of one table hanging off the same
/// parent through two keys are reported as ambiguous.
pub(crate) fn infer_condition(
    parent: &dyn Selectable,
    child: &dyn Selectable,
    reverse: bool,
) -> Result<JoinCondition> {
    let mut candidates: Vec<Vec<(ColumnRef, ColumnRef)>> = Vec::new();

    for key in parent.foreign_keys() {
        if key.references == child.relation_name() {
            let pairs = key_pairs(key, child)
                .map(|(fk, referenced)| {
                    (
                        ColumnRef::new(parent.name(), fk),
                        ColumnRef::new(child.name(), referenced),
                    )
                })
                .collect::<Vec<_>>();
            candidates.push(pairs);
        }
    }

    // a self-referencing relation would otherwise count each key twice
    if reverse && parent.relation_name() != child.relation_name() {
        for key in child.foreign_keys() {
            if key.references == parent.relation_name() {
                let pairs = key_pairs(key, parent)
                    .map(|(fk, referenced)| {
                        (
                            ColumnRef::new(parent.name(), referenced),
                            ColumnRef::new(child.name(), fk),
                        )
                    })
                    .collect::<Vec<_>>();
                candidates.push(pairs);
            }
        }
    }

    candidates.retain(|pairs| !pairs.is_empty());

    match candidates.len() {
        0 => Err(SchemaError::MissingRelation {
            parent: parent.name().to_string(),
            child: child.name().to_string(),
        }),
        1 => {
            let pairs = candidates.pop().unwrap_or_default();
            tracing::trace!(parent = parent.name(), child = child.name(), "inferred join from foreign key");
            Ok(JoinCondition::Columns(pairs))
        }
        n => Err(SchemaError::AmbiguousJoin {
            parent: parent.name().to_string(),
            child: child.name().to_string(),
            candidates: n,
        }),
    }
}

/// Pair each referencing column with its referenced column, falling back to
/// the referenced relation's primary key
fn key_pairs<'a>(
    key: &'a ForeignKey,
    referenced: &'a dyn Selectable,
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    let targets = if key.referenced_columns.is_empty() {
        referenced.primary_key()
    } else {
        key.referenced_columns.as_slice()
    };
    // a key whose arity does not line up with its targets yields nothing
    let usable = key.columns.len() == targets.len();
    key.columns
        .iter()
        .zip(targets.iter())
        .filter(move |_| usable)
        .map(|(fk, target)| (fk.as_str(), target.as_str()))
}
