//! Reference SQL builder
//!
//! Renders ANSI-style SQL text. Identifiers are double-quoted when they are
//! not plain `[A-Za-z_][A-Za-z0-9_]*` words or are reserved keywords, or
//! always when [`RenderConfig::quote_identifiers`] is set.
//!
//! A schema-qualified table (`sales.fact`) is its own node name, so it is
//! rendered as `sales.fact AS "sales.fact"` and columns are qualified with
//! the quoted name.

use std::fmt;

use super::{CompareOp, Filter, Projection, QueryBuilder, SelectRequest, SortOrder, Value};
use crate::config::RenderConfig;
use crate::graph::{ColumnRef, JoinCondition, JoinKind, JoinStep, TableNode};
use crate::selectable::Relation;

/// A FROM-clause entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource {
    /// Table under its own name
    Table(String),
    /// Table under another name
    Aliased { relation: String, name: String },
    /// Derived relation
    Subquery { sql: String, name: String },
}

impl TableSource {
    pub fn from_node(node: &TableNode) -> Self {
        let name = node.name().to_string();
        match node.selectable().relation() {
            Relation::Named(relation) if relation == name && !name.contains('.') => TableSource::Table(name),
            Relation::Named(relation) => TableSource::Aliased {
                relation: relation.to_string(),
                name,
            },
            Relation::Derived(sql) => TableSource::Subquery {
                sql: sql.to_string(),
                name,
            },
        }
    }

    /// Name columns of this source are qualified with
    pub fn name(&self) -> &str {
        match self {
            TableSource::Table(name) => name,
            TableSource::Aliased { name, .. } | TableSource::Subquery { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub source: TableSource,
    pub condition: JoinCondition,
}

/// Root source followed by joins in application order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromClause {
    pub root: TableSource,
    pub joins: Vec<JoinClause>,
}

/// Builder producing [`SelectStatement`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlBuilder {
    config: RenderConfig,
}

impl SqlBuilder {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }
}

impl QueryBuilder for SqlBuilder {
    type From = FromClause;
    type Query = SelectStatement;

    fn from_table(&self, root: &TableNode) -> FromClause {
        FromClause {
            root: TableSource::from_node(root),
            joins: Vec::new(),
        }
    }

    fn join(&self, mut from: FromClause, child: &TableNode, step: &JoinStep) -> FromClause {
        from.joins.push(JoinClause {
            kind: step.kind,
            source: TableSource::from_node(child),
            condition: step.condition.clone(),
        });
        from
    }

    fn finish(&self, from: FromClause, request: &SelectRequest) -> SelectStatement {
        SelectStatement {
            projections: request.projections.clone(),
            from,
            filters: request.filters.clone(),
            group_by: request.group_by.clone(),
            order_by: request.order_by.clone(),
            limit: request.limit,
            config: self.config,
        }
    }
}

/// Assembled SELECT; `Display` renders the SQL text
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub projections: Vec<Projection>,
    pub from: FromClause,
    pub filters: Vec<Filter>,
    pub group_by: Vec<ColumnRef>,
    pub order_by: Vec<(ColumnRef, SortOrder)>,
    pub limit: Option<u64>,
    config: RenderConfig,
}

impl SelectStatement {
    pub fn joins(&self) -> &[JoinClause] {
        &self.from.joins
    }

    pub fn to_sql(&self) -> String {
        self.to_string()
    }

    fn ident(&self, name: &str) -> String {
        if self.config.quote_identifiers || !is_plain(name) || is_reserved(name) {
            format!("\"{}\"", name.replace('"', "\"\""))
        } else {
            name.to_string()
        }
    }

    /// Relation names may be schema-qualified; each part is quoted on its own
    fn relation(&self, relation: &str) -> String {
        relation
            .split('.')
            .map(|part| self.ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn column(&self, column: &ColumnRef) -> String {
        format!("{}.{}", self.ident(&column.table), self.ident(&column.column))
    }

    fn source(&self, source: &TableSource) -> String {
        match source {
            TableSource::Table(name) => self.relation(name),
            TableSource::Aliased { relation, name } => {
                format!("{} AS {}", self.relation(relation), self.ident(name))
            }
            TableSource::Subquery { sql, name } => format!("({}) AS {}", sql, self.ident(name)),
        }
    }

    fn condition(&self, condition: &JoinCondition) -> String {
        match condition {
            JoinCondition::Columns(pairs) => pairs
                .iter()
                .map(|(left, right)| format!("{} = {}", self.column(left), self.column(right)))
                .collect::<Vec<_>>()
                .join(" AND "),
            JoinCondition::Expression(text) => text.clone(),
        }
    }

    fn projection(&self, projection: &Projection) -> String {
        match projection {
            Projection::Column(column) => self.column(column),
            Projection::AllColumns(table) => format!("{}.*", self.ident(table)),
            Projection::Aggregate {
                function,
                column,
                distinct,
            } => {
                let argument = match column {
                    Some(column) => self.column(column),
                    None => "*".to_string(),
                };
                let distinct = if *distinct { "DISTINCT " } else { "" };
                format!("{}({}{})", function.function_name(), distinct, argument)
            }
        }
    }

    fn filter(&self, filter: &Filter) -> String {
        let column = self.column(&filter.column);
        match (&filter.value, filter.op) {
            (Value::Float(x), CompareOp::Eq) if !x.is_finite() => format!("{} IS NULL", column),
            (Value::Float(x), CompareOp::NotEq) if !x.is_finite() => format!("{} IS NOT NULL", column),
            (Value::Null, CompareOp::Eq) => format!("{} IS NULL", column),
            (Value::Null, CompareOp::NotEq) => format!("{} IS NOT NULL", column),
            (value, op) => format!("{} {} {}", column, op.symbol(), literal(value)),
        }
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.config.pretty { "\n" } else { " " };

        let projections = if self.projections.is_empty() {
            "*".to_string()
        } else {
            self.projections
                .iter()
                .map(|p| self.projection(p))
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "SELECT {}{}FROM {}", projections, sep, self.source(&self.from.root))?;

        for join in &self.from.joins {
            write!(
                f,
                "{}{} {} ON {}",
                sep,
                join.kind.keyword(),
                self.source(&join.source),
                self.condition(&join.condition)
            )?;
        }

        if !self.filters.is_empty() {
            let filters: Vec<String> = self.filters.iter().map(|filter| self.filter(filter)).collect();
            write!(f, "{}WHERE {}", sep, filters.join(" AND "))?;
        }

        if !self.group_by.is_empty() {
            let columns: Vec<String> = self.group_by.iter().map(|c| self.column(c)).collect();
            write!(f, "{}GROUP BY {}", sep, columns.join(", "))?;
        }

        if !self.order_by.is_empty() {
            let columns: Vec<String> = self
                .order_by
                .iter()
                .map(|(c, order)| format!("{} {}", self.column(c), order))
                .collect();
            write!(f, "{}ORDER BY {}", sep, columns.join(", "))?;
        }

        if let Some(limit) = self.limit {
            write!(f, "{}LIMIT {}", sep, limit)?;
        }

        Ok(())
    }
}

fn is_plain(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Keywords that cannot stand as bare identifiers in common dialects
const RESERVED: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "check", "column", "create", "cross", "default",
    "delete", "desc", "distinct", "drop", "else", "end", "exists", "false", "foreign", "from", "full",
    "group", "having", "in", "index", "inner", "insert", "into", "is", "join", "key", "left", "like",
    "limit", "not", "null", "on", "or", "order", "outer", "primary", "references", "right", "select",
    "set", "table", "then", "true", "union", "update", "user", "values", "when", "where", "with",
];

fn is_reserved(name: &str) -> bool {
    RESERVED.iter().any(|word| word.eq_ignore_ascii_case(name))
}

/// Non-finite floats have no SQL literal and render as NULL
fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Float(x) if x.is_finite() => x.to_string(),
        Value::Float(_) => "NULL".to_string(),
        Value::Text(text) => format!("'{}'", text.replace('\'', "''")),
    }
}
