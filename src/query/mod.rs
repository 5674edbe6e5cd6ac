//! Query assembly
//!
//! A [`SelectRequest`] names the columns a caller wants (plus optional
//! filters, grouping and ordering). Assembling it against a
//! [`SchemaGraph`] resolves the join plan for every table the request
//! touches and drives a [`QueryBuilder`] through it:
//!
//! 1. `from_table(root)`
//! 2. `join(from, child, step)` once per plan step, in plan order
//! 3. `finish(from, request)`
//!
//! The builder is the seam to whatever actually constructs queries.
//! [`SqlBuilder`] is a dialect-neutral reference implementation that
//! renders SQL text.

pub mod sql;

pub use sql::{FromClause, JoinClause, SelectStatement, SqlBuilder, TableSource};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::Result;
use crate::graph::{ColumnRef, JoinPlan, JoinStep, SchemaGraph, TableNode};

/// Aggregate function applied to a projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    pub fn function_name(&self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Sum => "SUM",
            Aggregate::Avg => "AVG",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }
}

/// One entry of the select list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    Column(ColumnRef),
    /// Every column of one node (`table.*`)
    AllColumns(String),
    Aggregate {
        function: Aggregate,
        /// `None` means `*`
        column: Option<ColumnRef>,
        distinct: bool,
    },
}

impl Projection {
    /// Node this projection reads from, if any
    pub fn table(&self) -> Option<&str> {
        match self {
            Projection::Column(column) => Some(&column.table),
            Projection::AllColumns(table) => Some(table),
            Projection::Aggregate { column, .. } => column.as_ref().map(|c| c.table.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::Like => "LIKE",
        }
    }
}

/// Literal compared against a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// `column op value`, combined with the other filters by AND
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: ColumnRef,
    pub op: CompareOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "ASC"),
            SortOrder::Desc => write!(f, "DESC"),
        }
    }
}

/// What a caller wants selected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectRequest {
    #[serde(default)]
    pub projections: Vec<Projection>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub group_by: Vec<ColumnRef>,
    #[serde(default)]
    pub order_by: Vec<(ColumnRef, SortOrder)>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl SelectRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request built from names: `table.column`, `table.*` or a bare table
    /// name (all of its columns). A dotted table name must use the
    /// `table.*` form, since a bare dotted name reads as `table.column`.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let projections = names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                match ColumnRef::parse(name) {
                    Some(column) if column.column == "*" => Projection::AllColumns(column.table),
                    Some(column) => Projection::Column(column),
                    None => Projection::AllColumns(name.to_string()),
                }
            })
            .collect();
        Self {
            projections,
            ..Self::default()
        }
    }

    pub fn column(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.projections.push(Projection::Column(ColumnRef::new(table, column)));
        self
    }

    pub fn all_columns(mut self, table: impl Into<String>) -> Self {
        self.projections.push(Projection::AllColumns(table.into()));
        self
    }

    pub fn aggregate(mut self, function: Aggregate, column: Option<ColumnRef>) -> Self {
        self.projections.push(Projection::Aggregate {
            function,
            column,
            distinct: false,
        });
        self
    }

    pub fn count_distinct(mut self, column: ColumnRef) -> Self {
        self.projections.push(Projection::Aggregate {
            function: Aggregate::Count,
            column: Some(column),
            distinct: true,
        });
        self
    }

    pub fn filter(mut self, column: ColumnRef, op: CompareOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column,
            op,
            value: value.into(),
        });
        self
    }

    pub fn group_by(mut self, column: ColumnRef) -> Self {
        self.group_by.push(column);
        self
    }

    pub fn order_by(mut self, column: ColumnRef, order: SortOrder) -> Self {
        self.order_by.push((column, order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Every column the request mentions outside of `table.*` projections
    pub fn referenced_columns(&self) -> impl Iterator<Item = &ColumnRef> {
        self.projections
            .iter()
            .filter_map(|p| match p {
                Projection::Column(column) => Some(column),
                Projection::Aggregate { column, .. } => column.as_ref(),
                Projection::AllColumns(_) => None,
            })
            .chain(self.filters.iter().map(|f| &f.column))
            .chain(self.group_by.iter())
            .chain(self.order_by.iter().map(|(column, _)| column))
    }

    /// Names of every node the request touches, sorted
    pub fn referenced_tables(&self) -> BTreeSet<&str> {
        self.projections
            .iter()
            .filter_map(Projection::table)
            .chain(self.referenced_columns().map(|c| c.table.as_str()))
            .collect()
    }
}

/// The query-construction collaborator driven by the assembler
pub trait QueryBuilder {
    /// Accumulated FROM clause
    type From;
    /// Finished query object handed back to the caller
    type Query;

    fn from_table(&self, root: &TableNode) -> Self::From;

    /// Join `child` onto the accumulated FROM clause
    fn join(&self, from: Self::From, child: &TableNode, step: &JoinStep) -> Self::From;

    /// Apply the selection, filters, grouping and ordering
    fn finish(&self, from: Self::From, request: &SelectRequest) -> Self::Query;
}

/// Check every reference in `request` and resolve its join plan
pub fn plan(graph: &SchemaGraph, request: &SelectRequest) -> Result<JoinPlan> {
    for table in request.referenced_tables() {
        graph.lookup(table)?;
    }
    for column in request.referenced_columns() {
        let idx = graph.lookup(&column.table)?;
        graph.graph[idx].column(&column.column)?;
    }
    graph.resolve(request.referenced_tables())
}

/// Resolve `request` against `graph` and build it with `builder`
pub fn assemble<B: QueryBuilder>(
    graph: &SchemaGraph,
    builder: &B,
    request: &SelectRequest,
) -> Result<B::Query> {
    let plan = plan(graph, request)?;
    assemble_plan(graph, builder, &plan, request)
}

/// Build `request` over an already resolved plan
pub fn assemble_plan<B: QueryBuilder>(
    graph: &SchemaGraph,
    builder: &B,
    plan: &JoinPlan,
    request: &SelectRequest,
) -> Result<B::Query> {
    let root = graph.lookup(&plan.root)?;
    let mut from = builder.from_table(&graph.graph[root]);

    for step in &plan.steps {
        let child = graph.lookup(&step.child)?;
        tracing::trace!(parent = %step.parent, child = %step.child, kind = %step.kind, "applying join");
        from = builder.join(from, &graph.graph[child], step);
    }

    Ok(builder.finish(from, request))
}

impl SchemaGraph {
    /// Join plan for everything `request` references
    pub fn plan_for(&self, request: &SelectRequest) -> Result<JoinPlan> {
        plan(self, request)
    }

    /// Assemble `request` with the reference SQL builder
    pub fn select(&self, request: &SelectRequest) -> Result<SelectStatement> {
        self.select_with(&SqlBuilder::default(), request)
    }

    /// Assemble `request` with a caller-supplied builder
    pub fn select_with<B: QueryBuilder>(&self, builder: &B, request: &SelectRequest) -> Result<B::Query> {
        assemble(self, builder, request)
    }
}
