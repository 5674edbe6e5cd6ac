//! Star Schema Join Topology
//!
//! Models star, snowflake and galaxy schemas as an explicit join tree and
//! derives the joins any selection needs.
//!
//! ## Features
//!
//! - **Explicit Topology**: every table has exactly one parent, so the join path to any table is unique
//! - **Join Inference**: joins come from the single foreign key linking two tables, or from an override
//! - **Aliases and Subqueries**: the same table can appear several times under different names
//! - **Path Resolution**: deterministic, deduplicated, root-to-leaf join plans
//! - **Detach / Compose / Merge**: derive new graphs from existing ones without mutation
//! - **Query Assembly**: drive any [`QueryBuilder`]; [`SqlBuilder`] renders SQL text
//!
//! ## Architecture
//!
//! ```text
//! sale
//! ├── product
//! │   └── category
//! ├── employee
//! │   ├── department
//! │   └── employee_location   (alias of location)
//! └── customer
//!     └── customer_location   (alias of location)
//! ```
//!
//! Selecting `department.id` from this graph joins `sale → employee` and
//! `employee → department` and nothing else.

pub mod config;
pub mod error;
pub mod graph;
pub mod query;
pub mod selectable;

pub use config::{BuildConfig, LoggingConfig, RenderConfig, StarSchemaConfig};
pub use error::{Result, SchemaError};
pub use graph::{
    ColumnRef, JoinCondition, JoinEdge, JoinKind, JoinOverride, JoinOverrides, JoinPlan, JoinStep,
    NodeKey, SchemaGraph, TableNode, Topology, TopologyNode,
};
pub use query::{
    Aggregate, CompareOp, Filter, Projection, QueryBuilder, SelectRequest, SelectStatement, SortOrder,
    SqlBuilder, Value,
};
pub use selectable::{Alias, ForeignKey, IntoSelectable, Relation, Selectable, Subquery, Table};
