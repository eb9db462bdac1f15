//! ObjectQuel: a small entity query language that compiles to SQL.
//!
//! ```text
//! RANGE OF p IS App\Entity\Product;
//! RANGE OF s IS JSON_SOURCE("stock.json", "$.items");
//! RETRIEVE (p, s.count) WHERE p.sku = s.sku AND p.price > :min SORT BY p.name
//! ```
//!
//! [`prepare()`] parses and analyzes a statement; the resulting
//! [`PreparedQuery`] compiles it to SQL or executes it. Statements that mix
//! database and JSON ranges are decomposed into stages whose results are
//! joined in memory.

pub mod ast;
pub mod compiler;
pub mod condition;
pub mod decomposer;
pub mod error;
pub mod executor;
pub mod json_source;
pub mod lexer;
pub mod parser;
pub mod plan;
pub mod query_api;
pub mod visitor;

pub use compiler::{SqlCompiler, SqlQuery};
pub use error::{Error, Result};
pub use plan::{ExecutionPlan, ExecutionStage, JoinType};
pub use query_api::{PreparedQuery, Projection, QueryOptions, prepare};

/// Parses a statement without semantic analysis.
pub fn parse(source: &str) -> Result<ast::Retrieve> {
    parser::Parser::parse(source)
}
