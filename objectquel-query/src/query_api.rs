use crate::ast::{Expr, Retrieve};
use crate::compiler::{SqlCompiler, SqlQuery};
use crate::decomposer::decompose;
use crate::error::Result;
use crate::executor::PlanExecutor;
use crate::parser::Parser;
use crate::visitor;
use objectquel_api::{DatabaseAdapter, EntityMetadata, Params, Row};
use std::path::PathBuf;
use tracing::{debug, info};

/// Knobs for [`prepare()`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Namespaces tried, in order, for entity names that do not resolve as
    /// written.
    pub entity_namespaces: Vec<String>,
    /// Base directory for relative `JSON_SOURCE` paths.
    pub json_source_dir: Option<PathBuf>,
    /// Log compiled SQL at `info` instead of `debug`.
    pub log_sql: bool,
}

/// One column group of the result, as declared in `RETRIEVE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub name: String,
    /// Entity name when the projection is a whole database entity.
    pub entity: Option<String>,
}

/// A parsed and analyzed ObjectQuel statement.
///
/// Created by [`prepare()`]. The statement is analyzed once and can be
/// compiled or executed any number of times with different parameters.
#[derive(Clone)]
pub struct PreparedQuery<'m> {
    retrieve: Retrieve,
    metadata: &'m dyn EntityMetadata,
    options: QueryOptions,
}

impl<'m> PreparedQuery<'m> {
    pub fn retrieve(&self) -> &Retrieve {
        &self.retrieve
    }

    pub fn is_hybrid(&self) -> bool {
        self.retrieve.is_hybrid()
    }

    pub fn projections(&self) -> Vec<Projection> {
        self.retrieve
            .values
            .iter()
            .map(|alias| {
                let entity = match &alias.expression {
                    Expr::Identifier(ident) if ident.is_entity() => ident
                        .range()
                        .and_then(|a| self.retrieve.entity_of(a))
                        .map(str::to_string),
                    _ => None,
                };
                Projection {
                    name: alias.name.clone(),
                    entity,
                }
            })
            .collect()
    }

    /// SQL for a database-only statement. Hybrid statements compile their
    /// database ranges only; use [`PreparedQuery::explain`] to see the
    /// whole plan.
    pub fn sql(&self, params: &Params) -> Result<SqlQuery> {
        let plan = decompose(&self.retrieve, params);
        let query = match plan.stages.first() {
            Some(stage) if stage.json_range().is_none() => {
                SqlCompiler::new(self.metadata).compile(&stage.query, params)?
            }
            _ => SqlCompiler::new(self.metadata).compile(&self.retrieve, params)?,
        };
        if self.options.log_sql {
            info!(sql = %query.sql, "objectquel sql");
        }
        Ok(query)
    }

    pub fn execute(&self, adapter: &mut dyn DatabaseAdapter, params: &Params) -> Result<Vec<Row>> {
        let plan = decompose(&self.retrieve, params);
        debug!(stages = plan.stages.len(), hybrid = self.is_hybrid(), "executing query");
        if self.options.log_sql {
            let compiler = SqlCompiler::new(self.metadata).lenient();
            for stage in plan.stages.iter().filter(|s| s.json_range().is_none()) {
                let query = compiler.compile(&stage.query, &stage.static_params)?;
                info!(stage = %stage.name, sql = %query.sql, "objectquel sql");
            }
        }
        PlanExecutor::new(adapter, self.metadata)
            .with_json_dir(self.options.json_source_dir.clone())
            .execute(&plan)
    }

    /// Stage-by-stage description; parameters stay as placeholders.
    pub fn explain(&self) -> Result<String> {
        let plan = decompose(&self.retrieve, &Params::new());
        plan.explain(&SqlCompiler::new(self.metadata).lenient())
    }
}

/// Parses and analyzes an ObjectQuel statement against `metadata`.
pub fn prepare<'m>(
    source: &str,
    metadata: &'m dyn EntityMetadata,
    options: &QueryOptions,
) -> Result<PreparedQuery<'m>> {
    let mut retrieve = Parser::parse(source)?;
    visitor::analyze(&mut retrieve, metadata, &options.entity_namespaces)?;
    Ok(PreparedQuery {
        retrieve,
        metadata,
        options: options.clone(),
    })
}
