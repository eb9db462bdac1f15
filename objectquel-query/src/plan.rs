//! Execution plans: ordered stages plus the in-memory finalization that
//! hybrid queries need after their partial results are joined.

use crate::ast::{Alias, Expr, Range, RangeJsonSource, Retrieve, SortItem, Window};
use crate::compiler::SqlCompiler;
use crate::error::Result;
use objectquel_api::{Params, Row};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    Cross,
    Inner,
    #[default]
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinType::Cross => "cross",
            JoinType::Inner => "inner",
            JoinType::Left => "left",
        })
    }
}

pub type ResultProcessor = Box<dyn Fn(Vec<Row>) -> Result<Vec<Row>>>;

/// One independently executable piece of a query.
pub struct ExecutionStage {
    pub name: String,
    pub query: Retrieve,
    pub static_params: Params,
    /// Parameter name -> (source stage, source column). Without a column
    /// the parameter receives whole rows as a list of maps.
    pub dependent_params: BTreeMap<String, (String, Option<String>)>,
    pub join_conditions: Option<Expr>,
    pub join_type: JoinType,
    pub output_field: Option<String>,
    pub result_processor: Option<ResultProcessor>,
}

impl ExecutionStage {
    pub fn new(name: impl Into<String>, query: Retrieve) -> Self {
        Self {
            name: name.into(),
            query,
            static_params: Params::new(),
            dependent_params: BTreeMap::new(),
            join_conditions: None,
            join_type: JoinType::default(),
            output_field: None,
            result_processor: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.static_params = params;
        self
    }

    pub fn depends_on(
        mut self,
        param: impl Into<String>,
        stage: impl Into<String>,
        field: Option<&str>,
    ) -> Self {
        self.dependent_params
            .insert(param.into(), (stage.into(), field.map(str::to_string)));
        self
    }

    pub fn join(mut self, join_type: JoinType, conditions: Option<Expr>) -> Self {
        self.join_type = join_type;
        self.join_conditions = conditions;
        self
    }

    pub fn nest_as(mut self, field: impl Into<String>) -> Self {
        self.output_field = Some(field.into());
        self
    }

    pub fn process_with(mut self, processor: ResultProcessor) -> Self {
        self.result_processor = Some(processor);
        self
    }

    /// The JSON range this stage loads, if it is a JSON stage.
    pub fn json_range(&self) -> Option<&RangeJsonSource> {
        match self.query.ranges.as_slice() {
            [Range::JsonSource(json)] => Some(json),
            _ => None,
        }
    }
}

impl fmt::Debug for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionStage")
            .field("name", &self.name)
            .field("query", &self.query)
            .field("static_params", &self.static_params)
            .field("dependent_params", &self.dependent_params)
            .field("join_conditions", &self.join_conditions)
            .field("join_type", &self.join_type)
            .field("output_field", &self.output_field)
            .field("result_processor", &self.result_processor.is_some())
            .finish()
    }
}

/// Post-join work: projection, UNIQUE, sort and window, applied in memory.
#[derive(Debug, Clone, Default)]
pub struct Finalization {
    pub projections: Vec<Alias>,
    pub unique: bool,
    pub sort: Vec<SortItem>,
    pub window: Option<Window>,
}

#[derive(Debug, Default)]
pub struct ExecutionPlan {
    pub stages: Vec<ExecutionStage>,
    pub finalization: Option<Finalization>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(&mut self, stage: ExecutionStage) {
        self.stages.push(stage);
    }

    pub fn stage(&self, name: &str) -> Option<&ExecutionStage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// The stage without join conditions, else the first one.
    pub fn main_stage(&self) -> Option<&ExecutionStage> {
        self.stages
            .iter()
            .find(|s| s.join_conditions.is_none())
            .or_else(|| self.stages.first())
    }

    pub fn is_single_stage(&self) -> bool {
        self.stages.len() == 1
    }

    /// Human-readable plan; database stages show their SQL with parameters
    /// left as placeholders.
    pub fn explain(&self, compiler: &SqlCompiler<'_>) -> Result<String> {
        let main = self.main_stage().map(|s| s.name.as_str());
        let mut out = String::new();
        for (i, stage) in self.stages.iter().enumerate() {
            let marker = if Some(stage.name.as_str()) == main {
                " (main)"
            } else {
                ""
            };
            let _ = writeln!(out, "stage {}: {}{}", i + 1, stage.name, marker);
            match stage.json_range() {
                Some(json) => {
                    let _ = writeln!(out, "  json source: {}", json.path);
                    if let Some(filter) = &json.filter {
                        let _ = writeln!(out, "  path: {filter}");
                    }
                    if let Some(conditions) = &stage.query.conditions {
                        let _ = writeln!(out, "  filter: {conditions}");
                    }
                }
                None => {
                    let query = compiler.compile(&stage.query, &stage.static_params)?;
                    let _ = writeln!(out, "  sql: {}", query.sql);
                }
            }
            if Some(stage.name.as_str()) != main {
                let _ = write!(out, "  join: {}", stage.join_type);
                if let Some(conditions) = &stage.join_conditions {
                    let _ = write!(out, " on {conditions}");
                }
                out.push('\n');
            }
            for (param, (source, field)) in &stage.dependent_params {
                let _ = writeln!(
                    out,
                    "  :{param} <- {source}{}",
                    field.as_deref().map(|f| format!(".{f}")).unwrap_or_default()
                );
            }
        }
        if let Some(finalization) = &self.finalization {
            let names: Vec<&str> = finalization
                .projections
                .iter()
                .map(|a| a.name.as_str())
                .collect();
            let _ = writeln!(out, "finalize: project ({})", names.join(", "));
            if finalization.unique {
                out.push_str("  unique\n");
            }
            if !finalization.sort.is_empty() {
                let keys: Vec<String> = finalization
                    .sort
                    .iter()
                    .map(|s| {
                        format!(
                            "{} {}",
                            s.expression,
                            if s.descending { "desc" } else { "asc" }
                        )
                    })
                    .collect();
                let _ = writeln!(out, "  sort: {}", keys.join(", "));
            }
            if let Some(window) = finalization.window {
                let _ = writeln!(out, "  window: {} size {}", window.page, window.size);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_stage_prefers_stage_without_join_conditions() {
        let mut plan = ExecutionPlan::new();
        plan.add_stage(
            ExecutionStage::new("json", Retrieve::default()).join(JoinType::Inner, Some(Expr::Bool(true))),
        );
        plan.add_stage(ExecutionStage::new("database", Retrieve::default()));
        assert_eq!(plan.main_stage().map(|s| s.name.as_str()), Some("database"));
    }

    #[test]
    fn main_stage_falls_back_to_first() {
        let mut plan = ExecutionPlan::new();
        plan.add_stage(
            ExecutionStage::new("a", Retrieve::default()).join(JoinType::Inner, Some(Expr::Bool(true))),
        );
        plan.add_stage(
            ExecutionStage::new("b", Retrieve::default()).join(JoinType::Inner, Some(Expr::Bool(true))),
        );
        assert_eq!(plan.main_stage().map(|s| s.name.as_str()), Some("a"));
        assert!(ExecutionPlan::new().main_stage().is_none());
    }

    #[test]
    fn debug_hides_processor_body() {
        let stage = ExecutionStage::new("s", Retrieve::default())
            .process_with(Box::new(|rows| Ok(rows)));
        let text = format!("{stage:?}");
        assert!(text.contains("result_processor: true"));
    }
}
