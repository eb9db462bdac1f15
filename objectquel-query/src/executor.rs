//! Runs an [`ExecutionPlan`] against a database adapter and JSON sources,
//! then joins and finalizes the partial results in memory.

use crate::ast::{Alias, Expr, SortItem, Window};
use crate::compiler::SqlCompiler;
use crate::condition::{ConditionEvaluator, compare_values};
use crate::error::{Error, Result};
use crate::json_source;
use crate::plan::{ExecutionPlan, ExecutionStage, Finalization, JoinType};
use objectquel_api::{DatabaseAdapter, EntityMetadata, Params, Row, Value};
use std::cmp::Ordering;
use std::path::PathBuf;
use tracing::debug;

pub struct PlanExecutor<'a> {
    adapter: &'a mut dyn DatabaseAdapter,
    metadata: &'a dyn EntityMetadata,
    json_dir: Option<PathBuf>,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(adapter: &'a mut dyn DatabaseAdapter, metadata: &'a dyn EntityMetadata) -> Self {
        Self {
            adapter,
            metadata,
            json_dir: None,
        }
    }

    pub fn with_json_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.json_dir = dir;
        self
    }

    pub fn execute(&mut self, plan: &ExecutionPlan) -> Result<Vec<Row>> {
        let mut results: Vec<(String, Vec<Row>)> = Vec::with_capacity(plan.stages.len());
        for stage in &plan.stages {
            let rows = self
                .run_stage(stage, &results)
                .map_err(|e| e.in_stage(&stage.name))?;
            debug!(stage = %stage.name, rows = rows.len(), "stage executed");
            results.push((stage.name.clone(), rows));
        }

        let Some(main) = plan.main_stage() else {
            return Ok(Vec::new());
        };

        let mut combined = Vec::new();
        let mut rest = Vec::new();
        for ((name, rows), stage) in results.into_iter().zip(&plan.stages) {
            if name == main.name {
                combined = rows;
            } else {
                rest.push((stage, rows));
            }
        }

        for (stage, rows) in rest {
            combined = join_rows(
                combined,
                &rows,
                stage.join_type,
                stage.join_conditions.as_ref(),
                stage.output_field.as_deref(),
                &stage.static_params,
            )
            .map_err(|e| e.in_stage(&stage.name))?;
        }

        match &plan.finalization {
            Some(finalization) => {
                finalize(combined, finalization, &main.static_params)
            }
            None => Ok(combined),
        }
    }

    fn run_stage(&mut self, stage: &ExecutionStage, done: &[(String, Vec<Row>)]) -> Result<Vec<Row>> {
        let params = stage
            .static_params
            .merged(&resolve_dependent_params(stage, done)?);

        let rows = match stage.json_range() {
            Some(range) => json_source::load(range, self.json_dir.as_deref())?,
            None => {
                let query = SqlCompiler::new(self.metadata).compile(&stage.query, &params)?;
                self.adapter.execute(&query.sql, &query.params)?
            }
        };

        match &stage.result_processor {
            Some(process) => process(rows),
            None => Ok(rows),
        }
    }
}

/// Values for parameters fed by earlier stages. A named field yields the
/// list of that column; otherwise each row is passed as a map.
pub fn resolve_dependent_params(
    stage: &ExecutionStage,
    done: &[(String, Vec<Row>)],
) -> Result<Params> {
    let mut out = Params::new();
    for (param, (source, field)) in &stage.dependent_params {
        let Some((_, rows)) = done.iter().find(|(name, _)| name == source) else {
            return Err(Error::quel(format!(
                "Parameter ':{param}' depends on stage '{source}', which has not run"
            )));
        };
        let values: Vec<Value> = match field {
            Some(field) => rows
                .iter()
                .map(|r| r.get(field).cloned().unwrap_or_default())
                .collect(),
            None => rows.iter().map(|r| Value::Map(r.to_map())).collect(),
        };
        out.insert(param.clone(), Value::List(values));
    }
    Ok(out)
}

/// Joins `right` into `left`.
///
/// - cross: Cartesian product; an empty left side yields `right`
/// - inner: combined rows for which `conditions` holds
/// - left: like inner, but a left row with no match is kept once
///
/// With `output_field`, matches are nested as a list of maps under that
/// column instead of widening the row.
pub fn join_rows(
    left: Vec<Row>,
    right: &[Row],
    join_type: JoinType,
    conditions: Option<&Expr>,
    output_field: Option<&str>,
    params: &Params,
) -> Result<Vec<Row>> {
    if join_type == JoinType::Cross && left.is_empty() {
        return Ok(right.to_vec());
    }

    let evaluator = ConditionEvaluator::new(params);
    let mut out = Vec::new();
    for row in left {
        let mut matches: Vec<Row> = Vec::new();
        for candidate in right {
            let joined = row.join(candidate);
            let keep = match (join_type, conditions) {
                (JoinType::Cross, _) | (_, None) => true,
                (_, Some(cond)) => evaluator.matches(cond, &joined)?,
            };
            if keep {
                matches.push(match output_field {
                    Some(_) => candidate.clone(),
                    None => joined,
                });
            }
        }

        match output_field {
            Some(field) => {
                if matches.is_empty() && join_type == JoinType::Inner {
                    continue;
                }
                let nested = matches.iter().map(|m| Value::Map(m.to_map())).collect();
                out.push(row.with(field, Value::List(nested)));
            }
            None if matches.is_empty() => {
                if join_type == JoinType::Left {
                    out.push(row);
                }
            }
            None => out.extend(matches),
        }
    }
    Ok(out)
}

/// Sort, projection, UNIQUE and window over joined rows.
pub fn finalize(rows: Vec<Row>, finalization: &Finalization, params: &Params) -> Result<Vec<Row>> {
    let evaluator = ConditionEvaluator::new(params);
    let rows = sort_rows(rows, &finalization.sort, &evaluator)?;

    let mut projected = Vec::with_capacity(rows.len());
    for row in &rows {
        projected.push(project_row(row, &finalization.projections, &evaluator)?);
    }

    if finalization.unique {
        let mut distinct: Vec<Row> = Vec::with_capacity(projected.len());
        for row in projected {
            if !distinct.contains(&row) {
                distinct.push(row);
            }
        }
        projected = distinct;
    }

    Ok(apply_window(projected, finalization.window))
}

fn sort_rows(rows: Vec<Row>, sort: &[SortItem], evaluator: &ConditionEvaluator<'_>) -> Result<Vec<Row>> {
    if sort.is_empty() {
        return Ok(rows);
    }
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows {
        let mut keys = Vec::with_capacity(sort.len());
        for item in sort {
            keys.push(evaluator.evaluate(&item.expression, &row)?);
        }
        keyed.push((keys, row));
    }

    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), item) in a.iter().zip(b).zip(sort) {
            // Nulls sort last in either direction.
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (false, false) => compare_values(x, y).unwrap_or(Ordering::Equal),
            };
            let ord = if item.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

fn project_row(row: &Row, projections: &[Alias], evaluator: &ConditionEvaluator<'_>) -> Result<Row> {
    let mut out = Row::default();
    for alias in projections {
        match &alias.expression {
            Expr::Identifier(ident) if ident.is_entity() => {
                let prefix = format!("{}.", ident.name);
                for (key, value) in row.columns() {
                    if let Some(rest) = key.strip_prefix(&prefix) {
                        out.insert(format!("{}.{rest}", alias.name), value.clone());
                    }
                }
            }
            // The database stage already emitted aliased columns by name.
            _ => match row.get(&alias.name) {
                Some(value) => out.insert(alias.name.clone(), value.clone()),
                None => out.insert(alias.name.clone(), evaluator.evaluate(&alias.expression, row)?),
            },
        }
    }
    Ok(out)
}

fn apply_window(rows: Vec<Row>, window: Option<Window>) -> Vec<Row> {
    match window {
        Some(window) => {
            let offset = usize::try_from(window.offset()).unwrap_or(usize::MAX);
            let size = usize::try_from(window.size).unwrap_or(usize::MAX);
            rows.into_iter().skip(offset).take(size).collect()
        }
        None => rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, Identifier};

    fn people() -> Vec<Row> {
        vec![
            Row::default().with("p.id", 1).with("p.name", "Ann"),
            Row::default().with("p.id", 2).with("p.name", "Bo"),
        ]
    }

    fn orders() -> Vec<Row> {
        vec![
            Row::default().with("o.owner", 1).with("o.total", 10),
            Row::default().with("o.owner", 1).with("o.total", 5),
        ]
    }

    fn owner_matches() -> Expr {
        Expr::compare(
            Expr::Identifier(Identifier::property("o", "owner")),
            CompareOp::Eq,
            Expr::Identifier(Identifier::property("p", "id")),
        )
    }

    #[test]
    fn cross_join_is_a_cartesian_product() {
        let params = Params::new();
        let rows = join_rows(Vec::new(), &orders(), JoinType::Cross, None, None, &params).unwrap();
        assert_eq!(rows, orders());
        let rows = join_rows(people(), &[], JoinType::Cross, None, None, &params).unwrap();
        assert!(rows.is_empty());
        let rows = join_rows(people(), &orders(), JoinType::Cross, None, None, &params).unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn left_join_keeps_unmatched_rows() {
        let params = Params::new();
        let cond = owner_matches();
        let rows = join_rows(people(), &[], JoinType::Left, Some(&cond), None, &params).unwrap();
        assert_eq!(rows, people());
        let rows = join_rows(people(), &orders(), JoinType::Left, Some(&cond), None, &params).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].get("o.total"), None);
    }

    #[test]
    fn inner_join_of_disjoint_sets_is_empty() {
        let params = Params::new();
        let cond = owner_matches();
        let others = vec![Row::default().with("o.owner", 9).with("o.total", 1)];
        let rows = join_rows(people(), &others, JoinType::Inner, Some(&cond), None, &params).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn output_field_nests_matches() {
        let params = Params::new();
        let cond = owner_matches();
        let rows = join_rows(
            people(),
            &orders(),
            JoinType::Left,
            Some(&cond),
            Some("orders"),
            &params,
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        let Some(Value::List(nested)) = rows[0].get("orders") else {
            panic!("expected nested list");
        };
        assert_eq!(nested.len(), 2);
        assert_eq!(rows[1].get("orders"), Some(&Value::List(vec![])));
    }

    #[test]
    fn finalize_sorts_nulls_last_and_windows() {
        let rows = vec![
            Row::default().with("p.name", Value::Null),
            Row::default().with("p.name", "b"),
            Row::default().with("p.name", "a"),
        ];
        let name = Expr::Identifier(Identifier::property("p", "name"));
        let finalization = Finalization {
            projections: vec![Alias {
                name: "p.name".into(),
                expression: name.clone(),
                explicit: false,
            }],
            unique: false,
            sort: vec![SortItem {
                expression: name,
                descending: true,
            }],
            window: Some(Window { page: 0, size: 2 }),
        };
        let out = finalize(rows, &finalization, &Params::new()).unwrap();
        let names: Vec<_> = out.iter().map(|r| r.get("p.name").cloned()).collect();
        assert_eq!(
            names,
            vec![
                Some(Value::String("b".into())),
                Some(Value::String("a".into()))
            ]
        );
    }

    #[test]
    fn aliased_columns_are_read_by_alias() {
        let rows = vec![Row::default().with("title", "Kettle").with("s.count", 3)];
        let finalization = Finalization {
            projections: vec![
                Alias {
                    name: "title".into(),
                    expression: Expr::Identifier(Identifier::property("p", "name")),
                    explicit: true,
                },
                Alias {
                    name: "s.count".into(),
                    expression: Expr::Identifier(Identifier::property("s", "count")),
                    explicit: false,
                },
            ],
            unique: false,
            sort: Vec::new(),
            window: None,
        };
        let out = finalize(rows, &finalization, &Params::new()).unwrap();
        assert_eq!(out, vec![Row::default().with("title", "Kettle").with("s.count", 3)]);
    }

    #[test]
    fn missing_source_stage_is_an_error() {
        let stage = ExecutionStage::new("s", Default::default()).depends_on("ids", "nope", Some("p.id"));
        let err = resolve_dependent_params(&stage, &[]).unwrap_err();
        assert!(matches!(err, Error::Quel(_)));
    }

    #[test]
    fn dependent_params_collect_columns() {
        let stage = ExecutionStage::new("s", Default::default()).depends_on("ids", "people", Some("p.id"));
        let done = vec![("people".to_string(), people())];
        let params = resolve_dependent_params(&stage, &done).unwrap();
        assert_eq!(
            params.get("ids"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
    }
}
