//! Splits an analyzed statement into execution stages.
//!
//! Database-only statements become a single stage. Hybrid statements get one
//! database stage for all database ranges plus one stage per JSON range;
//! conditions spanning several sources are lifted out of the stage filters
//! and applied as join conditions instead.

use crate::ast::{Alias, Expr, Identifier, Range, Retrieve};
use crate::condition::ConditionEvaluator;
use crate::plan::{ExecutionPlan, ExecutionStage, Finalization, JoinType, ResultProcessor};
use crate::visitor::detect::referenced_ranges;
use objectquel_api::Params;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const MAIN_STAGE: &str = "main";
pub const DATABASE_STAGE: &str = "database";

pub fn json_stage_name(alias: &str) -> String {
    format!("json:{alias}")
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Source {
    Database,
    Json(String),
}

fn sources(expr: &Expr, retrieve: &Retrieve) -> BTreeSet<Source> {
    referenced_ranges(expr)
        .into_iter()
        .filter_map(|alias| match retrieve.range(&alias)? {
            Range::Database(_) => Some(Source::Database),
            Range::JsonSource(_) => Some(Source::Json(alias)),
        })
        .collect()
}

/// Keeps the parts of `expr` whose ranges all satisfy `eligible`.
///
/// AND/OR keep both sides when both are eligible, else the eligible side,
/// else nothing. Leaves without any range are eligible everywhere.
pub fn restrict(expr: &Expr, eligible: &dyn Fn(&str) -> bool) -> Option<Expr> {
    match expr {
        Expr::Logical { left, op, right } => {
            match (restrict(left, eligible), restrict(right, eligible)) {
                (Some(l), Some(r)) => Some(Expr::logical(l, *op, r)),
                (Some(side), None) | (None, Some(side)) => Some(side),
                (None, None) => None,
            }
        }
        leaf => referenced_ranges(leaf)
            .iter()
            .all(|alias| eligible(alias))
            .then(|| leaf.clone()),
    }
}

pub struct QueryDecomposer<'a> {
    retrieve: &'a Retrieve,
    params: &'a Params,
}

impl<'a> QueryDecomposer<'a> {
    pub fn new(retrieve: &'a Retrieve, params: &'a Params) -> Self {
        Self { retrieve, params }
    }

    pub fn decompose(&self) -> ExecutionPlan {
        let mut plan = ExecutionPlan::new();
        if !self.retrieve.is_hybrid() {
            plan.add_stage(
                ExecutionStage::new(MAIN_STAGE, self.retrieve.clone())
                    .with_params(self.params.clone()),
            );
            return plan;
        }

        let (local, lifted) = self.partition_conditions();
        let local_filter = Expr::and_all(local);

        if self.retrieve.database_ranges().next().is_some() {
            plan.add_stage(self.database_stage(local_filter.as_ref(), &lifted));
        }

        for json in self.retrieve.json_ranges() {
            let alias = json.alias.as_str();
            let filter = local_filter
                .as_ref()
                .and_then(|f| restrict(f, &|a| a == alias));

            let mut join_conditions: Vec<Expr> =
                lifted.get(alias).cloned().unwrap_or_default();
            let has_cross_source = !join_conditions.is_empty();
            join_conditions.extend(json.via.clone());

            let mut stage_range = json.clone();
            stage_range.via = None;
            let query = Retrieve {
                ranges: vec![Range::JsonSource(stage_range)],
                conditions: filter.clone(),
                ..Retrieve::default()
            };

            let first_stage = plan.stages.is_empty();
            let mut stage = ExecutionStage::new(json_stage_name(alias), query)
                .with_params(self.params.clone());

            if first_stage {
                // Nothing to join against yet: VIA narrows the source itself.
                let own = Expr::and_all(filter.into_iter().chain(join_conditions));
                stage.query.conditions = own.clone();
                if let Some(own) = own {
                    stage = stage.process_with(filter_processor(own, self.params.clone()));
                }
            } else {
                let join_type = if has_cross_source {
                    JoinType::Inner
                } else if json.via.is_some() {
                    JoinType::Left
                } else {
                    JoinType::Cross
                };
                stage = stage.join(join_type, Expr::and_all(join_conditions));
                if let Some(filter) = filter {
                    stage = stage.process_with(filter_processor(filter, self.params.clone()));
                }
            }
            plan.add_stage(stage);
        }

        plan.finalization = Some(Finalization {
            projections: self.retrieve.values.clone(),
            unique: self.retrieve.unique,
            sort: self.retrieve.sort.clone(),
            window: self.retrieve.window,
        });
        debug!(stages = plan.stages.len(), "decomposed hybrid query");
        plan
    }

    /// Splits WHERE into single-source conjuncts and cross-source ones,
    /// the latter keyed by the latest JSON range they reference.
    fn partition_conditions(&self) -> (Vec<Expr>, BTreeMap<String, Vec<Expr>>) {
        let mut local = Vec::new();
        let mut lifted: BTreeMap<String, Vec<Expr>> = BTreeMap::new();
        let Some(conditions) = &self.retrieve.conditions else {
            return (local, lifted);
        };

        let json_order: Vec<&str> = self
            .retrieve
            .json_ranges()
            .map(|j| j.alias.as_str())
            .collect();

        for conjunct in conditions.conjuncts() {
            let touched = sources(conjunct, self.retrieve);
            if touched.len() <= 1 {
                local.push(conjunct.clone());
                continue;
            }
            let latest = json_order
                .iter()
                .rev()
                .find(|alias| touched.contains(&Source::Json(alias.to_string())));
            match latest {
                Some(alias) => lifted
                    .entry(alias.to_string())
                    .or_default()
                    .push(conjunct.clone()),
                None => local.push(conjunct.clone()),
            }
        }
        (local, lifted)
    }

    fn database_stage(
        &self,
        local_filter: Option<&Expr>,
        lifted: &BTreeMap<String, Vec<Expr>>,
    ) -> ExecutionStage {
        let retrieve = self.retrieve;
        let is_db = |alias: &str| retrieve.database_range(alias).is_some();

        let mut values: Vec<Alias> = retrieve
            .values
            .iter()
            .filter(|a| {
                let ranges = referenced_ranges(&a.expression);
                !ranges.is_empty() && ranges.iter().all(|r| is_db(r))
            })
            .cloned()
            .collect();

        // Columns the joins, sort and the in-memory projections will read.
        let mut needed: Vec<&Expr> = lifted.values().flatten().collect();
        needed.extend(retrieve.json_ranges().filter_map(|j| j.via.as_ref()));
        needed.extend(retrieve.sort.iter().map(|s| &s.expression));
        needed.extend(
            retrieve
                .values
                .iter()
                .map(|a| &a.expression)
                .filter(|e| referenced_ranges(e).iter().any(|r| !is_db(r))),
        );

        for expr in needed {
            expr.for_each_identifier(&mut |ident| {
                let Some(alias) = ident.range() else {
                    return;
                };
                if !is_db(alias) {
                    return;
                }
                let name = if ident.is_entity() {
                    alias.to_string()
                } else {
                    ident.complete_name()
                };
                if values.iter().all(|v| v.name != name) {
                    values.push(Alias {
                        name,
                        expression: Expr::Identifier(ident.clone()),
                        explicit: false,
                    });
                }
            });
        }

        if values.is_empty() {
            for db in retrieve.database_ranges() {
                let mut ident = Identifier::new(db.alias.as_str());
                ident.range = Some(db.alias.clone());
                values.push(Alias {
                    name: db.alias.clone(),
                    expression: Expr::Identifier(ident),
                    explicit: false,
                });
            }
        }

        let query = Retrieve {
            ranges: retrieve
                .ranges
                .iter()
                .filter(|r| !r.is_json())
                .cloned()
                .collect(),
            unique: false,
            values,
            conditions: local_filter.and_then(|f| restrict(f, &is_db)),
            sort: Vec::new(),
            window: None,
        };
        ExecutionStage::new(DATABASE_STAGE, query).with_params(self.params.clone())
    }
}

fn filter_processor(filter: Expr, params: Params) -> ResultProcessor {
    Box::new(move |rows| {
        let evaluator = ConditionEvaluator::new(&params);
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if evaluator.matches(&filter, &row)? {
                kept.push(row);
            }
        }
        Ok(kept)
    })
}

/// Convenience wrapper around [`QueryDecomposer`].
pub fn decompose(retrieve: &Retrieve, params: &Params) -> ExecutionPlan {
    QueryDecomposer::new(retrieve, params).decompose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, LogicalOp};

    fn prop(alias: &str, name: &str) -> Expr {
        Expr::Identifier(Identifier::property(alias, name))
    }

    #[test]
    fn restrict_keeps_eligible_side() {
        let expr = Expr::logical(
            Expr::compare(prop("p", "price"), CompareOp::Gt, Expr::Number("1".into())),
            LogicalOp::And,
            Expr::compare(prop("j", "stock"), CompareOp::Gt, Expr::Number("0".into())),
        );
        let only_p = restrict(&expr, &|a| a == "p").unwrap();
        assert_eq!(
            only_p,
            Expr::compare(prop("p", "price"), CompareOp::Gt, Expr::Number("1".into()))
        );
        assert!(restrict(&expr, &|a| a == "x").is_none());
        assert_eq!(restrict(&expr, &|_| true), Some(expr.clone()));
    }

    #[test]
    fn range_free_leaves_are_eligible_everywhere() {
        let expr = Expr::compare(
            Expr::Parameter("flag".into()),
            CompareOp::Eq,
            Expr::Number("1".into()),
        );
        assert_eq!(restrict(&expr, &|_| false), Some(expr.clone()));
    }
}
