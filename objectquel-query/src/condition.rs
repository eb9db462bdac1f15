//! In-memory evaluation of expressions against result rows.
//!
//! Rows are keyed by `alias.property[.sub]`; this is what JSON stages
//! produce and what entity projections expand to.

use crate::ast::{CompareOp, Expr, FactorOp, LogicalOp, TermOp, UnaryOp};
use crate::compiler::{has_wildcards, search};
use crate::error::{Error, Result};
use objectquel_api::{Params, Row, Value};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub struct ConditionEvaluator<'a> {
    params: &'a Params,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self { params }
    }

    /// Evaluates a condition; NULL counts as false.
    pub fn matches(&self, expr: &Expr, row: &Row) -> Result<bool> {
        Ok(self.evaluate(expr, row)?.is_truthy())
    }

    pub fn evaluate(&self, expr: &Expr, row: &Row) -> Result<Value> {
        match expr {
            Expr::Number(text) => Ok(parse_number(text)),
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Parameter(name) => self
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| Error::quel(format!("Unbound parameter ':{name}'"))),
            Expr::Identifier(ident) => Ok(lookup(row, &ident.complete_name())),
            Expr::Compare { left, op, right } => self.compare(left, *op, right, row),
            Expr::Logical { left, op, right } => {
                let l = self.matches(left, row)?;
                let result = match op {
                    LogicalOp::And => l && self.matches(right, row)?,
                    LogicalOp::Or => l || self.matches(right, row)?,
                };
                Ok(Value::Bool(result))
            }
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(Value::Bool(!self.matches(operand, row)?)),
            Expr::Unary {
                op: UnaryOp::Negate,
                operand,
            } => Ok(match self.evaluate(operand, row)? {
                Value::Int(i) => Value::Int(-i),
                Value::Float(f) => Value::Float(-f),
                other => other.as_f64().map(|f| Value::Float(-f)).unwrap_or(Value::Null),
            }),
            Expr::Term { left, op, right } => {
                let l = self.evaluate(left, row)?;
                let r = self.evaluate(right, row)?;
                Ok(match op {
                    TermOp::Add => arithmetic(&l, &r, i64::checked_add, |a, b| a + b),
                    TermOp::Subtract => arithmetic(&l, &r, i64::checked_sub, |a, b| a - b),
                })
            }
            Expr::Factor { left, op, right } => {
                let l = self.evaluate(left, row)?;
                let r = self.evaluate(right, row)?;
                Ok(match op {
                    FactorOp::Multiply => arithmetic(&l, &r, i64::checked_mul, |a, b| a * b),
                    FactorOp::Divide => match (l.as_f64(), r.as_f64()) {
                        (Some(_), Some(b)) if b == 0.0 => Value::Null,
                        (Some(a), Some(b)) => Value::Float(a / b),
                        _ => Value::Null,
                    },
                })
            }
            Expr::In { operand, list } => {
                let value = self.evaluate(operand, row)?;
                if value.is_null() {
                    return Ok(Value::Bool(false));
                }
                for item in list {
                    let candidate = self.evaluate(item, row)?;
                    let hit = match &candidate {
                        Value::List(items) => items.iter().any(|c| values_equal(&value, c)),
                        c => values_equal(&value, c),
                    };
                    if hit {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::CheckNull(operand) => Ok(Value::Bool(self.evaluate(operand, row)?.is_null())),
            Expr::CheckNotNull(operand) => {
                Ok(Value::Bool(!self.evaluate(operand, row)?.is_null()))
            }
            Expr::Concat(items) => {
                let mut out = String::new();
                for item in items {
                    match self.evaluate(item, row)? {
                        Value::Null => return Ok(Value::Null),
                        v => out.push_str(&v.to_string()),
                    }
                }
                Ok(Value::String(out))
            }
            Expr::IsEmpty(operand) => {
                let value = self.evaluate(operand, row)?;
                Ok(Value::Bool(match &value {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    Value::Int(i) => *i == 0,
                    Value::Float(f) => *f == 0.0,
                    Value::Bool(b) => !b,
                    Value::List(l) => l.is_empty(),
                    Value::Map(m) => m.is_empty(),
                    Value::DateTime(_) => false,
                }))
            }
            Expr::IsNumeric(operand) => Ok(Value::Bool(match self.evaluate(operand, row)? {
                Value::Int(_) | Value::Float(_) => true,
                Value::String(s) => s.trim().parse::<f64>().is_ok(),
                _ => false,
            })),
            Expr::IsInteger(operand) => Ok(Value::Bool(match self.evaluate(operand, row)? {
                Value::Int(_) => true,
                Value::String(s) => s.trim().parse::<i64>().is_ok(),
                _ => false,
            })),
            Expr::IsFloat(operand) => Ok(Value::Bool(match self.evaluate(operand, row)? {
                Value::Float(_) => true,
                Value::String(s) => s.contains('.') && s.trim().parse::<f64>().is_ok(),
                _ => false,
            })),
            Expr::Exists(operand) => Ok(Value::Bool(!self.evaluate(operand, row)?.is_null())),
            Expr::RegExp { .. } => Err(Error::quel(
                "Regular expression used outside a comparison",
            )),
            Expr::Count(_) | Expr::UCount(_) => Err(Error::quel(
                "Aggregates cannot be evaluated in memory",
            )),
            Expr::Search { .. } => Err(Error::quel("search() cannot be evaluated in memory")),
            Expr::MethodCall { method, .. } => Err(Error::quel(format!(
                "Method '{method}' cannot be evaluated in memory"
            ))),
        }
    }

    fn compare(&self, left: &Expr, op: CompareOp, right: &Expr, row: &Row) -> Result<Value> {
        let value = self.evaluate(left, row)?;
        let pattern_match = matches!(op, CompareOp::Eq | CompareOp::NotEq);

        if let Expr::RegExp { pattern, flags } = right {
            if !pattern_match {
                return Err(Error::quel(
                    "Regular expressions can only be compared with = or <>",
                ));
            }
            if value.is_null() {
                return Ok(Value::Bool(false));
            }
            let regex = compile_regex(pattern, flags)?;
            let hit = regex.is_match(&value.to_string());
            return Ok(Value::Bool(hit == (op == CompareOp::Eq)));
        }

        if let Expr::String(s) = right
            && pattern_match
            && has_wildcards(s)
        {
            if value.is_null() {
                return Ok(Value::Bool(false));
            }
            let hit = wildcard_regex(s)?.is_match(&value.to_string());
            return Ok(Value::Bool(hit == (op == CompareOp::Eq)));
        }

        let other = self.evaluate(right, row)?;
        if value.is_null() || other.is_null() {
            return Ok(Value::Bool(false));
        }
        let result = match op {
            CompareOp::Eq => values_equal(&value, &other),
            CompareOp::NotEq => !values_equal(&value, &other),
            CompareOp::Lt => compare_values(&value, &other) == Some(Ordering::Less),
            CompareOp::LtEq => matches!(
                compare_values(&value, &other),
                Some(Ordering::Less | Ordering::Equal)
            ),
            CompareOp::Gt => compare_values(&value, &other) == Some(Ordering::Greater),
            CompareOp::GtEq => matches!(
                compare_values(&value, &other),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        };
        Ok(Value::Bool(result))
    }
}

fn parse_number(text: &str) -> Value {
    match text.parse::<i64>() {
        Ok(i) => Value::Int(i),
        Err(_) => text.parse::<f64>().map(Value::Float).unwrap_or(Value::Null),
    }
}

/// Row lookup by key. A bare alias with no exact column collects its
/// `alias.*` columns into a map.
fn lookup(row: &Row, key: &str) -> Value {
    if let Some(value) = row.get(key) {
        return value.clone();
    }
    let prefix = format!("{key}.");
    let nested: BTreeMap<String, Value> = row
        .columns()
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|rest| (rest.to_string(), v.clone())))
        .collect();
    if nested.is_empty() || nested.values().all(Value::is_null) {
        Value::Null
    } else {
        Value::Map(nested)
    }
}

fn arithmetic(
    l: &Value,
    r: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => int_op(*a, *b)
            .map(Value::Int)
            .unwrap_or_else(|| Value::Float(float_op(*a as f64, *b as f64))),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) if !l.is_null() && !r.is_null() => Value::Float(float_op(a, b)),
            _ => Value::Null,
        },
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        _ if a.is_numeric() || b.is_numeric() => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => a == b,
    }
}

/// Ordering used by comparisons and in-memory sorting. Mixed numeric types
/// compare by value; incomparable pairs yield `None`.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        _ if a.is_numeric() || b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

fn compile_regex(pattern: &str, flags: &str) -> Result<Regex> {
    let mut prefix = String::new();
    for flag in ['i', 'm', 's', 'x'] {
        if flags.contains(flag) {
            prefix.push(flag);
        }
    }
    let source = if prefix.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{prefix}){pattern}")
    };
    Regex::new(&source).map_err(|e| Error::quel(format!("Invalid regular expression: {e}")))
}

fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            c => source.push_str(&regex::escape(&c.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| Error::quel(format!("Invalid wildcard pattern: {e}")))
}

/// Same term semantics as the SQL `search()` expansion, for callers that
/// need to check a single string.
pub fn search_matches(haystack: &str, query: &str) -> bool {
    let terms = search::parse_search_query(query);
    let text = haystack.to_lowercase();
    let has = |t: &String| text.contains(&t.to_lowercase());
    terms.required.iter().all(has)
        && !terms.excluded.iter().any(has)
        && (terms.optional.is_empty() || terms.optional.iter().any(has))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Identifier;

    fn ident(path: &str) -> Expr {
        let parts: Vec<&str> = path.split('.').collect();
        let mut ident = Identifier::from_parts(&parts);
        ident.range = Some(parts[0].to_string());
        Expr::Identifier(ident)
    }

    fn row() -> Row {
        Row::default()
            .with("p.name", "Widget")
            .with("p.price", 12)
            .with("p.discount", Value::Null)
            .with("j.rating", 4.5)
    }

    #[test]
    fn comparisons_mix_numeric_types() {
        let params = Params::new();
        let eval = ConditionEvaluator::new(&params);
        let gt = Expr::compare(ident("j.rating"), CompareOp::Gt, Expr::Number("4".into()));
        assert!(eval.matches(&gt, &row()).unwrap());
        let eq = Expr::compare(ident("p.price"), CompareOp::Eq, Expr::Number("12.0".into()));
        assert!(eval.matches(&eq, &row()).unwrap());
    }

    #[test]
    fn null_never_compares_true() {
        let params = Params::new();
        let eval = ConditionEvaluator::new(&params);
        let ne = Expr::compare(ident("p.discount"), CompareOp::NotEq, Expr::Number("1".into()));
        assert!(!eval.matches(&ne, &row()).unwrap());
        assert!(eval.matches(&Expr::CheckNull(Box::new(ident("p.discount"))), &row()).unwrap());
    }

    #[test]
    fn wildcard_and_regex_matching() {
        let params = Params::new();
        let eval = ConditionEvaluator::new(&params);
        let like = Expr::compare(ident("p.name"), CompareOp::Eq, Expr::String("Wid*".into()));
        assert!(eval.matches(&like, &row()).unwrap());
        let not_like = Expr::compare(ident("p.name"), CompareOp::NotEq, Expr::String("Wid*".into()));
        assert!(!eval.matches(&not_like, &row()).unwrap());
        let re = Expr::compare(
            ident("p.name"),
            CompareOp::Eq,
            Expr::RegExp {
                pattern: "^widget$".into(),
                flags: "i".into(),
            },
        );
        assert!(eval.matches(&re, &row()).unwrap());
    }

    #[test]
    fn parameters_and_arithmetic() {
        let params = Params::new().with("min", 20);
        let eval = ConditionEvaluator::new(&params);
        let doubled = Expr::Factor {
            left: Box::new(ident("p.price")),
            op: FactorOp::Multiply,
            right: Box::new(Expr::Number("2".into())),
        };
        assert_eq!(eval.evaluate(&doubled, &row()).unwrap(), Value::Int(24));
        let cond = Expr::compare(doubled, CompareOp::GtEq, Expr::Parameter("min".into()));
        assert!(eval.matches(&cond, &row()).unwrap());
        let unbound = Expr::Parameter("missing".into());
        assert!(matches!(eval.evaluate(&unbound, &row()), Err(Error::Quel(_))));
    }

    #[test]
    fn aggregates_are_rejected() {
        let params = Params::new();
        let eval = ConditionEvaluator::new(&params);
        let count = Expr::Count(Box::new(ident("p")));
        assert!(matches!(eval.evaluate(&count, &row()), Err(Error::Quel(_))));
    }

    #[test]
    fn bare_alias_collects_columns() {
        let value = lookup(&row(), "p");
        let Value::Map(map) = value else {
            panic!("expected map");
        };
        assert_eq!(map["name"], Value::String("Widget".into()));
    }

    #[test]
    fn search_semantics_in_memory() {
        assert!(search_matches("Fresh green tea", "+tea -coffee"));
        assert!(!search_matches("tea and coffee", "+tea -coffee"));
        assert!(search_matches("apple pie", "apple pear"));
    }
}
