//! AST to SQL compilation.
//!
//! The compiler walks an analyzed [`Retrieve`] once per clause and appends
//! MySQL-flavoured SQL to a buffer. Literals are inlined; parameters stay
//! `:name` placeholders and are copied into the output parameter map.

pub mod search;
pub mod types;

use crate::ast::{
    Alias, CompareOp, Expr, FactorOp, Identifier, LogicalOp, Range, RangeDatabase, Retrieve,
    TermOp, UnaryOp,
};
use crate::error::{Error, Result};
use objectquel_api::{ColumnType, EntityMetadata, Params, Value};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;
use types::{infer_return_type, is_textual};

/// Compiled statement: SQL text and the parameters it references.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Params,
}

/// Double-quoted SQL string literal.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Converts `*`/`?` wildcards to a LIKE pattern, escaping literal `%`/`_`.
pub fn wildcard_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => out.push('%'),
            '?' => out.push('_'),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            c => out.push(c),
        }
    }
    out
}

pub fn has_wildcards(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

pub struct SqlCompiler<'a> {
    metadata: &'a dyn EntityMetadata,
    strict_params: bool,
}

impl<'a> SqlCompiler<'a> {
    pub fn new(metadata: &'a dyn EntityMetadata) -> Self {
        Self {
            metadata,
            strict_params: true,
        }
    }

    /// Leaves unbound parameters in place instead of failing (for EXPLAIN).
    pub fn lenient(mut self) -> Self {
        self.strict_params = false;
        self
    }

    /// Compiles database ranges of an analyzed statement.
    ///
    /// The same statement and parameters always produce identical output.
    pub fn compile(&self, retrieve: &Retrieve, params: &Params) -> Result<SqlQuery> {
        let mut emitter = Emitter {
            metadata: self.metadata,
            retrieve,
            input: params,
            strict: self.strict_params,
            bound: Params::new(),
            visited: HashSet::new(),
        };

        let mut sql = String::from("SELECT ");
        if retrieve.unique {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&emitter.select_list()?);

        let (from, demoted) = emitter.from_clause()?;
        sql.push_str(" FROM ");
        sql.push_str(&from);

        let mut conditions: Vec<String> = demoted;
        if let Some(where_expr) = &retrieve.conditions {
            conditions.push(emitter.clause(where_expr)?);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if let Some(group_by) = emitter.group_by()? {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_by);
        }

        if !retrieve.sort.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&emitter.order_by()?);
        }

        if let Some(window) = retrieve.window {
            sql.push_str(&format!(" LIMIT {}, {}", window.offset(), window.size));
        }

        debug!(sql = %sql, params = emitter.bound.len(), "compiled ObjectQuel retrieve");
        Ok(SqlQuery {
            sql,
            params: emitter.bound,
        })
    }
}

const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_COMPARE: u8 = 4;
const PREC_TERM: u8 = 5;
const PREC_FACTOR: u8 = 6;
const PREC_UNARY: u8 = 7;
const PREC_PRIMARY: u8 = 8;

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Logical {
            op: LogicalOp::Or, ..
        } => PREC_OR,
        Expr::Logical {
            op: LogicalOp::And, ..
        } => PREC_AND,
        Expr::Unary {
            op: UnaryOp::Not, ..
        } => PREC_NOT,
        Expr::Compare { .. }
        | Expr::In { .. }
        | Expr::CheckNull(_)
        | Expr::CheckNotNull(_)
        | Expr::Exists(_) => PREC_COMPARE,
        Expr::Term { .. } => PREC_TERM,
        Expr::Factor { .. } => PREC_FACTOR,
        Expr::Unary {
            op: UnaryOp::Negate,
            ..
        } => PREC_UNARY,
        // is_* may expand to an OR group and search always parenthesizes
        Expr::IsEmpty(_) | Expr::IsNumeric(_) | Expr::IsInteger(_) | Expr::IsFloat(_) => {
            PREC_COMPARE
        }
        _ => PREC_PRIMARY,
    }
}

struct Emitter<'a> {
    metadata: &'a dyn EntityMetadata,
    retrieve: &'a Retrieve,
    input: &'a Params,
    strict: bool,
    bound: Params,
    visited: HashSet<*const Expr>,
}

impl<'a> Emitter<'a> {
    /// Renders one top-level clause item with a fresh visited set.
    fn clause(&mut self, expr: &Expr) -> Result<String> {
        self.visited.clear();
        let mut out = String::new();
        self.expr(expr, &mut out)?;
        Ok(out)
    }

    fn select_list(&mut self) -> Result<String> {
        let retrieve = self.retrieve;
        let mut items = Vec::new();
        for alias in &retrieve.values {
            match self.entity_alias(&alias.expression)? {
                Some(db) => {
                    for (property, column) in self.metadata.column_map(&db.entity.name) {
                        items.push(format!(
                            "{}.{column} AS `{}.{property}`",
                            db.alias, alias.name
                        ));
                    }
                }
                None => {
                    let sql = self.clause(&alias.expression)?;
                    items.push(format!("{sql} AS `{}`", alias.name));
                }
            }
        }
        if items.is_empty() {
            return Err(Error::quel("RETRIEVE needs at least one projection"));
        }
        Ok(items.join(", "))
    }

    /// Database range when `expr` is a whole-entity identifier.
    fn entity_alias(&self, expr: &Expr) -> Result<Option<&'a RangeDatabase>> {
        let Some(ident) = expr.as_identifier().filter(|i| i.is_entity()) else {
            return Ok(None);
        };
        self.database_range(ident).map(Some)
    }

    fn database_range(&self, ident: &Identifier) -> Result<&'a RangeDatabase> {
        let alias = ident.range().unwrap_or(ident.name.as_str());
        match self.retrieve.range(alias) {
            Some(Range::Database(db)) => Ok(db),
            Some(Range::JsonSource(_)) => Err(Error::quel(format!(
                "'{}' refers to a JSON source and cannot be compiled to SQL",
                ident.complete_name()
            ))),
            None => Err(Error::quel(format!(
                "Unknown identifier '{}'",
                ident.complete_name()
            ))),
        }
    }

    fn table(&self, db: &RangeDatabase) -> Result<String> {
        self.metadata
            .table_name(&db.entity.name)
            .ok_or_else(|| Error::quel(format!("Entity '{}' has no table", db.entity.name)))
    }

    /// Returns the FROM/JOIN text plus VIA conditions that had to move to WHERE.
    fn from_clause(&mut self) -> Result<(String, Vec<String>)> {
        let retrieve = self.retrieve;
        let ranges: Vec<&RangeDatabase> = retrieve.database_ranges().collect();
        if ranges.is_empty() {
            return Err(Error::quel("Query has no database range"));
        }

        let mut demoted = Vec::new();
        let mut base: Vec<&RangeDatabase> = ranges.iter().copied().filter(|r| r.via.is_none()).collect();
        if base.is_empty() {
            let first = ranges[0];
            if let Some(via) = &first.via {
                demoted.push(self.clause(via)?);
            }
            base.push(first);
        }

        let mut from = Vec::new();
        for db in &base {
            from.push(format!("{} {}", self.table(db)?, db.alias));
        }
        let mut sql = from.join(", ");

        for db in ranges {
            if base.iter().any(|b| b.alias == db.alias) {
                continue;
            }
            let Some(via) = &db.via else { continue };
            let on = self.clause(via)?;
            sql.push_str(&format!(" LEFT JOIN {} {} ON {on}", self.table(db)?, db.alias));
        }
        Ok((sql, demoted))
    }

    /// GROUP BY of plain projections when they are mixed with aggregates.
    fn group_by(&mut self) -> Result<Option<String>> {
        let retrieve = self.retrieve;
        if !retrieve.has_aggregates() {
            return Ok(None);
        }
        let plain: Vec<&Alias> = retrieve
            .values
            .iter()
            .filter(|a| !crate::visitor::detect::contains_aggregate(&a.expression))
            .collect();
        if plain.is_empty() {
            return Ok(None);
        }

        let mut items = Vec::new();
        for alias in plain {
            match self.entity_alias(&alias.expression)? {
                Some(db) => {
                    for column in self.metadata.column_map(&db.entity.name).values() {
                        items.push(format!("{}.{column}", db.alias));
                    }
                }
                None => items.push(self.clause(&alias.expression)?),
            }
        }
        Ok(Some(items.join(", ")))
    }

    fn order_by(&mut self) -> Result<String> {
        let retrieve = self.retrieve;
        let mut items = Vec::new();
        for item in &retrieve.sort {
            let mut sql = self.clause(&item.expression)?;
            if let Some(column) = self.nullable_column(&item.expression) {
                let fallback = if column.is_numeric() { "0" } else { "''" };
                sql = format!("COALESCE({sql}, {fallback})");
            }
            let direction = if item.descending { "DESC" } else { "ASC" };
            items.push(format!("{sql} {direction}"));
        }
        Ok(items.join(", "))
    }

    fn nullable_column(&self, expr: &Expr) -> Option<ColumnType> {
        let ident = expr.as_identifier()?;
        let property = ident.tail_name()?;
        let db = self.database_range(ident).ok()?;
        self.metadata
            .column_definition(&db.entity.name, &property)
            .filter(|c| c.nullable)
            .map(|c| c.column_type)
    }

    fn column(&self, ident: &Identifier) -> Result<String> {
        let db = self.database_range(ident)?;
        let columns = self.metadata.column_map(&db.entity.name);
        match ident.tail_name() {
            Some(property) => columns
                .get(&property)
                .map(|column| format!("{}.{column}", db.alias))
                .ok_or_else(|| {
                    Error::quel(format!(
                        "Unknown property '{property}' on entity '{}'",
                        db.entity.name
                    ))
                }),
            None => self.primary_key_column(db),
        }
    }

    fn primary_key_column(&self, db: &RangeDatabase) -> Result<String> {
        let key = self.metadata.primary_key(&db.entity.name).ok_or_else(|| {
            Error::quel(format!("Entity '{}' has no identifier key", db.entity.name))
        })?;
        let column = self
            .metadata
            .column_map(&db.entity.name)
            .remove(&key)
            .unwrap_or(key);
        Ok(format!("{}.{column}", db.alias))
    }

    fn render(&mut self, expr: &Expr) -> Result<String> {
        let mut out = String::new();
        self.expr(expr, &mut out)?;
        Ok(out)
    }

    fn child(&mut self, expr: &Expr, min: u8, out: &mut String) -> Result<()> {
        if precedence(expr) < min {
            out.push('(');
            self.expr(expr, out)?;
            out.push(')');
            Ok(())
        } else {
            self.expr(expr, out)
        }
    }

    fn expr(&mut self, expr: &Expr, out: &mut String) -> Result<()> {
        if !self.visited.insert(expr as *const Expr) {
            return Ok(());
        }

        match expr {
            Expr::Number(text) => out.push_str(text),
            Expr::String(s) => out.push_str(&quote_string(s)),
            Expr::Bool(b) => out.push_str(if *b { "1" } else { "0" }),
            Expr::Null => out.push_str("NULL"),
            Expr::Parameter(name) => self.parameter(name, out)?,
            Expr::Identifier(ident) => out.push_str(&self.column(ident)?),
            Expr::Compare { left, op, right } => self.comparison(left, *op, right, out)?,
            Expr::Logical { left, op, right } => {
                let (prec, keyword) = match op {
                    LogicalOp::And => (PREC_AND, " AND "),
                    LogicalOp::Or => (PREC_OR, " OR "),
                };
                self.child(left, prec, out)?;
                out.push_str(keyword);
                self.child(right, prec, out)?;
            }
            Expr::Term { left, op, right } => {
                self.child(left, PREC_TERM, out)?;
                out.push_str(match op {
                    TermOp::Add => " + ",
                    TermOp::Subtract => " - ",
                });
                self.child(right, PREC_FACTOR, out)?;
            }
            Expr::Factor { left, op, right } => {
                self.child(left, PREC_FACTOR, out)?;
                out.push_str(match op {
                    FactorOp::Multiply => " * ",
                    FactorOp::Divide => " / ",
                });
                self.child(right, PREC_UNARY, out)?;
            }
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                out.push_str("NOT ");
                self.child(operand, PREC_COMPARE, out)?;
            }
            Expr::Unary {
                op: UnaryOp::Negate,
                operand,
            } => {
                out.push('-');
                self.child(operand, PREC_PRIMARY, out)?;
            }
            Expr::In { operand, list } => {
                self.child(operand, PREC_TERM, out)?;
                out.push_str(" IN(");
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.expr(item, out)?;
                }
                out.push(')');
            }
            Expr::CheckNull(operand) => {
                self.child(operand, PREC_TERM, out)?;
                out.push_str(" IS NULL");
            }
            Expr::CheckNotNull(operand) => {
                self.child(operand, PREC_TERM, out)?;
                out.push_str(" IS NOT NULL");
            }
            Expr::Count(operand) => {
                let inner = self.aggregate_operand(operand)?;
                out.push_str(&format!("COUNT({inner})"));
            }
            Expr::UCount(operand) => {
                let inner = self.aggregate_operand(operand)?;
                out.push_str(&format!("COUNT(DISTINCT {inner})"));
            }
            Expr::Concat(items) => {
                out.push_str("CONCAT(");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.expr(item, out)?;
                }
                out.push(')');
            }
            Expr::Search { columns, query } => self.search(columns, query, out)?,
            Expr::RegExp { .. } => {
                return Err(Error::quel(
                    "Regular expression used outside a comparison",
                ));
            }
            Expr::IsEmpty(operand) => self.is_empty(operand, out)?,
            Expr::IsNumeric(operand) => self.is_numeric(operand, out)?,
            Expr::IsInteger(operand) => self.is_integer(operand, out)?,
            Expr::IsFloat(operand) => self.is_float(operand, out)?,
            Expr::Exists(operand) => {
                let inner = self.aggregate_operand(operand)?;
                out.push_str(&format!("{inner} IS NOT NULL"));
            }
            Expr::MethodCall { target, method, .. } => {
                let column = self.column(target)?;
                let function = match method.as_str() {
                    "lower" => "LOWER",
                    "upper" => "UPPER",
                    "length" => "CHAR_LENGTH",
                    "trim" => "TRIM",
                    other => {
                        return Err(Error::quel(format!("Unknown method '{other}'")));
                    }
                };
                out.push_str(&format!("{function}({column})"));
            }
        }
        Ok(())
    }

    fn parameter(&mut self, name: &str, out: &mut String) -> Result<()> {
        match self.input.get(name) {
            Some(value) => self.bound.insert(name, value.clone()),
            None if self.strict => {
                return Err(Error::quel(format!("Unbound parameter ':{name}'")));
            }
            None => {}
        }
        out.push(':');
        out.push_str(name);
        Ok(())
    }

    fn comparison(&mut self, left: &Expr, op: CompareOp, right: &Expr, out: &mut String) -> Result<()> {
        let pattern_match = matches!(op, CompareOp::Eq | CompareOp::NotEq);
        let negated = op == CompareOp::NotEq;

        match right {
            Expr::RegExp { pattern, flags } if pattern_match => {
                self.child(left, PREC_TERM, out)?;
                out.push_str(if negated { " NOT REGEXP " } else { " REGEXP " });
                let pattern = if flags.contains('i') {
                    format!("(?i){pattern}")
                } else {
                    pattern.clone()
                };
                out.push_str(&quote_string(&pattern));
            }
            Expr::RegExp { .. } => {
                return Err(Error::quel(
                    "Regular expressions can only be compared with = or <>",
                ));
            }
            Expr::String(s) if pattern_match && has_wildcards(s) => {
                self.child(left, PREC_TERM, out)?;
                out.push_str(if negated { " NOT LIKE " } else { " LIKE " });
                out.push_str(&quote_string(&wildcard_to_like(s)));
            }
            _ => {
                self.child(left, PREC_TERM, out)?;
                out.push(' ');
                out.push_str(op.as_sql());
                out.push(' ');
                self.child(right, PREC_TERM, out)?;
            }
        }
        Ok(())
    }

    /// Column for count/ucount/exists: the primary key for whole entities.
    fn aggregate_operand(&mut self, operand: &Expr) -> Result<String> {
        match self.entity_alias(operand)? {
            Some(db) => self.primary_key_column(db),
            None => self.render(operand),
        }
    }

    fn search(&mut self, columns: &[Expr], query: &Expr, out: &mut String) -> Result<()> {
        let text = match query {
            Expr::String(s) => s.clone(),
            Expr::Parameter(name) => match self.input.get(name) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => return Err(Error::quel(format!("Unbound parameter ':{name}'"))),
            },
            _ => {
                return Err(Error::quel(
                    "search() expects a string or parameter as its last argument",
                ));
            }
        };
        let mut rendered = Vec::with_capacity(columns.len());
        for column in columns {
            rendered.push(self.render(column)?);
        }
        let terms = search::parse_search_query(&text);
        out.push_str(&search::search_condition(&rendered, &terms));
        Ok(())
    }

    /// Literal operand value, looking through parameters.
    fn literal(&self, expr: &Expr) -> Option<Value> {
        match expr {
            Expr::Number(text) => Some(
                text.parse::<i64>()
                    .map(Value::Int)
                    .unwrap_or_else(|_| Value::Float(text.parse().unwrap_or(0.0))),
            ),
            Expr::String(s) => Some(Value::String(s.clone())),
            Expr::Bool(b) => Some(Value::Bool(*b)),
            Expr::Null => Some(Value::Null),
            Expr::Parameter(name) => self.input.get(name).cloned(),
            _ => None,
        }
    }

    fn flag(out: &mut String, value: bool) {
        out.push_str(if value { "1" } else { "0" });
    }

    fn is_empty(&mut self, operand: &Expr, out: &mut String) -> Result<()> {
        if let Some(value) = self.literal(operand) {
            let empty = match &value {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                Value::Int(i) => *i == 0,
                Value::Float(f) => *f == 0.0,
                Value::Bool(b) => !b,
                Value::List(l) => l.is_empty(),
                Value::Map(m) => m.is_empty(),
                Value::DateTime(_) => false,
            };
            Self::flag(out, empty);
            return Ok(());
        }
        let column_type = infer_return_type(operand, self.retrieve, self.metadata);
        let sql = self.render(operand)?;
        if column_type.is_some_and(ColumnType::is_numeric) {
            out.push_str(&format!("({sql} IS NULL OR {sql} = 0)"));
        } else if is_textual(column_type) {
            out.push_str(&format!("({sql} IS NULL OR {sql} = \"\")"));
        } else {
            out.push_str(&format!("{sql} IS NULL"));
        }
        Ok(())
    }

    fn is_numeric(&mut self, operand: &Expr, out: &mut String) -> Result<()> {
        if let Some(value) = self.literal(operand) {
            let numeric = match &value {
                Value::Int(_) | Value::Float(_) => true,
                Value::String(s) => s.trim().parse::<f64>().is_ok(),
                _ => false,
            };
            Self::flag(out, numeric);
            return Ok(());
        }
        self.type_check(
            operand,
            out,
            |t| t.is_numeric(),
            |_| false,
            r"^-?[0-9]+(\.[0-9]+)?$",
        )
    }

    fn is_integer(&mut self, operand: &Expr, out: &mut String) -> Result<()> {
        if let Some(value) = self.literal(operand) {
            let integer = match &value {
                Value::Int(_) => true,
                Value::String(s) => s.trim().parse::<i64>().is_ok(),
                _ => false,
            };
            Self::flag(out, integer);
            return Ok(());
        }
        let column_type = infer_return_type(operand, self.retrieve, self.metadata);
        if let Some(ColumnType::Float | ColumnType::Decimal) = column_type {
            let sql = self.render(operand)?;
            out.push_str(&format!("({sql} IS NOT NULL AND {sql} = FLOOR({sql}))"));
            return Ok(());
        }
        self.type_check(operand, out, ColumnType::is_integral, |_| false, r"^-?[0-9]+$")
    }

    fn is_float(&mut self, operand: &Expr, out: &mut String) -> Result<()> {
        if let Some(value) = self.literal(operand) {
            let float = match &value {
                Value::Float(_) => true,
                Value::String(s) => s.contains('.') && s.trim().parse::<f64>().is_ok(),
                _ => false,
            };
            Self::flag(out, float);
            return Ok(());
        }
        self.type_check(
            operand,
            out,
            |t| matches!(t, ColumnType::Float | ColumnType::Decimal),
            ColumnType::is_integral,
            r"^-?[0-9]+\.[0-9]+$",
        )
    }

    /// Shared tail of the `is_*` checks: `IS NOT NULL` when the static type
    /// satisfies the check, `0` when it rules it out, a `REGEXP` test for
    /// text, and `0` for anything else.
    fn type_check(
        &mut self,
        operand: &Expr,
        out: &mut String,
        satisfies: impl Fn(ColumnType) -> bool,
        excludes: impl Fn(ColumnType) -> bool,
        text_pattern: &str,
    ) -> Result<()> {
        let column_type = infer_return_type(operand, self.retrieve, self.metadata);
        match column_type {
            Some(t) if satisfies(t) => {
                let sql = self.render(operand)?;
                out.push_str(&format!("{sql} IS NOT NULL"));
            }
            Some(t) if excludes(t) => Self::flag(out, false),
            t if is_textual(t) => {
                let sql = self.render(operand)?;
                out.push_str(&format!("{sql} REGEXP {}", quote_string(text_pattern)));
            }
            _ => Self::flag(out, false),
        }
        Ok(())
    }
}
