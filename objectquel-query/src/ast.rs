use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::ControlFlow;

/// A dotted property path (`alias.prop.sub`), stored as a singly linked chain.
///
/// Only the head carries the range binding, and it refers to the range by
/// alias rather than owning it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub next: Option<Box<Identifier>>,
    pub range: Option<String>,
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next: None,
            range: None,
        }
    }

    /// Builds a chain from its parts; `parts` must not be empty.
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> Self {
        let mut iter = parts.iter().rev();
        let mut current = Identifier::new(iter.next().map(|s| s.as_ref()).unwrap_or_default());
        for part in iter {
            let mut head = Identifier::new(part.as_ref());
            head.set_next(current);
            current = head;
        }
        current
    }

    /// Bound identifier `alias.property`.
    pub fn property(alias: &str, property: &str) -> Self {
        let mut ident = Identifier::from_parts(&[alias, property]);
        ident.range = Some(alias.to_string());
        ident
    }

    pub fn set_next(&mut self, next: Identifier) {
        self.next = Some(Box::new(next));
    }

    pub fn parts(&self) -> Vec<&str> {
        let mut out = vec![self.name.as_str()];
        let mut cur = self.next.as_deref();
        while let Some(ident) = cur {
            out.push(&ident.name);
            cur = ident.next.as_deref();
        }
        out
    }

    /// `alias.prop.sub`.
    pub fn complete_name(&self) -> String {
        self.parts().join(".")
    }

    /// Everything after the head (`prop.sub`), if any.
    pub fn tail_name(&self) -> Option<String> {
        self.next.as_ref().map(|n| n.complete_name())
    }

    pub fn depth(&self) -> usize {
        1 + self.next.as_ref().map_or(0, |n| n.depth())
    }

    /// Single-part chain bound to a range, i.e. the whole entity.
    pub fn is_entity(&self) -> bool {
        self.next.is_none() && self.range.is_some()
    }

    pub fn range(&self) -> Option<&str> {
        self.range.as_deref()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TermOp {
    Add,
    Subtract,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FactorOp {
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Expr {
    /// Raw source text.
    Number(String),
    String(String),
    Bool(bool),
    Null,
    Parameter(String),
    Identifier(Identifier),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    Term {
        left: Box<Expr>,
        op: TermOp,
        right: Box<Expr>,
    },
    Factor {
        left: Box<Expr>,
        op: FactorOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    In {
        operand: Box<Expr>,
        list: Vec<Expr>,
    },
    CheckNull(Box<Expr>),
    CheckNotNull(Box<Expr>),
    Count(Box<Expr>),
    UCount(Box<Expr>),
    Concat(Vec<Expr>),
    Search {
        columns: Vec<Expr>,
        query: Box<Expr>,
    },
    RegExp {
        pattern: String,
        flags: String,
    },
    IsEmpty(Box<Expr>),
    IsNumeric(Box<Expr>),
    IsInteger(Box<Expr>),
    IsFloat(Box<Expr>),
    Exists(Box<Expr>),
    MethodCall {
        target: Identifier,
        method: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn ident(ident: Identifier) -> Self {
        Expr::Identifier(ident)
    }

    pub fn compare(left: Expr, op: CompareOp, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn logical(left: Expr, op: LogicalOp, right: Expr) -> Self {
        Expr::Logical {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// ANDs a list of conditions; `None` when the list is empty.
    pub fn and_all(conditions: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        conditions
            .into_iter()
            .reduce(|acc, next| Expr::logical(acc, LogicalOp::And, next))
    }

    /// Splits top-level ANDs into their conjuncts.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::Logical {
                left,
                op: LogicalOp::And,
                right,
            } => {
                let mut out = left.conjuncts();
                out.extend(right.conjuncts());
                out
            }
            other => vec![other],
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expr::Count(_) | Expr::UCount(_))
    }

    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            Expr::Identifier(ident) => Some(ident),
            _ => None,
        }
    }

    /// Direct children, left to right.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Number(_)
            | Expr::String(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Parameter(_)
            | Expr::Identifier(_)
            | Expr::RegExp { .. } => Vec::new(),
            Expr::Compare { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Term { left, right, .. }
            | Expr::Factor { left, right, .. } => vec![&**left, &**right],
            Expr::Unary { operand, .. } => vec![&**operand],
            Expr::In { operand, list } => {
                let mut out: Vec<&Expr> = vec![&**operand];
                out.extend(list.iter());
                out
            }
            Expr::CheckNull(e)
            | Expr::CheckNotNull(e)
            | Expr::Count(e)
            | Expr::UCount(e)
            | Expr::IsEmpty(e)
            | Expr::IsNumeric(e)
            | Expr::IsInteger(e)
            | Expr::IsFloat(e)
            | Expr::Exists(e) => vec![&**e],
            Expr::Concat(items) => items.iter().collect(),
            Expr::Search { columns, query } => {
                let mut out: Vec<&Expr> = columns.iter().collect();
                out.push(&**query);
                out
            }
            Expr::MethodCall { args, .. } => args.iter().collect(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Number(_)
            | Expr::String(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Parameter(_)
            | Expr::Identifier(_)
            | Expr::RegExp { .. } => Vec::new(),
            Expr::Compare { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Term { left, right, .. }
            | Expr::Factor { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Expr::Unary { operand, .. } => vec![operand.as_mut()],
            Expr::In { operand, list } => {
                let mut out: Vec<&mut Expr> = vec![operand.as_mut()];
                out.extend(list.iter_mut());
                out
            }
            Expr::CheckNull(e)
            | Expr::CheckNotNull(e)
            | Expr::Count(e)
            | Expr::UCount(e)
            | Expr::IsEmpty(e)
            | Expr::IsNumeric(e)
            | Expr::IsInteger(e)
            | Expr::IsFloat(e)
            | Expr::Exists(e) => vec![e.as_mut()],
            Expr::Concat(items) => items.iter_mut().collect(),
            Expr::Search { columns, query } => {
                let mut out: Vec<&mut Expr> = columns.iter_mut().collect();
                out.push(query.as_mut());
                out
            }
            Expr::MethodCall { args, .. } => args.iter_mut().collect(),
        }
    }

    /// Pre-order walk that stops as soon as `f` breaks.
    pub fn walk<B>(&self, f: &mut impl FnMut(&Expr) -> ControlFlow<B>) -> ControlFlow<B> {
        f(self)?;
        for child in self.children() {
            child.walk(f)?;
        }
        ControlFlow::Continue(())
    }

    /// Visits every identifier chain head, including method-call targets.
    pub fn for_each_identifier(&self, f: &mut impl FnMut(&Identifier)) {
        let _ = self.walk(&mut |e| {
            match e {
                Expr::Identifier(ident) => f(ident),
                Expr::MethodCall { target, .. } => f(target),
                _ => {}
            }
            ControlFlow::<()>::Continue(())
        });
    }

    pub fn for_each_identifier_mut(&mut self, f: &mut impl FnMut(&mut Identifier)) {
        match self {
            Expr::Identifier(ident) => f(ident),
            Expr::MethodCall { target, args, .. } => {
                f(target);
                for arg in args {
                    arg.for_each_identifier_mut(f);
                }
            }
            other => {
                for child in other.children_mut() {
                    child.for_each_identifier_mut(f);
                }
            }
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.complete_name())
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// ObjectQuel surface syntax, fully parenthesized. Used by plan explain
/// output and diagnostics.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(text) => f.write_str(text),
            Expr::String(s) => write!(f, "{s:?}"),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Null => f.write_str("null"),
            Expr::Parameter(name) => write!(f, ":{name}"),
            Expr::Identifier(ident) => write!(f, "{ident}"),
            Expr::Compare { left, op, right } => {
                let op = match op {
                    CompareOp::NotEq => "<>",
                    other => other.as_sql(),
                };
                write!(f, "({left} {op} {right})")
            }
            Expr::Logical { left, op, right } => {
                let op = match op {
                    LogicalOp::And => "AND",
                    LogicalOp::Or => "OR",
                };
                write!(f, "({left} {op} {right})")
            }
            Expr::Term { left, op, right } => {
                let op = match op {
                    TermOp::Add => "+",
                    TermOp::Subtract => "-",
                };
                write!(f, "({left} {op} {right})")
            }
            Expr::Factor { left, op, right } => {
                let op = match op {
                    FactorOp::Multiply => "*",
                    FactorOp::Divide => "/",
                };
                write!(f, "({left} {op} {right})")
            }
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => write!(f, "NOT {operand}"),
            Expr::Unary {
                op: UnaryOp::Negate,
                operand,
            } => write!(f, "-{operand}"),
            Expr::In { operand, list } => {
                write!(f, "{operand} IN (")?;
                write_list(f, list)?;
                f.write_str(")")
            }
            Expr::CheckNull(e) => write!(f, "{e} IS NULL"),
            Expr::CheckNotNull(e) => write!(f, "{e} IS NOT NULL"),
            Expr::Count(e) => write!(f, "count({e})"),
            Expr::UCount(e) => write!(f, "ucount({e})"),
            Expr::Concat(items) => {
                f.write_str("concat(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
            Expr::Search { columns, query } => {
                f.write_str("search(")?;
                write_list(f, columns)?;
                write!(f, ", {query})")
            }
            Expr::RegExp { pattern, flags } => write!(f, "/{pattern}/{flags}"),
            Expr::IsEmpty(e) => write!(f, "is_empty({e})"),
            Expr::IsNumeric(e) => write!(f, "is_numeric({e})"),
            Expr::IsInteger(e) => write!(f, "is_integer({e})"),
            Expr::IsFloat(e) => write!(f, "is_float({e})"),
            Expr::Exists(e) => write!(f, "exists({e})"),
            Expr::MethodCall {
                target,
                method,
                args,
            } => {
                write!(f, "{target}.{method}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
        }
    }
}

/// A projection item: `[name =] expression`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alias {
    pub name: String,
    pub expression: Expr,
    /// Written as `name = expr` rather than derived from the expression.
    pub explicit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRef {
    /// Backslash-separated entity name as written (or resolved).
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RangeDatabase {
    pub alias: String,
    pub entity: EntityRef,
    pub via: Option<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RangeJsonSource {
    pub alias: String,
    pub path: String,
    pub filter: Option<String>,
    pub via: Option<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Range {
    Database(RangeDatabase),
    JsonSource(RangeJsonSource),
}

impl Range {
    pub fn alias(&self) -> &str {
        match self {
            Range::Database(r) => &r.alias,
            Range::JsonSource(r) => &r.alias,
        }
    }

    pub fn via(&self) -> Option<&Expr> {
        match self {
            Range::Database(r) => r.via.as_ref(),
            Range::JsonSource(r) => r.via.as_ref(),
        }
    }

    pub fn via_mut(&mut self) -> Option<&mut Expr> {
        match self {
            Range::Database(r) => r.via.as_mut(),
            Range::JsonSource(r) => r.via.as_mut(),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Range::JsonSource(_))
    }

    pub fn as_database(&self) -> Option<&RangeDatabase> {
        match self {
            Range::Database(r) => Some(r),
            Range::JsonSource(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SortItem {
    pub expression: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Window {
    pub page: u64,
    pub size: u64,
}

impl Window {
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Retrieve {
    pub ranges: Vec<Range>,
    pub unique: bool,
    pub values: Vec<Alias>,
    pub conditions: Option<Expr>,
    pub sort: Vec<SortItem>,
    pub window: Option<Window>,
}

impl Retrieve {
    pub fn range(&self, alias: &str) -> Option<&Range> {
        self.ranges.iter().find(|r| r.alias() == alias)
    }

    pub fn database_range(&self, alias: &str) -> Option<&RangeDatabase> {
        self.range(alias).and_then(Range::as_database)
    }

    pub fn database_ranges(&self) -> impl Iterator<Item = &RangeDatabase> {
        self.ranges.iter().filter_map(Range::as_database)
    }

    pub fn json_ranges(&self) -> impl Iterator<Item = &RangeJsonSource> {
        self.ranges.iter().filter_map(|r| match r {
            Range::JsonSource(json) => Some(json),
            Range::Database(_) => None,
        })
    }

    /// Entity name behind a database range alias.
    pub fn entity_of(&self, alias: &str) -> Option<&str> {
        self.database_range(alias).map(|r| r.entity.name.as_str())
    }

    /// Ranges span both the database and JSON sources.
    pub fn is_hybrid(&self) -> bool {
        self.json_ranges().next().is_some()
    }

    pub fn has_aggregates(&self) -> bool {
        self.values.iter().any(|a| a.expression.is_aggregate())
    }

    /// Every expression of the statement (projections, WHERE, SORT BY, VIA).
    pub fn expressions(&self) -> impl Iterator<Item = &Expr> {
        self.values
            .iter()
            .map(|a| &a.expression)
            .chain(self.conditions.iter())
            .chain(self.sort.iter().map(|s| &s.expression))
            .chain(self.ranges.iter().filter_map(Range::via))
    }

    pub fn expressions_mut(&mut self) -> impl Iterator<Item = &mut Expr> {
        self.values
            .iter_mut()
            .map(|a| &mut a.expression)
            .chain(self.conditions.iter_mut())
            .chain(self.sort.iter_mut().map(|s| &mut s.expression))
            .chain(self.ranges.iter_mut().filter_map(Range::via_mut))
    }
}
