//! Boolean searches over expressions. Each stops at the first hit.

use crate::ast::{Expr, Retrieve};
use std::collections::BTreeSet;
use std::ops::ControlFlow;

fn any(expr: &Expr, mut predicate: impl FnMut(&Expr) -> bool) -> bool {
    expr.walk(&mut |e| {
        if predicate(e) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .is_break()
}

fn range_of(e: &Expr) -> Option<&str> {
    match e {
        Expr::Identifier(ident) => ident.range(),
        Expr::MethodCall { target, .. } => target.range(),
        _ => None,
    }
}

pub fn contains_json_reference(expr: &Expr, retrieve: &Retrieve) -> bool {
    any(expr, |e| {
        range_of(e)
            .and_then(|alias| retrieve.range(alias))
            .is_some_and(|r| r.is_json())
    })
}

pub fn contains_range(expr: &Expr, alias: &str) -> bool {
    any(expr, |e| range_of(e) == Some(alias))
}

pub fn contains_method_call(expr: &Expr) -> bool {
    any(expr, |e| matches!(e, Expr::MethodCall { .. }))
}

pub fn contains_aggregate(expr: &Expr) -> bool {
    any(expr, Expr::is_aggregate)
}

/// Aliases of every range the expression touches.
pub fn referenced_ranges(expr: &Expr) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let _ = expr.walk(&mut |e| {
        if let Some(alias) = range_of(e) {
            out.insert(alias.to_string());
        }
        ControlFlow::<()>::Continue(())
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, Identifier};

    #[test]
    fn referenced_ranges_collects_all_heads() {
        let expr = Expr::compare(
            Expr::Identifier(Identifier::property("p", "id")),
            CompareOp::Eq,
            Expr::Identifier(Identifier::property("j", "productId")),
        );
        let ranges: Vec<_> = referenced_ranges(&expr).into_iter().collect();
        assert_eq!(ranges, ["j", "p"]);
        assert!(contains_range(&expr, "j"));
        assert!(!contains_range(&expr, "x"));
        assert!(!contains_method_call(&expr));
    }

    #[test]
    fn aggregate_detection_descends() {
        let expr = Expr::compare(
            Expr::Count(Box::new(Expr::Identifier(Identifier::property("p", "id")))),
            CompareOp::Gt,
            Expr::Number("1".into()),
        );
        assert!(contains_aggregate(&expr));
    }
}
