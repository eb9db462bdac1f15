use crate::ast::{Alias, Expr, Retrieve};

/// Replaces references to projection aliases with a copy of the aliased
/// expression. Inside the projection list only earlier aliases are visible;
/// `WHERE` and `SORT BY` see all of them.
pub fn substitute_macros(retrieve: &mut Retrieve) {
    for index in 0..retrieve.values.len() {
        let (earlier, rest) = retrieve.values.split_at_mut(index);
        replace(&mut rest[0].expression, earlier);
    }

    let values = retrieve.values.clone();
    if let Some(conditions) = &mut retrieve.conditions {
        replace(conditions, &values);
    }
    for item in &mut retrieve.sort {
        replace(&mut item.expression, &values);
    }
}

fn replace(expr: &mut Expr, macros: &[Alias]) {
    if let Expr::Identifier(ident) = expr
        && ident.range.is_none()
        && ident.next.is_none()
        && let Some(found) = macros.iter().find(|m| m.name == ident.name)
    {
        *expr = found.expression.clone();
        return;
    }
    for child in expr.children_mut() {
        replace(child, macros);
    }
}
