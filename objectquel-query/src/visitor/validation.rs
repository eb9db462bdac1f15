use crate::ast::{Expr, Identifier, Range, Retrieve, UnaryOp};
use crate::error::{Error, Result};
use objectquel_api::EntityMetadata;
use std::ops::ControlFlow;

/// Methods callable on database properties.
pub const KNOWN_METHODS: &[&str] = &["lower", "upper", "length", "trim"];

pub fn validate_entities(retrieve: &Retrieve, metadata: &dyn EntityMetadata) -> Result<()> {
    for range in retrieve.database_ranges() {
        if !metadata.entity_exists(&range.entity.name) {
            return Err(Error::quel(format!(
                "Unknown entity '{}' in range '{}'",
                range.entity.name, range.alias
            )));
        }
    }
    Ok(())
}

/// Every identifier must be bound, database chains stop at
/// `alias.property`, properties must be mapped and methods known.
pub fn validate_references(retrieve: &Retrieve, metadata: &dyn EntityMetadata) -> Result<()> {
    for expr in retrieve.expressions() {
        let outcome = expr.walk(&mut |e| match e {
            Expr::Identifier(ident) => check_identifier(ident, retrieve, metadata),
            Expr::MethodCall { target, method, .. } => {
                check_method(target, method, retrieve)?;
                check_identifier(target, retrieve, metadata)
            }
            _ => ControlFlow::Continue(()),
        });
        if let ControlFlow::Break(err) = outcome {
            return Err(err);
        }
    }
    Ok(())
}

fn check_identifier(
    ident: &Identifier,
    retrieve: &Retrieve,
    metadata: &dyn EntityMetadata,
) -> ControlFlow<Error> {
    let path = ident.complete_name();
    let Some(range) = ident.range().and_then(|alias| retrieve.range(alias)) else {
        return ControlFlow::Break(Error::quel(format!("Unknown identifier '{path}'")));
    };
    let Range::Database(db) = range else {
        return ControlFlow::Continue(());
    };
    if ident.depth() > 2 {
        return ControlFlow::Break(Error::quel(format!(
            "'{path}' is too deep; database properties are addressed as alias.property"
        )));
    }
    if let Some(property) = ident.tail_name()
        && !metadata.column_map(&db.entity.name).contains_key(&property)
    {
        return ControlFlow::Break(Error::quel(format!(
            "Unknown property '{property}' on entity '{}'",
            db.entity.name
        )));
    }
    ControlFlow::Continue(())
}

fn check_method(target: &Identifier, method: &str, retrieve: &Retrieve) -> ControlFlow<Error> {
    let path = target.complete_name();
    if !KNOWN_METHODS.contains(&method) {
        return ControlFlow::Break(Error::quel(format!(
            "Unknown method '{method}' on '{path}'"
        )));
    }
    let on_database = target
        .range()
        .and_then(|alias| retrieve.database_range(alias))
        .is_some();
    if !on_database || target.depth() != 2 {
        return ControlFlow::Break(Error::quel(format!(
            "Method '{method}' can only be called on a database property, not '{path}'"
        )));
    }
    ControlFlow::Continue(())
}

/// Arithmetic and negation need scalar operands, never a whole entity.
pub fn forbid_entity_arithmetic(retrieve: &Retrieve) -> Result<()> {
    for expr in retrieve.expressions() {
        let outcome = expr.walk(&mut |e| {
            let offender = match e {
                Expr::Term { left, right, .. } | Expr::Factor { left, right, .. } => {
                    entity_operand(left).or_else(|| entity_operand(right))
                }
                Expr::Unary {
                    op: UnaryOp::Negate,
                    operand,
                } => entity_operand(operand),
                _ => None,
            };
            match offender {
                Some(ident) => ControlFlow::Break(Error::quel(format!(
                    "Arithmetic on entity '{}' is not allowed",
                    ident.name
                ))),
                None => ControlFlow::Continue(()),
            }
        });
        if let ControlFlow::Break(err) = outcome {
            return Err(err);
        }
    }
    Ok(())
}

fn entity_operand(e: &Expr) -> Option<Identifier> {
    e.as_identifier().filter(|i| i.is_entity()).cloned()
}
