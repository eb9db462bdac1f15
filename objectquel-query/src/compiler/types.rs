use crate::ast::{Expr, Range, Retrieve, UnaryOp};
use objectquel_api::{ColumnType, EntityMetadata};

/// Static result type of an expression, when it can be known without
/// touching data.
pub fn infer_return_type(
    expr: &Expr,
    retrieve: &Retrieve,
    metadata: &dyn EntityMetadata,
) -> Option<ColumnType> {
    match expr {
        Expr::Number(text) if text.contains('.') => Some(ColumnType::Float),
        Expr::Number(_) => Some(ColumnType::Integer),
        Expr::String(_) => Some(ColumnType::String),
        Expr::Bool(_) => Some(ColumnType::Boolean),
        Expr::Null | Expr::Parameter(_) | Expr::RegExp { .. } => None,
        Expr::Identifier(ident) => {
            let property = ident.tail_name()?;
            let Some(Range::Database(db)) = ident.range().and_then(|a| retrieve.range(a)) else {
                return None;
            };
            metadata
                .column_definition(&db.entity.name, &property)
                .map(|c| c.column_type)
        }
        Expr::Compare { .. }
        | Expr::Logical { .. }
        | Expr::In { .. }
        | Expr::CheckNull(_)
        | Expr::CheckNotNull(_)
        | Expr::Search { .. }
        | Expr::IsEmpty(_)
        | Expr::IsNumeric(_)
        | Expr::IsInteger(_)
        | Expr::IsFloat(_)
        | Expr::Exists(_) => Some(ColumnType::Boolean),
        Expr::Unary {
            op: UnaryOp::Not, ..
        } => Some(ColumnType::Boolean),
        Expr::Unary { operand, .. } => infer_return_type(operand, retrieve, metadata),
        Expr::Term { left, right, .. } => {
            let l = infer_return_type(left, retrieve, metadata)?;
            let r = infer_return_type(right, retrieve, metadata)?;
            if l.is_integral() && r.is_integral() {
                Some(ColumnType::Integer)
            } else {
                Some(ColumnType::Float)
            }
        }
        Expr::Factor { .. } => Some(ColumnType::Float),
        Expr::Count(_) | Expr::UCount(_) => Some(ColumnType::Integer),
        Expr::Concat(_) => Some(ColumnType::String),
        Expr::MethodCall { method, .. } if method == "length" => Some(ColumnType::Integer),
        Expr::MethodCall { .. } => Some(ColumnType::String),
    }
}

pub fn is_textual(column_type: Option<ColumnType>) -> bool {
    matches!(
        column_type,
        Some(ColumnType::String | ColumnType::Text | ColumnType::Guid)
    )
}
