use crate::ast::Retrieve;
use crate::error::{Error, Result};
use std::collections::BTreeSet;

/// Sets `range` on every identifier head that names a range alias.
///
/// Single-part identifiers naming a projection are left unbound for macro
/// substitution; anything else is an unknown range.
pub fn bind_ranges(retrieve: &mut Retrieve) -> Result<()> {
    let aliases: BTreeSet<String> = retrieve
        .ranges
        .iter()
        .map(|r| r.alias().to_string())
        .collect();
    let projections: BTreeSet<String> = retrieve.values.iter().map(|v| v.name.clone()).collect();

    let mut failure = None;
    for expr in retrieve.expressions_mut() {
        expr.for_each_identifier_mut(&mut |ident| {
            if aliases.contains(&ident.name) {
                ident.range = Some(ident.name.clone());
            } else if ident.next.is_none() && projections.contains(&ident.name) {
                // macro reference
            } else if failure.is_none() {
                failure = Some(Error::quel(format!(
                    "Unknown range '{}' in '{}'",
                    ident.name,
                    ident.complete_name()
                )));
            }
        });
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
