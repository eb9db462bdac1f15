//! Semantic passes over a parsed [`Retrieve`].
//!
//! Each pass does one thing and runs in a fixed order:
//!
//! 1. [`namespace`]: qualify entity names against configured namespaces
//! 2. [`range_binding`]: attach range aliases to identifier heads
//! 3. [`macros`]: inline references to earlier projection aliases
//! 4. [`via_rewrite`]: turn relation paths in `VIA` into key equalities
//! 5. [`validation`]: entity, property and method existence checks
//! 6. [`validation::forbid_entity_arithmetic`]
//!
//! [`detect`] holds the read-only search helpers used by the compiler and
//! the decomposer.

pub mod detect;
pub mod macros;
pub mod namespace;
pub mod range_binding;
pub mod validation;
pub mod via_rewrite;

use crate::ast::Retrieve;
use crate::error::Result;
use objectquel_api::EntityMetadata;
use tracing::trace;

pub fn analyze(
    retrieve: &mut Retrieve,
    metadata: &dyn EntityMetadata,
    namespaces: &[String],
) -> Result<()> {
    namespace::resolve_namespaces(retrieve, metadata, namespaces);
    validation::validate_entities(retrieve, metadata)?;
    range_binding::bind_ranges(retrieve)?;
    macros::substitute_macros(retrieve);
    via_rewrite::rewrite_via(retrieve, metadata)?;
    validation::validate_references(retrieve, metadata)?;
    validation::forbid_entity_arithmetic(retrieve)?;
    trace!(ranges = retrieve.ranges.len(), "semantic analysis complete");
    Ok(())
}
