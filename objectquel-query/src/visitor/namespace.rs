use crate::ast::{Range, Retrieve};
use objectquel_api::EntityMetadata;

/// Qualifies bare entity names: with namespace `App\Entity`, `Product`
/// becomes `App\Entity\Product` when the metadata knows that name.
/// Names already known are only normalized.
pub fn resolve_namespaces(
    retrieve: &mut Retrieve,
    metadata: &dyn EntityMetadata,
    namespaces: &[String],
) {
    for range in &mut retrieve.ranges {
        let Range::Database(db) = range else {
            continue;
        };
        db.entity.name = qualify(&db.entity.name, metadata, namespaces);
    }
}

/// Qualified form of one entity name; unknown names come back normalized.
pub fn qualify(name: &str, metadata: &dyn EntityMetadata, namespaces: &[String]) -> String {
    let name = metadata.normalize_entity_name(name);
    if metadata.entity_exists(&name) {
        return name;
    }
    namespaces
        .iter()
        .map(|ns| metadata.normalize_entity_name(&format!("{}\\{name}", ns.trim_end_matches('\\'))))
        .find(|candidate| metadata.entity_exists(candidate))
        .unwrap_or(name)
}
