use crate::entity::EntityId;
use objectquel_api::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Key index entry: normalized entity name plus the rendered primary key.
type KeyIndex = BTreeMap<(String, String), EntityId>;

/// Which managed entities exist, grouped by entity name, with a lookup by
/// primary key so one live instance exists per identity.
#[derive(Debug, Default)]
pub struct IdentityMap {
    by_entity: BTreeMap<String, BTreeSet<EntityId>>,
    names: BTreeMap<EntityId, String>,
    by_key: KeyIndex,
}

/// Renders key values into an index key. Keys with a null part have no
/// identity yet.
pub fn identity_key(values: &[Value]) -> Option<String> {
    if values.is_empty() || values.iter().any(Value::is_null) {
        return None;
    }
    let parts: Vec<String> = values.iter().map(Value::to_string).collect();
    Some(parts.join("\u{1f}"))
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: &str, id: EntityId) {
        self.by_entity.entry(entity.to_string()).or_default().insert(id);
        self.names.insert(id, entity.to_string());
    }

    /// Records `id` as the instance for `key`, replacing any stale entry.
    pub fn index_key(&mut self, entity: &str, key: String, id: EntityId) {
        self.by_key.retain(|_, v| *v != id);
        self.by_key.insert((entity.to_string(), key), id);
    }

    pub fn lookup(&self, entity: &str, key: &str) -> Option<EntityId> {
        self.by_key
            .get(&(entity.to_string(), key.to_string()))
            .copied()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.names.contains_key(&id)
    }

    pub fn entity_name(&self, id: EntityId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(name) = self.names.remove(&id) else {
            return false;
        };
        if let Some(ids) = self.by_entity.get_mut(&name) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_entity.remove(&name);
            }
        }
        self.by_key.retain(|_, v| *v != id);
        true
    }

    pub fn ids_of(&self, entity: &str) -> impl Iterator<Item = EntityId> + '_ {
        self.by_entity.get(entity).into_iter().flatten().copied()
    }

    /// Every managed id, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.names.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_entity.clear();
        self.names.clear();
        self.by_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_index_follows_removal() {
        let mut map = IdentityMap::new();
        let id = EntityId(1);
        map.insert("Product", id);
        map.index_key("Product", "7".into(), id);
        assert_eq!(map.lookup("Product", "7"), Some(id));
        assert_eq!(map.ids_of("Product").collect::<Vec<_>>(), vec![id]);

        assert!(map.remove(id));
        assert_eq!(map.lookup("Product", "7"), None);
        assert!(map.is_empty());
        assert!(!map.remove(id));
    }

    #[test]
    fn null_keys_have_no_identity() {
        assert_eq!(identity_key(&[Value::Null]), None);
        assert_eq!(identity_key(&[]), None);
        assert_eq!(identity_key(&[Value::Int(3)]), Some("3".to_string()));
    }
}
