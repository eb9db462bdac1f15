use crate::entity::EntityId;
use objectquel_api::Value;
use std::collections::BTreeMap;

/// Property name -> value, for the mapped columns of one entity.
pub type ColumnValues = BTreeMap<String, Value>;

/// Column values as last loaded from or written to the database.
#[derive(Debug, Default)]
pub struct SnapshotMap {
    originals: BTreeMap<EntityId, ColumnValues>,
}

impl SnapshotMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self, id: EntityId, values: ColumnValues) {
        self.originals.insert(id, values);
    }

    pub fn get(&self, id: EntityId) -> Option<&ColumnValues> {
        self.originals.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.originals.contains_key(&id)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<ColumnValues> {
        self.originals.remove(&id)
    }

    pub fn clear(&mut self) {
        self.originals.clear();
    }

    /// Properties whose current value differs from the snapshot, or `None`
    /// when there is no snapshot.
    pub fn changed(&self, id: EntityId, current: &ColumnValues) -> Option<Vec<String>> {
        let original = self.originals.get(&id)?;
        Some(
            current
                .iter()
                .filter(|(property, value)| original.get(*property).unwrap_or(&Value::Null) != *value)
                .map(|(property, _)| property.clone())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_changed_properties() {
        let mut snapshots = SnapshotMap::new();
        let id = EntityId(1);
        let mut values = ColumnValues::new();
        values.insert("name".into(), Value::from("Tea"));
        values.insert("price".into(), Value::Int(3));
        assert_eq!(snapshots.changed(id, &values), None);

        snapshots.take(id, values.clone());
        assert_eq!(snapshots.changed(id, &values), Some(vec![]));

        values.insert("price".into(), Value::Int(4));
        assert_eq!(snapshots.changed(id, &values), Some(vec!["price".to_string()]));
    }
}
