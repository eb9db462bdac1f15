use crate::error::{OrmError, Result};
use objectquel_api::DatabaseAdapter;
use tracing::warn;

/// Nesting-aware transaction bookkeeping. Only the outermost begin/commit
/// reach the adapter; rollback always does and resets the depth.
#[derive(Debug, Default)]
pub struct TransactionCounter {
    depth: usize,
}

impl TransactionCounter {
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub fn begin(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<()> {
        if self.depth == 0 {
            adapter
                .begin_trans()
                .map_err(|e| OrmError::Transaction(e.message))?;
        }
        self.depth += 1;
        Ok(())
    }

    pub fn commit(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<()> {
        match self.depth {
            0 => Err(OrmError::Transaction(
                "commit without an open transaction".to_string(),
            )),
            1 => {
                self.depth = 0;
                adapter
                    .commit_trans()
                    .map_err(|e| OrmError::Transaction(e.message))
            }
            _ => {
                self.depth -= 1;
                Ok(())
            }
        }
    }

    pub fn rollback(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<()> {
        if self.depth > 1 {
            warn!(depth = self.depth, "rolling back nested transaction");
        }
        self.depth = 0;
        adapter
            .rollback_trans()
            .map_err(|e| OrmError::Transaction(e.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryAdapter, TransactionEvent};

    #[test]
    fn only_outermost_pair_reaches_adapter() {
        let mut adapter = MemoryAdapter::new();
        let mut tx = TransactionCounter::default();
        tx.begin(&mut adapter).unwrap();
        tx.begin(&mut adapter).unwrap();
        tx.commit(&mut adapter).unwrap();
        assert!(tx.is_active());
        tx.commit(&mut adapter).unwrap();
        assert_eq!(
            adapter.transaction_log(),
            &[TransactionEvent::Begin, TransactionEvent::Commit]
        );
    }

    #[test]
    fn rollback_resets_depth() {
        let mut adapter = MemoryAdapter::new();
        let mut tx = TransactionCounter::default();
        tx.begin(&mut adapter).unwrap();
        tx.begin(&mut adapter).unwrap();
        tx.rollback(&mut adapter).unwrap();
        assert_eq!(tx.depth(), 0);
        assert!(tx.commit(&mut adapter).is_err());
        assert_eq!(
            adapter.transaction_log(),
            &[TransactionEvent::Begin, TransactionEvent::Rollback]
        );
    }
}
