use super::{check_outcome, DocumentStore};
use crate::document::{ConversionOutcome, Document};
use crate::error::StoreError;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    /// Insertion sequence, used to order records with equal timestamps.
    next_seq: u64,
    docs: HashMap<Uuid, (u64, Document)>,
}

/// Process-local [`DocumentStore`]. Contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

impl DocumentStore for MemoryStore {
    fn create(&self, title: &str, original_filename: &str) -> Result<Document, StoreError> {
        let mut inner = self.write()?;
        let mut doc = Document::new_pending(title, original_filename);
        while inner.docs.contains_key(&doc.id) {
            doc.id = Uuid::new_v4();
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.docs.insert(doc.id, (seq, doc.clone()));
        Ok(doc)
    }

    fn get(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.read()?.docs.get(&id).map(|(_, d)| d.clone()))
    }

    fn list(&self) -> Result<Vec<Document>, StoreError> {
        let inner = self.read()?;
        let mut rows: Vec<&(u64, Document)> = inner.docs.values().collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        Ok(rows.into_iter().map(|(_, d)| d.clone()).collect())
    }

    fn update(&self, id: Uuid, outcome: &ConversionOutcome) -> Result<Document, StoreError> {
        check_outcome(id, outcome)?;
        let mut inner = self.write()?;
        let (_, doc) = inner.docs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if doc.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                id,
                from: doc.status,
            });
        }
        doc.apply(outcome);
        Ok(doc.clone())
    }

    fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.write()?.docs.remove(&id).is_some())
    }
}
