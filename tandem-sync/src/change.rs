//! The unit of replication: a batch of whole-record adds and deletes.

use tandem_types::Record;

/// Records added and deleted by one committed mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub adds: Vec<Record>,
    pub deletes: Vec<Record>,
}

impl ChangeSet {
    pub fn new(adds: Vec<Record>, deletes: Vec<Record>) -> Self {
        Self { adds, deletes }
    }

    /// A change set holding a single add.
    pub fn added(record: Record) -> Self {
        Self {
            adds: vec![record],
            deletes: Vec::new(),
        }
    }

    /// A change set holding a single delete.
    pub fn deleted(record: Record) -> Self {
        Self {
            adds: Vec::new(),
            deletes: vec![record],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.deletes.is_empty()
    }

    /// Total number of records carried.
    pub fn len(&self) -> usize {
        self.adds.len() + self.deletes.len()
    }
}
