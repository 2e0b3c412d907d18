//! Snapshot reconciliation planning.

use crate::change::ChangeSet;
use std::collections::HashSet;
use tandem_types::{Record, RecordKey};

/// Computes the changes that turn `current` into `incoming`.
///
/// Deletes are current records whose key is absent from `incoming`. Adds are
/// incoming records whose key is not already current. When `incoming` repeats
/// a key, the first occurrence wins. Records present on both sides are left
/// alone even if their fields differ.
pub fn plan<'a, I>(current: I, incoming: Vec<Record>) -> ChangeSet
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut incoming_keys: HashSet<RecordKey> = HashSet::with_capacity(incoming.len());
    let incoming: Vec<Record> = incoming
        .into_iter()
        .filter(|r| incoming_keys.insert(r.key().clone()))
        .collect();

    let mut current_keys: HashSet<&RecordKey> = HashSet::new();
    let mut deletes = Vec::new();
    for record in current {
        current_keys.insert(record.key());
        if !incoming_keys.contains(record.key()) {
            deletes.push(record.clone());
        }
    }

    let adds = incoming
        .into_iter()
        .filter(|r| !current_keys.contains(r.key()))
        .collect();

    ChangeSet::new(adds, deletes)
}
