//! # Reconciliation Store
//!
//! Owns the authoritative, ordered results collection and merges every inbound
//! payload into it by identity.
//!
//! ## Merge rules
//!
//! - An object whose `id` is unseen (or that has no `id`) is appended.
//! - An object whose `id` is known replaces only the `time_finish` of the
//!   existing record. Every other field of the stored record is kept; the
//!   incoming payload's other fields are ignored.
//! - The first payload may be an array (or `null`): it seeds the collection in
//!   one step. Later arrays are applied as a run of ordinary merges.
//!
//! ## Snapshots
//!
//! The collection is never mutated in place. Each applied payload produces a new
//! [`Snapshot`] that shares the unchanged records with the previous one, so a
//! reader holding an older snapshot keeps seeing exactly what it saw.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use super::record::{Record, RecordId, RecordNormalizer};

/// Why an inbound payload was discarded.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The frame was not valid JSON.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame decoded to something that is not a record or a batch of records.
    #[error("unsupported payload: expected an object or an array of objects, got {0}")]
    Unsupported(&'static str),
}

/// Immutable, ordered view of the collection at one instant.
#[derive(Debug, Clone)]
pub struct Snapshot {
    records: Arc<Vec<Arc<Record>>>,
    version: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Snapshot {
    /// The snapshot before anything was received.
    pub fn empty() -> Self {
        Self {
            records: Arc::new(Vec::new()),
            version: 0,
        }
    }

    /// Number of payloads applied to produce this snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index).map(Arc::as_ref)
    }

    /// Looks a record up by id.
    pub fn find(&self, id: &RecordId) -> Option<&Record> {
        self.iter().find(|r| r.id.as_ref() == Some(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        self.records.iter().map(Arc::as_ref)
    }

    /// True when both values are the very same snapshot, not merely equal ones.
    pub fn same_as(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }

}

/// Single-writer owner of the results collection.
#[derive(Debug)]
pub struct ReconciliationStore {
    normalizer: RecordNormalizer,
    current: Snapshot,
    /// Position of every identified record in `current`. Records are never
    /// removed, so positions stay valid across snapshots.
    index: HashMap<RecordId, usize>,
    received_any: bool,
}

impl Default for ReconciliationStore {
    fn default() -> Self {
        Self::new(RecordNormalizer::default())
    }
}

impl ReconciliationStore {
    pub fn new(normalizer: RecordNormalizer) -> Self {
        Self {
            normalizer,
            current: Snapshot::empty(),
            index: HashMap::new(),
            received_any: false,
        }
    }

    /// The current snapshot.
    pub fn current(&self) -> Snapshot {
        self.current.clone()
    }

    /// Decodes a framed text payload and merges it.
    pub fn ingest_frame(&mut self, frame: &str) -> Result<Snapshot, IngestError> {
        let raw: Value = serde_json::from_str(frame)?;
        self.try_ingest(raw)
    }

    /// Merges a decoded payload. Unsupported payloads are logged and leave the
    /// collection unchanged.
    pub fn ingest(&mut self, raw: Value) -> Snapshot {
        match self.try_ingest(raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Discarding payload: {}", e);
                self.current()
            }
        }
    }

    /// Merges a decoded payload, reporting unsupported payloads to the caller.
    pub fn try_ingest(&mut self, raw: Value) -> Result<Snapshot, IngestError> {
        let first = !self.received_any;
        match raw {
            Value::Object(object) => {
                self.received_any = true;
                let record = self.normalizer.normalize(object);
                let mut records = self.working_copy();
                self.upsert(&mut records, record);
                Ok(self.publish(records))
            }
            Value::Array(items) if first => {
                self.received_any = true;
                Ok(self.seed(items))
            }
            Value::Array(items) => Ok(self.merge_batch(items)),
            Value::Null if first => {
                self.received_any = true;
                Ok(self.seed(Vec::new()))
            }
            Value::Null => Err(IngestError::Unsupported("null")),
            Value::Bool(_) => Err(IngestError::Unsupported("a boolean")),
            Value::Number(_) => Err(IngestError::Unsupported("a number")),
            Value::String(_) => Err(IngestError::Unsupported("a string")),
        }
    }

    /// Replaces the (still empty) collection with the initial batch.
    fn seed(&mut self, items: Vec<Value>) -> Snapshot {
        self.index.clear();
        let mut records = Vec::with_capacity(items.len());
        for object in Self::objects(items) {
            let record = self.normalizer.normalize(object);
            self.upsert(&mut records, record);
        }
        log::info!("Seeded results with {} records", records.len());
        self.publish(records)
    }

    /// Applies a later batch element by element, as one snapshot step.
    fn merge_batch(&mut self, items: Vec<Value>) -> Snapshot {
        let objects = Self::objects(items);
        if objects.is_empty() {
            return self.current();
        }
        log::debug!("Merging a batch of {} records", objects.len());
        let mut records = self.working_copy();
        for object in objects {
            let record = self.normalizer.normalize(object);
            self.upsert(&mut records, record);
        }
        self.publish(records)
    }

    fn objects(items: Vec<Value>) -> Vec<Map<String, Value>> {
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(object) => Some(object),
                other => {
                    log::warn!("Skipping non-object batch element: {}", other);
                    None
                }
            })
            .collect()
    }

    fn working_copy(&self) -> Vec<Arc<Record>> {
        self.current.records.as_ref().clone()
    }

    fn upsert(&mut self, records: &mut Vec<Arc<Record>>, incoming: Record) {
        let existing = incoming.id.as_ref().and_then(|id| self.index.get(id).copied());
        match existing {
            Some(position) => {
                let mut updated = Record::clone(&records[position]);
                updated.time_finish = incoming.time_finish;
                records[position] = Arc::new(updated);
            }
            None => {
                if let Some(id) = incoming.id.clone() {
                    self.index.insert(id, records.len());
                }
                records.push(Arc::new(incoming));
            }
        }
    }

    fn publish(&mut self, records: Vec<Arc<Record>>) -> Snapshot {
        self.current = Snapshot {
            records: Arc::new(records),
            version: self.current.version + 1,
        };
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(snapshot: &Snapshot) -> Vec<RecordId> {
        snapshot.iter().filter_map(|r| r.id.clone()).collect()
    }

    #[test]
    fn same_id_twice_updates_instead_of_appending() {
        let mut store = ReconciliationStore::default();
        let first = store.ingest(json!({"id": 1, "time_finish": 1000}));
        let second = store.ingest(json!({"id": 1, "time_finish": 1000}));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second.get(0).map(|r| r.time_finish.as_str()), Some("0:0:1.0"));
    }

    #[test]
    fn new_ids_are_appended_and_existing_records_untouched() {
        let mut store = ReconciliationStore::default();
        let before = store.ingest(json!({"id": 1, "name": "A"}));
        let after = store.ingest(json!({"id": 2, "name": "B"}));

        assert_eq!(ids(&after), vec![RecordId::Int(1), RecordId::Int(2)]);
        assert_eq!(after.get(0), before.get(0));
    }

    #[test]
    fn update_only_replaces_finish_time() {
        let mut store = ReconciliationStore::default();
        store.ingest(json!({"id": 1, "name": "A", "time_finish": "1:2:3.004"}));
        let snapshot = store.ingest(json!({"id": 1, "name": "ignored", "time_finish": 7_384_005}));

        let record = snapshot.find(&RecordId::Int(1)).unwrap();
        assert_eq!(record.name(), Some(&json!("A")));
        assert_eq!(record.time_finish, "2:3:4.5");
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn last_applied_finish_time_wins_even_when_empty() {
        let mut store = ReconciliationStore::default();
        store.ingest(json!({"id": 1, "time_finish": 1000}));
        let snapshot = store.ingest(json!({"id": 1}));
        assert_eq!(snapshot.get(0).unwrap().time_finish, "");
    }

    #[test]
    fn missing_finish_time_is_empty_string() {
        let mut store = ReconciliationStore::default();
        let snapshot = store.ingest(json!({"id": 3}));
        assert_eq!(snapshot.get(0).unwrap().time_finish, "");
    }

    #[test]
    fn first_array_seeds_in_order_and_later_objects_update_in_place() {
        let mut store = ReconciliationStore::default();
        let seeded = store.ingest(json!([
            {"id": 1, "name": "A"},
            {"id": 2, "name": "B"}
        ]));
        assert_eq!(ids(&seeded), vec![RecordId::Int(1), RecordId::Int(2)]);
        assert_eq!(seeded.version(), 1);

        let updated = store.ingest(json!({"id": 1, "time_finish": 1000}));
        assert_eq!(ids(&updated), vec![RecordId::Int(1), RecordId::Int(2)]);
        assert_eq!(updated.get(0).unwrap().time_finish, "0:0:1.0");
        assert_eq!(updated.get(0).unwrap().name(), Some(&json!("A")));
    }

    #[test]
    fn duplicate_ids_inside_the_seed_are_reconciled() {
        let mut store = ReconciliationStore::default();
        let seeded = store.ingest(json!([
            {"id": 1, "name": "A"},
            {"id": 2, "name": "B"},
            {"id": 1, "name": "A2", "time_finish": 2000}
        ]));
        assert_eq!(seeded.len(), 2);
        let first = seeded.get(0).unwrap();
        assert_eq!(first.name(), Some(&json!("A")));
        assert_eq!(first.time_finish, "0:0:2.0");
    }

    #[test]
    fn null_first_payload_seeds_an_empty_collection() {
        let mut store = ReconciliationStore::default();
        let seeded = store.ingest(Value::Null);
        assert!(seeded.is_empty());
        assert_eq!(seeded.version(), 1);

        // Only the first payload may be null.
        assert!(matches!(store.try_ingest(Value::Null), Err(IngestError::Unsupported("null"))));
    }

    #[test]
    fn later_arrays_are_merged_not_reseeded() {
        let mut store = ReconciliationStore::default();
        store.ingest(json!({"id": 1, "name": "A"}));
        let merged = store.ingest(json!([
            {"id": 2, "name": "B"},
            {"id": 1, "name": "ignored", "time_finish": 1000},
            42
        ]));
        assert_eq!(ids(&merged), vec![RecordId::Int(1), RecordId::Int(2)]);
        assert_eq!(merged.get(0).unwrap().name(), Some(&json!("A")));
        assert_eq!(merged.get(0).unwrap().time_finish, "0:0:1.0");
        assert_eq!(merged.version(), 2);
    }

    #[test]
    fn snapshots_handed_out_are_never_mutated() {
        let mut store = ReconciliationStore::default();
        let before = store.ingest(json!({"id": 1, "time_finish": 1000}));
        let after = store.ingest(json!({"id": 2}));
        let updated = store.ingest(json!({"id": 1, "time_finish": 5000}));

        assert!(!before.same_as(&after));
        assert_eq!(before.len(), 1);
        assert!(before.find(&RecordId::Int(2)).is_none());
        assert_eq!(after.get(0).unwrap().time_finish, "0:0:1.0");
        assert_eq!(updated.get(0).unwrap().time_finish, "0:0:5.0");
    }

    #[test]
    fn malformed_frames_leave_the_collection_unchanged() {
        let mut store = ReconciliationStore::default();
        let before = store.ingest_frame(r#"{"id": 1}"#).unwrap();

        assert!(matches!(store.ingest_frame("{not json"), Err(IngestError::Malformed(_))));
        assert!(matches!(store.ingest_frame("17"), Err(IngestError::Unsupported(_))));

        assert!(store.current().same_as(&before));
        assert_eq!(store.ingest(json!("text")).version(), before.version());
    }

    #[test]
    fn records_without_id_are_always_appended() {
        let mut store = ReconciliationStore::default();
        store.ingest(json!({"name": "anonymous"}));
        let snapshot = store.ingest(json!({"name": "anonymous"}));
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|r| r.id.is_none()));
    }

    #[test]
    fn string_and_integer_ids_do_not_collide() {
        let mut store = ReconciliationStore::default();
        store.ingest(json!({"id": 1}));
        let snapshot = store.ingest(json!({"id": "1"}));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn numerically_equal_ids_update_the_same_record() {
        let mut store = ReconciliationStore::default();
        store.ingest_frame(r#"{"id": 1000, "name": "A"}"#).unwrap();
        let snapshot = store.ingest_frame(r#"{"id": 1e3, "time_finish": 5000}"#).unwrap();
        assert_eq!(ids(&snapshot), vec![RecordId::Int(1000)]);
        assert_eq!(snapshot.get(0).unwrap().time_finish, "0:0:5.0");

        let snapshot = store.ingest_frame(r#"{"id": 7.0}"#).unwrap();
        assert_eq!(store.ingest_frame(r#"{"id": 7}"#).unwrap().len(), snapshot.len());
    }

    #[test]
    fn large_numeric_ids_do_not_collide_with_strings() {
        let mut store = ReconciliationStore::default();
        store.ingest_frame(r#"{"id": 18446744073709551615}"#).unwrap();
        let snapshot = store.ingest_frame(r#"{"id": "18446744073709551615"}"#).unwrap();
        assert_eq!(
            ids(&snapshot),
            vec![RecordId::Unsigned(u64::MAX), RecordId::Text("18446744073709551615".into())]
        );
    }
}
