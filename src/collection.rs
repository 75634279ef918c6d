//! An indexed, in-memory store for API records.
//!
//! Callers that mirror cluster state locally (inventories, caches, test
//! fixtures) need the same handful of operations: insert-or-replace keyed by
//! `id`, lookup by id, and lookup by a declared set of indexed fields.
//! [`Collection`] provides exactly that over JSON objects, with its own
//! error type since none of these failures involve the network.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A stored record: a JSON object, keyed by its `"id"` member.
pub type Record = serde_json::Map<String, Value>;

/// Errors from [`Collection`] operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// [`Collection::add`] found an existing record under the same id.
    #[error("A record with id {id:?} already exists")]
    AlreadyExists {
        /// The conflicting id.
        id: String,
    },

    /// A filter named fields the collection does not index.
    #[error("Cannot filter on non-indexed fields: {}", fields.join(", "))]
    NotIndexed {
        /// The offending filter fields.
        fields: Vec<String>,
    },

    /// An id was neither a string nor a number.
    #[error("Record ids must be strings or numbers, got {found}")]
    InvalidId {
        /// The offending value, rendered as JSON.
        found: String,
    },
}

/// A thread-safe collection of JSON records with field indexes.
///
/// Records without an `"id"` get an auto-incremented numeric one. The
/// indexed fields are fixed at construction; filtering on anything else is
/// an error rather than a silent full scan.
///
/// # Examples
///
/// ```
/// use limpet::collection::Collection;
/// use serde_json::json;
///
/// let vms = Collection::new(["power_state", "resident_on"]);
///
/// vms.add(obj(json!({"id": "vm1", "power_state": "Running", "resident_on": "host1"})))
///     .unwrap();
/// vms.add(obj(json!({"id": "vm2", "power_state": "Halted", "resident_on": "host1"})))
///     .unwrap();
///
/// let running = vms.get(&obj(json!({"power_state": "Running"}))).unwrap();
/// assert_eq!(running.len(), 1);
/// assert_eq!(running[0]["id"], "vm1");
///
/// fn obj(v: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
///     v.as_object().unwrap().clone()
/// }
/// ```
pub struct Collection {
    state: RwLock<State>,
}

struct State {
    next_id: u64,
    records: BTreeMap<String, Record>,
    // field -> indexed value -> ids
    indexes: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl Collection {
    /// Creates an empty collection indexing the given fields.
    pub fn new<I, S>(indexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let indexes = indexes
            .into_iter()
            .map(|field| (field.into(), BTreeMap::new()))
            .collect();
        Collection {
            state: RwLock::new(State {
                next_id: 0,
                records: BTreeMap::new(),
                indexes,
            }),
        }
    }

    /// Inserts a record, failing if its id is already taken.
    ///
    /// A record without an `"id"` member is assigned the next free numeric
    /// id. The stored record (id included) is returned.
    pub fn add(&self, record: Record) -> Result<Record, CollectionError> {
        self.insert(record, false)
    }

    /// Inserts or replaces a record.
    ///
    /// Replacement drops the previous record's index entries, so stale
    /// field values stop matching immediately.
    pub fn update(&self, record: Record) -> Result<Record, CollectionError> {
        self.insert(record, true)
    }

    /// Returns the records matching `filter`.
    ///
    /// An empty filter returns everything. A filter may name `"id"` and any
    /// indexed fields; the result is the intersection. Naming a non-indexed
    /// field is a [`CollectionError::NotIndexed`] error. Results come back
    /// ordered by id.
    pub fn get(&self, filter: &Record) -> Result<Vec<Record>, CollectionError> {
        let state = self.state.read();

        let unknown: Vec<String> = filter
            .keys()
            .filter(|field| *field != "id" && !state.indexes.contains_key(*field))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(CollectionError::NotIndexed { fields: unknown });
        }

        if filter.is_empty() {
            return Ok(state.records.values().cloned().collect());
        }

        let mut candidates: Option<BTreeSet<String>> = None;
        if let Some(id) = filter.get("id") {
            let key = id_key(id)?;
            if !state.records.contains_key(&key) {
                return Ok(Vec::new());
            }
            candidates = Some(BTreeSet::from([key]));
        }

        for (field, value) in filter {
            if field == "id" {
                continue;
            }
            let bucket = state
                .indexes
                .get(field)
                .and_then(|buckets| buckets.get(&index_value(value)));
            let Some(bucket) = bucket else {
                return Ok(Vec::new());
            };

            candidates = Some(match candidates {
                None => bucket.clone(),
                Some(current) => current.intersection(bucket).cloned().collect(),
            });
            if candidates.as_ref().is_some_and(BTreeSet::is_empty) {
                return Ok(Vec::new());
            }
        }

        let ids = candidates.unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|key| state.records.get(key))
            .cloned()
            .collect())
    }

    /// Removes the given ids, returning how many records actually existed.
    pub fn remove(&self, ids: &[Value]) -> Result<usize, CollectionError> {
        let mut state = self.state.write();
        let mut removed = 0;
        for id in ids {
            let key = id_key(id)?;
            if let Some(record) = state.records.remove(&key) {
                state.unindex_record(&key, &record);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Whether the collection holds no records.
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    fn insert(&self, mut record: Record, replace: bool) -> Result<Record, CollectionError> {
        let mut state = self.state.write();

        let key = match record.get("id") {
            Some(id) => id_key(id)?,
            None => {
                // Skip over ids that were inserted explicitly.
                loop {
                    state.next_id += 1;
                    let candidate = state.next_id.to_string();
                    if !state.records.contains_key(&candidate) {
                        break;
                    }
                }
                record.insert("id".to_string(), Value::from(state.next_id));
                state.next_id.to_string()
            }
        };

        if state.records.contains_key(&key) {
            if !replace {
                return Err(CollectionError::AlreadyExists { id: key });
            }
            if let Some(old) = state.records.remove(&key) {
                state.unindex_record(&key, &old);
            }
        }

        state.index_record(&key, &record);
        state.records.insert(key, record.clone());
        Ok(record)
    }
}

impl State {
    fn index_record(&mut self, key: &str, record: &Record) {
        for (field, buckets) in self.indexes.iter_mut() {
            if let Some(value) = record.get(field) {
                buckets
                    .entry(index_value(value))
                    .or_default()
                    .insert(key.to_string());
            }
        }
    }

    fn unindex_record(&mut self, key: &str, record: &Record) {
        for (field, buckets) in self.indexes.iter_mut() {
            if let Some(value) = record.get(field) {
                let slot = index_value(value);
                if let Some(ids) = buckets.get_mut(&slot) {
                    ids.remove(key);
                    if ids.is_empty() {
                        buckets.remove(&slot);
                    }
                }
            }
        }
    }
}

/// Canonical map key for an id value.
fn id_key(id: &Value) -> Result<String, CollectionError> {
    match id {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(CollectionError::InvalidId {
            found: other.to_string(),
        }),
    }
}

/// Canonical bucket key for an indexed field value.
fn index_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
