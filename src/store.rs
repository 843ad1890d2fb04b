use anyhow::{bail, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Firestore-style retry budget before a transaction gives up.
const MAX_TXN_ATTEMPTS: u32 = 5;

pub fn message_path(room_id: &str, message_id: &str) -> String {
    format!("chatRooms/{room_id}/messages/{message_id}")
}

pub fn room_path(room_id: &str) -> String {
    format!("chatRooms/{room_id}")
}

pub fn user_path(user_id: &str) -> String {
    format!("users/{user_id}")
}

#[derive(Debug, Clone)]
struct Doc {
    version: u64,
    data: Value,
}

/// In-process document store with the same contract as the deployment
/// database: point reads, shallow merge writes, and transactions that are
/// all-or-nothing and automatically re-run on write conflict.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, Doc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.docs
            .lock()
            .unwrap()
            .get(path)
            .map(|doc| doc.data.clone())
    }

    /// Full write, replacing whatever is stored. This is how collaborators
    /// outside the pipeline (the message-send path, room creation) create
    /// documents.
    pub fn insert(&self, path: &str, data: Value) {
        let mut docs = self.docs.lock().unwrap();
        let version = docs.get(path).map_or(0, |doc| doc.version) + 1;
        docs.insert(path.to_string(), Doc { version, data });
    }

    /// Shallow merge: the patch's top-level fields are rewritten, every
    /// other field on the document is left untouched. Creates the document
    /// if it does not exist.
    pub fn merge(&self, path: &str, patch: &Value) -> Result<()> {
        let mut docs = self.docs.lock().unwrap();
        apply_merge(&mut docs, path, patch)
    }

    /// Runs `body` with optimistic concurrency. Reads inside the transaction
    /// record the document version they observed (absent counts as version
    /// zero); writes are buffered. The commit applies only if every read
    /// version is still current, otherwise the closure re-runs against fresh
    /// state, up to the retry budget. An error from `body` aborts with no
    /// writes applied.
    pub fn run_transaction<T>(
        &self,
        mut body: impl FnMut(&mut Txn<'_>) -> Result<T>,
    ) -> Result<T> {
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut txn = Txn {
                store: self,
                reads: HashMap::new(),
                writes: Vec::new(),
            };
            let value = body(&mut txn)?;
            let Txn { reads, writes, .. } = txn;

            let mut docs = self.docs.lock().unwrap();
            let conflicted = reads
                .iter()
                .any(|(path, seen)| docs.get(path).map_or(0, |doc| doc.version) != *seen);
            if conflicted {
                drop(docs);
                log::debug!("Transaction conflict on attempt {attempt}, retrying");
                continue;
            }
            for (path, patch) in &writes {
                apply_merge(&mut docs, path, patch)?;
            }
            return Ok(value);
        }
        bail!("transaction aborted after {MAX_TXN_ATTEMPTS} conflicting attempts")
    }
}

/// Read-and-buffer handle passed to a transaction body. Reads see committed
/// state only; as with the backing database, do all reads before writes.
pub struct Txn<'a> {
    store: &'a MemoryStore,
    reads: HashMap<String, u64>,
    writes: Vec<(String, Value)>,
}

impl Txn<'_> {
    pub fn get(&mut self, path: &str) -> Option<Value> {
        let docs = self.store.docs.lock().unwrap();
        let (version, data) = match docs.get(path) {
            Some(doc) => (doc.version, Some(doc.data.clone())),
            None => (0, None),
        };
        self.reads.entry(path.to_string()).or_insert(version);
        data
    }

    /// Buffers a merge write; nothing is visible until the commit lands.
    pub fn merge(&mut self, path: &str, patch: Value) {
        self.writes.push((path.to_string(), patch));
    }
}

fn apply_merge(docs: &mut HashMap<String, Doc>, path: &str, patch: &Value) -> Result<()> {
    let fields = match patch.as_object() {
        Some(fields) => fields,
        None => bail!("merge patch must be a JSON object"),
    };
    let doc = docs.entry(path.to_string()).or_insert_with(|| Doc {
        version: 0,
        data: Value::Object(Default::default()),
    });
    if !doc.data.is_object() {
        doc.data = Value::Object(Default::default());
    }
    if let Some(map) = doc.data.as_object_mut() {
        for (key, value) in fields {
            map.insert(key.clone(), value.clone());
        }
    }
    doc.version += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_merge_leaves_other_fields_untouched() {
        let store = MemoryStore::new();
        store.insert("doc", json!({ "a": 1, "b": 2 }));
        store.merge("doc", &json!({ "b": 20, "c": 3 })).unwrap();
        assert_eq!(store.get("doc").unwrap(), json!({ "a": 1, "b": 20, "c": 3 }));
    }

    #[test]
    fn test_merge_creates_missing_document() {
        let store = MemoryStore::new();
        store.merge("doc", &json!({ "a": 1 })).unwrap();
        assert_eq!(store.get("doc").unwrap(), json!({ "a": 1 }));
    }

    #[test]
    fn test_merge_rejects_non_object_patch() {
        let store = MemoryStore::new();
        assert!(store.merge("doc", &json!(42)).is_err());
    }

    #[test]
    fn test_transaction_commits_reads_and_writes() {
        let store = MemoryStore::new();
        store.insert("counter", json!({ "n": 1 }));
        let next = store
            .run_transaction(|txn| {
                let n = txn.get("counter").unwrap()["n"].as_i64().unwrap();
                txn.merge("counter", json!({ "n": n + 1 }));
                Ok(n + 1)
            })
            .unwrap();
        assert_eq!(next, 2);
        assert_eq!(store.get("counter").unwrap()["n"], 2);
    }

    #[test]
    fn test_transaction_retries_on_conflict() {
        let store = MemoryStore::new();
        store.insert("counter", json!({ "n": 1 }));
        let attempts = Cell::new(0u32);

        let next = store
            .run_transaction(|txn| {
                attempts.set(attempts.get() + 1);
                let n = txn.get("counter").unwrap()["n"].as_i64().unwrap();
                if attempts.get() == 1 {
                    // concurrent writer lands between our read and commit
                    store.merge("counter", &json!({ "n": 10 })).unwrap();
                }
                txn.merge("counter", json!({ "n": n + 1 }));
                Ok(n + 1)
            })
            .unwrap();

        assert_eq!(attempts.get(), 2);
        assert_eq!(next, 11);
        assert_eq!(store.get("counter").unwrap()["n"], 11);
    }

    #[test]
    fn test_transaction_gives_up_after_retry_budget() {
        let store = MemoryStore::new();
        store.insert("doc", json!({ "n": 0 }));
        let attempts = Cell::new(0u32);

        let result: Result<()> = store.run_transaction(|txn| {
            attempts.set(attempts.get() + 1);
            let _ = txn.get("doc");
            // a writer that always wins the race
            store.merge("doc", &json!({ "n": attempts.get() })).unwrap();
            txn.merge("doc", json!({ "stomped": true }));
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), MAX_TXN_ATTEMPTS);
        assert_eq!(store.get("doc").unwrap().get("stomped"), None);
    }

    #[test]
    fn test_body_error_aborts_without_writes() {
        let store = MemoryStore::new();
        store.insert("doc", json!({ "n": 0 }));
        let result: Result<()> = store.run_transaction(|txn| {
            let _ = txn.get("doc");
            txn.merge("doc", json!({ "n": 99 }));
            bail!("boom")
        });
        assert!(result.is_err());
        assert_eq!(store.get("doc").unwrap()["n"], 0);
    }

    #[test]
    fn test_concurrent_transactions_do_not_lose_updates() {
        let store = MemoryStore::new();
        store.insert("counter", json!({ "n": 0 }));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    store
                        .run_transaction(|txn| {
                            let n = txn.get("counter").unwrap()["n"].as_i64().unwrap();
                            txn.merge("counter", json!({ "n": n + 1 }));
                            Ok(())
                        })
                        .unwrap();
                });
            }
        });

        assert_eq!(store.get("counter").unwrap()["n"], 4);
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(message_path("r1", "m1"), "chatRooms/r1/messages/m1");
        assert_eq!(room_path("r1"), "chatRooms/r1");
        assert_eq!(user_path("u1"), "users/u1");
    }
}
