//! In-memory storage engine with snapshot-isolated transactions.
//!
//! Reads run against a consistent view of the map; a write transaction
//! buffers its mutations and applies them atomically on commit. The map is
//! guarded by a reader-writer lock, which also enforces the single-writer
//! discipline the ledger core relies on.

use crate::{ReadTransaction, Result, StorageError, WriteTransaction};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|t| t > now)
    }
}

/// In-process storage engine backed by an ordered map.
#[derive(Default)]
pub struct MemoryDb {
    map: RwLock<BTreeMap<Vec<u8>, Entry>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` inside a read transaction.
    pub fn view<T, E>(&self, f: impl FnOnce(&dyn ReadTransaction) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<StorageError>,
    {
        let guard = self.map.read();
        let txn = MemoryReadTxn {
            base: &guard,
            now: Instant::now(),
        };
        f(&txn)
    }

    /// Run `f` inside a write transaction. Mutations are committed if `f`
    /// returns `Ok` and discarded otherwise.
    pub fn update<T, E>(
        &self,
        f: impl FnOnce(&mut dyn WriteTransaction) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StorageError>,
    {
        let mut guard = self.map.write();
        let (res, pending) = {
            let mut txn = MemoryWriteTxn {
                base: &guard,
                pending: BTreeMap::new(),
                now: Instant::now(),
            };
            let res = f(&mut txn);
            (res, txn.pending)
        };
        let value = res?;
        for (key, op) in pending {
            match op {
                Pending::Put(entry) => {
                    guard.insert(key, entry);
                }
                Pending::Delete => {
                    guard.remove(&key);
                }
            }
        }
        Ok(value)
    }

    /// Remove every entry. Used when a fast sync restarts the node state.
    pub fn drop_all(&self) {
        self.map.write().clear();
    }

    /// Number of live entries (test helper).
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.map.read().values().filter(|e| e.live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct MemoryReadTxn<'a> {
    base: &'a BTreeMap<Vec<u8>, Entry>,
    now: Instant,
}

impl ReadTransaction for MemoryReadTxn<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .base
            .get(key)
            .filter(|e| e.live(self.now))
            .map(|e| e.value.clone()))
    }

    fn iter_prefix<'b>(
        &'b self,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'b>> {
        let items = prefix_range(self.base, prefix, self.now).collect::<Vec<_>>();
        Ok(Box::new(items.into_iter()))
    }
}

enum Pending {
    Put(Entry),
    Delete,
}

struct MemoryWriteTxn<'a> {
    base: &'a BTreeMap<Vec<u8>, Entry>,
    pending: BTreeMap<Vec<u8>, Pending>,
    now: Instant,
}

impl ReadTransaction for MemoryWriteTxn<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(op) = self.pending.get(key) {
            return Ok(match op {
                Pending::Put(entry) => Some(entry.value.clone()),
                Pending::Delete => None,
            });
        }
        Ok(self
            .base
            .get(key)
            .filter(|e| e.live(self.now))
            .map(|e| e.value.clone()))
    }

    fn iter_prefix<'b>(
        &'b self,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'b>> {
        // Overlay the pending mutations on the base snapshot.
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            prefix_range(self.base, prefix, self.now).collect();
        for (key, op) in self.pending.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match op {
                Pending::Put(entry) => {
                    merged.insert(key.clone(), entry.value.clone());
                }
                Pending::Delete => {
                    merged.remove(key);
                }
            }
        }
        Ok(Box::new(merged.into_iter()))
    }
}

impl WriteTransaction for MemoryWriteTxn<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.pending.insert(
            key.to_vec(),
            Pending::Put(Entry {
                value: value.to_vec(),
                expires_at: None,
            }),
        );
        Ok(())
    }

    fn put_with_ttl(&mut self, key: &[u8], value: &[u8], ttl: Duration) -> Result<()> {
        self.pending.insert(
            key.to_vec(),
            Pending::Put(Entry {
                value: value.to_vec(),
                expires_at: Some(self.now + ttl),
            }),
        );
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.pending.insert(key.to_vec(), Pending::Delete);
        Ok(())
    }
}

fn prefix_range<'a>(
    map: &'a BTreeMap<Vec<u8>, Entry>,
    prefix: &[u8],
    now: Instant,
) -> impl Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a {
    let start = prefix.to_vec();
    let prefix = prefix.to_vec();
    map.range(start..)
        .take_while(move |(k, _)| k.starts_with(&prefix))
        .filter(move |(_, e)| e.live(now))
        .map(|(k, e)| (k.clone(), e.value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let db = MemoryDb::new();
        db.update::<_, StorageError>(|txn| {
            txn.put(b"k1", b"v1")?;
            // Visible to the writing transaction itself.
            assert_eq!(txn.get(b"k1")?, Some(b"v1".to_vec()));
            Ok(())
        })
        .unwrap();
        let got = db
            .view::<_, StorageError>(|txn| txn.get(b"k1"))
            .unwrap();
        assert_eq!(got, Some(b"v1".to_vec()));
    }

    #[test]
    fn failed_update_discards_mutations() {
        let db = MemoryDb::new();
        let res = db.update::<(), StorageError>(|txn| {
            txn.put(b"k1", b"v1")?;
            Err(StorageError::Backend("boom".into()))
        });
        assert!(res.is_err());
        let got = db
            .view::<_, StorageError>(|txn| txn.get(b"k1"))
            .unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn iter_prefix_is_ordered_and_merges_overlay() {
        let db = MemoryDb::new();
        db.update::<_, StorageError>(|txn| {
            txn.put(b"aa01", b"1")?;
            txn.put(b"aa03", b"3")?;
            txn.put(b"zz", b"other")?;
            Ok(())
        })
        .unwrap();
        db.update::<_, StorageError>(|txn| {
            txn.put(b"aa02", b"2")?;
            txn.delete(b"aa03")?;
            let keys: Vec<_> = txn
                .iter_prefix(b"aa")?
                .map(|(k, _)| k)
                .collect();
            assert_eq!(keys, vec![b"aa01".to_vec(), b"aa02".to_vec()]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn ttl_entry_expires() {
        let db = MemoryDb::new();
        db.update::<_, StorageError>(|txn| txn.put_with_ttl(b"k", b"v", Duration::from_millis(5)))
            .unwrap();
        assert_eq!(
            db.view::<_, StorageError>(|txn| txn.get(b"k")).unwrap(),
            Some(b"v".to_vec())
        );
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(db.view::<_, StorageError>(|txn| txn.get(b"k")).unwrap(), None);
    }

    #[test]
    fn drop_all_clears_everything() {
        let db = MemoryDb::new();
        db.update::<_, StorageError>(|txn| txn.put(b"k", b"v")).unwrap();
        db.drop_all();
        assert!(db.is_empty());
    }
}
