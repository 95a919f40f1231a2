//! In-memory content-addressed store.
//!
//! The default persistence realization for embedded use and tests.
//! Object ids are blake3 hex digests over a type-prefixed encoding of
//! the content, so identical objects always share an id and ids are
//! stable across runs. Refs live behind a single lock, which is what
//! makes compare-and-swap atomic here.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::ports::{CommitInfo, Persistence, StoreError};

#[derive(Debug, Clone)]
struct CommitData {
    tree: String,
    parents: Vec<String>,
    message: String,
}

#[derive(Debug, Default)]
struct Inner {
    blobs: HashMap<String, Vec<u8>>,
    trees: HashMap<String, BTreeMap<String, String>>,
    commits: HashMap<String, CommitData>,
    refs: HashMap<String, String>,
}

/// A content-addressed store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Returns an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }

    fn oid(kind: &str, payload: &[u8]) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_bytes());
        hasher.update(b"\x00");
        hasher.update(payload);
        hasher.finalize().to_hex().to_string()
    }
}

impl Persistence for MemoryStore {
    fn read_ref(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.refs.get(name).cloned())
    }

    fn compare_and_swap_ref(
        &self,
        name: &str,
        new_oid: &str,
        expected: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let current = inner.refs.get(name).map(String::as_str);
        if current != expected {
            return Err(StoreError::CasConflict {
                ref_name: name.to_owned(),
            });
        }
        inner.refs.insert(name.to_owned(), new_oid.to_owned());
        Ok(())
    }

    fn write_blob(&self, bytes: &[u8]) -> Result<String, StoreError> {
        let oid = Self::oid("blob", bytes);
        self.lock()?.blobs.insert(oid.clone(), bytes.to_vec());
        Ok(oid)
    }

    fn read_blob(&self, oid: &str) -> Result<Vec<u8>, StoreError> {
        self.lock()?
            .blobs
            .get(oid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                oid: oid.to_owned(),
            })
    }

    fn write_tree(&self, entries: &[(String, String)]) -> Result<String, StoreError> {
        let tree: BTreeMap<String, String> = entries.iter().cloned().collect();
        let mut payload = Vec::new();
        for (name, oid) in &tree {
            payload.extend_from_slice(name.as_bytes());
            payload.push(0);
            payload.extend_from_slice(oid.as_bytes());
            payload.push(b'\n');
        }
        let oid = Self::oid("tree", &payload);
        self.lock()?.trees.insert(oid.clone(), tree);
        Ok(oid)
    }

    fn read_tree(&self, oid: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.lock()?
            .trees
            .get(oid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                oid: oid.to_owned(),
            })
    }

    fn create_commit(
        &self,
        tree: &str,
        parents: &[String],
        message: &str,
    ) -> Result<String, StoreError> {
        let mut payload = Vec::new();
        payload.extend_from_slice(tree.as_bytes());
        for parent in parents {
            payload.push(0);
            payload.extend_from_slice(parent.as_bytes());
        }
        payload.push(b'\n');
        payload.extend_from_slice(message.as_bytes());
        let sha = Self::oid("commit", &payload);
        self.lock()?.commits.insert(
            sha.clone(),
            CommitData {
                tree: tree.to_owned(),
                parents: parents.to_vec(),
                message: message.to_owned(),
            },
        );
        Ok(sha)
    }

    fn commit_tree(&self, sha: &str) -> Result<String, StoreError> {
        self.lock()?
            .commits
            .get(sha)
            .map(|commit| commit.tree.clone())
            .ok_or_else(|| StoreError::NotFound {
                oid: sha.to_owned(),
            })
    }

    fn commit_info(&self, sha: &str) -> Result<CommitInfo, StoreError> {
        self.lock()?
            .commits
            .get(sha)
            .map(|commit| CommitInfo {
                parents: commit.parents.clone(),
                message: commit.message.clone(),
                date: None,
            })
            .ok_or_else(|| StoreError::NotFound {
                oid: sha.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip_is_content_addressed() {
        let store = MemoryStore::new();
        let a = store.write_blob(b"hello").expect("writes");
        let b = store.write_blob(b"hello").expect("writes");
        assert_eq!(a, b);
        assert_eq!(store.read_blob(&a).expect("reads"), b"hello");
        assert_ne!(a, store.write_blob(b"other").expect("writes"));
    }

    #[test]
    fn missing_objects_are_not_found() {
        let store = MemoryStore::new();
        let err = store.read_blob("nope").unwrap_err();
        assert_eq!(err.code().code(), "E_STORE_NOT_FOUND");
        assert!(store.read_tree("nope").is_err());
        assert!(store.commit_info("nope").is_err());
    }

    #[test]
    fn tree_entries_roundtrip_sorted() {
        let store = MemoryStore::new();
        let blob = store.write_blob(b"x").expect("writes");
        let tree = store
            .write_tree(&[("patch.cbor".to_owned(), blob.clone())])
            .expect("writes");
        let entries = store.read_tree(&tree).expect("reads");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["patch.cbor"], blob);
    }

    #[test]
    fn commit_records_parents_and_message() {
        let store = MemoryStore::new();
        let blob = store.write_blob(b"x").expect("writes");
        let tree = store
            .write_tree(&[("patch.cbor".to_owned(), blob)])
            .expect("writes");
        let root = store.create_commit(&tree, &[], "root").expect("commits");
        let child = store
            .create_commit(&tree, &[root.clone()], "child")
            .expect("commits");
        let info = store.commit_info(&child).expect("reads");
        assert_eq!(info.parents, vec![root]);
        assert_eq!(info.message, "child");
        assert_eq!(store.commit_message(&child).expect("reads"), "child");
        assert_eq!(store.commit_tree(&child).expect("reads"), tree);
    }

    #[test]
    fn cas_enforces_expected_tip() {
        let store = MemoryStore::new();
        // Creating a ref asserts absence.
        store
            .compare_and_swap_ref("refs/warp/g/writers/a", "oid1", None)
            .expect("creates");
        // Stale expectation loses.
        let err = store
            .compare_and_swap_ref("refs/warp/g/writers/a", "oid2", None)
            .unwrap_err();
        assert_eq!(err.code().code(), "E_CAS_CONFLICT");
        let err = store
            .compare_and_swap_ref("refs/warp/g/writers/a", "oid2", Some("wrong"))
            .unwrap_err();
        assert!(matches!(err, StoreError::CasConflict { .. }));
        // Correct expectation wins.
        store
            .compare_and_swap_ref("refs/warp/g/writers/a", "oid2", Some("oid1"))
            .expect("swaps");
        assert_eq!(
            store.read_ref("refs/warp/g/writers/a").expect("reads"),
            Some("oid2".to_owned())
        );
    }
}
