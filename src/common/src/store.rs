// Copyright 2026 rengine Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// A sled-backed key → serialized-value store. Used for the stream catalog
/// (`<data>/stream`) and per-rule checkpoint state
/// (`<data>/checkpoints/<rule-id>`). Values are serde_json documents so the
/// on-disk format survives process and version restarts.
#[derive(Debug, Clone)]
pub struct KvStore {
    db: sled::Db,
}

impl KvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.insert(key, bytes)?;
        self.db.flush()?;
        Ok(())
    }

    /// Returns whether the key existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let existed = self.db.remove(key)?.is_some();
        self.db.flush()?;
        Ok(existed)
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.db.contains_key(key)?)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut out = vec![];
        for entry in self.db.iter() {
            let (key, _) = entry?;
            out.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path().join("stream")).unwrap();

        store.put("demo", &vec!["color", "size"]).unwrap();
        let got: Option<Vec<String>> = store.get("demo").unwrap();
        assert_eq!(got.unwrap(), vec!["color", "size"]);

        assert!(store.contains("demo").unwrap());
        assert_eq!(store.keys().unwrap(), vec!["demo".to_owned()]);

        assert!(store.delete("demo").unwrap());
        assert!(!store.delete("demo").unwrap());
        let got: Option<Vec<String>> = store.get("demo").unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn test_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream");
        {
            let store = KvStore::open(&path).unwrap();
            store.put("k", &42u64).unwrap();
        }
        let store = KvStore::open(&path).unwrap();
        assert_eq!(store.get::<u64>("k").unwrap(), Some(42));
    }
}
