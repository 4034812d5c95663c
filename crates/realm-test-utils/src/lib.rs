//! Testing utilities for the realm workspace
//!
//! Temp data directories seeded with character and likes documents.

#![allow(missing_docs)]

use realm_store::{RealmData, StoreConfig};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A realm over a private temp directory, removed on drop
pub struct TestRealm {
    dir: TempDir,
    pub realm: RealmData,
}

impl TestRealm {
    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn likes_path(&self) -> PathBuf {
        self.realm.config().likes_path()
    }

    pub fn likes_backup_path(&self) -> PathBuf {
        self.realm.store().backup_path(self.likes_path())
    }

    pub fn characters_path(&self) -> PathBuf {
        self.realm.config().characters_path()
    }

    pub fn write_likes(&self, likes: &Value) {
        std::fs::write(self.likes_path(), likes.to_string()).unwrap();
    }

    pub fn write_likes_raw(&self, text: &str) {
        std::fs::write(self.likes_path(), text).unwrap();
    }

    pub fn read_likes_file(&self) -> Value {
        read_json(&self.likes_path())
    }

    pub fn read_likes_backup(&self) -> Value {
        read_json(&self.likes_backup_path())
    }
}

/// Character document with one minimal card per id
pub fn characters_with_ids(ids: &[u64]) -> Value {
    let succubi: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "name": format!("Succubus {id}"),
                "type": "Test",
                "origin": "Fixture",
                "power": 50,
                "abilities": {"charm": 10},
                "description": "fixture character",
                "image": format!("img/{id}.png")
            })
        })
        .collect();
    json!({ "succubi": succubi })
}

/// Realm whose character file holds `characters`; no likes file yet
pub fn setup_realm(characters: &Value) -> TestRealm {
    setup_realm_with_config(characters, StoreConfig::new())
}

/// Like [`setup_realm`] with a config whose data dir is replaced
pub fn setup_realm_with_config(characters: &Value, config: StoreConfig) -> TestRealm {
    let dir = TempDir::new().unwrap();
    let config = config.with_data_dir(dir.path());
    std::fs::write(config.characters_path(), characters.to_string()).unwrap();
    TestRealm {
        realm: RealmData::new(config),
        dir,
    }
}

/// Realm over characters `ids`
pub fn setup_realm_with_ids(ids: &[u64]) -> TestRealm {
    setup_realm(&characters_with_ids(ids))
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
