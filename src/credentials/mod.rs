//! Encrypted, file-backed storage of named connection profiles.
//!
//! The credentials file is a JSON object mapping profile names to
//! `{host, port, username, encrypted_password, database}`. Passwords are only
//! ever written encrypted; [`Credentials`] is the decrypted form handed to the
//! connection manager.

mod key;

pub use key::EncryptionKey;

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: &str = "8123";
pub const DEFAULT_USERNAME: &str = "default";
pub const DEFAULT_DATABASE: &str = "default";

/// A profile as persisted: the password field holds ciphertext.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ConnectionProfile {
    pub host: String,
    #[serde(deserialize_with = "port_from_any")]
    pub port: String,
    #[serde(alias = "user")]
    pub username: String,
    #[serde(alias = "password")]
    pub encrypted_password: String,
    pub database: String,
}

/// Resolved connection parameters with the password in plaintext.
///
/// Wiped from memory on drop. The port is kept as entered so that validation
/// can happen at connect time.
#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub name: String,
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials {
            name: String::new(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: String::new(),
            database: DEFAULT_DATABASE.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

pub struct CredentialStore {
    path: PathBuf,
    key: EncryptionKey,
    profiles: BTreeMap<String, ConnectionProfile>,
    /// Set when the last `load` found data it could not read or decrypt.
    corrupt: bool,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, key: EncryptionKey) -> Self {
        CredentialStore {
            path: path.into(),
            key,
            profiles: BTreeMap::new(),
            corrupt: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every profile from disk and decrypts it.
    ///
    /// A missing file yields an empty set. On any failure the in-memory set is
    /// left empty so the store stays usable.
    pub fn load(&mut self) -> Result<Vec<Credentials>> {
        self.profiles.clear();
        let outcome = self.read_all();
        self.corrupt = matches!(outcome, Err(Error::CorruptData(_)));
        outcome
    }

    fn read_all(&mut self) -> Result<Vec<Credentials>> {
        let Some(profiles) = self.read_profiles()? else {
            return Ok(Vec::new());
        };

        let mut resolved = Vec::with_capacity(profiles.len());
        for (name, profile) in &profiles {
            resolved.push(self.resolve(name, profile)?);
        }

        info!(path = %self.path.display(), count = profiles.len(), "loaded credentials");
        self.profiles = profiles;
        Ok(resolved)
    }

    pub fn save(&mut self, creds: &Credentials) -> Result<()> {
        let name = creds.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Profile name must not be empty".to_string()));
        }

        let profile = ConnectionProfile {
            host: creds.host.clone(),
            port: creds.port.clone(),
            username: creds.username.clone(),
            encrypted_password: self.key.encrypt(&creds.password)?,
            database: creds.database.clone(),
        };

        let mut next = self.save_base()?;
        next.insert(name.to_string(), profile);
        self.write_profiles(&next)?;
        self.profiles = next;

        info!(profile = name, path = %self.path.display(), "saved credentials");
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        let mut next = self.current_on_disk();
        if next.remove(name).is_none() {
            return Err(Error::ProfileNotFound(name.to_string()));
        }
        self.write_profiles(&next)?;
        self.profiles = next;

        info!(profile = name, "deleted credentials");
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, name: &str) -> Result<Credentials> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| Error::ProfileNotFound(name.to_string()))?;
        self.resolve(name, profile)
    }

    /// Name of the profile to pre-select: the first remote one, otherwise the
    /// first one.
    pub fn preferred(&self) -> Option<String> {
        self.profiles
            .iter()
            .find(|(_, p)| !is_local_host(&p.host))
            .or_else(|| self.profiles.iter().next())
            .map(|(name, _)| name.clone())
    }

    fn resolve(&self, name: &str, profile: &ConnectionProfile) -> Result<Credentials> {
        let password = self
            .key
            .decrypt(&profile.encrypted_password)
            .map_err(|e| match e {
                Error::CorruptData(message) => {
                    Error::CorruptData(format!("profile '{}': {}", name, message))
                }
                other => other,
            })?;
        Ok(Credentials {
            name: name.to_string(),
            host: profile.host.clone(),
            port: profile.port.clone(),
            username: profile.username.clone(),
            password,
            database: profile.database.clone(),
        })
    }

    /// Profiles a save starts from. After a corrupt load the old file is moved
    /// to `<path>.bak` and the save starts over, otherwise it merges with disk.
    fn save_base(&mut self) -> Result<BTreeMap<String, ConnectionProfile>> {
        if !self.corrupt {
            return Ok(self.current_on_disk());
        }

        let backup = self.backup_path();
        match fs::rename(&self.path, &backup) {
            Ok(()) => {
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    "moved unreadable credentials file aside"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::from_io(&self.path, e)),
        }
        self.corrupt = false;
        Ok(self.profiles.clone())
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Profiles to merge a write into: the file's current content when it can
    /// be read, otherwise what is in memory.
    fn current_on_disk(&self) -> BTreeMap<String, ConnectionProfile> {
        match self.read_profiles() {
            Ok(Some(profiles)) => profiles,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "rewriting unreadable credentials file");
                self.profiles.clone()
            }
        }
    }

    fn read_profiles(&self) -> Result<Option<BTreeMap<String, ConnectionProfile>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| Error::from_io(&self.path, e))?;
        parse_profiles(&raw).map(Some)
    }

    fn write_profiles(&self, profiles: &BTreeMap<String, ConnectionProfile>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::from_io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(profiles)
            .map_err(|e| Error::CorruptData(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| Error::from_io(&self.path, e))
    }
}

fn parse_profiles(raw: &str) -> Result<BTreeMap<String, ConnectionProfile>> {
    let value: Value = serde_json::from_str(raw).map_err(|e| Error::CorruptData(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(Error::CorruptData("expected a JSON object at the top level".to_string()));
    };

    // Older files held a single unnamed profile at the top level
    if matches!(map.get("host"), Some(Value::String(_))) {
        let profile = serde_json::from_value(Value::Object(map))
            .map_err(|e| Error::CorruptData(e.to_string()))?;
        return Ok(BTreeMap::from([("default".to_string(), profile)]));
    }

    map.into_iter()
        .map(|(name, entry)| {
            let profile = serde_json::from_value(entry)
                .map_err(|e| Error::CorruptData(format!("profile '{}': {}", name, e)))?;
            Ok((name, profile))
        })
        .collect()
}

fn port_from_any<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "port must be a string or a number, got {}",
            other
        ))),
    }
}

fn is_local_host(host: &str) -> bool {
    let host = host.trim();
    host.is_empty() || host.contains("localhost") || host.contains("127.0.0.1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn test_key() -> EncryptionKey {
        EncryptionKey::from_bytes([9u8; 32])
    }

    fn store_in(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("creds.json"), test_key())
    }

    fn prod() -> Credentials {
        Credentials {
            name: "prod".to_string(),
            host: "db.example.com".to_string(),
            port: "9000".to_string(),
            username: "default".to_string(),
            password: "secret123".to_string(),
            database: "analytics".to_string(),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        store.save(&prod()).unwrap();

        let mut reopened = store_in(&temp_dir);
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], prod());
        assert_eq!(loaded[0].password, "secret123");
        assert_eq!(reopened.names(), vec!["prod".to_string()]);
    }

    #[test]
    fn test_password_never_written_in_plaintext() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        store.save(&prod()).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("secret123"));
        assert!(raw.contains("encrypted_password"));
        assert!(raw.contains("db.example.com"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        assert!(store.load().unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_invalid_json_is_corrupt_and_store_stays_usable() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        std::fs::write(store.path(), "{ not json").unwrap();

        let err = store.load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
        assert!(store.is_empty());

        // The store can still save over the broken file
        store.save(&prod()).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
        assert_eq!(
            std::fs::read_to_string(store.backup_path()).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn test_load_invalid_ciphertext_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        std::fs::write(
            store.path(),
            r#"{"prod": {"host": "h", "port": "9000", "username": "u",
                "encrypted_password": "definitely-not-ciphertext", "database": "d"}}"#,
        )
        .unwrap();

        let err = store.load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
        assert!(store.is_empty());
        assert!(store.names().is_empty());
    }

    #[test]
    fn test_key_mismatch_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        store_in(&temp_dir).save(&prod()).unwrap();

        let mut other =
            CredentialStore::new(temp_dir.path().join("creds.json"), EncryptionKey::generate());
        let err = other.load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
        assert_eq!(
            err.to_string(),
            "Credentials file is corrupt: profile 'prod': password decryption failed (key mismatch?)"
        );
    }

    #[test]
    fn test_save_after_key_mismatch_starts_a_fresh_file() {
        let temp_dir = TempDir::new().unwrap();
        store_in(&temp_dir).save(&prod()).unwrap();

        let path = temp_dir.path().join("creds.json");
        let new_key = EncryptionKey::from_bytes([4u8; 32]);
        let mut other = CredentialStore::new(&path, new_key.clone());
        assert!(other.load().is_err());

        let mut fresh = prod();
        fresh.name = "fresh".to_string();
        other.save(&fresh).unwrap();
        assert_eq!(other.names(), vec!["fresh".to_string()]);

        let mut reopened = CredentialStore::new(&path, new_key);
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "fresh");
        assert_eq!(loaded[0].password, "secret123");

        // The unreadable profiles are kept next to the new file
        let mut backup = CredentialStore::new(reopened.backup_path(), test_key());
        assert_eq!(backup.load().unwrap()[0].name, "prod");
    }

    #[test]
    fn test_unknown_and_missing_fields_are_tolerated() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        std::fs::write(
            store.path(),
            r#"{"dev": {"host": "dev.local", "port": 8123, "color": "blue"}}"#,
        )
        .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].host, "dev.local");
        assert_eq!(loaded[0].port, "8123");
        assert_eq!(loaded[0].username, "");
        assert_eq!(loaded[0].password, "");
        assert_eq!(loaded[0].database, "");
    }

    #[test]
    fn test_legacy_field_names_are_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let key = test_key();
        let blob = key.encrypt("pw").unwrap();
        let mut store = CredentialStore::new(temp_dir.path().join("creds.json"), key);
        std::fs::write(
            store.path(),
            format!(
                r#"{{"old": {{"host": "h", "port": "9000", "user": "bob", "password": "{}", "database": "d"}}}}"#,
                blob
            ),
        )
        .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].username, "bob");
        assert_eq!(loaded[0].password, "pw");
    }

    #[test]
    fn test_legacy_single_profile_file_loads_as_default() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        std::fs::write(
            store.path(),
            r#"{"host": "solo.example.com", "port": "8443", "user": "default", "password": "", "database": "default"}"#,
        )
        .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "default");
        assert_eq!(loaded[0].host, "solo.example.com");
    }

    #[test]
    fn test_delete_profile() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        store.save(&prod()).unwrap();
        let mut staging = prod();
        staging.name = "staging".to_string();
        store.save(&staging).unwrap();

        store.delete("prod").unwrap();
        assert_eq!(store.names(), vec!["staging".to_string()]);

        let mut reopened = store_in(&temp_dir);
        assert_eq!(reopened.load().unwrap().len(), 1);

        let err = store.delete("nonexistent").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_save_preserves_profiles_written_by_another_instance() {
        let temp_dir = TempDir::new().unwrap();
        let mut first = store_in(&temp_dir);
        let mut second = store_in(&temp_dir);

        first.save(&prod()).unwrap();
        let mut other = prod();
        other.name = "other".to_string();
        second.save(&other).unwrap();

        assert_eq!(
            second.names(),
            vec!["other".to_string(), "prod".to_string()]
        );
    }

    #[test]
    fn test_save_rejects_empty_name() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        let mut creds = prod();
        creds.name = "  ".to_string();
        assert_eq!(store.save(&creds).unwrap_err().kind(), ErrorKind::Validation);
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_to_read_only_directory_is_permission_error() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let locked = temp_dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o500)).unwrap();

        // Root ignores directory permissions, nothing to check there
        if std::fs::write(locked.join("probe"), "x").is_ok() {
            return;
        }

        let mut store = CredentialStore::new(locked.join("creds.json"), test_key());
        let err = store.save(&prod()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[test]
    fn test_get_and_preferred() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = store_in(&temp_dir);
        let mut local = prod();
        local.name = "a-local".to_string();
        local.host = "localhost".to_string();
        store.save(&local).unwrap();
        assert_eq!(store.preferred(), Some("a-local".to_string()));

        store.save(&prod()).unwrap();
        assert_eq!(store.preferred(), Some("prod".to_string()));
        assert_eq!(store.get("prod").unwrap().password, "secret123");
        assert_eq!(store.get("missing").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", prod());
        assert!(!rendered.contains("secret123"));
        assert!(rendered.contains("<redacted>"));
    }
}
