use anyhow::Result;
use rocksdb::{Direction, IteratorMode, Options, DB};

use crate::model::{device::Device, topic::Topic, user::User};

use std::{str, sync::Mutex};

/// A requested topic name already exists in the device's active set. Raised
/// at write time so concurrent adds cannot slip a duplicate past the
/// read-then-diff done by the service layer.
#[derive(Debug, thiserror::Error)]
#[error("topic names already registered: {0:?}")]
pub struct DuplicateTopics(pub Vec<String>);

#[derive(Debug, thiserror::Error)]
#[error("username already taken: {0}")]
pub struct DuplicateUsername(pub String);

/// The owner row vanished between the caller's check and the write. Raised
/// at write time so a device can never be committed under a deleted user.
#[derive(Debug, thiserror::Error)]
#[error("user {0} does not exist")]
pub struct MissingOwner(pub u64);

pub struct DbLayer {
    db: DB,
    // Serializes id allocation and uniqueness checks. Reads never take it.
    write_lock: Mutex<()>,
}

impl DbLayer {
    pub fn new(path: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    // ============================================================
    // KEY LAYOUT
    // ============================================================
    fn user_key(user_id: u64) -> String {
        format!("user:{user_id:020}")
    }

    fn username_key(username: &str) -> String {
        format!("username:{username}")
    }

    // Device keys carry the owner id first so the ownership join is a single
    // keyed lookup and per-user listing is a prefix scan.
    fn device_key(owner_id: u64, device_id: u64) -> String {
        format!("device:{owner_id:020}:{device_id:020}")
    }

    fn device_prefix(owner_id: u64) -> String {
        format!("device:{owner_id:020}:")
    }

    fn topic_key(device_id: u64, topic_id: u64) -> String {
        format!("topic:{device_id:020}:{topic_id:020}")
    }

    fn topic_prefix(device_id: u64) -> String {
        format!("topic:{device_id:020}:")
    }

    /// Next value of a persisted counter. Callers must hold `write_lock`.
    fn next_id(&self, kind: &str) -> Result<u64> {
        let key = format!("seq:{kind}");
        let current = match self.db.get(&key)? {
            Some(raw) => str::from_utf8(&raw)?.parse::<u64>()?,
            None => 0,
        };
        let next = current + 1;
        self.db.put(&key, next.to_string())?;
        Ok(next)
    }

    fn scan_prefix<T: serde::de::DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let mut results = Vec::new();

        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, val) = item?;
            let k = str::from_utf8(&key)?;
            if !k.starts_with(prefix) {
                break;
            }
            results.push(serde_json::from_slice(&val)?);
        }

        Ok(results)
    }

    // ============================================================
    // USER STORAGE
    // ============================================================
    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let _guard = self.write_lock.lock().unwrap();

        if self.db.get(Self::username_key(username))?.is_some() {
            return Err(DuplicateUsername(username.to_string()).into());
        }

        let user = User {
            id: self.next_id("user")?,
            username: username.to_string(),
            first_name: None,
            last_name: None,
            password_hash: password_hash.to_string(),
            mqtt_password_hash: None,
            created_ts: chrono::Utc::now().timestamp(),
        };

        self.db
            .put(Self::user_key(user.id), serde_json::to_vec(&user)?)?;
        self.db
            .put(Self::username_key(username), user.id.to_string())?;

        Ok(user)
    }

    pub async fn save_user(&self, user: &User) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        self.db
            .put(Self::user_key(user.id), serde_json::to_vec(user)?)?;
        Ok(())
    }

    pub async fn load_user(&self, user_id: u64) -> Result<Option<User>> {
        Ok(self
            .db
            .get(Self::user_key(user_id))?
            .map(|v| serde_json::from_slice(&v))
            .transpose()?)
    }

    pub async fn find_user_by_name(&self, username: &str) -> Result<Option<User>> {
        let Some(raw) = self.db.get(Self::username_key(username))? else {
            return Ok(None);
        };
        let user_id = str::from_utf8(&raw)?.parse::<u64>()?;
        self.load_user(user_id).await
    }

    /// Deletes a user together with every owned device and topic. The whole
    /// chain goes in one pass so no orphaned rows survive.
    pub async fn delete_user(&self, user_id: u64) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();

        // Scanned under the lock so a racing create_device cannot slip a
        // device in behind the cascade.
        let devices: Vec<Device> = self.scan_prefix(&Self::device_prefix(user_id))?;

        for device in &devices {
            self.delete_topics_for_device(device.id)?;
            self.db.delete(Self::device_key(user_id, device.id))?;
        }

        if let Some(raw) = self.db.get(Self::user_key(user_id))? {
            let user: User = serde_json::from_slice(&raw)?;
            self.db.delete(Self::username_key(&user.username))?;
        }
        self.db.delete(Self::user_key(user_id))?;

        Ok(())
    }

    // ============================================================
    // DEVICE STORAGE
    // ============================================================
    pub async fn create_device(
        &self,
        owner_id: u64,
        name: &str,
        serial: Option<String>,
    ) -> Result<Device> {
        let _guard = self.write_lock.lock().unwrap();

        // Re-checked under the lock: the owner may have been unregistered
        // since the caller resolved it.
        if self.db.get(Self::user_key(owner_id))?.is_none() {
            return Err(MissingOwner(owner_id).into());
        }

        let device = Device {
            id: self.next_id("device")?,
            name: name.to_string(),
            serial,
            owner_id,
            created_ts: chrono::Utc::now().timestamp(),
        };

        self.db.put(
            Self::device_key(owner_id, device.id),
            serde_json::to_vec(&device)?,
        )?;

        Ok(device)
    }

    /// Joint lookup keyed by (owner, device). A miss means "no such owner",
    /// "no such device" or "owned by someone else" — indistinguishable on
    /// purpose.
    pub async fn load_owned_device(&self, owner_id: u64, device_id: u64) -> Result<Option<Device>> {
        Ok(self
            .db
            .get(Self::device_key(owner_id, device_id))?
            .map(|v| serde_json::from_slice(&v))
            .transpose()?)
    }

    pub async fn list_devices_for_user(&self, owner_id: u64) -> Result<Vec<Device>> {
        self.scan_prefix(&Self::device_prefix(owner_id))
    }

    pub async fn delete_device(&self, owner_id: u64, device_id: u64) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        self.delete_topics_for_device(device_id)?;
        self.db.delete(Self::device_key(owner_id, device_id))?;
        Ok(())
    }

    // ============================================================
    // TOPIC STORAGE
    // ============================================================

    /// Creates one topic per name. Fails with [`DuplicateTopics`] if any name
    /// is already active on the device (or repeats within `names`), so the
    /// per-device uniqueness invariant holds even under concurrent adds.
    pub async fn create_topics(&self, device_id: u64, names: &[String]) -> Result<Vec<Topic>> {
        let _guard = self.write_lock.lock().unwrap();

        let existing: Vec<Topic> = self.scan_prefix(&Self::topic_prefix(device_id))?;
        let mut active: std::collections::HashSet<&str> =
            existing.iter().map(|t| t.name.as_str()).collect();

        let mut duplicates = Vec::new();
        for name in names {
            if !active.insert(name.as_str()) {
                duplicates.push(name.clone());
            }
        }
        if !duplicates.is_empty() {
            return Err(DuplicateTopics(duplicates).into());
        }

        let mut created = Vec::with_capacity(names.len());
        for name in names {
            let topic = Topic {
                id: self.next_id("topic")?,
                name: name.clone(),
                unit: None,
                last_update: None,
            };
            self.db.put(
                Self::topic_key(device_id, topic.id),
                serde_json::to_vec(&topic)?,
            )?;
            created.push(topic);
        }

        Ok(created)
    }

    pub async fn topics_for_device(&self, device_id: u64) -> Result<Vec<Topic>> {
        self.scan_prefix(&Self::topic_prefix(device_id))
    }

    pub async fn topic_names_for_device(&self, device_id: u64) -> Result<Vec<String>> {
        Ok(self
            .topics_for_device(device_id)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect())
    }

    pub async fn delete_topics(&self, device_id: u64, topics: &[Topic]) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        for topic in topics {
            self.db.delete(Self::topic_key(device_id, topic.id))?;
        }
        Ok(())
    }

    fn delete_topics_for_device(&self, device_id: u64) -> Result<()> {
        let prefix = Self::topic_prefix(device_id);
        let mut keys = Vec::new();

        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, _) = item?;
            let k = str::from_utf8(&key)?;
            if !k.starts_with(&prefix) {
                break;
            }
            keys.push(key);
        }

        for key in keys {
            self.db.delete(key)?;
        }

        Ok(())
    }
}
