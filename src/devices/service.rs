use std::sync::Arc;

use crate::db::{DbLayer, DuplicateTopics, MissingOwner};
use crate::devices::topics::{topics_to_add, topics_to_remove};
use crate::devices::types::{DeviceDetail, TopicAdd, TopicInput, TopicRemove};
use crate::error::RegistryError;
use crate::model::device::{Device, DEVICE_NAME_MAX_LEN};
use crate::model::topic::TOPIC_NAME_MAX_LEN;
use crate::model::user::User;

pub struct DevicesService {
    db: Arc<DbLayer>,
}

impl DevicesService {
    pub fn new(db: Arc<DbLayer>) -> Self {
        Self { db }
    }

    pub async fn register(
        &self,
        owner_id: u64,
        name: Option<&str>,
        topic_names: &[String],
    ) -> Result<DeviceDetail, RegistryError> {
        let owner = self.get_owner(owner_id).await?;

        let name = match name {
            Some(n) if !n.is_empty() => n,
            _ => return Err(RegistryError::InvalidInput("Device name is missing".into())),
        };
        if name.chars().count() > DEVICE_NAME_MAX_LEN {
            return Err(RegistryError::InvalidInput("Device name is too long".into()));
        }
        validate_topic_names(topic_names)?;

        // The storage layer re-checks the owner under its write lock; an
        // unregister racing this call surfaces as the same NotFound.
        let device = match self.db.create_device(owner.id, name, None).await {
            Ok(device) => device,
            Err(e) if e.is::<MissingOwner>() => {
                return Err(RegistryError::NotFound("User not found".into()));
            }
            Err(e) => return Err(e.into()),
        };

        // Repeats in the initial list collapse; the device starts with a set.
        let initial = topics_to_add(&[], topic_names);
        let topics = match self.db.create_topics(device.id, &initial).await {
            Ok(topics) => topics,
            Err(e) => {
                self.db.delete_device(owner.id, device.id).await?;
                return Err(e.into());
            }
        };

        tracing::info!(owner_id, device_id = device.id, "device registered");
        Ok(DeviceDetail::new(
            &device,
            topics.into_iter().map(|t| t.name).collect(),
        ))
    }

    pub async fn unregister(
        &self,
        owner_id: u64,
        device_id: u64,
    ) -> Result<DeviceDetail, RegistryError> {
        let device = self.find_owned_device(device_id, owner_id).await?;
        let topics = self.db.topic_names_for_device(device.id).await?;

        self.db.delete_device(owner_id, device.id).await?;

        tracing::info!(owner_id, device_id, "device unregistered");
        Ok(DeviceDetail::new(&device, topics))
    }

    /// Lists all devices of an owner. An empty registry is reported as
    /// NotFound rather than an empty success; callers depend on that.
    pub async fn list(&self, owner_id: u64) -> Result<Vec<DeviceDetail>, RegistryError> {
        let owner = self.get_owner(owner_id).await?;

        let devices = self.db.list_devices_for_user(owner.id).await?;
        if devices.is_empty() {
            return Err(RegistryError::NotFound("No devices found".into()));
        }

        let mut details = Vec::with_capacity(devices.len());
        for device in &devices {
            let topics = self.db.topic_names_for_device(device.id).await?;
            details.push(DeviceDetail::new(device, topics));
        }

        Ok(details)
    }

    pub async fn get_details(
        &self,
        owner_id: u64,
        device_id: u64,
    ) -> Result<DeviceDetail, RegistryError> {
        let device = self.find_owned_device(device_id, owner_id).await?;
        let topics = self.db.topic_names_for_device(device.id).await?;
        Ok(DeviceDetail::new(&device, topics))
    }

    pub async fn add_topics(
        &self,
        owner_id: u64,
        device_id: u64,
        input: TopicInput,
    ) -> Result<TopicAdd, RegistryError> {
        let device = self.find_owned_device(device_id, owner_id).await?;

        let requested = input.into_names();
        validate_topic_names(&requested)?;
        let current = self.db.topic_names_for_device(device.id).await?;
        let to_add = topics_to_add(&current, &requested);

        if to_add.is_empty() {
            return Err(RegistryError::Conflict(
                "Topics are already registered".into(),
            ));
        }

        // A concurrent add can still win the race between the read above and
        // this write; the storage layer re-checks and we report the same
        // conflict as if the names had been present all along.
        let created = match self.db.create_topics(device.id, &to_add).await {
            Ok(topics) => topics,
            Err(e) if e.is::<DuplicateTopics>() => {
                return Err(RegistryError::Conflict(
                    "Topics are already registered".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(TopicAdd {
            topics_added: created.len(),
            topics: created.into_iter().map(|t| t.name).collect(),
        })
    }

    pub async fn remove_topics(
        &self,
        owner_id: u64,
        device_id: u64,
        input: TopicInput,
    ) -> Result<TopicRemove, RegistryError> {
        let device = self.find_owned_device(device_id, owner_id).await?;

        let requested = input.into_names();
        let current = self.db.topics_for_device(device.id).await?;
        let selected: Vec<_> = topics_to_remove(&current, &requested, |t| t.name.as_str())
            .into_iter()
            .cloned()
            .collect();

        if selected.is_empty() {
            return Err(RegistryError::Conflict("Topics are not registered".into()));
        }

        self.db.delete_topics(device.id, &selected).await?;

        Ok(TopicRemove {
            topics_removed: selected.len(),
            topics: selected.into_iter().map(|t| t.name).collect(),
        })
    }

    /// Read-style presence check that reports absence as a Conflict instead
    /// of `false`; the broker hook is the boolean one, not this.
    pub async fn check_topic(
        &self,
        owner_id: u64,
        device_id: u64,
        topic_name: &str,
    ) -> Result<bool, RegistryError> {
        let device = self.find_owned_device(device_id, owner_id).await?;

        let current = self.db.topic_names_for_device(device.id).await?;
        if !current.iter().any(|n| n == topic_name) {
            return Err(RegistryError::Conflict("Topic is not registered".into()));
        }

        Ok(true)
    }

    async fn get_owner(&self, owner_id: u64) -> Result<User, RegistryError> {
        self.db
            .load_user(owner_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound("User not found".into()))
    }

    /// Ownership guard. One keyed lookup filtered by both ids at once; the
    /// message is identical whether the owner is missing, the device is
    /// missing, or the device belongs to someone else, so callers cannot
    /// probe for other users' devices.
    async fn find_owned_device(
        &self,
        device_id: u64,
        owner_id: u64,
    ) -> Result<Device, RegistryError> {
        self.db
            .load_owned_device(owner_id, device_id)
            .await?
            .ok_or_else(|| {
                RegistryError::NotFound(format!(
                    "Device with id {device_id} was not found for user with id {owner_id}"
                ))
            })
    }
}

fn validate_topic_names(names: &[String]) -> Result<(), RegistryError> {
    if names
        .iter()
        .any(|name| name.chars().count() > TOPIC_NAME_MAX_LEN)
    {
        return Err(RegistryError::InvalidInput("Topic name is too long".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::testing::StaticSigner;
    use crate::users::types::UserLookup;
    use crate::users::UsersService;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        db: Arc<DbLayer>,
        users: UsersService,
        devices: DevicesService,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(DbLayer::new(dir.path().to_str().unwrap()).unwrap());
        Fixture {
            _dir: dir,
            db: db.clone(),
            users: UsersService::new(db.clone(), Arc::new(StaticSigner)),
            devices: DevicesService::new(db),
        }
    }

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    async fn new_user(fx: &Fixture, username: &str) -> u64 {
        fx.users
            .register(Some(username), Some("hunter2"))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn register_creates_device_with_initial_topics() {
        let fx = fixture();
        let owner = new_user(&fx, "alice").await;

        let detail = fx
            .devices
            .register(owner, Some("thermo"), &names(&["temp", "humidity"]))
            .await
            .unwrap();
        assert_eq!(detail.name, "thermo");
        assert_eq!(detail.user_id, owner);
        assert_eq!(detail.topics, names(&["temp", "humidity"]));

        // Empty topic list is allowed.
        let bare = fx
            .devices
            .register(owner, Some("gps"), &[])
            .await
            .unwrap();
        assert!(bare.topics.is_empty());
    }

    #[tokio::test]
    async fn register_rejects_missing_owner_and_missing_name() {
        let fx = fixture();
        let owner = new_user(&fx, "alice").await;

        let err = fx
            .devices
            .register(owner + 99, Some("thermo"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert_eq!(err.to_string(), "User not found");

        let err = fx.devices.register(owner, None, &[]).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInput(_)));
        assert_eq!(err.to_string(), "Device name is missing");
    }

    #[tokio::test]
    async fn register_rejects_overlong_names() {
        let fx = fixture();
        let owner = new_user(&fx, "alice").await;

        let long = "d".repeat(16);
        let err = fx
            .devices
            .register(owner, Some(&long), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInput(_)));
        assert_eq!(err.to_string(), "Device name is too long");

        let err = fx
            .devices
            .register(owner, Some("thermo"), &["t".repeat(16)])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInput(_)));
        assert_eq!(err.to_string(), "Topic name is too long");
    }

    #[tokio::test]
    async fn add_topics_rejects_an_overlong_name() {
        let fx = fixture();
        let owner = new_user(&fx, "alice").await;
        let device = fx
            .devices
            .register(owner, Some("thermo"), &[])
            .await
            .unwrap();

        let err = fx
            .devices
            .add_topics(owner, device.id, TopicInput::One("t".repeat(16)))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInput(_)));
        assert_eq!(err.to_string(), "Topic name is too long");
    }

    #[tokio::test]
    async fn list_reports_an_empty_registry_as_not_found() {
        let fx = fixture();
        let owner = new_user(&fx, "alice").await;

        let err = fx.devices.list(owner).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert_eq!(err.to_string(), "No devices found");

        fx.devices
            .register(owner, Some("thermo"), &names(&["temp"]))
            .await
            .unwrap();
        let listed = fx.devices.list(owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].topics, names(&["temp"]));
    }

    #[tokio::test]
    async fn ownership_guard_is_uniform_across_all_three_causes() {
        let fx = fixture();
        let alice = new_user(&fx, "alice").await;
        let bob = new_user(&fx, "bob").await;
        let device = fx
            .devices
            .register(alice, Some("thermo"), &[])
            .await
            .unwrap();

        // Device owned by someone else.
        let foreign = fx
            .devices
            .get_details(bob, device.id)
            .await
            .unwrap_err();
        // Device absent.
        let missing_device = fx
            .devices
            .get_details(alice, device.id + 99)
            .await
            .unwrap_err();
        // Owner absent.
        let ghost = 4242;
        let missing_owner = fx.devices.get_details(ghost, device.id).await.unwrap_err();

        assert!(matches!(foreign, RegistryError::NotFound(_)));
        assert_eq!(
            foreign.to_string(),
            format!(
                "Device with id {} was not found for user with id {bob}",
                device.id
            )
        );
        assert_eq!(
            missing_device.to_string(),
            format!(
                "Device with id {} was not found for user with id {alice}",
                device.id + 99
            )
        );
        assert_eq!(
            missing_owner.to_string(),
            format!(
                "Device with id {} was not found for user with id {ghost}",
                device.id
            )
        );
    }

    #[tokio::test]
    async fn add_topics_diffs_against_the_current_set() {
        let fx = fixture();
        let owner = new_user(&fx, "alice").await;
        let device = fx
            .devices
            .register(owner, Some("thermo"), &names(&["temp"]))
            .await
            .unwrap();

        // Mixed list: only the new names land.
        let added = fx
            .devices
            .add_topics(
                owner,
                device.id,
                TopicInput::Many(names(&["temp", "pressure"])),
            )
            .await
            .unwrap();
        assert_eq!(
            added,
            TopicAdd {
                topics_added: 1,
                topics: names(&["pressure"]),
            }
        );

        // Identical list again: nothing left to add.
        let err = fx
            .devices
            .add_topics(
                owner,
                device.id,
                TopicInput::Many(names(&["temp", "pressure"])),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
        assert_eq!(err.to_string(), "Topics are already registered");

        // Empty request behaves the same.
        let err = fx
            .devices
            .add_topics(owner, device.id, TopicInput::Many(vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Topics are already registered");
    }

    #[tokio::test]
    async fn single_topic_name_normalizes_to_a_list() {
        let fx = fixture();
        let owner = new_user(&fx, "alice").await;
        let device = fx
            .devices
            .register(owner, Some("thermo"), &[])
            .await
            .unwrap();

        let added = fx
            .devices
            .add_topics(owner, device.id, TopicInput::One("temp".into()))
            .await
            .unwrap();
        assert_eq!(added.topics_added, 1);
        assert_eq!(added.topics, names(&["temp"]));

        let removed = fx
            .devices
            .remove_topics(owner, device.id, TopicInput::One("temp".into()))
            .await
            .unwrap();
        assert_eq!(removed.topics_removed, 1);
    }

    #[tokio::test]
    async fn remove_topics_intersects_and_conflicts_when_empty() {
        let fx = fixture();
        let owner = new_user(&fx, "alice").await;
        let device = fx
            .devices
            .register(owner, Some("thermo"), &names(&["temp", "humidity"]))
            .await
            .unwrap();

        let err = fx
            .devices
            .remove_topics(owner, device.id, TopicInput::One("ghost".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
        assert_eq!(err.to_string(), "Topics are not registered");

        let removed = fx
            .devices
            .remove_topics(
                owner,
                device.id,
                TopicInput::Many(names(&["temp", "ghost"])),
            )
            .await
            .unwrap();
        assert_eq!(
            removed,
            TopicRemove {
                topics_removed: 1,
                topics: names(&["temp"]),
            }
        );

        let err = fx
            .devices
            .check_topic(owner, device.id, "temp")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
        assert_eq!(err.to_string(), "Topic is not registered");

        assert!(fx
            .devices
            .check_topic(owner, device.id, "humidity")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn unregister_returns_the_pre_deletion_detail() {
        let fx = fixture();
        let owner = new_user(&fx, "alice").await;
        let device = fx
            .devices
            .register(owner, Some("thermo"), &names(&["temp"]))
            .await
            .unwrap();

        let detail = fx.devices.unregister(owner, device.id).await.unwrap();
        assert_eq!(detail, device);

        assert!(fx
            .db
            .topics_for_device(device.id)
            .await
            .unwrap()
            .is_empty());
        let err = fx.devices.get_details(owner, device.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn end_to_end_topic_lifecycle() {
        let fx = fixture();
        let owner = new_user(&fx, "u1").await;

        let d1 = fx
            .devices
            .register(owner, Some("D1"), &names(&["t1", "t2"]))
            .await
            .unwrap();

        let listed = fx.devices.list(owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].topics, names(&["t1", "t2"]));

        let added = fx
            .devices
            .add_topics(owner, d1.id, TopicInput::One("t3".into()))
            .await
            .unwrap();
        assert_eq!(added.topics_added, 1);
        assert_eq!(added.topics, names(&["t3"]));

        let removed = fx
            .devices
            .remove_topics(owner, d1.id, TopicInput::Many(names(&["t1", "t3"])))
            .await
            .unwrap();
        assert_eq!(removed.topics_removed, 2);
        assert_eq!(removed.topics, names(&["t1", "t3"]));

        let detail = fx.devices.get_details(owner, d1.id).await.unwrap();
        assert_eq!(detail.topics, names(&["t2"]));
    }

    #[tokio::test]
    async fn user_unregister_cascades_into_the_registry() {
        let fx = fixture();
        let owner = new_user(&fx, "u1").await;
        let device = fx
            .devices
            .register(owner, Some("D1"), &names(&["t1"]))
            .await
            .unwrap();

        fx.users
            .unregister(Some(owner), Some("hunter2"))
            .await
            .unwrap();

        // Owner is gone, so the registry reports the user as unknown.
        let err = fx.devices.list(owner).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert_eq!(err.to_string(), "User not found");

        // And nothing owned survived.
        assert!(fx
            .db
            .list_devices_for_user(owner)
            .await
            .unwrap()
            .is_empty());
        assert!(fx
            .db
            .topics_for_device(device.id)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            fx.users
                .get_user_details(UserLookup::Id(owner))
                .await
                .unwrap_err(),
            RegistryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn concurrent_overlapping_adds_keep_names_unique() {
        let fx = fixture();
        let owner = new_user(&fx, "alice").await;
        let device = fx
            .devices
            .register(owner, Some("thermo"), &[])
            .await
            .unwrap();

        let devices = Arc::new(DevicesService::new(fx.db.clone()));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let devices = devices.clone();
            let device_id = device.id;
            handles.push(tokio::spawn(async move {
                devices
                    .add_topics(
                        owner,
                        device_id,
                        TopicInput::Many(vec!["temp".into(), "humidity".into()]),
                    )
                    .await
            }));
        }

        for handle in handles {
            // Each task either adds names or sees them as already registered.
            match handle.await.unwrap() {
                Ok(added) => assert!(added.topics_added <= 2),
                Err(err) => assert!(matches!(err, RegistryError::Conflict(_))),
            }
        }

        let mut active = fx.db.topic_names_for_device(device.id).await.unwrap();
        active.sort();
        assert_eq!(active, names(&["humidity", "temp"]));
    }
}
