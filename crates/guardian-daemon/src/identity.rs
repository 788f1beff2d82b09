//! Persistent device identity and its registration with the control server.

use std::path::{Path, PathBuf};

use guardian_protocol::{Registration, ServerApi};
use guardian_types::DeviceIdentity;
use tracing::{info, warn};

/// File name of the persisted identity inside the config directory.
const IDENTITY_FILE: &str = "device-id";

/// Owns the on-disk device identity.
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join(IDENTITY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the persisted identity, creating and persisting one on first run.
    ///
    /// Never fails. An empty identity file is replaced. A file that exists
    /// but cannot be read is left untouched and a temporary identity is used
    /// for this run. A write failure leaves the new identity in memory only.
    pub fn get_or_create(&self) -> DeviceIdentity {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                if let Some(id) = DeviceIdentity::parse(&content) {
                    info!(id = %id, "loaded device identity");
                    return id;
                }
                warn!(path = %self.path.display(), "identity file is empty, generating a new one");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                let id = DeviceIdentity::generate();
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    id = %id,
                    "failed to read identity, using a temporary one and leaving the file in place"
                );
                return id;
            }
        }

        let id = DeviceIdentity::generate();
        if let Err(e) = self.persist(&id) {
            warn!(path = %self.path.display(), error = %e, "failed to persist device identity");
        }
        info!(id = %id, "created new device identity");
        id
    }

    fn persist(&self, id: &DeviceIdentity) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, id.as_str())
    }
}

/// Register `identity` once. Failures are logged and not retried.
pub async fn register_identity(api: &dyn ServerApi, identity: &DeviceIdentity) {
    match api.register(identity).await {
        Ok(Registration::Registered) => info!(id = %identity, "device identity registered"),
        Ok(Registration::AlreadyRegistered) => {
            info!(id = %identity, "device identity was already registered");
        }
        Err(e) => warn!(id = %identity, error = %e, "failed to register device identity"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_protocol::mock::MockServerApi;

    #[test]
    fn creates_then_reuses_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path());

        let first = store.get_or_create();
        assert!(store.path().exists());
        let second = store.get_or_create();
        assert_eq!(first, second);

        // A fresh store over the same directory sees the same identity.
        let third = IdentityStore::new(dir.path()).get_or_create();
        assert_eq!(first, third);
    }

    #[test]
    fn keeps_existing_opaque_identity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(IDENTITY_FILE), "legacy-uid-42\n").unwrap();
        let id = IdentityStore::new(dir.path()).get_or_create();
        assert_eq!(id.as_str(), "legacy-uid-42");
    }

    #[test]
    fn replaces_empty_identity_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(IDENTITY_FILE), "  \n").unwrap();
        let store = IdentityStore::new(dir.path());
        let id = store.get_or_create();
        assert_eq!(id.as_str().len(), 36);
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            id.as_str()
        );
    }

    #[test]
    fn unreadable_identity_file_is_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path());
        let original = [0xff, 0xfe, 0x00, 0x41];
        std::fs::write(store.path(), original).unwrap();

        let id = store.get_or_create();
        assert_eq!(id.as_str().len(), 36);
        assert_eq!(std::fs::read(store.path()).unwrap(), original);

        // Each run gets its own temporary identity until the file is fixed.
        let again = store.get_or_create();
        assert_ne!(id, again);
        assert_eq!(std::fs::read(store.path()).unwrap(), original);
    }

    #[test]
    fn creates_missing_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = IdentityStore::new(&nested);
        let id = store.get_or_create();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), id.as_str());
    }

    #[tokio::test]
    async fn already_registered_keeps_identity_and_does_not_retry() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path());
        let id = store.get_or_create();

        let api = MockServerApi::new(Some(Registration::AlreadyRegistered));
        register_identity(&api, &id).await;

        assert_eq!(api.registrations(), vec![id.clone()]);
        assert_eq!(store.get_or_create(), id);
    }

    #[tokio::test]
    async fn failed_registration_is_not_retried() {
        let id = DeviceIdentity::generate();
        let api = MockServerApi::new(None);
        register_identity(&api, &id).await;
        assert_eq!(api.registrations().len(), 1);
    }
}
