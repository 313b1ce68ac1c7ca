use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::config::{BootstrapConfig, Config};
use crate::core::error::BackendError;
use crate::models::role::Role;
use crate::stores::{Backend, MemoryBackend};
use crate::wal::wal::{Wal, WalOperation};

// this runs at boot time
pub fn apply_wal_operations(backend: &MemoryBackend, operations: &[WalOperation]) {
    for op in operations {
        backend.apply(op);
    }
}

/// Build the backend, restore users from the journal and prepare it for
/// serving: no session survives a restart, and the bootstrap superuser exists.
pub async fn open_backend(config: &Config) -> Result<Arc<MemoryBackend>> {
    let backend = match &config.storage.wal_path {
        Some(path) => {
            let wal = Wal::new(path.clone()).context("Failed to initialize WAL")?;
            info!(wal_path = %path.display(), "WAL initialized");

            let operations = wal.replay().context("Failed to replay WAL")?;
            let backend = MemoryBackend::with_wal(Arc::new(wal));
            apply_wal_operations(&backend, &operations);

            info!(
                operations_replayed = operations.len(),
                users_loaded = backend.user_count(),
                "WAL replay completed"
            );

            if let Some(wal) = backend.wal() {
                wal.compact(&backend.users()).context("Failed to compact WAL")?;
            }
            backend
        }
        None => {
            warn!("No wal_path configured, user records will not survive a restart");
            MemoryBackend::new()
        }
    };

    backend
        .clear_all_sessions()
        .await
        .context("Failed to clear sessions at startup")?;

    if let Some(bootstrap) = &config.bootstrap {
        seed_superuser(&backend, bootstrap).await?;
    }

    Ok(Arc::new(backend))
}

/// Create the bootstrap superuser unless the name is already taken
pub async fn seed_superuser(backend: &dyn Backend, bootstrap: &BootstrapConfig) -> Result<()> {
    let digest = bootstrap.digest_bytes()?;

    match backend.insert_user(&bootstrap.username, &digest, Role::Superuser).await {
        Ok(()) => {
            info!(username = %bootstrap.username, "Bootstrap superuser created");
            Ok(())
        }
        Err(BackendError::DuplicateUsername(_)) => {
            info!(username = %bootstrap.username, "Bootstrap user already present");
            Ok(())
        }
        Err(e) => Err(e).context("Failed to seed bootstrap superuser"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_with(extra: &str) -> Config {
        Config::from_str(&format!("[server]\nport = 7741\n{}", extra)).unwrap()
    }

    #[tokio::test]
    async fn test_open_backend_seeds_bootstrap_superuser() {
        let config = config_with("[bootstrap]\nusername = \"root\"\ndigest = \"dead\"");
        let backend = open_backend(&config).await.unwrap();

        let root = backend.find_user("root").await.unwrap();
        assert_eq!(root.role, Role::Superuser);
        assert_eq!(root.digest, vec![0xDE, 0xAD]);
    }

    #[tokio::test]
    async fn test_bootstrap_does_not_overwrite_existing_user() {
        let backend = MemoryBackend::new();
        backend.insert_user("root", &[1], Role::Guest).await.unwrap();

        let bootstrap = BootstrapConfig {
            username: "root".to_string(),
            digest: "ff".to_string(),
        };
        seed_superuser(&backend, &bootstrap).await.unwrap();

        let root = backend.find_user("root").await.unwrap();
        assert_eq!(root.role, Role::Guest);
        assert_eq!(root.digest, vec![1]);
    }

    #[tokio::test]
    async fn test_users_survive_restart_through_wal() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("authd.wal");
        let config = config_with(&format!("[storage]\nwal_path = {:?}", wal_path.display().to_string()));

        {
            let backend = open_backend(&config).await.unwrap();
            backend.insert_user("alice", &[1, 2], Role::User).await.unwrap();
            backend.insert_user("bob", &[3], Role::Guest).await.unwrap();
            backend.remove_user("bob").await.unwrap();
        }

        let restored = open_backend(&config).await.unwrap();
        assert_eq!(restored.user_count(), 1);
        assert_eq!(restored.find_user("alice").await.unwrap().digest, vec![1, 2]);

        // Compaction leaves one record per live user
        let contents = std::fs::read_to_string(&wal_path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_without_wal_backend_starts_empty() {
        let backend = open_backend(&config_with("")).await.unwrap();
        assert_eq!(backend.user_count(), 0);
        assert_eq!(backend.session_count(), 0);
    }
}
