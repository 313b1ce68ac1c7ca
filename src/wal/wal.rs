use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::user::User;

/// WAL operation types
///
/// Only user records are journaled. Sessions are wiped at every startup,
/// so there is nothing to recover for them.
#[derive(Debug, Clone, PartialEq)]
pub enum WalOperation {
    AddUser {
        id: u32,
        username: String,
        digest: Vec<u8>,
        role: u8,
    },
    RemoveUser {
        username: String,
    },
    SetDigest {
        username: String,
        digest: Vec<u8>,
    },
    SetRole {
        username: String,
        role: u8,
    },
}

impl WalOperation {
    fn to_string(&self) -> String {
        // Usernames are hex-encoded so a '|' in a name cannot split a record
        match self {
            WalOperation::AddUser {
                id,
                username,
                digest,
                role,
            } => format!(
                "ADD_USER|{}|{}|{}|{}",
                id,
                hex::encode(username),
                hex::encode(digest),
                role
            ),
            WalOperation::RemoveUser { username } => {
                format!("REMOVE_USER|{}", hex::encode(username))
            }
            WalOperation::SetDigest { username, digest } => {
                format!("SET_DIGEST|{}|{}", hex::encode(username), hex::encode(digest))
            }
            WalOperation::SetRole { username, role } => {
                format!("SET_ROLE|{}|{}", hex::encode(username), role)
            }
        }
    }

    fn from_string(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split('|').collect();

        match parts.first() {
            Some(&"ADD_USER") => {
                if parts.len() != 5 {
                    bail!("Invalid ADD_USER format");
                }
                let id = parts[1].parse::<u32>().context("Invalid user ID")?;
                let username = decode_username(parts[2])?;
                let digest = hex::decode(parts[3]).context("Invalid digest hex")?;
                let role = parts[4].parse::<u8>().context("Invalid role ID")?;

                Ok(WalOperation::AddUser {
                    id,
                    username,
                    digest,
                    role,
                })
            }
            Some(&"REMOVE_USER") => {
                if parts.len() != 2 {
                    bail!("Invalid REMOVE_USER format");
                }
                let username = decode_username(parts[1])?;

                Ok(WalOperation::RemoveUser { username })
            }
            Some(&"SET_DIGEST") => {
                if parts.len() != 3 {
                    bail!("Invalid SET_DIGEST format");
                }
                let username = decode_username(parts[1])?;
                let digest = hex::decode(parts[2]).context("Invalid digest hex")?;

                Ok(WalOperation::SetDigest { username, digest })
            }
            Some(&"SET_ROLE") => {
                if parts.len() != 3 {
                    bail!("Invalid SET_ROLE format");
                }
                let username = decode_username(parts[1])?;
                let role = parts[2].parse::<u8>().context("Invalid role ID")?;

                Ok(WalOperation::SetRole { username, role })
            }
            _ => bail!("Unknown operation type"),
        }
    }
}

fn decode_username(field: &str) -> Result<String> {
    let bytes = hex::decode(field).context("Invalid username hex")?;
    String::from_utf8(bytes).context("Username is not valid UTF-8")
}

pub struct Wal {
    file: Arc<Mutex<File>>,
    path: PathBuf,
}

impl Wal {
    pub fn new(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open WAL file")?;

        Ok(Wal {
            file: Arc::new(Mutex::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, File>> {
        self.file.lock().map_err(|_| anyhow!("WAL lock poisoned"))
    }

    pub fn log_operation(&self, op: WalOperation) -> Result<()> {
        let line = op.to_string();
        let mut file = self.lock()?;
        writeln!(file, "{}", line).context("Failed to write to WAL")?;
        file.flush().context("Failed to flush WAL")?;
        Ok(())
    }

    pub fn replay(&self) -> Result<Vec<WalOperation>> {
        let file = File::open(&self.path).context("Failed to open WAL for replay")?;
        let reader = BufReader::new(file);
        let mut operations = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.context("Failed to read line from WAL")?;
            let line = line.trim();

            // Skip empty lines
            if line.is_empty() {
                continue;
            }

            match WalOperation::from_string(line) {
                Ok(op) => operations.push(op),
                Err(e) => {
                    tracing::warn!(
                        line_num = line_num + 1,
                        error = %e,
                        "Failed to parse WAL line, skipping"
                    );
                }
            }
        }

        Ok(operations)
    }

    fn compaction_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".compact");
        PathBuf::from(path)
    }

    /// Replace the journal with one ADD_USER record per live user.
    ///
    /// The snapshot is written and synced to a sibling file first, then
    /// renamed over the journal, so a crash leaves either the old or the new
    /// journal intact.
    pub fn compact(&self, users: &[User]) -> Result<()> {
        let mut file = self.lock()?;
        let temp_path = self.compaction_path();

        let mut snapshot = File::create(&temp_path).context("Failed to create WAL snapshot")?;
        for user in users {
            let op = WalOperation::AddUser {
                id: user.id,
                username: user.username.clone(),
                digest: user.digest.clone(),
                role: user.role.id(),
            };
            writeln!(snapshot, "{}", op.to_string()).context("Failed to write WAL snapshot")?;
        }
        snapshot.sync_all().context("Failed to sync WAL snapshot")?;
        drop(snapshot);

        fs::rename(&temp_path, &self.path).context("Failed to replace WAL with snapshot")?;

        // The old handle still points at the replaced inode
        *file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to reopen WAL after compaction")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use tempfile::TempDir;

    #[test]
    fn test_wal_operation_serialization() {
        let op = WalOperation::AddUser {
            id: 7,
            username: "alice".to_string(),
            digest: vec![0xDE, 0xAD],
            role: 1,
        };
        let serialized = op.to_string();
        assert_eq!(serialized, format!("ADD_USER|7|{}|dead|1", hex::encode("alice")));
        assert_eq!(WalOperation::from_string(&serialized).unwrap(), op);

        let op = WalOperation::SetRole {
            username: "a|b".to_string(),
            role: 3,
        };
        let serialized = op.to_string();
        assert_eq!(serialized.matches('|').count(), 2);
        assert_eq!(WalOperation::from_string(&serialized).unwrap(), op);
    }

    #[test]
    fn test_wal_log_and_replay() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");

        let wal = Wal::new(wal_path.clone()).unwrap();

        wal.log_operation(WalOperation::AddUser {
            id: 1,
            username: "alice".to_string(),
            digest: vec![1, 2, 3],
            role: 2,
        })
        .unwrap();

        wal.log_operation(WalOperation::SetDigest {
            username: "alice".to_string(),
            digest: vec![4, 5],
        })
        .unwrap();

        wal.log_operation(WalOperation::SetRole {
            username: "alice".to_string(),
            role: 1,
        })
        .unwrap();

        wal.log_operation(WalOperation::RemoveUser {
            username: "alice".to_string(),
        })
        .unwrap();

        let operations = wal.replay().unwrap();
        assert_eq!(operations.len(), 4);

        match &operations[1] {
            WalOperation::SetDigest { username, digest } => {
                assert_eq!(username, "alice");
                assert_eq!(digest, &vec![4, 5]);
            }
            _ => panic!("Expected SetDigest"),
        }

        match &operations[3] {
            WalOperation::RemoveUser { username } => assert_eq!(username, "alice"),
            _ => panic!("Expected RemoveUser"),
        }
    }

    #[test]
    fn test_wal_compact() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");

        let wal = Wal::new(wal_path).unwrap();

        for role in [1u8, 2, 3] {
            wal.log_operation(WalOperation::SetRole {
                username: "bob".to_string(),
                role,
            })
            .unwrap();
        }
        assert_eq!(wal.replay().unwrap().len(), 3);

        let users = vec![User::new(4, "bob", vec![9], Role::Guest)];
        wal.compact(&users).unwrap();

        let operations = wal.replay().unwrap();
        assert_eq!(
            operations,
            vec![WalOperation::AddUser {
                id: 4,
                username: "bob".to_string(),
                digest: vec![9],
                role: 3,
            }]
        );

        // Appends continue after compaction
        wal.log_operation(WalOperation::RemoveUser {
            username: "bob".to_string(),
        })
        .unwrap();
        assert_eq!(wal.replay().unwrap().len(), 2);
        assert!(!wal.compaction_path().exists());
    }

    #[test]
    fn test_failed_compaction_keeps_old_journal() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");
        let wal = Wal::new(wal_path).unwrap();

        let original = WalOperation::AddUser {
            id: 1,
            username: "alice".to_string(),
            digest: vec![1],
            role: 2,
        };
        wal.log_operation(original.clone()).unwrap();

        // Snapshot cannot be created where a directory sits
        fs::create_dir(wal.compaction_path()).unwrap();
        let users = vec![User::new(2, "bob", vec![2], Role::Guest)];
        assert!(wal.compact(&users).is_err());

        assert_eq!(wal.replay().unwrap(), vec![original.clone()]);

        // Journal is still appendable
        wal.log_operation(WalOperation::RemoveUser {
            username: "alice".to_string(),
        })
        .unwrap();
        assert_eq!(wal.replay().unwrap().len(), 2);
    }

    #[test]
    fn test_wal_invalid_lines() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");

        // Write invalid data directly to file
        fs::write(
            &wal_path,
            format!("INVALID_OP|data\nSET_ROLE|zz|1\nREMOVE_USER|{}\n", hex::encode("carol")),
        )
        .unwrap();

        let wal = Wal::new(wal_path).unwrap();
        let operations = wal.replay().unwrap();

        // Should skip invalid lines and parse the valid one
        assert_eq!(operations.len(), 1);
    }
}
