use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::UserId;

const DATA_FILE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("malformed row data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no row {id} in {table}")]
    NotFound { table: &'static str, id: Uuid },
    #[error("row {id} already exists in {table}")]
    Duplicate { table: &'static str, id: Uuid },
    #[error("row in {table} belongs to another account")]
    ForeignOwner { table: &'static str },
    #[error("unsupported data file version {0}")]
    Version(u32),
}

/// A row type bound to one table of the backing store.
pub trait Record: Serialize + DeserializeOwned + Clone {
    const TABLE: &'static str;

    fn id(&self) -> Uuid;

    fn owner(&self) -> UserId;
}

/// Row access scoped to a single account.
///
/// Rows owned by other accounts are never returned and cannot be changed.
/// Writes are last-write-wins; there is no versioning.
pub trait Store {
    fn user_id(&self) -> UserId;

    fn list<T: Record>(&self) -> Result<Vec<T>, StoreError>;

    fn get<T: Record>(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        Ok(self.list::<T>()?.into_iter().find(|row| row.id() == id))
    }

    fn insert<T: Record>(&mut self, row: &T) -> Result<(), StoreError>;

    fn update<T: Record>(&mut self, row: &T) -> Result<(), StoreError>;

    /// Returns false when the row does not exist for this account.
    fn delete<T: Record>(&mut self, id: Uuid) -> Result<bool, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DataFile {
    version: u32,
    #[serde(default)]
    tables: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    user_id: UserId,
    tables: BTreeMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            tables: BTreeMap::new(),
        }
    }

    /// Positions of rows in `T::TABLE` that this account owns, paired with the decoded row.
    fn owned_rows<T: Record>(&self) -> Result<Vec<(usize, T)>, StoreError> {
        let Some(rows) = self.tables.get(T::TABLE) else {
            return Ok(Vec::new());
        };
        let mut owned = Vec::new();
        for (index, value) in rows.iter().enumerate() {
            let row: T = serde_json::from_value(value.clone())?;
            if row.owner() == self.user_id {
                owned.push((index, row));
            }
        }
        Ok(owned)
    }

    fn position<T: Record>(&self, id: Uuid) -> Result<Option<usize>, StoreError> {
        Ok(self
            .owned_rows::<T>()?
            .into_iter()
            .find(|(_, row)| row.id() == id)
            .map(|(index, _)| index))
    }
}

impl Store for MemoryStore {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn list<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        Ok(self
            .owned_rows::<T>()?
            .into_iter()
            .map(|(_, row)| row)
            .collect())
    }

    fn insert<T: Record>(&mut self, row: &T) -> Result<(), StoreError> {
        if row.owner() != self.user_id {
            return Err(StoreError::ForeignOwner { table: T::TABLE });
        }
        let id = row.id().to_string();
        let exists = self
            .tables
            .get(T::TABLE)
            .map(|rows| {
                rows.iter()
                    .any(|value| value.get("id").and_then(Value::as_str) == Some(id.as_str()))
            })
            .unwrap_or(false);
        if exists {
            return Err(StoreError::Duplicate {
                table: T::TABLE,
                id: row.id(),
            });
        }
        let value = serde_json::to_value(row)?;
        self.tables.entry(T::TABLE.to_string()).or_default().push(value);
        debug!(table = T::TABLE, id = %row.id(), "inserted row");
        Ok(())
    }

    fn update<T: Record>(&mut self, row: &T) -> Result<(), StoreError> {
        if row.owner() != self.user_id {
            return Err(StoreError::ForeignOwner { table: T::TABLE });
        }
        let index = self
            .position::<T>(row.id())?
            .ok_or(StoreError::NotFound {
                table: T::TABLE,
                id: row.id(),
            })?;
        let value = serde_json::to_value(row)?;
        if let Some(rows) = self.tables.get_mut(T::TABLE) {
            rows[index] = value;
        }
        debug!(table = T::TABLE, id = %row.id(), "updated row");
        Ok(())
    }

    fn delete<T: Record>(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let Some(index) = self.position::<T>(id)? else {
            return Ok(false);
        };
        if let Some(rows) = self.tables.get_mut(T::TABLE) {
            rows.remove(index);
        }
        debug!(table = T::TABLE, %id, "deleted row");
        Ok(true)
    }
}

/// A [`MemoryStore`] mirrored to a JSON file after every write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>, user_id: UserId) -> Result<Self, StoreError> {
        let path = path.into();
        let mut inner = MemoryStore::new(user_id);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let data: DataFile = serde_json::from_str(&contents)?;
                if data.version != DATA_FILE_VERSION {
                    return Err(StoreError::Version(data.version));
                }
                inner.tables = data.tables;
                debug!(path = %path.display(), "loaded data file");
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "data file missing, starting empty");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let data = DataFile {
            version: DATA_FILE_VERSION,
            tables: self.inner.tables.clone(),
        };
        let json = serde_json::to_string_pretty(&data)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl Store for FileStore {
    fn user_id(&self) -> UserId {
        self.inner.user_id()
    }

    fn list<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        self.inner.list()
    }

    fn insert<T: Record>(&mut self, row: &T) -> Result<(), StoreError> {
        self.inner.insert(row)?;
        self.flush()
    }

    fn update<T: Record>(&mut self, row: &T) -> Result<(), StoreError> {
        self.inner.update(row)?;
        self.flush()
    }

    fn delete<T: Record>(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let deleted = self.inner.delete::<T>(id)?;
        if deleted {
            self.flush()?;
        }
        Ok(deleted)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Client;
    use chrono::{TimeZone, Utc};

    fn client(user_id: UserId, name: &str) -> Client {
        Client {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            email: None,
            phone: None,
            hourly_rate: 50.0,
            created_at: Utc.with_ymd_and_hms(2026, 2, 3, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn rows_of_other_accounts_are_invisible() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut store = MemoryStore::new(alice);
        store.insert(&client(alice, "Acme")).unwrap();

        let mut bob_view = store.clone();
        bob_view.user_id = bob;
        assert!(bob_view.list::<Client>().unwrap().is_empty());
        assert_eq!(store.list::<Client>().unwrap().len(), 1);
    }

    #[test]
    fn foreign_rows_cannot_be_written() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut store = MemoryStore::new(alice);
        let row = client(alice, "Acme");
        store.insert(&row).unwrap();

        assert!(matches!(
            store.insert(&client(bob, "Sneaky")),
            Err(StoreError::ForeignOwner { .. })
        ));

        let mut bob_view = store.clone();
        bob_view.user_id = bob;
        assert!(!bob_view.delete::<Client>(row.id).unwrap());
        let mut renamed = row.clone();
        renamed.user_id = bob;
        assert!(matches!(
            bob_view.update(&renamed),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn update_replaces_row_last_write_wins() {
        let user = Uuid::new_v4();
        let mut store = MemoryStore::new(user);
        let mut row = client(user, "Acme");
        store.insert(&row).unwrap();
        row.hourly_rate = 65.0;
        store.update(&row).unwrap();
        row.hourly_rate = 70.0;
        store.update(&row).unwrap();

        let stored: Client = store.get(row.id).unwrap().unwrap();
        assert_eq!(stored.hourly_rate, 70.0);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let user = Uuid::new_v4();
        let mut store = MemoryStore::new(user);
        let row = client(user, "Acme");
        store.insert(&row).unwrap();
        assert!(matches!(store.insert(&row), Err(StoreError::Duplicate { .. })));
    }

    #[test]
    fn file_store_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let user = Uuid::new_v4();

        let mut store = FileStore::open(&path, user).unwrap();
        let row = client(user, "Acme");
        store.insert(&row).unwrap();

        let reopened = FileStore::open(&path, user).unwrap();
        let clients: Vec<Client> = reopened.list().unwrap();
        assert_eq!(clients, vec![row]);
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("absent.json"), Uuid::new_v4()).unwrap();
        assert!(store.list::<Client>().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn flaky_store_fails_after_budget() {
        let user = Uuid::new_v4();
        let mut store = testing::FlakyStore::new(MemoryStore::new(user), 1);
        store.insert(&client(user, "First")).unwrap();
        assert!(matches!(
            store.insert(&client(user, "Second")),
            Err(StoreError::Io(_))
        ));
        assert_eq!(store.list::<Client>().unwrap().len(), 1);
    }
}
