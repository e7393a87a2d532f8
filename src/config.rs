use std::path::PathBuf;

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::storage::LocalStorage;

const DATA_FILE: &str = ".tradetimer-data.json";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// JSON file backing the record store.
    pub data_path: PathBuf,
    /// Directory holding the preference and timer files.
    pub home_dir: PathBuf,
    pub user_id: Option<Uuid>,
}

impl AppConfig {
    /// Reads `TRADETIMER_*` variables (after loading any `.env` file) and
    /// applies the command-line overrides on top.
    pub fn load(data_path: Option<PathBuf>, user_id: Option<Uuid>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        Ok(config.with_overrides(data_path, user_id))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home_dir = match non_empty(lookup("TRADETIMER_HOME")) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or_else(|| AppError::Config("Could not determine the home directory; set TRADETIMER_HOME.".to_string()))?,
        };
        let data_path = non_empty(lookup("TRADETIMER_DATA"))
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir.join(DATA_FILE));
        let user_id = non_empty(lookup("TRADETIMER_USER"))
            .map(|value| {
                Uuid::parse_str(value.trim())
                    .map_err(|err| AppError::Config(format!("Invalid TRADETIMER_USER: {err}")))
            })
            .transpose()?;

        Ok(Self {
            data_path,
            home_dir,
            user_id,
        })
    }

    pub fn with_overrides(mut self, data_path: Option<PathBuf>, user_id: Option<Uuid>) -> Self {
        if let Some(path) = data_path {
            self.data_path = path;
        }
        if user_id.is_some() {
            self.user_id = user_id;
        }
        self
    }

    pub fn local_storage(&self) -> LocalStorage {
        LocalStorage::new(&self.home_dir)
    }

    /// The configured user id, else the one kept in the preferences file,
    /// else a fresh id that is written there for next time. An unreadable
    /// preferences file is left alone so the id it holds is not replaced.
    pub fn resolve_user_id(&self, storage: &LocalStorage) -> Result<Uuid> {
        if let Some(user_id) = self.user_id {
            return Ok(user_id);
        }
        let preferences = storage.load_preferences().map_err(|err| {
            AppError::Config(format!(
                "Cannot read {}: {err}. Fix or remove it, or pass --user.",
                storage.preferences_path().display()
            ))
        })?;
        if let Some(user_id) = preferences.user_id {
            return Ok(user_id);
        }
        let user_id = Uuid::new_v4();
        storage.update_preferences(|preferences| preferences.user_id = Some(user_id))?;
        tracing::info!(%user_id, "generated local user id");
        Ok(user_id)
    }
}

/// `RUST_LOG` wins, then `TRADETIMER_LOG`, then warnings only.
pub fn log_filter(lookup: impl Fn(&str) -> Option<String>) -> String {
    non_empty(lookup("RUST_LOG"))
        .or_else(|| non_empty(lookup("TRADETIMER_LOG")))
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
