use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::rollups::WeekStart;
use crate::timer::TimerState;

const PREFERENCES_FILE: &str = ".tradetimer.json";
const TIMER_FILE: &str = ".tradetimer-timer.json";

/// Device-local toggles, stored under fixed key names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_weekly_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_monthly_revenue: Option<f64>,
    #[serde(default)]
    pub help_banner_dismissed: bool,
    #[serde(default)]
    pub onboarding_completed: bool,
    #[serde(default)]
    pub week_start: WeekStart,
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    dir: PathBuf,
}

impl LocalStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.dir.join(PREFERENCES_FILE)
    }

    pub fn timer_path(&self) -> PathBuf {
        self.dir.join(TIMER_FILE)
    }

    pub fn read_preferences(&self) -> Preferences {
        read_json(&self.preferences_path()).unwrap_or_default()
    }

    /// Like [`read_preferences`](Self::read_preferences), but a file that
    /// exists and fails to parse is an error instead of the defaults.
    pub fn load_preferences(&self) -> Result<Preferences, io::Error> {
        let path = self.preferences_path();
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Preferences::default()),
            Err(err) => Err(err),
        }
    }

    pub fn write_preferences(&self, preferences: &Preferences) -> Result<(), io::Error> {
        write_json(&self.preferences_path(), preferences)
    }

    /// Applies `change` to the stored preferences and writes them back.
    pub fn update_preferences(
        &self,
        change: impl FnOnce(&mut Preferences),
    ) -> Result<Preferences, io::Error> {
        let mut preferences = self.read_preferences();
        change(&mut preferences);
        self.write_preferences(&preferences)?;
        Ok(preferences)
    }

    pub fn read_timer(&self) -> TimerState {
        read_json(&self.timer_path()).unwrap_or_else(TimerState::new)
    }

    pub fn write_timer(&self, timer: &TimerState) -> Result<(), io::Error> {
        write_json(&self.timer_path(), timer)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %path.display(), %err, "ignoring unreadable file");
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
    fs::write(path, json)
}
