use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("Select a client before starting the timer.")]
    NoClientSelected,
    #[error("A timer is already running.")]
    AlreadyActive,
    #[error("The timer is not running.")]
    NotRunning,
    #[error("The timer is not paused.")]
    NotPaused,
    #[error("The timer was never started.")]
    NotStarted,
    #[error("Tracked time must be longer than zero seconds.")]
    NonPositiveDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Everything needed to turn a finished session into a time entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerCandidate {
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub active_seconds: i64,
}

/// Timer session state.
///
/// Durations are always recomputed from the stored instants, so ticks shown
/// while the timer runs never feed back into the billed duration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimerState {
    pub status: TimerStatus,
    pub client_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub total_paused_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_candidate: Option<TimerCandidate>,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TimerStatus::Running | TimerStatus::Paused)
    }

    pub fn start(
        &mut self,
        client_id: Option<Uuid>,
        project_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(), TimerError> {
        let client_id = client_id.ok_or(TimerError::NoClientSelected)?;
        if self.is_active() {
            return Err(TimerError::AlreadyActive);
        }

        *self = Self {
            status: TimerStatus::Running,
            client_id: Some(client_id),
            project_id,
            started_at: Some(now),
            paused_at: None,
            total_paused_seconds: 0,
            last_candidate: None,
        };
        info!(%client_id, "timer started");
        Ok(())
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), TimerError> {
        if self.status != TimerStatus::Running {
            return Err(TimerError::NotRunning);
        }
        self.status = TimerStatus::Paused;
        self.paused_at = Some(now);
        info!("timer paused");
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), TimerError> {
        if self.status != TimerStatus::Paused {
            return Err(TimerError::NotPaused);
        }
        self.close_pause(now);
        self.status = TimerStatus::Running;
        info!(total_paused_seconds = self.total_paused_seconds, "timer resumed");
        Ok(())
    }

    /// Ends the session and hands back the finished interval.
    ///
    /// A paused timer may be stopped directly; the open pause ends at `now`.
    /// A session with no positive active time is rejected and left untouched.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<TimerCandidate, TimerError> {
        if !self.is_active() {
            return Err(TimerError::NotStarted);
        }
        let (Some(start), Some(client_id)) = (self.started_at, self.client_id) else {
            return Err(TimerError::NotStarted);
        };

        let paused = self.total_paused_seconds + self.open_pause_seconds(now);
        let active_seconds = (now - start).num_seconds() - paused;
        if active_seconds <= 0 {
            return Err(TimerError::NonPositiveDuration);
        }

        self.close_pause(now);
        self.status = TimerStatus::Stopped;
        let candidate = TimerCandidate {
            client_id,
            project_id: self.project_id,
            start,
            end: now,
            active_seconds,
        };
        self.last_candidate = Some(candidate.clone());
        info!(active_seconds, "timer stopped");
        Ok(candidate)
    }

    pub fn cancel(&mut self) {
        *self = Self::default();
    }

    /// Active seconds for display; frozen while paused.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        match (self.status, self.started_at) {
            (TimerStatus::Running | TimerStatus::Paused, Some(start)) => {
                let paused = self.total_paused_seconds + self.open_pause_seconds(now);
                ((now - start).num_seconds() - paused).max(0)
            }
            (TimerStatus::Stopped, _) => self
                .last_candidate
                .as_ref()
                .map(|candidate| candidate.active_seconds)
                .unwrap_or(0),
            _ => 0,
        }
    }

    fn open_pause_seconds(&self, now: DateTime<Utc>) -> i64 {
        match (self.status, self.paused_at) {
            (TimerStatus::Paused, Some(paused_at)) => (now - paused_at).num_seconds().max(0),
            _ => 0,
        }
    }

    fn close_pause(&mut self, now: DateTime<Utc>) {
        self.total_paused_seconds += self.open_pause_seconds(now);
        self.paused_at = None;
    }
}
