//! Local login lockout.
//!
//! A counter of failed login attempts tagged with a timestamp, persisted as
//! JSON next to the session file (the CLI equivalent of the web client's
//! localStorage entry). After three failures the client refuses to submit
//! the login form for five minutes, independent of any server response.
//! This is advisory UX throttling only; the server applies its own per-IP
//! rate limit on the auth routes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const MAX_ATTEMPTS: u32 = 3;
pub const LOCK_DURATION: Duration = Duration::from_secs(300);

/// Persisted lockout state: last failure time and the running counter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LockRecord {
    /// Unix milliseconds of the most recent failed attempt.
    pub timestamp: i64,
    /// Consecutive failed attempts.
    pub attempts: u32,
}

/// Outcome of a lockout check at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked { attempts: u32 },
    Locked { remaining_secs: i64 },
}

impl LockRecord {
    /// Evaluate this record against the wall clock. Pure; the caller decides
    /// whether an expired record should be cleared.
    fn evaluate(&self, now: DateTime<Utc>, max_attempts: u32, lock_duration: Duration) -> LockStatus {
        let elapsed_secs = (now.timestamp_millis() - self.timestamp) as f64 / 1000.0;
        let duration_secs = lock_duration.as_secs() as f64;

        if self.attempts >= max_attempts && elapsed_secs < duration_secs {
            LockStatus::Locked {
                remaining_secs: (duration_secs - elapsed_secs).ceil() as i64,
            }
        } else if elapsed_secs >= duration_secs {
            LockStatus::Unlocked { attempts: 0 }
        } else {
            LockStatus::Unlocked {
                attempts: self.attempts,
            }
        }
    }
}

/// File-backed lockout counter.
pub struct LoginLockout {
    path: PathBuf,
    max_attempts: u32,
    lock_duration: Duration,
}

impl LoginLockout {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_limits(path, MAX_ATTEMPTS, LOCK_DURATION)
    }

    pub fn with_limits(path: impl Into<PathBuf>, max_attempts: u32, lock_duration: Duration) -> Self {
        Self {
            path: path.into(),
            max_attempts,
            lock_duration,
        }
    }

    /// Current status. An expired lock window clears the persisted record.
    pub fn status(&self, now: DateTime<Utc>) -> Result<LockStatus> {
        let Some(record) = self.load()? else {
            return Ok(LockStatus::Unlocked { attempts: 0 });
        };

        let status = record.evaluate(now, self.max_attempts, self.lock_duration);
        if status == (LockStatus::Unlocked { attempts: 0 }) {
            self.reset()?;
        }
        Ok(status)
    }

    /// Record one failed attempt and return the resulting status.
    pub fn record_failure(&self, now: DateTime<Utc>) -> Result<LockStatus> {
        let attempts = match self.status(now)? {
            LockStatus::Unlocked { attempts } => attempts + 1,
            // Already locked; keep the existing record untouched
            locked @ LockStatus::Locked { .. } => return Ok(locked),
        };

        let record = LockRecord {
            timestamp: now.timestamp_millis(),
            attempts,
        };
        self.save(&record)?;

        Ok(record.evaluate(now, self.max_attempts, self.lock_duration))
    }

    /// Clear the counter (successful login, or expired window).
    pub fn reset(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove lock file {}", self.path.display()))?;
        }
        Ok(())
    }

    fn load(&self) -> Result<Option<LockRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read lock file {}", self.path.display()))?;
        let record = serde_json::from_str(&raw).context("Corrupt lock file")?;
        Ok(Some(record))
    }

    fn save(&self, record: &LockRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(record)?)
            .with_context(|| format!("Failed to write lock file {}", self.path.display()))?;
        Ok(())
    }
}
