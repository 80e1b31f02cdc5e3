use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{EngineError, EngineResult};
use crate::models::{CountingMethod, KickSession, TARGET_KICKS};

const MS_PER_MINUTE: u64 = 60_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Counting,
    ReadyToSubmit,
    /// Reported once by `cancel()`; the controller is back to `Idle` afterwards.
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: SessionStatus,
    pub session: Option<KickSession>,
    /// Last synced value; snapshots report the live figure at the top level.
    #[serde(skip)]
    pub elapsed_ms: u64,
    #[serde(skip)]
    pub started_anchor: Option<Instant>,
    /// Frozen when the session completes; elapsed time stops there.
    #[serde(skip)]
    pub ended_anchor: Option<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, session: KickSession, now: Instant) {
        *self = Self {
            status: SessionStatus::Counting,
            session: Some(session),
            elapsed_ms: 0,
            started_anchor: Some(now),
            ended_anchor: None,
        };
    }

    pub fn current_elapsed_ms(&self) -> u64 {
        match (self.started_anchor, self.ended_anchor) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).as_millis() as u64,
            (Some(start), None) if self.status == SessionStatus::Counting => {
                start.elapsed().as_millis() as u64
            }
            _ => self.elapsed_ms,
        }
    }

    pub fn sync_elapsed(&mut self) {
        self.elapsed_ms = self.current_elapsed_ms();
    }

    pub fn kick_count(&self) -> u32 {
        self.session.as_ref().map_or(0, |session| session.kick_count)
    }

    /// Counts one kick. Returns `true` when this kick completed the session.
    pub fn record_kick(&mut self, now: Instant, now_utc: DateTime<Utc>) -> EngineResult<bool> {
        if self.status != SessionStatus::Counting {
            return Err(EngineError::invalid_state("record a kick", self.status));
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| EngineError::invalid_state("record a kick", SessionStatus::Idle))?;

        session.kick_count = session.kick_count.saturating_add(1);
        let reached_target =
            session.method == CountingMethod::CountToTarget && session.kick_count >= TARGET_KICKS;

        if reached_target {
            self.complete(now, now_utc);
        } else {
            self.sync_elapsed();
        }
        Ok(reached_target)
    }

    /// Tick check for fixed-duration sessions. Returns `true` on completion.
    pub fn check_duration(&mut self, now: Instant, now_utc: DateTime<Utc>) -> bool {
        if self.status != SessionStatus::Counting {
            return false;
        }
        self.sync_elapsed();

        let target_ms = match self.session.as_ref() {
            Some(KickSession {
                method: CountingMethod::FixedDuration,
                target_duration_minutes: Some(minutes),
                ..
            }) => u64::from(*minutes) * MS_PER_MINUTE,
            _ => return false,
        };

        if self.elapsed_ms >= target_ms {
            self.complete(now, now_utc);
            return true;
        }
        false
    }

    fn complete(&mut self, now: Instant, now_utc: DateTime<Utc>) {
        if self.ended_anchor.is_some() {
            return;
        }
        self.ended_anchor = Some(now);
        if let Some(session) = self.session.as_mut() {
            session.ended_at = Some(now_utc);
        }
        self.status = SessionStatus::ReadyToSubmit;
        self.sync_elapsed();
    }

    /// Whole minutes between start and completion, never below one.
    pub fn duration_minutes(&self) -> u32 {
        let minutes = self.current_elapsed_ms() / MS_PER_MINUTE;
        minutes.clamp(1, u64::from(u32::MAX)) as u32
    }

    pub fn remaining_ms(&self) -> Option<u64> {
        let minutes = self.session.as_ref()?.target_duration_minutes?;
        let target_ms = u64::from(minutes) * MS_PER_MINUTE;
        Some(target_ms.saturating_sub(self.current_elapsed_ms()))
    }

    pub fn kicks_remaining(&self) -> Option<u32> {
        let target = self.session.as_ref()?.target_kicks?;
        Some(target.saturating_sub(self.kick_count()))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
