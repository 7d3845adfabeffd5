//! Active-time accounting for a problem session.
//!
//! A [`SessionTimer`] tracks one session id at a time. Active time is wall
//! time since `start_time`, minus everything spent with the page hidden:
//!
//! ```text
//! elapsed = now - start_time - paused_time - (hidden ? now - hidden_since : 0)
//! ```
//!
//! Hiding the page only stamps `hidden_since`; showing it folds the hidden
//! span into `paused_time` and persists. Persisted writes go through the
//! shared [`WriteQueue`] and merge only `startTime`/`pausedTime`, so display
//! ticks, visibility changes and pipeline writes never clobber each other.
//!
//! Timers are plain values handed out by a [`SessionRegistry`]; there is no
//! process-wide instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::SolveError;
use crate::record::{merge_timer_fields, ProblemRecord};
use crate::store::WriteQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub start_time: i64,
    pub paused_time: i64,
    pub hidden_since: Option<i64>,
}

impl Session {
    fn fresh(session_id: &str, now_ms: i64) -> Self {
        Session {
            session_id: session_id.to_string(),
            start_time: now_ms,
            paused_time: 0,
            hidden_since: None,
        }
    }

    /// The clock persisted on `record`, if it has one.
    pub fn from_record(session_id: &str, record: &ProblemRecord) -> Option<Self> {
        let start_time = record.start_time?;
        Some(Session {
            session_id: session_id.to_string(),
            start_time,
            paused_time: record.paused_time.unwrap_or(0).max(0),
            hidden_since: None,
        })
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden_since.is_some()
    }

    /// Raw active time; negative means the stored clock is inconsistent.
    pub fn raw_elapsed_ms(&self, now_ms: i64) -> i64 {
        let hidden = self
            .hidden_since
            .map(|since| now_ms.saturating_sub(since).max(0))
            .unwrap_or(0);
        now_ms
            .saturating_sub(self.start_time)
            .saturating_sub(self.paused_time)
            .saturating_sub(hidden)
    }

    fn restart_clock(&mut self, now_ms: i64) {
        self.start_time = now_ms;
        self.paused_time = 0;
        if self.hidden_since.is_some() {
            self.hidden_since = Some(now_ms);
        }
    }

    fn fold_hidden(&mut self, now_ms: i64) {
        if let Some(since) = self.hidden_since.take() {
            self.paused_time = self
                .paused_time
                .saturating_add(now_ms.saturating_sub(since).max(0));
        }
    }
}

pub struct SessionTimer {
    queue: Arc<WriteQueue>,
    clock: Arc<dyn Clock>,
    active: StdMutex<Option<Session>>,
}

impl SessionTimer {
    pub fn new(queue: Arc<WriteQueue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue,
            clock,
            active: StdMutex::new(None),
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.lock_active().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock_active().as_ref().map(|s| s.session_id.clone())
    }

    /// Starts tracking `session_id`, resuming any persisted clock for it.
    /// Re-starting the active id is a no-op.
    pub async fn start(&self, session_id: &str) {
        if session_id.trim().is_empty() {
            warn!("Ignoring timer start with empty session id");
            return;
        }

        let previous = {
            let mut active = self.lock_active();
            let already_active = active
                .as_ref()
                .map(|current| current.session_id == session_id)
                .unwrap_or(false);
            if already_active {
                debug!(session_id = %session_id, "Timer already tracking session");
                return;
            }
            active.take()
        };

        if let Some(mut previous) = previous {
            if previous.is_hidden() {
                previous.fold_hidden(self.clock.now_ms());
                self.persist(&previous).await;
            }
        }

        let stored = match self.queue.read(session_id).await {
            Ok(value) => value,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Failed to load stored session");
                None
            }
        };

        let now = self.clock.now_ms();
        let record = ProblemRecord::from_stored(stored);
        let (session, is_new) = match Session::from_record(session_id, &record) {
            Some(session) => (session, false),
            None => (Session::fresh(session_id, now), true),
        };

        info!(
            session_id = %session_id,
            resumed = !is_new,
            start_time = session.start_time,
            paused_time = session.paused_time,
            "Timer session started"
        );

        *self.lock_active() = Some(session.clone());
        if is_new {
            self.persist(&session).await;
        }
    }

    pub async fn reset(&self) {
        let now = self.clock.now_ms();
        let session = {
            let mut active = self.lock_active();
            let Some(session) = active.as_mut() else {
                debug!("Timer reset with no active session");
                return;
            };
            session.start_time = now;
            session.paused_time = 0;
            session.hidden_since = None;
            session.clone()
        };
        info!(session_id = %session.session_id, "Timer reset");
        self.persist(&session).await;
    }

    pub fn on_visibility_hidden(&self) {
        let now = self.clock.now_ms();
        let mut active = self.lock_active();
        if let Some(session) = active.as_mut() {
            if session.hidden_since.is_none() {
                session.hidden_since = Some(now);
                debug!(session_id = %session.session_id, "Timer paused (page hidden)");
            }
        }
    }

    pub async fn on_visibility_visible(&self) {
        let now = self.clock.now_ms();
        let session = {
            let mut active = self.lock_active();
            match active.as_mut() {
                Some(session) if session.is_hidden() => {
                    session.fold_hidden(now);
                    debug!(
                        session_id = %session.session_id,
                        paused_time = session.paused_time,
                        "Timer resumed (page visible)"
                    );
                    session.clone()
                }
                _ => return,
            }
        };
        self.persist(&session).await;
    }

    /// Active time for the current session. Never fails: an inconsistent
    /// clock is restarted in memory and reported as zero.
    pub fn elapsed_active_time(&self) -> Duration {
        let now = self.clock.now_ms();
        let mut active = self.lock_active();
        let Some(session) = active.as_mut() else {
            return Duration::ZERO;
        };

        let elapsed = session.raw_elapsed_ms(now);
        if elapsed < 0 {
            let anomaly = SolveError::TimingAnomaly {
                overshoot_ms: elapsed.saturating_neg(),
            };
            warn!(session_id = %session.session_id, error = %anomaly, "Timing anomaly");
            session.restart_clock(now);
            return Duration::ZERO;
        }
        Duration::from_millis(elapsed as u64)
    }

    /// Display refresh step: computes elapsed time and persists the clock so a
    /// self-corrected session is written back.
    pub async fn tick(&self) -> Duration {
        let elapsed = self.elapsed_active_time();
        if let Some(session) = self.session() {
            self.persist(&session).await;
        }
        elapsed
    }

    async fn persist(&self, session: &Session) {
        let snapshot = session.clone();
        self.queue
            .update_logged(&session.session_id, move |current| {
                merge_timer_fields(current, &snapshot)
            })
            .await;
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<Session>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Named timers sharing one store queue and clock, e.g. one per open tab.
pub struct SessionRegistry {
    queue: Arc<WriteQueue>,
    clock: Arc<dyn Clock>,
    timers: StdMutex<HashMap<String, Arc<SessionTimer>>>,
}

impl SessionRegistry {
    pub fn new(queue: Arc<WriteQueue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue,
            clock,
            timers: StdMutex::new(HashMap::new()),
        }
    }

    pub fn timer(&self, context: &str) -> Arc<SessionTimer> {
        let mut timers = self
            .timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(timers.entry(context.to_string()).or_insert_with(|| {
            Arc::new(SessionTimer::new(
                Arc::clone(&self.queue),
                Arc::clone(&self.clock),
            ))
        }))
    }

    pub fn remove(&self, context: &str) -> Option<Arc<SessionTimer>> {
        self.timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(context)
    }

    pub fn len(&self) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Formats a duration as `HH:MM:SS` (hours keep growing past 99).
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Periodically formats the timer for display and persists its clock.
pub fn spawn_display_refresh<F>(
    timer: Arc<SessionTimer>,
    interval: Duration,
    sink: F,
) -> JoinHandle<()>
where
    F: Fn(String) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if timer.session_id().is_none() {
                continue;
            }
            let elapsed = timer.tick().await;
            sink(format_elapsed(elapsed));
        }
    })
}
