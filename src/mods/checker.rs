//! Remote update checks.
//!
//! [`UpdateChecker`] walks every sourced mod, fetches its manifest and flags
//! strictly newer versions. Only one check runs at a time: a caller arriving
//! while a check is in flight waits for it and shares its result.
//! [`UpdateScheduler`] drives periodic checks from a background thread.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::github::ManifestFetcher;
use super::registry::ModRegistry;
use super::types::{ModError, UpdateInfo};
use super::version::is_newer;

/// Store key holding the time of the last completed check.
pub const LAST_CHECK_KEY: &str = "lastUpdateCheck";

/// Default interval between scheduled checks (24 hours).
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the scheduler wakes to see whether a check is due.
const SCHEDULER_TICK: Duration = Duration::from_secs(60);

type CheckResult = Result<Vec<UpdateInfo>, ModError>;

/// Shared state of the checker.
#[derive(Default)]
struct CheckState {
    /// A check is running.
    in_flight: bool,
    /// Incremented each time a check finishes.
    generation: u64,
    /// Result of the last finished check.
    last_result: Option<CheckResult>,
    /// When the last check started.
    last_started: Option<Instant>,
}

/// User-facing summary of available updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateNotification {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub message: String,
}

/// Builds a notification for a non-empty update list.
#[must_use]
pub fn update_notification(updates: &[UpdateInfo]) -> Option<UpdateNotification> {
    match updates.len() {
        0 => None,
        n => Some(UpdateNotification {
            title: "Mod Updates Available".to_string(),
            message: format!(
                "{} mod{} have updates available",
                n,
                if n > 1 { "s" } else { "" }
            ),
        }),
    }
}

/// Checks sourced mods for newer remote versions.
pub struct UpdateChecker {
    /// Registry being checked.
    registry: Arc<ModRegistry>,
    /// Manifest source.
    fetcher: Arc<ManifestFetcher>,
    /// Minimum time between scheduled checks.
    interval: Duration,
    /// In-flight bookkeeping.
    state: Mutex<CheckState>,
    /// Signalled when a check finishes.
    finished: Condvar,
}

impl UpdateChecker {
    /// Creates a checker.
    #[must_use]
    pub fn new(registry: Arc<ModRegistry>, fetcher: Arc<ManifestFetcher>, interval: Duration) -> Self {
        Self {
            registry,
            fetcher,
            interval,
            state: Mutex::new(CheckState::default()),
            finished: Condvar::new(),
        }
    }

    /// Returns the scheduling interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Checks every sourced mod now, or joins the check already running.
    pub fn check_all(&self) -> CheckResult {
        let mut state = self.lock_state()?;

        if state.in_flight {
            info!("[UPDATE] Check already in flight, waiting for it");
            let generation = state.generation;
            while state.generation == generation {
                state = self
                    .finished
                    .wait(state)
                    .map_err(|_| ModError::Store("update checker lock poisoned".to_string()))?;
            }
            return state
                .last_result
                .clone()
                .unwrap_or_else(|| Ok(Vec::new()));
        }

        state.in_flight = true;
        state.last_started = Some(Instant::now());
        drop(state);

        let mut guard = InFlight {
            checker: self,
            result: None,
        };
        let result = self.run_check();
        guard.result = Some(result.clone());
        drop(guard);

        result
    }

    /// Runs a check only if none started within the interval.
    ///
    /// Returns `None` when the check was not due.
    pub fn check_if_due(&self) -> Option<CheckResult> {
        let due = match self.lock_state() {
            Ok(state) => {
                !state.in_flight
                    && state
                        .last_started
                        .is_none_or(|started| started.elapsed() >= self.interval)
            }
            Err(e) => return Some(Err(e)),
        };

        if !due {
            debug!("[UPDATE] Scheduled check not due yet");
            return None;
        }
        Some(self.check_all())
    }

    /// Returns the time of the last completed check, if any was recorded.
    pub fn last_checked(&self) -> Result<Option<DateTime<Utc>>, ModError> {
        let mut values = self.registry.store().get(&[LAST_CHECK_KEY])?;
        Ok(values
            .remove(LAST_CHECK_KEY)
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    fn run_check(&self) -> CheckResult {
        let candidates: Vec<_> = self
            .registry
            .list()
            .into_iter()
            .filter(|m| m.source.is_some())
            .collect();
        info!("[UPDATE] Checking {} sourced mods", candidates.len());

        let mut found: HashMap<String, UpdateInfo> = HashMap::new();
        let mut order = Vec::new();

        for record in &candidates {
            let Some(source) = record.source.as_ref() else {
                continue;
            };

            match self.fetcher.fetch(source) {
                Ok(manifest) if is_newer(&manifest.version, &record.version) => {
                    info!(
                        "[UPDATE] {} {} -> {}",
                        record.id, record.version, manifest.version
                    );
                    order.push(record.id.clone());
                    found.insert(
                        record.id.clone(),
                        UpdateInfo {
                            id: record.id.clone(),
                            name: record.name.clone(),
                            current_version: record.version.clone(),
                            new_version: manifest.version,
                        },
                    );
                }
                Ok(_) => debug!("[UPDATE] {} is up to date", record.id),
                Err(e) => warn!("[UPDATE] Skipping {}: {}", record.id, e),
            }
        }

        // One registry write for the whole pass. Mods changed or removed
        // while fetching are left alone.
        let updates = self.registry.mutate(|mods| {
            let mut applied = Vec::new();
            for id in &order {
                let Some(info) = found.get(id) else {
                    continue;
                };
                if let Some(record) = mods.iter_mut().find(|m| &m.id == id) {
                    if record.version == info.current_version {
                        record.update_available = Some(info.new_version.clone());
                        applied.push(info.clone());
                    }
                }
            }
            let changed = !applied.is_empty();
            Ok((applied, changed))
        })?;

        self.record_check_time();
        info!("[UPDATE] {} updates available", updates.len());
        Ok(updates)
    }

    fn record_check_time(&self) {
        let now = serde_json::to_value(Utc::now()).unwrap_or_default();
        let entries = HashMap::from([(LAST_CHECK_KEY.to_string(), now)]);
        if let Err(e) = self.registry.store().set(entries) {
            warn!("[UPDATE] Failed to record check time: {}", e);
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, CheckState>, ModError> {
        self.state
            .lock()
            .map_err(|_| ModError::Store("update checker lock poisoned".to_string()))
    }
}

/// Clears the in-flight flag and wakes waiters when a check ends, including
/// by unwinding.
struct InFlight<'a> {
    checker: &'a UpdateChecker,
    result: Option<CheckResult>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let result = self.result.take().unwrap_or_else(|| {
            warn!("[UPDATE] Check aborted before finishing");
            Err(ModError::FetchFailed("update check aborted".to_string()))
        });

        let mut state = self
            .checker
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.in_flight = false;
        state.generation += 1;
        state.last_result = Some(result);
        drop(state);
        self.checker.finished.notify_all();
    }
}

/// Periodic update checks on a background thread.
pub struct UpdateScheduler {
    /// Dropping or sending stops the loop.
    stop_tx: Sender<()>,
    /// Background thread.
    handle: JoinHandle<()>,
}

impl UpdateScheduler {
    /// Starts checking whenever the checker's interval has elapsed.
    #[must_use]
    pub fn start(checker: Arc<UpdateChecker>) -> Self {
        Self::start_with_tick(checker, SCHEDULER_TICK)
    }

    /// Starts with a custom wake-up period.
    #[must_use]
    pub fn start_with_tick(checker: Arc<UpdateChecker>, tick: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            info!("[UPDATE] Scheduler started");
            loop {
                if let Some(Err(e)) = checker.check_if_due() {
                    warn!("[UPDATE] Scheduled check failed: {}", e);
                }

                match stop_rx.recv_timeout(tick) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("[UPDATE] Scheduler stopped");
        });

        Self { stop_tx, handle }
    }

    /// Stops the scheduler and waits for its thread.
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            warn!("[UPDATE] Scheduler thread panicked");
        }
    }
}
