//! Bookkeeping of macro runs.
//!
//! Two tables live behind one lock so every check-and-mutate is atomic:
//! the per-device run lock (at most one run per device) and the per-group
//! record holding the group's current run id and its live run states.
//! Entries are only ever cleared by the run that owns them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Playback of one macro on one device within one group run
#[derive(Debug)]
pub struct MacroRunState {
    pub run_id: u64,
    pub group_id: String,
    pub device_id: String,
    pub macro_id: String,
    pub started_at: DateTime<Utc>,
    stop: AtomicBool,
}

impl MacroRunState {
    pub fn new(run_id: u64, group_id: &str, device_id: &str, macro_id: &str) -> Self {
        Self {
            run_id,
            group_id: group_id.to_string(),
            device_id: device_id.to_string(),
            macro_id: macro_id.to_string(),
            started_at: Utc::now(),
            stop: AtomicBool::new(false),
        }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Entry of the global device lock table
#[derive(Debug)]
struct DeviceLock {
    state: Arc<MacroRunState>,
    stop: AtomicBool,
}

#[derive(Debug)]
struct GroupRun {
    run_id: u64,
    states: HashMap<String, Arc<MacroRunState>>,
}

#[derive(Debug, Default)]
struct Tables {
    locks: HashMap<String, DeviceLock>,
    groups: HashMap<String, GroupRun>,
}

/// A device's current run, for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRun {
    pub device_id: String,
    pub group_id: String,
    pub macro_id: String,
    pub run_id: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RunRegistry {
    tables: Mutex<Tables>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the device lock for `state`. Returns `false`, changing nothing,
    /// when the device is already running a macro.
    ///
    /// The first device a run acquires makes it the group's current run,
    /// which cancels older runs of the group at their next step.
    pub fn try_acquire(&self, state: Arc<MacroRunState>) -> bool {
        let mut tables = self.tables();
        if tables.locks.contains_key(&state.device_id) {
            return false;
        }

        tables.locks.insert(
            state.device_id.clone(),
            DeviceLock {
                state: state.clone(),
                stop: AtomicBool::new(false),
            },
        );
        let group = tables
            .groups
            .entry(state.group_id.clone())
            .or_insert_with(|| GroupRun {
                run_id: state.run_id,
                states: HashMap::new(),
            });
        group.run_id = state.run_id;
        group.states.insert(state.device_id.clone(), state);
        true
    }

    /// The cooperative cancellation predicate checked before every step.
    pub fn is_cancelled(&self, state: &MacroRunState) -> bool {
        if state.stop_requested() {
            return true;
        }

        let tables = self.tables();
        let lock_stopped = match tables.locks.get(&state.device_id) {
            Some(lock) => lock.state.run_id != state.run_id || lock.stop.load(Ordering::SeqCst),
            None => true,
        };
        let superseded = match tables.groups.get(&state.group_id) {
            Some(group) => group.run_id != state.run_id,
            None => true,
        };
        lock_stopped || superseded
    }

    /// Release everything `state` holds. Entries that already belong to a
    /// newer run are left alone.
    pub fn finish(&self, state: &MacroRunState) {
        let mut tables = self.tables();

        let owns_lock = tables
            .locks
            .get(&state.device_id)
            .is_some_and(|lock| lock.state.run_id == state.run_id);
        if owns_lock {
            tables.locks.remove(&state.device_id);
        }

        let mut group_empty = false;
        if let Some(group) = tables.groups.get_mut(&state.group_id) {
            let owns_state = group
                .states
                .get(&state.device_id)
                .is_some_and(|s| s.run_id == state.run_id);
            if owns_state {
                group.states.remove(&state.device_id);
            }
            group_empty = group.states.is_empty();
        }
        if group_empty {
            tables.groups.remove(&state.group_id);
        }
    }

    /// Stop every live run state of the group. Returns how many were signalled.
    pub fn stop_group(&self, group_id: &str) -> usize {
        let tables = self.tables();
        let Some(group) = tables.groups.get(group_id) else {
            return 0;
        };

        for state in group.states.values() {
            state.request_stop();
            if let Some(lock) = tables.locks.get(&state.device_id) {
                if lock.state.run_id == state.run_id {
                    lock.stop.store(true, Ordering::SeqCst);
                }
            }
        }
        group.states.len()
    }

    /// Stop whatever run holds the device. Returns whether one was running.
    pub fn stop_device(&self, device_id: &str) -> bool {
        let tables = self.tables();
        match tables.locks.get(device_id) {
            Some(lock) => {
                lock.stop.store(true, Ordering::SeqCst);
                lock.state.request_stop();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) -> usize {
        let tables = self.tables();
        for lock in tables.locks.values() {
            lock.stop.store(true, Ordering::SeqCst);
            lock.state.request_stop();
        }
        tables.locks.len()
    }

    pub fn is_busy(&self, device_id: &str) -> bool {
        self.tables().locks.contains_key(device_id)
    }

    /// Whether the group has a run record
    pub fn has_group_run(&self, group_id: &str) -> bool {
        self.tables().groups.contains_key(group_id)
    }

    pub fn active(&self) -> Vec<ActiveRun> {
        let tables = self.tables();
        let mut runs: Vec<ActiveRun> = tables
            .locks
            .values()
            .map(|lock| ActiveRun {
                device_id: lock.state.device_id.clone(),
                group_id: lock.state.group_id.clone(),
                macro_id: lock.state.macro_id.clone(),
                run_id: lock.state.run_id,
                started_at: lock.state.started_at,
            })
            .collect();
        runs.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        runs
    }
}
