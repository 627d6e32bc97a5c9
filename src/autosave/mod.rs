//! C10 (part two) — the auto-save scheduler.
//!
//! Tracks which node paths have been mutated since the last save and
//! periodically flushes them to disk, the way this crate's ancestry ran
//! its cache TTL sweep: one background thread, woken on a fixed tick,
//! that only does work when there is work pending.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::AutosaveStrategy;
use crate::disk::Disk;

const MAX_ATTEMPTS: u32 = 5;
const HISTORY_CAPACITY: usize = 100;
const TICK_MS: u64 = 50;

#[derive(Debug, Clone)]
pub struct SaveEvent {
    pub at: chrono::DateTime<chrono::Utc>,
    pub saved: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

struct State {
    dirty: HashSet<String>,
    last_save: Instant,
    history: VecDeque<SaveEvent>,
}

pub struct AutosaveScheduler {
    disk: Arc<Disk>,
    interval_ms: u64,
    batch_size: usize,
    strategy: AutosaveStrategy,
    count_threshold: usize,
    state: Mutex<State>,
    running: Arc<AtomicBool>,
    dirty_count: AtomicUsize,
}

impl AutosaveScheduler {
    #[must_use]
    pub fn new(disk: Arc<Disk>, interval_ms: u64, batch_size: usize, strategy: AutosaveStrategy, count_threshold: usize) -> Arc<Self> {
        Arc::new(Self {
            disk,
            interval_ms,
            batch_size,
            strategy,
            count_threshold,
            state: Mutex::new(State { dirty: HashSet::new(), last_save: Instant::now(), history: VecDeque::new() }),
            running: Arc::new(AtomicBool::new(false)),
            dirty_count: AtomicUsize::new(0),
        })
    }

    /// Mark `path` as needing a save. With the `Count`/`Hybrid`
    /// strategies this may cross `count_threshold` and trigger an
    /// immediate save from the caller's thread; `Time`-only scheduling
    /// always waits for the background tick.
    pub fn mark_dirty(self: &Arc<Self>, path: impl Into<String>) {
        let mut state = self.state.lock().expect("autosave state mutex poisoned");
        state.dirty.insert(path.into());
        let count = state.dirty.len();
        drop(state);
        self.dirty_count.store(count, Ordering::SeqCst);

        let should_save_on_count = matches!(self.strategy, AutosaveStrategy::Count | AutosaveStrategy::Hybrid)
            && count >= self.count_threshold;
        if should_save_on_count {
            self.perform_save();
        }
    }

    fn due_on_time(&self, state: &State) -> bool {
        matches!(self.strategy, AutosaveStrategy::Time | AutosaveStrategy::Hybrid)
            && state.last_save.elapsed() >= Duration::from_millis(self.interval_ms)
            && !state.dirty.is_empty()
    }

    /// Save up to `batch_size` dirty paths, retrying each one up to
    /// [`MAX_ATTEMPTS`] times before giving up on it for this round (it
    /// stays dirty and will be retried on the next tick).
    pub fn perform_save(&self) -> SaveEvent {
        let start = Instant::now();
        let batch: Vec<String> = {
            let state = self.state.lock().expect("autosave state mutex poisoned");
            state.dirty.iter().take(self.batch_size).cloned().collect()
        };

        let mut saved = 0usize;
        let mut failed = 0usize;
        let mut succeeded_paths = Vec::new();
        for path in &batch {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match self.disk.save_node(path) {
                    Ok(()) => {
                        saved += 1;
                        succeeded_paths.push(path.clone());
                        break;
                    }
                    Err(e) if attempt < MAX_ATTEMPTS => {
                        log::warn!("fxd autosave: save_node({path}) attempt {attempt} failed: {e}");
                    }
                    Err(e) => {
                        log::error!("fxd autosave: giving up on {path} after {MAX_ATTEMPTS} attempts: {e}");
                        failed += 1;
                        break;
                    }
                }
            }
        }

        let event = SaveEvent { at: chrono::Utc::now(), saved, failed, elapsed: start.elapsed() };
        let mut state = self.state.lock().expect("autosave state mutex poisoned");
        for path in &succeeded_paths {
            state.dirty.remove(path);
        }
        state.last_save = Instant::now();
        state.history.push_back(event.clone());
        while state.history.len() > HISTORY_CAPACITY {
            state.history.pop_front();
        }
        self.dirty_count.store(state.dirty.len(), Ordering::SeqCst);
        crate::logger::metrics(&format!(
            "autosave saved={saved} failed={failed} elapsed_ms={}",
            event.elapsed.as_millis()
        ));
        event
    }

    /// Save immediately regardless of the configured strategy's
    /// thresholds.
    pub fn force_save(&self) -> SaveEvent {
        self.perform_save()
    }

    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.dirty_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn history(&self) -> Vec<SaveEvent> {
        self.state.lock().expect("autosave state mutex poisoned").history.iter().cloned().collect()
    }

    /// Spawn the background tick thread. Idempotent: calling this twice
    /// on an already-running scheduler is a no-op. A no-op too if the
    /// `autosave-background-thread` feature flag has been turned off at
    /// runtime, in which case callers must flush dirty paths themselves
    /// via [`Self::force_save`].
    pub fn start(self: &Arc<Self>) {
        if !crate::utils::feature_flags::is_enabled("autosave-background-thread") {
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let scheduler = self.clone();
        std::thread::spawn(move || {
            while scheduler.running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(TICK_MS));
                let due = {
                    let state = scheduler.state.lock().expect("autosave state mutex poisoned");
                    scheduler.due_on_time(&state)
                };
                if due {
                    scheduler.perform_save();
                }
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
