//! Debounced filesystem observation.
//!
//! Raw backend events only mark a path as pending; a path is signaled once it
//! has been quiet for the changed timeout and is not locked by a writer. The
//! native backend receives events through [`notify`] (inotify, FSEvents, or
//! `ReadDirectoryChangesW` behind one API); where that fails a polling
//! backend walks the tree and diffs modified times.
//!
//! The loop is single threaded and cooperative: backend reads are bounded
//! waits, settled callbacks run synchronously inside the loop, and a stop
//! flag is honored at every tick boundary.

use crate::error::{AppError, Result};
use cfg_if::cfg_if;
use notify::{RecursiveMode, Watcher};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::{Duration, Instant},
};

/// How long the native backend waits for events per tick.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a path must stay quiet before it is signaled.
pub const DEFAULT_CHANGED_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the polling backend walks the tree.
const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Changed timeout of the polling backend. Coarser detection risks dropping
/// fast consecutive edits, so it is considerably longer.
const POLL_CHANGED_TIMEOUT: Duration = Duration::from_secs(25);

/// Lower bound for both timeouts.
const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Pending paths keyed by the time they were last seen changing.
///
/// Paths are promoted to settled once their timestamp has aged past the
/// timeout, in sorted path order. A locked path stays pending with its stale
/// timestamp, so it fires as soon as it unlocks.
pub(crate) struct DebounceQueue {
    pending: BTreeMap<PathBuf, Instant>,
    timeout: Duration,
}

impl DebounceQueue {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { pending: BTreeMap::new(), timeout }
    }

    /// Queues a change event for a path, refreshing its last-seen time.
    /// Directories are not queued.
    pub(crate) fn queue(&mut self, path: PathBuf, now: Instant) {
        if path.is_dir() {
            return;
        }
        self.pending.insert(path, now);
    }

    /// Removes and returns every pending path that has been quiet for the
    /// timeout and is not locked.
    pub(crate) fn settled(
        &mut self,
        now: Instant,
        is_locked: impl Fn(&Path) -> bool,
    ) -> Vec<PathBuf> {
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(path, seen)| !is_locked(path) && **seen + self.timeout <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &ready {
            self.pending.remove(path);
        }
        ready
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Checks whether a file is still being written to.
///
/// Windows reports a single change event for a copy, but keeps the file
/// unreadable until the copy finishes; probing for readability avoids
/// signaling such files early. Elsewhere a path is never considered locked.
fn is_locked(path: &Path) -> bool {
    cfg_if! {
        if #[cfg(windows)] {
            path.exists() && std::fs::File::open(path).is_err()
        } else {
            let _ = path;
            false
        }
    }
}

/// Watches a directory tree and signals stable file changes.
pub struct Observer {
    root: PathBuf,
    event_timeout: Duration,
    changed_timeout: Option<Duration>,
    stop: Arc<AtomicBool>,
}

impl Observer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            event_timeout: DEFAULT_EVENT_TIMEOUT,
            changed_timeout: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the backend wait quantum. Clamped to at least one second.
    pub fn set_event_timeout(&mut self, timeout: Duration) {
        self.event_timeout = timeout.max(MIN_TIMEOUT);
    }

    /// Sets how long a path must stay quiet before it is signaled. Clamped to
    /// at least one second. Defaults to the backend's own timeout.
    pub fn set_changed_timeout(&mut self, timeout: Duration) {
        self.changed_timeout = Some(timeout.max(MIN_TIMEOUT));
    }

    /// Flag that cancels the observation loop at the next tick boundary.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Starts the observation loop, invoking the callback for every settled
    /// file change. Blocks until the stop flag is set or the backend ends.
    ///
    /// Callbacks run synchronously inside the loop and should be bounded.
    pub fn run(self, mut on_changed: impl FnMut(&Path)) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        });

        match watcher {
            Ok(mut watcher) => match watcher.watch(&self.root, RecursiveMode::Recursive) {
                Ok(()) => self.run_native(rx, &mut on_changed),
                Err(err) => {
                    debug!("native observer unavailable ({err}), falling back to polling");
                    self.run_polling(&mut on_changed)
                }
            },
            Err(err) => {
                debug!("native observer unavailable ({err}), falling back to polling");
                self.run_polling(&mut on_changed)
            }
        }
    }

    fn run_native(
        &self,
        rx: mpsc::Receiver<notify::Result<notify::Event>>,
        on_changed: &mut impl FnMut(&Path),
    ) -> Result<()> {
        let timeout = self.changed_timeout.unwrap_or(DEFAULT_CHANGED_TIMEOUT);
        let mut queue = DebounceQueue::new(timeout);

        loop {
            match rx.recv_timeout(self.event_timeout) {
                Ok(event) => {
                    self.queue_event(&mut queue, event);
                    // Drain whatever else arrived in the meantime before
                    // evaluating the tick.
                    while let Ok(event) = rx.try_recv() {
                        self.queue_event(&mut queue, event);
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }

            for path in queue.settled(Instant::now(), is_locked) {
                on_changed(&path);
            }
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
        }
        Ok(())
    }

    fn queue_event(
        &self,
        queue: &mut DebounceQueue,
        event: notify::Result<notify::Event>,
    ) {
        match event {
            Ok(event) => {
                let now = Instant::now();
                for path in event.paths {
                    queue.queue(path, now);
                }
            }
            Err(err) => warn!("observer backend error: {err}"),
        }
    }

    fn run_polling(&self, on_changed: &mut impl FnMut(&Path)) -> Result<()> {
        let timeout = self.changed_timeout.unwrap_or(POLL_CHANGED_TIMEOUT);
        let mut queue = DebounceQueue::new(timeout);
        let mut before = self.snapshot()?;

        loop {
            thread::sleep(POLL_INTERVAL);
            let after = self.snapshot()?;
            let now = Instant::now();

            for (path, modified) in &after {
                if before.get(path).map_or(true, |prior| prior != modified) {
                    queue.queue(path.clone(), now);
                }
            }
            for path in before.keys() {
                if !after.contains_key(path) {
                    queue.queue(path.clone(), now);
                }
            }
            before = after;

            for path in queue.settled(Instant::now(), is_locked) {
                on_changed(&path);
            }
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
        }
        Ok(())
    }

    /// Flat map of file paths to modified times under the observed root.
    fn snapshot(&self) -> Result<BTreeMap<PathBuf, i64>> {
        if !self.root.is_dir() {
            return Err(AppError::io(
                std::io::Error::new(std::io::ErrorKind::NotFound, "observed root missing"),
                &self.root,
            ));
        }
        Ok(crate::utils::source_files_iter(&self.root)
            .map(|path| {
                let (_, modified) = crate::utils::file_stat(&path);
                (path, modified)
            })
            .collect())
    }
}
