use crate::config::ParserConfig;
use crate::example::Example;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::ring::ExampleRing;
use crate::source::{ExampleSource, SourceAdapter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::debug;

/// Error types for parser operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParserError {
    /// `start` was called a second time. A parser drives its source
    /// exactly once; there is no restart.
    #[error("parser thread is already running")]
    AlreadyRunning,
}

/// Lifecycle phase of the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserStatus {
    /// `start` has not been called yet.
    Idle,
    /// The worker is reading from the source.
    Running,
    /// The source hit end of stream; published examples remain consumable.
    Draining,
    /// Every parsed example has been consumed.
    Finished,
    /// `abort` ended the stream early.
    Aborted,
}

/// State guarded by the controller lock. Every mutation is paired with a
/// condvar signal.
#[derive(Debug)]
struct ParserState {
    /// True once the source returned end of stream.
    parsing_done: bool,
    /// True once the consumer has drained every parsed example.
    reading_done: bool,
    /// True once an abort was requested before the stream finished.
    aborted: bool,
    /// Examples published to the ring. Final once `parsing_done`.
    parsed: u64,
    /// Examples handed to the consumer. `read <= parsed`.
    read: u64,
    /// Widest feature vector published so far.
    max_features: i32,
}

struct ParserShared<T> {
    ring: ExampleRing<T>,
    state: Mutex<ParserState>,
    state_changed: Condvar,
    /// Cleared to request abort.
    keep_running: RunFlag,
    metrics: Metrics,
    enable_metrics: bool,
}

enum Retrieve<'a, T> {
    /// A ready example, checked out of the ring.
    Example(&'a Example<T>),
    /// The stream is over; nothing further will arrive.
    Drained,
    /// Nothing ready yet; the caller should wait for a parse.
    NotReady,
}

impl<T> ParserShared<T> {
    fn lock_state(&self) -> MutexGuard<'_, ParserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, ParserState>) -> MutexGuard<'a, ParserState> {
        self.state_changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Core drain logic, executed under the controller lock.
    ///
    /// Sets `reading_done` exactly once, the first time the consumer
    /// observes `parsing_done` with every parsed example read.
    fn retrieve_example<'a>(&'a self, st: &mut ParserState) -> Retrieve<'a, T> {
        if st.parsing_done && st.read == st.parsed {
            if !st.reading_done {
                st.reading_done = true;
                self.state_changed.notify_all();
                debug!(read = st.read, "all parsed examples read, reading done");
            }
            return Retrieve::Drained;
        }

        if st.parsed == 0 || st.read == st.parsed {
            return Retrieve::NotReady;
        }

        // `read < parsed` guarantees the slot at the consumer cursor is
        // already published, so this does not block.
        match self.ring.get_unused_example() {
            Some(example) => {
                st.read += 1;
                Retrieve::Example(example)
            }
            // Ring closed by a concurrent abort.
            None => Retrieve::Drained,
        }
    }

    /// Requests termination: clears the run flag, releases a producer
    /// parked on a full ring and a consumer parked in `next`. Idempotent.
    fn request_abort(&self) {
        if self.keep_running.clear() {
            self.ring.close();
            let mut st = self.lock_state();
            if !(st.parsing_done && st.reading_done) {
                st.aborted = true;
            }
            self.state_changed.notify_all();
            drop(st);
            debug!("parser abort requested");
        }
    }
}

/// Streaming example parser.
///
/// Owns a bounded ring of example slots and a single worker thread that
/// fills it from an [`ExampleSource`]. The consumer pulls examples out in
/// source order with [`next`](Self::next), releasing each slot when the
/// returned [`ExampleHandle`] drops.
///
/// Single-producer, single-consumer: the worker is the only writer and the
/// caller of `next` the only reader. Concurrent consumers are not
/// supported; aborting from another thread goes through [`AbortHandle`].
pub struct ExampleParser<T: Send + 'static> {
    shared: Arc<ParserShared<T>>,
    /// Moved into the worker at `start`.
    source: Option<SourceAdapter<T>>,
    worker: Option<JoinHandle<()>>,
    config: ParserConfig,
    started: bool,
}

impl<T: Send + 'static> ExampleParser<T> {
    /// Creates a parser over `source`. No thread is spawned until
    /// [`start`](Self::start).
    pub fn new(source: impl ExampleSource<T> + 'static, config: ParserConfig) -> Self {
        Self {
            shared: Arc::new(ParserShared {
                ring: ExampleRing::new(config.ring_capacity, config.free_on_destruct),
                state: Mutex::new(ParserState {
                    // Done until started, so observers see a quiescent
                    // parser before the first `start`.
                    parsing_done: true,
                    reading_done: true,
                    aborted: false,
                    parsed: 0,
                    read: 0,
                    max_features: 0,
                }),
                state_changed: Condvar::new(),
                keep_running: RunFlag::new(),
                metrics: Metrics::new(),
                enable_metrics: config.enable_metrics,
            }),
            source: Some(SourceAdapter::new(Box::new(source), config.kind)),
            worker: None,
            config,
            started: false,
        }
    }

    /// Spawns the worker thread.
    ///
    /// Returns [`ParserError::AlreadyRunning`] if called a second time; the
    /// running stream is undisturbed and no second worker is spawned.
    pub fn start(&mut self) -> Result<(), ParserError> {
        if self.started {
            return Err(ParserError::AlreadyRunning);
        }
        let source = self.source.take().ok_or(ParserError::AlreadyRunning)?;
        self.started = true;

        {
            let mut st = self.shared.lock_state();
            st.parsing_done = false;
            st.reading_done = false;
            st.aborted = false;
            st.parsed = 0;
            st.read = 0;
            st.max_features = 0;
        }
        self.shared.keep_running.set();

        let shared = Arc::clone(&self.shared);
        self.worker = Some(thread::spawn(move || parse_loop(shared, source)));
        debug!(capacity = self.config.ring_capacity, "parser started");
        Ok(())
    }

    /// Returns the next example, in source order.
    ///
    /// Blocks while the ring is empty and parsing is not done. Returns
    /// `None` once the stream is drained or aborted; the two cases are
    /// distinguishable through [`status`](Self::status).
    ///
    /// The returned handle keeps the slot checked out; dropping it (or
    /// calling [`ExampleHandle::finalize`]) releases the slot for the
    /// worker to reuse.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<ExampleHandle<'_, T>> {
        let shared = &*self.shared;
        let release = self.config.free_after_release;

        let mut st = shared.lock_state();
        while shared.keep_running.is_set() {
            if st.reading_done {
                return None;
            }
            match shared.retrieve_example(&mut st) {
                Retrieve::Example(example) => {
                    drop(st);
                    if shared.enable_metrics {
                        shared.metrics.add_examples_read(1);
                    }
                    return Some(ExampleHandle {
                        shared,
                        example,
                        release,
                    });
                }
                Retrieve::Drained => return None,
                Retrieve::NotReady => {
                    if shared.enable_metrics {
                        shared.metrics.add_consumer_waits(1);
                    }
                    st = shared.wait(st);
                }
            }
        }
        None
    }

    /// Joins the worker thread.
    ///
    /// Safe to call once end of stream has been observed or after
    /// [`abort`](Self::abort); a premature call blocks until the worker can
    /// finish on its own.
    pub fn end(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                // Source panics are converted to EOF inside the loop; this
                // only fires for a bug in the worker itself.
                debug!("parser worker terminated by panic");
            }
        }
    }

    /// Aborts the stream and joins the worker.
    ///
    /// Wakes a producer blocked on a full ring and a consumer blocked in
    /// [`next`](Self::next); both observe the cleared flag and return.
    /// Idempotent, and a no-op after the stream already finished.
    pub fn abort(&mut self) {
        self.shared.request_abort();
        self.end();
    }

    /// Returns a cloneable handle for aborting from another thread.
    pub fn abort_handle(&self) -> AbortHandle<T> {
        AbortHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// True while parsing is not done or unconsumed examples remain.
    pub fn is_running(&self) -> bool {
        let st = self.shared.lock_state();
        !st.aborted && (!st.parsing_done || st.read < st.parsed)
    }

    /// Returns the lifecycle phase, which also distinguishes a drained
    /// stream from an aborted one after `next` starts returning `None`.
    pub fn status(&self) -> ParserStatus {
        if !self.started {
            return ParserStatus::Idle;
        }
        let st = self.shared.lock_state();
        if st.aborted {
            ParserStatus::Aborted
        } else if !st.parsing_done {
            ParserStatus::Running
        } else if !st.reading_done {
            ParserStatus::Draining
        } else {
            ParserStatus::Finished
        }
    }

    /// Number of examples the worker has published so far.
    pub fn examples_parsed(&self) -> u64 {
        self.shared.lock_state().parsed
    }

    /// Number of examples handed to the consumer so far.
    pub fn examples_read(&self) -> u64 {
        self.shared.lock_state().read
    }

    /// Widest feature vector seen so far; the dimensionality of the stream
    /// once at least one example has been parsed.
    pub fn number_of_features(&self) -> i32 {
        self.shared.lock_state().max_features
    }

    /// Returns the ring size in number of examples.
    pub fn ring_capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    /// Returns the parser configuration.
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Returns a metrics snapshot. All zeros unless
    /// [`enable_metrics`](ParserConfig::enable_metrics) is set.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl<T: Send + 'static> Drop for ExampleParser<T> {
    fn drop(&mut self) {
        // No detached worker: release both sides and join.
        self.shared.request_abort();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// The worker: pulls records from the source into the ring until end of
/// stream or abort.
fn parse_loop<T: Send + 'static>(shared: Arc<ParserShared<T>>, mut source: SourceAdapter<T>) {
    while shared.keep_running.is_set() {
        {
            let st = shared.lock_state();
            if st.parsing_done {
                return;
            }
        }

        // May park on a full ring; released by finalize or close.
        let Some(mut slot) = shared.ring.get_free_example() else {
            return;
        };

        // A panicking source ends the stream like EOF; the fault never
        // crosses the thread boundary.
        let parsed = catch_unwind(AssertUnwindSafe(|| source.read_into(slot.example())))
            .unwrap_or(false);

        if !parsed {
            // Slot returns to empty without publication.
            drop(slot);
            let mut st = shared.lock_state();
            st.parsing_done = true;
            shared.state_changed.notify_all();
            debug!(parsed = st.parsed, "source end of stream, parsing done");
            return;
        }

        let len = slot.example().len;
        slot.publish();
        let mut st = shared.lock_state();
        st.parsed += 1;
        st.max_features = st.max_features.max(len);
        shared.state_changed.notify_all();
        drop(st);
        if shared.enable_metrics {
            shared.metrics.add_examples_parsed(1);
        }
    }
}

/// A parsed example checked out from the ring.
///
/// Holding the handle keeps the slot in its reading state. Dropping the
/// handle finalizes the slot - releasing or recycling its vector storage
/// per [`ParserConfig::free_after_release`] - so finalization happens
/// exactly once per example, with [`finalize`](Self::finalize) available
/// when the release point should be explicit.
pub struct ExampleHandle<'a, T> {
    shared: &'a ParserShared<T>,
    example: &'a Example<T>,
    release: bool,
}

impl<T> ExampleHandle<'_, T> {
    /// The feature vector.
    #[inline]
    pub fn fv(&self) -> &[T] {
        &self.example.fv
    }

    /// Number of features.
    #[inline]
    pub fn len(&self) -> i32 {
        self.example.len
    }

    /// The label. Meaningless for an unlabelled stream.
    #[inline]
    pub fn label(&self) -> f64 {
        self.example.label
    }

    /// The whole example record.
    #[inline]
    pub fn example(&self) -> &Example<T> {
        self.example
    }

    /// Releases the slot. Equivalent to dropping the handle.
    pub fn finalize(self) {}
}

impl<T> Drop for ExampleHandle<'_, T> {
    fn drop(&mut self) {
        self.shared.ring.finalize_example(self.release);
        if self.shared.enable_metrics {
            self.shared.metrics.add_examples_finalized(1);
        }
    }
}

/// Cloneable handle for requesting abort from another thread, typically
/// while the consumer is blocked in [`ExampleParser::next`].
///
/// Aborting is idempotent - only the first call has effect. The handle
/// does not join the worker; that stays with
/// [`ExampleParser::abort`]/[`end`](ExampleParser::end).
pub struct AbortHandle<T> {
    shared: Arc<ParserShared<T>>,
}

impl<T> AbortHandle<T> {
    /// Requests termination of a running parse.
    pub fn abort(&self) {
        self.shared.request_abort();
    }

    /// True once an abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.shared.lock_state().aborted
    }
}

impl<T> Clone for AbortHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// The abort flag, padded out to two cache lines.
///
/// Producer and consumer poll this flag on every iteration while the
/// counters declared next to it churn under the controller lock; the
/// 128-byte alignment keeps the flag's line (plus the neighbour a
/// prefetcher may pull in with it) free of that traffic.
#[repr(align(128))]
struct RunFlag(AtomicBool);

impl RunFlag {
    const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Marks the parser as running.
    fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True while no abort has been requested.
    #[inline]
    fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clears the flag, returning true only for the call that cleared it.
    fn clear(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}
