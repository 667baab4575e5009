use crate::example::Example;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Occupancy state of one ring slot.
///
/// A slot cycles `Empty -> Writing -> Ready -> Reading -> Empty`. At most
/// one slot is `Writing` (single producer) and at most one is `Reading`
/// (single consumer) at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    Empty,
    Writing,
    Ready,
    Reading,
}

/// Bounded ring of example slots - the core building block.
///
/// A fixed-capacity circular array with a producer cursor and a consumer
/// cursor. Slot state transitions happen under one lock; producer and
/// consumer park on the condvar only when the ring geometry forbids
/// progress, and `close()` releases both sides.
///
/// State lives per slot rather than in count-based semaphores so the
/// consumer can inspect a `Ready` payload in place before transitioning it
/// out, and so a slot can hand the same backing storage to successive
/// examples.
pub(crate) struct ExampleRing<T> {
    /// Slot states and cursors, guarded by one lock.
    state: Mutex<RingState>,
    /// Signalled on every slot state transition.
    state_changed: Condvar,
    /// Set by `close()`; blocking calls return `None` once they observe it.
    closed: AtomicBool,
    /// Release remaining slot storage eagerly on drop.
    free_on_destruct: bool,
    /// Slot payloads. A payload may be touched without the state lock only
    /// by the unique owner of its `Writing` or `Reading` transition.
    slots: Box<[UnsafeCell<Example<T>>]>,
}

struct RingState {
    states: Box<[SlotState]>,
    /// Producer cursor, monotonic. Counts published examples; the slot
    /// being written is `write_idx % capacity`.
    write_idx: u64,
    /// Consumer cursor, monotonic. Counts finalized examples;
    /// `read_idx <= write_idx`.
    read_idx: u64,
}

// Safety: the ring is shared between exactly one producer and one consumer.
// All state transitions go through the mutex; payload access outside the
// mutex is exclusive by the slot-state discipline (a `Writing` payload is
// touched only by the producer that claimed it, a `Reading` payload only by
// the consumer).
unsafe impl<T: Send> Send for ExampleRing<T> {}
unsafe impl<T: Send> Sync for ExampleRing<T> {}

impl<T> ExampleRing<T> {
    /// Creates a ring with `capacity` empty slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub(crate) fn new(capacity: usize, free_on_destruct: bool) -> Self {
        assert!(capacity >= 1, "ring capacity must be at least 1");

        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || UnsafeCell::new(Example::empty()));

        Self {
            state: Mutex::new(RingState {
                states: vec![SlotState::Empty; capacity].into_boxed_slice(),
                write_idx: 0,
                read_idx: 0,
            }),
            state_changed: Condvar::new(),
            closed: AtomicBool::new(false),
            free_on_destruct,
            slots: slots.into_boxed_slice(),
        }
    }

    /// Returns the ring capacity in number of examples.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of examples currently resident (published and not
    /// yet finalized).
    pub(crate) fn len(&self) -> usize {
        let st = self.lock_state();
        (st.write_idx - st.read_idx) as usize
    }

    /// Returns true if no published example is resident.
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the ring has been closed.
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Claims the slot at the producer cursor for writing.
    ///
    /// Blocks while that slot still holds an unconsumed example. Returns
    /// `None` once the ring is closed. Single-producer only.
    pub(crate) fn get_free_example(&self) -> Option<WriteSlot<'_, T>> {
        let mut st = self.lock_state();
        let idx = (st.write_idx % self.capacity() as u64) as usize;
        loop {
            if self.is_closed() {
                return None;
            }
            if st.states[idx] == SlotState::Empty {
                break;
            }
            st = self.wait(st);
        }
        st.states[idx] = SlotState::Writing;
        drop(st);

        Some(WriteSlot {
            ring: self,
            idx,
            published: false,
        })
    }

    /// Internal: stamp a written slot `Ready` and advance the producer
    /// cursor. Called by [`WriteSlot::publish`].
    fn publish_internal(&self, idx: usize) {
        let mut st = self.lock_state();
        debug_assert_eq!(st.states[idx], SlotState::Writing);
        st.states[idx] = SlotState::Ready;
        st.write_idx += 1;
        self.state_changed.notify_all();
    }

    /// Internal: return an unpublished slot to `Empty`. Called when a
    /// [`WriteSlot`] is dropped without publishing (the producer's
    /// end-of-stream path).
    fn retract_internal(&self, idx: usize) {
        let mut st = self.lock_state();
        debug_assert_eq!(st.states[idx], SlotState::Writing);
        st.states[idx] = SlotState::Empty;
        self.state_changed.notify_all();
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Returns the example at the consumer cursor, transitioning its slot
    /// `Ready -> Reading`.
    ///
    /// Blocks while that slot holds no published example. Returns `None`
    /// once the ring is closed. Single-consumer only; the returned
    /// reference must not be held across [`finalize_example`](Self::finalize_example).
    pub(crate) fn get_unused_example(&self) -> Option<&Example<T>> {
        let mut st = self.lock_state();
        let idx = (st.read_idx % self.capacity() as u64) as usize;
        loop {
            if self.is_closed() {
                return None;
            }
            if st.states[idx] == SlotState::Ready {
                break;
            }
            st = self.wait(st);
        }
        st.states[idx] = SlotState::Reading;
        drop(st);

        // Safety: the slot is `Reading` and this is the only consumer; the
        // payload stays untouched by the producer until the slot returns to
        // `Empty` in finalize_example.
        Some(unsafe { &*self.slots[idx].get() })
    }

    /// Returns the current reading slot to `Empty` and advances the
    /// consumer cursor.
    ///
    /// With `release_storage` the slot vector's allocation is dropped;
    /// otherwise it is cleared in place so the next example through this
    /// slot reuses the storage.
    ///
    /// # Panics
    ///
    /// Panics if no slot is in `Reading` (finalize without a matching read).
    pub(crate) fn finalize_example(&self, release_storage: bool) {
        let mut st = self.lock_state();
        let idx = (st.read_idx % self.capacity() as u64) as usize;
        assert_eq!(
            st.states[idx],
            SlotState::Reading,
            "finalize_example without a matching read"
        );

        // Safety: the slot is still `Reading`; the consumer is its unique
        // owner and the producer cannot claim it until the state flips.
        let example = unsafe { &mut *self.slots[idx].get() };
        if release_storage {
            example.fv = Vec::new();
        } else {
            example.fv.clear();
        }
        example.len = -1;

        st.states[idx] = SlotState::Empty;
        st.read_idx += 1;
        self.state_changed.notify_all();
    }

    // ---------------------------------------------------------------------
    // LIFECYCLE
    // ---------------------------------------------------------------------

    /// Closes the ring and wakes both blocked sides.
    ///
    /// Subsequent (and woken) blocking calls return `None`. Idempotent.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Lock round-trip so a waiter past its closed check cannot miss the
        // wake-up.
        drop(self.lock_state());
        self.state_changed.notify_all();
    }

    fn lock_state(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, RingState>) -> MutexGuard<'a, RingState> {
        self.state_changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for ExampleRing<T> {
    fn drop(&mut self) {
        if !self.free_on_destruct {
            return;
        }
        // Release every slot's vector eagerly; without the flag the storage
        // drops with the slots as usual.
        for slot in self.slots.iter_mut() {
            let example = slot.get_mut();
            example.fv = Vec::new();
            example.len = -1;
        }
    }
}

/// Exclusive write access to a claimed slot.
///
/// [`publish`](Self::publish) stamps the slot `Ready` and advances the
/// producer cursor; the payload must already be written. Dropping the guard
/// without publishing returns the slot to `Empty`.
pub(crate) struct WriteSlot<'a, T> {
    ring: &'a ExampleRing<T>,
    idx: usize,
    published: bool,
}

impl<T> WriteSlot<'_, T> {
    /// Returns the slot payload for writing.
    #[inline]
    pub(crate) fn example(&mut self) -> &mut Example<T> {
        // Safety: the slot is `Writing` and this guard is its unique owner.
        unsafe { &mut *self.ring.slots[self.idx].get() }
    }

    /// Publishes the slot, making the example visible to the consumer.
    pub(crate) fn publish(mut self) {
        self.ring.publish_internal(self.idx);
        self.published = true;
    }
}

impl<T> Drop for WriteSlot<'_, T> {
    fn drop(&mut self) {
        if !self.published {
            self.ring.retract_internal(self.idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn push(ring: &ExampleRing<f32>, fv: &[f32], label: f64) {
        let mut slot = ring.get_free_example().unwrap();
        let example = slot.example();
        example.fv.clear();
        example.fv.extend_from_slice(fv);
        example.len = fv.len() as i32;
        example.label = label;
        slot.publish();
    }

    #[test]
    fn test_write_publish_read_finalize_cycle() {
        let ring = ExampleRing::<f32>::new(4, true);

        push(&ring, &[1.0, 2.0], 0.5);
        assert_eq!(ring.len(), 1);

        let example = ring.get_unused_example().unwrap();
        assert_eq!(example.fv, vec![1.0, 2.0]);
        assert_eq!(example.len, 2);
        assert_eq!(example.label, 0.5);

        ring.finalize_example(true);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_fifo_across_wraparound() {
        let ring = ExampleRing::<f32>::new(2, true);

        for round in 0..5u32 {
            push(&ring, &[round as f32], f64::from(round));
            let example = ring.get_unused_example().unwrap();
            assert_eq!(example.fv, vec![round as f32]);
            ring.finalize_example(true);
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_storage_reused_when_not_released() {
        let ring = ExampleRing::<f32>::new(1, true);

        push(&ring, &[1.0, 2.0], 0.0);
        let first_ptr = ring.get_unused_example().unwrap().fv.as_ptr();
        ring.finalize_example(false);

        // Same slot, same backing storage.
        push(&ring, &[3.0, 4.0], 1.0);
        let second_ptr = ring.get_unused_example().unwrap().fv.as_ptr();
        ring.finalize_example(false);

        assert_eq!(first_ptr, second_ptr);
    }

    #[test]
    fn test_unpublished_slot_returns_to_empty() {
        let ring = ExampleRing::<f32>::new(1, true);

        {
            let slot = ring.get_free_example().unwrap();
            drop(slot);
        }

        // The slot is free again; a second claim succeeds immediately.
        let slot = ring.get_free_example().unwrap();
        drop(slot);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_close_unblocks_producer() {
        let ring = Arc::new(ExampleRing::<f32>::new(1, true));
        push(&ring, &[1.0], 0.0);

        let ring2 = Arc::clone(&ring);
        let producer = thread::spawn(move || ring2.get_free_example().is_none());

        thread::sleep(Duration::from_millis(50));
        ring.close();
        assert!(producer.join().unwrap());
    }

    #[test]
    fn test_close_unblocks_consumer() {
        let ring = Arc::new(ExampleRing::<f32>::new(1, true));

        let ring2 = Arc::clone(&ring);
        let consumer = thread::spawn(move || ring2.get_unused_example().is_none());

        thread::sleep(Duration::from_millis(50));
        ring.close();
        assert!(consumer.join().unwrap());
    }

    #[test]
    fn test_producer_waits_for_free_slot() {
        let ring = Arc::new(ExampleRing::<f32>::new(1, true));
        push(&ring, &[1.0], 0.0);

        let ring2 = Arc::clone(&ring);
        let producer = thread::spawn(move || {
            push(&ring2, &[2.0], 1.0);
        });

        thread::sleep(Duration::from_millis(50));
        // Producer is parked on the occupied slot; free it.
        let example = ring.get_unused_example().unwrap();
        assert_eq!(example.fv, vec![1.0]);
        ring.finalize_example(true);
        producer.join().unwrap();

        let example = ring.get_unused_example().unwrap();
        assert_eq!(example.fv, vec![2.0]);
        ring.finalize_example(true);
    }
}
