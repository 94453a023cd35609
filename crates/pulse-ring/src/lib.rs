//! Lock-free SPSC ring buffer for the decoder → book handoff.
//!
//! Exactly one producer thread and one consumer thread. Synchronisation
//! flows through a per-slot sequence number: the producer publishes a slot
//! by storing `position + 1` with release ordering, the consumer retires it
//! by storing `position + capacity`. Head and tail are written relaxed;
//! visibility of payloads comes from the slot sequences alone. Head, tail,
//! and every slot sit on their own cache line; sharing a line between the
//! two threads measurably inflates tail latency.
//!
//! Payloads are moved in and out of slots, never copied, so `T` does not
//! need `Copy`. Operations never block; spinning wrappers are provided for
//! callers that want them.

#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU64, Ordering};

#[repr(align(64))]
struct CachePadded<T>(T);

#[repr(align(64))]
struct Slot<T> {
    sequence: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Single-producer single-consumer ring buffer.
///
/// Capacity is a power of two, fixed at construction. Use [`split`] to
/// obtain the two endpoint handles; the `&mut self` receiver guarantees at
/// most one producer and one consumer exist at a time.
///
/// [`split`]: SpscRing::split
pub struct SpscRing<T> {
    /// Next position the producer will publish.
    head: CachePadded<AtomicU64>,
    /// Next position the consumer will take.
    tail: CachePadded<AtomicU64>,
    slots: Box<[Slot<T>]>,
    mask: u64,
}

// SAFETY: slot handoff is synchronised by the acquire/release sequence
// protocol; a payload is touched by exactly one side at a time.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// Create a ring with the given capacity.
    ///
    /// # Panics
    /// Panics if `capacity` is zero or not a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring capacity must be a nonzero power of two"
        );

        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity as u64 {
            slots.push(Slot {
                sequence: AtomicU64::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            });
        }

        Self {
            head: CachePadded(AtomicU64::new(0)),
            tail: CachePadded(AtomicU64::new(0)),
            slots: slots.into_boxed_slice(),
            mask: (capacity - 1) as u64,
        }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Approximate occupancy. Exact from either endpoint's own thread;
    /// monotone under the SPSC model from anywhere else.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.0.load(Ordering::Acquire);
        let tail = self.tail.0.load(Ordering::Acquire);
        head.wrapping_sub(tail) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split into the producer and consumer endpoints.
    pub fn split(&mut self) -> (Producer<'_, T>, Consumer<'_, T>) {
        (Producer { ring: self }, Consumer { ring: self })
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        if !core::mem::needs_drop::<T>() {
            return;
        }
        // Unconsumed payloads occupy positions tail..head.
        let head = *self.head.0.get_mut();
        let tail = *self.tail.0.get_mut();
        for pos in tail..head {
            let slot = &mut self.slots[(pos & self.mask) as usize];
            // SAFETY: every position in tail..head was published and never
            // consumed, so the slot holds an initialised value.
            unsafe { slot.value.get_mut().assume_init_drop() };
        }
    }
}

/// Write endpoint. Must stay on a single thread.
pub struct Producer<'a, T> {
    ring: &'a SpscRing<T>,
}

impl<'a, T> Producer<'a, T> {
    /// Attempt to publish a value.
    ///
    /// Returns the value back if the ring is full.
    #[inline(always)]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let ring = self.ring;
        let head = ring.head.0.load(Ordering::Relaxed);
        let slot = &ring.slots[(head & ring.mask) as usize];

        // The slot is free for this lap only once its sequence has come
        // around to the producer's position.
        if slot.sequence.load(Ordering::Acquire) != head {
            return Err(value);
        }

        // SAFETY: the sequence check above proves the consumer has retired
        // this slot; only this producer may touch it until publication.
        unsafe { (*slot.value.get()).write(value) };
        slot.sequence.store(head.wrapping_add(1), Ordering::Release);
        ring.head.0.store(head.wrapping_add(1), Ordering::Relaxed);
        Ok(())
    }

    /// Publish, spinning until space is available.
    #[inline]
    pub fn push(&mut self, value: T) {
        let mut value = value;
        loop {
            match self.try_push(value) {
                Ok(()) => return,
                Err(v) => value = v,
            }
            core::hint::spin_loop();
        }
    }

    /// Slots currently free.
    #[inline]
    pub fn free(&self) -> usize {
        self.ring.capacity() - self.ring.len()
    }
}

/// Read endpoint. Must stay on a single thread.
pub struct Consumer<'a, T> {
    ring: &'a SpscRing<T>,
}

impl<'a, T> Consumer<'a, T> {
    /// Attempt to take the next value.
    #[inline(always)]
    pub fn try_pop(&mut self) -> Option<T> {
        let ring = self.ring;
        let tail = ring.tail.0.load(Ordering::Relaxed);
        let slot = &ring.slots[(tail & ring.mask) as usize];

        if slot.sequence.load(Ordering::Acquire) != tail.wrapping_add(1) {
            return None;
        }

        // SAFETY: the sequence check proves the producer published this
        // slot; moving the value out leaves the slot logically empty until
        // the retire store below hands it back.
        let value = unsafe { (*slot.value.get()).assume_init_read() };
        slot.sequence.store(
            tail.wrapping_add(ring.capacity() as u64),
            Ordering::Release,
        );
        ring.tail.0.store(tail.wrapping_add(1), Ordering::Relaxed);
        Some(value)
    }

    /// Take the next value, spinning until one is available.
    #[inline]
    pub fn pop(&mut self) -> T {
        loop {
            if let Some(value) = self.try_pop() {
                return value;
            }
            core::hint::spin_loop();
        }
    }

    /// Items currently queued.
    #[inline]
    pub fn available(&self) -> usize {
        self.ring.len()
    }
}
