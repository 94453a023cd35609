//! Pooled order storage.
//!
//! All slots are allocated up front; a LIFO free list recycles them so the
//! book never heap-allocates per order. A freed slot's contents are
//! indeterminate; its handle must not be dereferenced until the slot is
//! handed out again by `insert`.

use core::mem::MaybeUninit;

use crate::order::Order;

/// Index into the order pool. `u32` keeps id-map entries small.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct OrderHandle(pub u32);

impl OrderHandle {
    pub const INVALID: Self = Self(u32::MAX);

    #[inline(always)]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for OrderHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Fixed-capacity pool of orders with a LIFO free list.
pub struct OrderPool {
    slots: Box<[MaybeUninit<Order>]>,
    free_list: Vec<u32>,
    active: u32,
}

impl OrderPool {
    /// Create a pool holding up to `capacity` orders.
    ///
    /// # Panics
    /// Panics if `capacity` is zero, not a power of two, or above 2^28.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "pool capacity must be a power of two"
        );
        assert!(capacity <= 1 << 28, "pool capacity too large");

        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, MaybeUninit::uninit);

        // LIFO reuse keeps recently freed slots warm in cache.
        let free_list: Vec<u32> = (0..capacity as u32).rev().collect();

        Self {
            slots: slots.into_boxed_slice(),
            free_list,
            active: 0,
        }
    }

    /// Store an order, returning its handle, or `None` when exhausted.
    #[inline(always)]
    pub fn insert(&mut self, order: Order) -> Option<OrderHandle> {
        let idx = self.free_list.pop()?;
        self.active += 1;
        self.slots[idx as usize].write(order);
        Some(OrderHandle(idx))
    }

    /// Return a slot to the free list.
    ///
    /// The handle must have come from `insert` and not been freed since.
    #[inline(always)]
    pub fn free(&mut self, handle: OrderHandle) {
        debug_assert!(handle.index() < self.slots.len(), "invalid handle");
        debug_assert!(self.active > 0, "double free");
        self.free_list.push(handle.0);
        self.active -= 1;
    }

    /// Read an order. The handle must be live.
    #[inline(always)]
    pub fn get(&self, handle: OrderHandle) -> &Order {
        debug_assert!(handle.index() < self.slots.len(), "handle out of bounds");
        // SAFETY: the book only holds handles between insert and free, so
        // the slot is initialised.
        unsafe { self.slots[handle.index()].assume_init_ref() }
    }

    /// Mutate an order in place. The handle must be live.
    #[inline(always)]
    pub fn get_mut(&mut self, handle: OrderHandle) -> &mut Order {
        debug_assert!(handle.index() < self.slots.len(), "handle out of bounds");
        // SAFETY: as in `get`.
        unsafe { self.slots[handle.index()].assume_init_mut() }
    }

    #[inline(always)]
    pub fn active(&self) -> usize {
        self.active as usize
    }

    #[inline(always)]
    pub fn available(&self) -> usize {
        self.free_list.len()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    pub fn is_exhausted(&self) -> bool {
        self.free_list.is_empty()
    }

    /// Drop all live orders and refill the free list.
    pub fn clear(&mut self) {
        self.free_list.clear();
        self.free_list.extend((0..self.capacity() as u32).rev());
        self.active = 0;
    }
}
