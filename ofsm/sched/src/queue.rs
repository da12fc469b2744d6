//! Bounded per-group event ring

use alloc::boxed::Box;
use alloc::vec;

use ofsm_core::{Enqueued, Event, OResult, OfsmError};

/// Circular buffer of pending events with coalescing.
///
/// `head` is the oldest unconsumed slot, `tail` the next free one. When a
/// push makes `tail` catch up with `head` the queue is flagged as overflowed:
/// every slot then holds an unconsumed event and no new slot can be taken
/// until the next pop.
#[derive(Debug, Clone)]
pub struct EventQueue {
    slots: Box<[Event]>,
    head: usize,
    tail: usize,
    overflow: bool,
}

impl EventQueue {
    /// Create an empty queue of `capacity` slots (1..=255).
    pub fn new(capacity: usize) -> OResult<Self> {
        if capacity == 0 || capacity > u8::MAX as usize {
            return Err(OfsmError::QueueCapacity(capacity));
        }
        Ok(Self {
            slots: vec![Event::default(); capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            overflow: false,
        })
    }

    /// Add an event.
    ///
    /// Without `force_new` an event whose code matches the newest pending
    /// event replaces that event's data in place. Timeouts always coalesce
    /// when something is pending, and always take a slot when the queue is
    /// empty. Fails with [`OfsmError::QueueFull`] when a slot is needed but
    /// the queue has overflowed.
    pub fn push(&mut self, force_new: bool, event: Event) -> OResult<Enqueued> {
        let mut force_new = force_new;
        if !self.overflow {
            if self.head == self.tail {
                force_new = true;
            } else if event.is_timeout() {
                force_new = false;
            }
        }

        if !force_new {
            let last = self.wrap_back(self.tail);
            let slot = &mut self.slots[last];
            if slot.code == event.code {
                slot.data = event.data;
                return Ok(Enqueued::Coalesced);
            }
        }

        if self.overflow {
            return Err(OfsmError::QueueFull);
        }

        self.slots[self.tail] = event;
        self.tail = self.wrap_forward(self.tail);
        self.overflow = self.tail == self.head;
        Ok(Enqueued::Appended)
    }

    /// Take the oldest pending event, returning it with whether more remain.
    pub fn pop(&mut self) -> Option<(Event, bool)> {
        if self.is_empty() {
            return None;
        }
        let event = self.slots[self.head];
        self.head = self.wrap_forward(self.head);
        self.overflow = false;
        Some((event, self.head != self.tail))
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail && !self.overflow
    }

    /// Whether every slot holds an unconsumed event.
    pub fn is_overflowed(&self) -> bool {
        self.overflow
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        if self.overflow {
            self.capacity()
        } else {
            (self.tail + self.capacity() - self.head) % self.capacity()
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Pending events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> + '_ {
        (0..self.len()).map(move |i| &self.slots[(self.head + i) % self.capacity()])
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.overflow = false;
    }

    fn wrap_forward(&self, index: usize) -> usize {
        if index + 1 == self.capacity() {
            0
        } else {
            index + 1
        }
    }

    fn wrap_back(&self, index: usize) -> usize {
        if index == 0 {
            self.capacity() - 1
        } else {
            index - 1
        }
    }
}
