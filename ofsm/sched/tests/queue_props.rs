//! The event ring checked against a `VecDeque` model

use std::collections::VecDeque;

use ofsm_core::{Enqueued, Event, EventCode, OResult, OfsmError};
use ofsm_sched::EventQueue;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Push { force_new: bool, code: u8, data: u8 },
    Pop,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<bool>(), 0u8..3, any::<u8>())
            .prop_map(|(force_new, code, data)| Op::Push { force_new, code, data }),
        1 => Just(Op::Pop),
    ]
}

struct Model {
    events: VecDeque<Event>,
    capacity: usize,
}

impl Model {
    fn push(&mut self, force_new: bool, event: Event) -> OResult<Enqueued> {
        let full = self.events.len() == self.capacity;
        let mut force_new = force_new;
        if !full {
            if self.events.is_empty() {
                force_new = true;
            } else if event.is_timeout() {
                force_new = false;
            }
        }

        if !force_new {
            if let Some(last) = self.events.back_mut() {
                if last.code == event.code {
                    last.data = event.data;
                    return Ok(Enqueued::Coalesced);
                }
            }
        }

        if full {
            return Err(OfsmError::QueueFull);
        }
        self.events.push_back(event);
        Ok(Enqueued::Appended)
    }

    fn pop(&mut self) -> Option<(Event, bool)> {
        let event = self.events.pop_front()?;
        Some((event, !self.events.is_empty()))
    }
}

proptest! {
    #[test]
    fn ring_matches_model(capacity in 1usize..6, ops in prop::collection::vec(op(), 0..64)) {
        let mut queue = EventQueue::new(capacity).unwrap();
        let mut model = Model { events: VecDeque::new(), capacity };

        for op in ops {
            match op {
                Op::Push { force_new, code, data } => {
                    let event = Event::new(EventCode(code), data.into());
                    prop_assert_eq!(queue.push(force_new, event), model.push(force_new, event));
                }
                Op::Pop => prop_assert_eq!(queue.pop(), model.pop()),
            }

            prop_assert_eq!(queue.len(), model.events.len());
            prop_assert_eq!(queue.is_overflowed(), model.events.len() == capacity);
            prop_assert!(queue.iter().copied().eq(model.events.iter().copied()));
        }
    }
}
