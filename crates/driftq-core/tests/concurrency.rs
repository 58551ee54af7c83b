//! Many producers and many drainers sharing one queue.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use driftq_core::queue::EventQueue;
use driftq_core::{EventId, Payload, Priority};

const PRODUCERS: usize = 4;
const DRAINERS: usize = 4;
const PER_PRODUCER: usize = 500;
const TOTAL: usize = PRODUCERS * PER_PRODUCER;

#[test]
fn concurrent_enqueue_and_drain_hand_out_each_event_once() {
    let queue = Arc::new(EventQueue::new(TOTAL));
    let enqueued = Mutex::new(Vec::with_capacity(TOTAL));
    let taken = AtomicUsize::new(0);

    let drained: Vec<Vec<EventId>> = std::thread::scope(|s| {
        for p in 0..PRODUCERS {
            let queue = &queue;
            let enqueued = &enqueued;
            s.spawn(move || {
                let mut ids = Vec::with_capacity(PER_PRODUCER);
                for i in 0..PER_PRODUCER {
                    let priority = Priority::DRAIN_ORDER[(p + i) % 4];
                    ids.push(queue.enqueue("work", Payload::new(), priority).unwrap());
                }
                enqueued.lock().unwrap().extend(ids);
            });
        }

        let drainers: Vec<_> = (0..DRAINERS)
            .map(|_| {
                let queue = &queue;
                let taken = &taken;
                s.spawn(move || {
                    let mut seen = Vec::new();
                    while taken.load(Ordering::SeqCst) < TOTAL {
                        match queue.next_eligible() {
                            Some(event) => {
                                seen.push(event.id());
                                taken.fetch_add(1, Ordering::SeqCst);
                            }
                            None => std::thread::yield_now(),
                        }
                    }
                    seen
                })
            })
            .collect();

        drainers.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let enqueued: HashSet<EventId> = enqueued.into_inner().unwrap().into_iter().collect();
    assert_eq!(enqueued.len(), TOTAL);

    let mut seen = HashSet::new();
    for id in drained.into_iter().flatten() {
        assert!(seen.insert(id), "{id} handed out twice");
    }
    assert_eq!(seen, enqueued);
    assert!(queue.is_empty());
    assert_eq!(queue.stats(true, vec![]).events_evicted_total, 0);
}
