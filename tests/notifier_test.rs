//! Integration tests for asynchronous listener notification.
//!
//! These tests validate:
//! 1. A notification fans out to every registered listener
//! 2. One failing listener never blocks the others
//! 3. Listeners are read from the source at delivery time, not captured
//!    when the notifier is built

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use workforce::config::PoolSpec;
use workforce::core::ManagedExecutor;
use workforce::notify::{AsyncNotifier, ListenerSource};

struct Subscriber {
    id: usize,
    explode: bool,
}

#[derive(Default)]
struct SubscriberBoard {
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
}

impl ListenerSource<String, Subscriber> for SubscriberBoard {
    fn listeners(&self, _key: &String) -> Vec<Arc<Subscriber>> {
        self.subscribers.lock().clone()
    }
}

fn executor(name: &str) -> Arc<ManagedExecutor> {
    let executor = Arc::new(ManagedExecutor::new(
        PoolSpec::named(name).with_min_pool_size(2),
    ));
    executor.initialize().unwrap();
    executor
}

#[test]
fn test_notification_reaches_every_listener() {
    let board = Arc::new(SubscriberBoard::default());
    *board.subscribers.lock() = (0..5)
        .map(|id| Arc::new(Subscriber { id, explode: false }))
        .collect();
    let executor = executor("fan-out");
    let notifier = AsyncNotifier::new(Arc::clone(&board), Arc::clone(&executor));

    let (tx, rx) = crossbeam_channel::unbounded();
    notifier
        .notify_async("order.created".to_owned(), move |listener: &Subscriber| {
            tx.send(listener.id).unwrap();
        })
        .unwrap();

    let mut seen: Vec<usize> = (0..5)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    executor.dispose();
}

#[test]
fn test_failing_listener_does_not_block_the_rest() {
    let board = Arc::new(SubscriberBoard::default());
    *board.subscribers.lock() = vec![
        Arc::new(Subscriber { id: 0, explode: false }),
        Arc::new(Subscriber { id: 1, explode: true }),
        Arc::new(Subscriber { id: 2, explode: false }),
    ];
    let executor = executor("blast-shield");
    let notifier = AsyncNotifier::new(Arc::clone(&board), Arc::clone(&executor));

    let (tx, rx) = crossbeam_channel::unbounded();
    notifier
        .notify_async("order.failed".to_owned(), move |listener: &Subscriber| {
            assert!(!listener.explode, "subscriber {} exploded", listener.id);
            tx.send(listener.id).unwrap();
        })
        .unwrap();

    let mut seen: Vec<usize> = (0..2)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 2]);
    executor.dispose();
}

#[test]
fn test_listeners_are_read_at_delivery_time() {
    let board = Arc::new(SubscriberBoard::default());
    let executor = executor("late-binding");
    let notifier = AsyncNotifier::new(Arc::clone(&board), Arc::clone(&executor));

    // registered before dispatch; the fetch job reads the board on a worker
    *board.subscribers.lock() = vec![Arc::new(Subscriber { id: 7, explode: false })];

    let (tx, rx) = crossbeam_channel::unbounded();
    notifier
        .notify_async("audit".to_owned(), move |listener: &Subscriber| {
            tx.send(listener.id).unwrap();
        })
        .unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    executor.dispose();
}
