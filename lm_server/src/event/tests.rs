use super::{Event, EventBus, EventType, Flow, Priority};
use crate::test_util;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn priority_ordering() {
  let dir = test_util::temp_dir("bus-priority");
  let game = test_util::game(&dir);
  let bus = EventBus::new();
  let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(vec![]));

  for (name, prio) in [
    ("default-a", Priority::Default),
    ("last", Priority::Last),
    ("first", Priority::First),
    ("default-b", Priority::Default),
  ] {
    let log = log.clone();
    bus.register(EventType::NewTurn, prio, name, move |_, _| {
      log.lock().push(name);
      Flow::Continue
    });
  }
  bus.enqueue(Event::NewTurn { turn: 1 });
  bus.drain(&game);
  assert_eq!(*log.lock(), vec!["first", "default-a", "default-b", "last"]);
}

#[test]
fn cancel_skips_the_rest() {
  let dir = test_util::temp_dir("bus-cancel");
  let game = test_util::game(&dir);
  let bus = EventBus::new();
  let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(vec![]));

  {
    let log = log.clone();
    bus.register(EventType::NewTurn, Priority::First, "canceller", move |_, _| {
      log.lock().push("canceller");
      Flow::Cancel
    });
  }
  {
    let log = log.clone();
    bus.register(EventType::NewTurn, Priority::Default, "never", move |_, _| {
      log.lock().push("never");
      Flow::Continue
    });
  }
  bus.enqueue(Event::NewTurn { turn: 1 });
  bus.drain(&game);
  assert_eq!(*log.lock(), vec!["canceller"]);
}

#[test]
fn panicking_listener_does_not_poison_the_bus() {
  let dir = test_util::temp_dir("bus-panic");
  let game = test_util::game(&dir);
  let bus = EventBus::new();
  let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(vec![]));

  bus.register(EventType::NewTurn, Priority::First, "bad", |_, _| panic!("oh no"));
  {
    let log = log.clone();
    bus.register(EventType::NewTurn, Priority::Default, "good", move |_, _| {
      log.lock().push("good");
      Flow::Continue
    });
  }
  bus.enqueue(Event::NewTurn { turn: 1 });
  bus.drain(&game);
  // The panic is treated as Continue, and the next event still delivers.
  assert_eq!(*log.lock(), vec!["good"]);
  bus.enqueue(Event::NewTurn { turn: 2 });
  bus.drain(&game);
  assert_eq!(*log.lock(), vec!["good", "good"]);
}

#[test]
fn reentrant_enqueues_deliver_in_the_same_pass() {
  let dir = test_util::temp_dir("bus-reentrant");
  let game = test_util::game(&dir);
  let bus = Arc::new(EventBus::new());
  let log: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(vec![]));

  {
    let log = log.clone();
    let inner = bus.clone();
    bus.register(EventType::NewTurn, Priority::Default, "chain", move |ev, _| {
      if let Event::NewTurn { turn } = ev {
        log.lock().push(*turn);
        if *turn < 3 {
          inner.enqueue(Event::NewTurn { turn: turn + 1 });
        }
      }
      Flow::Continue
    });
  }
  bus.enqueue(Event::NewTurn { turn: 1 });
  bus.drain(&game);
  assert_eq!(*log.lock(), vec![1, 2, 3]);
  assert_eq!(bus.queued(), 0);
}

#[test]
fn fifo_across_event_types() {
  let dir = test_util::temp_dir("bus-fifo");
  let game = test_util::game(&dir);
  let bus = EventBus::new();
  let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));

  {
    let log = log.clone();
    bus.register(EventType::NewTurn, Priority::Default, "t", move |ev, _| {
      if let Event::NewTurn { turn } = ev {
        log.lock().push(format!("turn-{turn}"));
      }
      Flow::Continue
    });
  }
  {
    let log = log.clone();
    bus.register(EventType::NewRound, Priority::Default, "r", move |ev, _| {
      if let Event::NewRound { round } = ev {
        log.lock().push(format!("round-{round}"));
      }
      Flow::Continue
    });
  }
  bus.enqueue(Event::NewRound { round: 9 });
  bus.enqueue(Event::NewTurn { turn: 1 });
  bus.enqueue(Event::NewTurn { turn: 2 });
  bus.drain(&game);
  assert_eq!(*log.lock(), vec!["round-9", "turn-1", "turn-2"]);
}
