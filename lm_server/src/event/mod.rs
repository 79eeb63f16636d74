//! The in-process event bus.
//!
//! Everything interesting that happens in the world is an [`Event`].
//! Subsystems register listeners against an [`EventType`] with a priority;
//! enqueued events sit in a FIFO until the simulation thread drains them at a
//! well-defined point (end of each hook, end of each command). Exactly one
//! drain pass runs at a time: if a listener enqueues more events, they are
//! delivered later in the same pass, in enqueue order.

mod types;

use crate::Game;
use parking_lot::{Mutex, RwLock};
use std::{collections::HashMap, panic, panic::AssertUnwindSafe};

pub use types::{ActorRef, CommsKind, Event, EventType, MessageTarget};

/// What a listener tells the bus after seeing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  /// The next listener runs.
  Continue,
  /// The remaining listeners are skipped.
  Cancel,
}

/// Dispatch ordering within one event type. All `First` listeners run before
/// all `Default` listeners, which run before all `Last` listeners;
/// registration order breaks ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
  First,
  Default,
  Last,
}

type Listener = Box<dyn Fn(&Event, &Game) -> Flow + Send + Sync>;

#[derive(Default)]
struct Listeners {
  first:   Vec<(&'static str, Listener)>,
  default: Vec<(&'static str, Listener)>,
  last:    Vec<(&'static str, Listener)>,
}

pub struct EventBus {
  listeners: RwLock<HashMap<EventType, Listeners>>,
  queue:     Mutex<Vec<Event>>,
  /// Held by the active drain pass. `try_lock` failing means someone above
  /// us on the stack is already draining, and will pick up what we enqueued.
  draining: Mutex<()>,
}

impl EventBus {
  pub fn new() -> Self {
    EventBus {
      listeners: RwLock::new(HashMap::new()),
      queue:     Mutex::new(vec![]),
      draining:  Mutex::new(()),
    }
  }

  /// Registers a listener. The name shows up in logs when the listener
  /// panics or cancels.
  ///
  /// Registration happens at startup, before the simulation loop runs; the
  /// bus does not support registering from inside a listener.
  pub fn register<F>(&self, ty: EventType, priority: Priority, name: &'static str, f: F)
  where
    F: Fn(&Event, &Game) -> Flow + Send + Sync + 'static,
  {
    let mut listeners = self.listeners.write();
    let l = listeners.entry(ty).or_default();
    let entry = (name, Box::new(f) as Listener);
    match priority {
      Priority::First => l.first.push(entry),
      Priority::Default => l.default.push(entry),
      Priority::Last => l.last.push(entry),
    }
  }

  /// Appends an event to the queue. It is delivered on the current drain
  /// pass if one is running, otherwise on the next one.
  pub fn enqueue(&self, ev: Event) { self.queue.lock().push(ev); }

  /// The number of queued, undelivered events.
  pub fn queued(&self) -> usize { self.queue.lock().len() }

  /// Delivers queued events until the queue is empty. No-op if a drain pass
  /// is already running higher up the stack.
  pub fn drain(&self, game: &Game) {
    let _guard = match self.draining.try_lock() {
      Some(g) => g,
      None => return,
    };
    loop {
      // Take one event at a time, so re-entrant enqueues keep their order.
      let ev = {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
          break;
        }
        queue.remove(0)
      };
      self.dispatch(&ev, game);
    }
  }

  /// Delivers one event to its listeners, in priority order. A listener
  /// that panics is logged and treated as `Continue`; a `Cancel` skips the
  /// remaining listeners.
  pub fn dispatch(&self, ev: &Event, game: &Game) {
    let listeners = self.listeners.read();
    let l = match listeners.get(&ev.ty()) {
      Some(l) => l,
      None => return,
    };
    for (name, f) in
      l.first.iter().chain(l.default.iter()).chain(l.last.iter())
    {
      match panic::catch_unwind(AssertUnwindSafe(|| f(ev, game))) {
        Ok(Flow::Continue) => {}
        Ok(Flow::Cancel) => {
          trace!("listener `{name}` cancelled {:?}", ev.ty());
          break;
        }
        Err(_) => {
          error!("listener `{name}` panicked on {:?}", ev.ty());
        }
      }
    }
  }
}

impl Default for EventBus {
  fn default() -> Self { EventBus::new() }
}

#[cfg(test)]
mod tests;
