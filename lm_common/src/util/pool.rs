use crossbeam_channel::{Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use std::{sync::Arc, thread};

type BoxFn<S> = Box<dyn FnOnce(&S) + Send>;

/// A pool of threads. Each thread will be created with some state. The
/// `new_state` function passed to the constructor will be called once for
/// every thread that is created. This state will then be passed to each thread
/// whenever they execute. This can be used for things such as cloning an arc
/// on initialization, instead of cloning it every time you call `execute`.
pub struct ThreadPool<S> {
  tx:       Sender<BoxFn<S>>,
  in_flight: Arc<(Mutex<usize>, Condvar)>,
}

impl<S: Send + 'static> ThreadPool<S> {
  /// Creates a thread pool with the same number of workers as cores on the
  /// system. These are logical cores, so features like hyper threading will be
  /// accounted for.
  pub fn auto<F: Fn() -> S>(name: &str, new_state: F) -> Self {
    ThreadPool::new(name, num_cpus::get() as u32, new_state)
  }
  /// Creates a thread pool with the given number of worker threads. A
  /// reasonable number should be chosen here. Anything too large will crash
  /// the program and/or host system.
  ///
  /// # Panics
  ///
  /// Panics if the number of workers is 0.
  pub fn new<F: Fn() -> S>(name: &str, workers: u32, new_state: F) -> Self {
    if workers == 0 {
      panic!("cannot create a thread pool with no workers");
    }
    let (tx, rx): (Sender<BoxFn<S>>, _) = crossbeam_channel::bounded(256);
    let in_flight = Arc::new((Mutex::new(0_usize), Condvar::new()));
    for i in 0..workers {
      let s = new_state();
      let rx = rx.clone();
      let counter = in_flight.clone();
      thread::Builder::new()
        .name(format!("{name}-{i}"))
        .spawn(move || {
          while let Ok(f) = rx.recv() {
            f(&s);
            let mut n = counter.0.lock();
            *n -= 1;
            if *n == 0 {
              counter.1.notify_all();
            }
          }
        })
        .expect("could not spawn worker thread");
    }
    ThreadPool { tx, in_flight }
  }

  /// Executes the given task on the next worker thread. Blocks if the queue
  /// is full.
  pub fn execute<F: FnOnce(&S) + Send + 'static>(&self, f: F) {
    *self.in_flight.0.lock() += 1;
    self.tx.send(Box::new(f)).expect("thread pool unexpectedly closed");
  }

  /// Executes the given task, unless the queue is full.
  pub fn try_execute<F: FnOnce(&S) + Send + 'static>(&self, f: F) -> Result<(), ()> {
    *self.in_flight.0.lock() += 1;
    match self.tx.try_send(Box::new(f)) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(_)) => {
        *self.in_flight.0.lock() -= 1;
        Err(())
      }
      Err(TrySendError::Disconnected(_)) => panic!("thread pool unexpectedly closed"),
    }
  }

  /// Waits for every queued task to complete.
  pub fn wait(&self) {
    let mut n = self.in_flight.0.lock();
    while *n > 0 {
      self.in_flight.1.wait(&mut n);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[test]
  fn runs_all_tasks() {
    let pool = ThreadPool::new("test", 4, || ());
    let count = Arc::new(AtomicUsize::new(0));
    for _ in 0..64 {
      let count = count.clone();
      pool.execute(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
      });
    }
    pool.wait();
    assert_eq!(count.load(Ordering::SeqCst), 64);
  }
}
