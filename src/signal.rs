use std::sync::{Condvar, Mutex};

/// Wake event owned by a [`Node`](crate::Node).
///
/// Binary-semaphore semantics: any number of deliveries between two waits
/// collapse into one wakeup, after which the node drains every queue it owns.
/// Termination is sticky and wins over pending wakeups.
pub(crate) struct WakeSignal {
  state: Mutex<SignalState>,
  wakeup: Condvar,
}

#[derive(Default)]
struct SignalState {
  pending: bool,
  terminated: bool,
}

impl WakeSignal {
  pub(crate) fn new() -> Self {
    WakeSignal {
      state: Mutex::new(SignalState::default()),
      wakeup: Condvar::new(),
    }
  }

  pub(crate) fn notify(&self) {
    let mut state = self.state.lock().unwrap();
    state.pending = true;
    self.wakeup.notify_one();
  }

  pub(crate) fn terminate(&self) {
    let mut state = self.state.lock().unwrap();
    state.terminated = true;
    self.wakeup.notify_all();
  }

  /// Blocks until a delivery or termination. Returns false once terminated.
  pub(crate) fn wait(&self) -> bool {
    let mut state = self.state.lock().unwrap();
    while !state.pending && !state.terminated {
      state = self.wakeup.wait(state).unwrap();
    }
    state.pending = false;
    !state.terminated
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread};

  use super::*;

  #[test]
  fn notify_before_wait_is_not_lost() {
    let signal = WakeSignal::new();
    signal.notify();
    assert!(signal.wait());
  }

  #[test]
  fn terminate_unblocks_waiter() {
    let signal = Arc::new(WakeSignal::new());
    let waiter = {
      let signal = Arc::clone(&signal);
      thread::spawn(move || signal.wait())
    };
    signal.terminate();
    assert!(!waiter.join().unwrap());
  }
}
