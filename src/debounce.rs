//! Debounced signal for rapidly changing input such as free-text search.
//!
//! Each new raw value cancels the pending timer and starts a new one. When a
//! timer survives the full quiescence window its value becomes the settled
//! value. Like `QueryClient` state, the settled value is picked up by polling
//! from the consumer's tick, or by awaiting `settle()`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default quiescence window for search input.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

pub struct Debounced<T> {
  delay: Duration,
  raw: T,
  settled: T,
  /// Bumped on every restart; emissions from older timers are ignored.
  generation: u64,
  timer: Option<JoinHandle<()>>,
  tx: mpsc::UnboundedSender<(u64, T)>,
  rx: mpsc::UnboundedReceiver<(u64, T)>,
}

impl<T: Clone + PartialEq + Send + 'static> Debounced<T> {
  pub fn new(initial: T, delay: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      delay,
      raw: initial.clone(),
      settled: initial,
      generation: 0,
      timer: None,
      tx,
      rx,
    }
  }

  pub fn delay(&self) -> Duration {
    self.delay
  }

  /// The latest raw value, as typed.
  pub fn raw(&self) -> &T {
    &self.raw
  }

  /// The last value that survived the quiescence window.
  pub fn settled(&self) -> &T {
    &self.settled
  }

  /// Whether a timer is waiting to fire.
  pub fn is_pending(&self) -> bool {
    self.timer.is_some()
  }

  /// Feed a new raw value, restarting the timer.
  pub fn set(&mut self, value: T) {
    if value == self.raw {
      return;
    }
    self.raw = value.clone();
    self.restart(value);
  }

  /// Replace both raw and settled values immediately, dropping any pending
  /// emission.
  pub fn reset(&mut self, value: T) {
    self.cancel();
    self.raw = value.clone();
    self.settled = value;
  }

  /// Cancel the pending timer, if any. The raw value stays unsettled.
  pub fn cancel(&mut self) {
    self.generation += 1;
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
  }

  /// Drain fired timers without blocking.
  ///
  /// Returns the new settled value when it changed.
  pub fn poll(&mut self) -> Option<T> {
    let mut changed = None;
    while let Ok((generation, value)) = self.rx.try_recv() {
      if generation == self.generation {
        self.timer = None;
        if let Some(v) = self.apply(value) {
          changed = Some(v);
        }
      }
    }
    changed
  }

  /// Wait for the pending timer to fire.
  ///
  /// Returns the new settled value when it changed, `None` if nothing was
  /// pending or the value did not change.
  pub async fn settle(&mut self) -> Option<T> {
    if let Some(v) = self.poll() {
      return Some(v);
    }
    while self.timer.is_some() {
      match self.rx.recv().await {
        Some((generation, value)) if generation == self.generation => {
          self.timer = None;
          return self.apply(value);
        }
        Some(_) => continue,
        None => break,
      }
    }
    None
  }

  fn restart(&mut self, value: T) {
    self.cancel();
    let generation = self.generation;
    let delay = self.delay;
    let tx = self.tx.clone();
    self.timer = Some(tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      // Receiver may be gone if the owner was torn down mid-sleep
      let _ = tx.send((generation, value));
    }));
  }

  fn apply(&mut self, value: T) -> Option<T> {
    if value == self.settled {
      return None;
    }
    self.settled = value.clone();
    Some(value)
  }
}

impl<T> Drop for Debounced<T> {
  fn drop(&mut self) {
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Debounced<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Debounced")
      .field("delay", &self.delay)
      .field("raw", &self.raw)
      .field("settled", &self.settled)
      .field("pending", &self.timer.is_some())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_rapid_input_settles_once() {
    let mut search = Debounced::new(String::new(), Duration::from_millis(500));

    search.set("a".to_string());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(search.poll(), None);

    search.set("ac".to_string());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(search.poll(), None);

    search.set("acm".to_string());
    assert_eq!(search.settled(), "");

    assert_eq!(search.settle().await, Some("acm".to_string()));
    assert_eq!(search.settled(), "acm");
    assert!(!search.is_pending());

    // Nothing else fires later
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(search.poll(), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_poll_after_window() {
    let mut search = Debounced::new(String::new(), Duration::from_millis(500));
    search.set("acme".to_string());

    tokio::time::sleep(Duration::from_millis(499)).await;
    assert_eq!(search.poll(), None);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(search.poll(), Some("acme".to_string()));
  }

  #[tokio::test(start_paused = true)]
  async fn test_returning_to_settled_value_is_not_a_change() {
    let mut search = Debounced::new("acme".to_string(), Duration::from_millis(500));
    search.set("acm".to_string());
    search.set("acme".to_string());

    assert_eq!(search.settle().await, None);
    assert_eq!(search.settled(), "acme");
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_drops_pending_emission() {
    let mut search = Debounced::new(String::new(), Duration::from_millis(500));
    search.set("acme".to_string());
    search.cancel();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(search.poll(), None);
    assert_eq!(search.settled(), "");
    assert_eq!(search.settle().await, None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_drop_cancels_pending_timer() {
    let mut search = Debounced::new(String::new(), Duration::from_millis(500));
    search.set("acme".to_string());
    let timer = search.timer.as_ref().unwrap().abort_handle();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!timer.is_finished());

    drop(search);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(timer.is_finished());
  }

  #[tokio::test(start_paused = true)]
  async fn test_reset_settles_immediately() {
    let mut search = Debounced::new(String::new(), Duration::from_millis(500));
    search.set("acme".to_string());
    search.reset(String::new());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(search.poll(), None);
    assert_eq!(search.raw(), "");
  }
}
