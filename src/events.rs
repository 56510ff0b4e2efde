use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;

/// Fan-out of typed events to any number of subscribers.
///
/// Cloning an `Emitter` shares the subscriber list, so a background task can
/// emit while the owner hands out new subscriptions. Subscribers whose
/// receiver has been dropped are pruned on the next emit.
pub struct Emitter<T> {
  subscribers: Arc<StdMutex<Vec<mpsc::UnboundedSender<T>>>>,
}

impl<T> Clone for Emitter<T> {
  fn clone(&self) -> Self {
    Self { subscribers: Arc::clone(&self.subscribers) }
  }
}

impl<T> Default for Emitter<T> {
  fn default() -> Self {
    Self { subscribers: Arc::new(StdMutex::new(Vec::new())) }
  }
}

impl<T: Clone> Emitter<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a new subscription. Events emitted before this call are not replayed.
  pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    if let Ok(mut subs) = self.subscribers.lock() {
      subs.push(tx);
    }
    rx
  }

  pub fn emit(&self, event: T) {
    if let Ok(mut subs) = self.subscribers.lock() {
      subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
  }

  /// Drop every subscription; their receivers will see the channel close.
  pub fn clear(&self) {
    if let Ok(mut subs) = self.subscribers.lock() {
      subs.clear();
    }
  }

  #[cfg(test)]
  pub fn subscriber_count(&self) -> usize {
    self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
  }
}

/// Drain everything currently queued on a receiver without waiting.
pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  events
}
