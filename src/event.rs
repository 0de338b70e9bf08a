//! # Capability-verified event
//!
//! Single-fire rendezvous between the asynchronous parameter callback that
//! reports a deck as present and the session waiting before it allows motion.

use std::time::Duration;
use tokio::sync::watch;

/// Single-fire boolean signal with a bounded wait
///
/// The event starts unset. The first call to [CapabilityEvent::set()] sets it,
/// later calls have no effect. Waiters are woken as soon as the event is set.
#[derive(Debug)]
pub struct CapabilityEvent {
    sender: watch::Sender<bool>,
}

impl Default for CapabilityEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityEvent {
    /// Create an unset event
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Set the event
    ///
    /// Returns `true` only for the call that transitioned the event from unset to set.
    pub fn set(&self) -> bool {
        self.sender.send_if_modified(|is_set| {
            if *is_set {
                false
            } else {
                *is_set = true;
                true
            }
        })
    }

    /// Returns `true` if the event has been set
    pub fn is_set(&self) -> bool {
        *self.sender.borrow()
    }

    /// Wait for the event to be set, for at most `timeout`
    ///
    /// Returns immediately with `true` if the event is already set and `false`
    /// if the timeout elapsed before anyone set it.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut receiver = self.sender.subscribe();

        let waited = match tokio::time::timeout(timeout, receiver.wait_for(|is_set| *is_set)).await {
            Ok(Ok(_)) => true,
            // The sender lives as long as self, the receiver cannot observe a closed channel
            Ok(Err(_)) => self.is_set(),
            Err(_) => self.is_set(),
        };
        waited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn only_the_first_set_transitions() {
        let event = CapabilityEvent::new();
        assert!(!event.is_set());
        assert!(event.set());
        assert!(!event.set());
        assert!(event.is_set());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_when_never_set() {
        let event = CapabilityEvent::new();
        let start = tokio::time::Instant::now();

        assert!(!event.wait(Duration::from_secs(5)).await);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_when_set_from_another_task() {
        let event = Arc::new(CapabilityEvent::new());

        let setter = event.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            setter.set();
        });

        let start = tokio::time::Instant::now();
        assert!(event.wait(Duration::from_secs(5)).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn already_set_event_does_not_wait() {
        let event = CapabilityEvent::new();
        event.set();
        assert!(event.wait(Duration::from_millis(1)).await);
    }
}
