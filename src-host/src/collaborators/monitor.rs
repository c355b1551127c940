use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateState {
    pub available: bool,
    pub version: Option<String>,
}

impl UpdateState {
    pub fn none() -> Self {
        Self {
            available: false,
            version: None,
        }
    }
}

/// Latest value of some host-observed state. Publishing wakes every subscriber.
pub struct StateMonitor<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for StateMonitor<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> StateMonitor<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn current(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_latest_state() {
        let monitor = StateMonitor::new(IdleState::Active);
        let mut rx = monitor.clone().subscribe();

        monitor.publish(IdleState::Idle);
        monitor.publish(IdleState::Locked);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), IdleState::Locked);
        assert_eq!(monitor.current(), IdleState::Locked);
        assert_eq!(monitor.subscriber_count(), 1);
    }
}
