//! Delivery of the deep-phase verdict to whoever started the assessment.
//!
//! At most once, best effort: if the subscriber has gone away the verdict is
//! dropped without error and the orchestrator never waits for it.

use crate::verdict::UnifiedVerdict;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Dropped,
}

#[derive(Debug)]
pub struct VerdictNotifier {
    sender: oneshot::Sender<UnifiedVerdict>,
}

#[derive(Debug)]
pub struct VerdictSubscription {
    receiver: oneshot::Receiver<UnifiedVerdict>,
}

pub fn notification_channel() -> (VerdictNotifier, VerdictSubscription) {
    let (sender, receiver) = oneshot::channel();
    (VerdictNotifier { sender }, VerdictSubscription { receiver })
}

impl VerdictNotifier {
    pub fn deliver(self, verdict: UnifiedVerdict) -> Delivery {
        match self.sender.send(verdict) {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Dropped,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}

impl VerdictSubscription {
    /// Wait for the final verdict. `None` if the producer went away without
    /// delivering one.
    pub async fn recv(self) -> Option<UnifiedVerdict> {
        self.receiver.await.ok()
    }
}
