use std::sync::Arc;
use tokio::sync::watch;

/// One-shot signal released when the pod watch stops.
///
/// Clones share state. Waiters that arrive after release return at once.
#[derive(Debug, Clone)]
pub struct CompletionLatch {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CompletionLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionLatch {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn release(&self) {
        self.sender.send_replace(true);
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        *self.sender.borrow()
    }

    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as self, so this only returns once released.
        let _released = receiver.wait_for(|released| *released).await;
    }
}
