use tokio::sync::oneshot;

/// Held by the broker; fires the matching [`CancelToken`] once
#[derive(Debug)]
pub struct CancelHandle {
    sender: Option<oneshot::Sender<()>>,
}

/// Passed along with a request; observed by the coordinator
#[derive(Debug)]
pub struct CancelToken {
    receiver: Option<oneshot::Receiver<()>>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = oneshot::channel();
    (
        CancelHandle {
            sender: Some(sender),
        },
        CancelToken {
            receiver: Some(receiver),
        },
    )
}

impl CancelHandle {
    /// Request cancellation. Only the first call has an effect; returns
    /// whether this call was the one that fired.
    pub fn cancel(&mut self) -> bool {
        match self.sender.take() {
            Some(sender) => {
                // Receiver may already be gone if the request has completed
                let _ = sender.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.sender.is_none()
    }
}

impl CancelToken {
    /// A token that never fires
    pub fn never() -> Self {
        Self { receiver: None }
    }

    /// Non-blocking check used before a request is enqueued
    pub(crate) fn try_cancelled(&mut self) -> bool {
        match self.receiver.as_mut() {
            Some(receiver) => matches!(receiver.try_recv(), Ok(())),
            None => false,
        }
    }

    /// Resolves `true` once cancellation fires. A handle dropped without
    /// cancelling resolves `false`.
    pub(crate) async fn cancelled(self) -> bool {
        match self.receiver {
            Some(receiver) => receiver.await.is_ok(),
            None => std::future::pending().await,
        }
    }
}
