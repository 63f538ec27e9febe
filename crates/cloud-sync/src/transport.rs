use crate::CloudError;
use std::time::Duration;

/// Two-step broker contract: queue a publish, then block until it is out.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Queue a payload for `topic`
    async fn enqueue(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), CloudError>;

    /// Drive the connection until everything queued has been taken by the broker
    async fn send_pending(&mut self) -> Result<(), CloudError>;

    /// Wait out `wait`, servicing the connection meanwhile
    async fn idle(&mut self, wait: Duration) {
        tokio::time::sleep(wait).await;
    }

    async fn close(&mut self);
}
