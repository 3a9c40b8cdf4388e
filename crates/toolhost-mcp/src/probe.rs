//! Protocol-level reuse check for the process pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use toolhost_core::{ProcessChannel, ProcessProbe, ToolProtocol};
use tracing::debug;

/// Probe that pings the server through its `ToolProtocol`.
///
/// Installed on the pool when the reuse policy is `ProtocolPing`, so a
/// process that is alive but no longer answering gets replaced.
pub struct ProtocolProbe {
    protocol: Arc<dyn ToolProtocol>,
    timeout: Duration,
}

impl ProtocolProbe {
    pub fn new(protocol: Arc<dyn ToolProtocol>, timeout: Duration) -> Self {
        Self { protocol, timeout }
    }
}

#[async_trait]
impl ProcessProbe for ProtocolProbe {
    async fn probe(&self, process_id: &str, channel: &ProcessChannel) -> bool {
        match timeout(self.timeout, self.protocol.ping(process_id, channel)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(process_id = %process_id, error = %e, "Ping failed");
                false
            }
            Err(_) => {
                debug!(process_id = %process_id, "Ping timed out");
                false
            }
        }
    }
}
