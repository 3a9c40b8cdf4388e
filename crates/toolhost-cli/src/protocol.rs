//! Protocol used when the CLI supervises servers it does not talk to.

use async_trait::async_trait;
use serde_json::Value;
use toolhost_core::{ProcessChannel, ProtocolError, Tool, ToolProtocol, ToolResult};

/// Treats every server as offering no tools.
///
/// Connecting still spawns and supervises the process, which is all the
/// `supervise` and `status` commands need.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProtocol;

#[async_trait]
impl ToolProtocol for NoopProtocol {
    async fn discover_tools(
        &self,
        _server_id: &str,
        _channel: &ProcessChannel,
    ) -> Result<Vec<Tool>, ProtocolError> {
        Ok(Vec::new())
    }

    async fn call_tool(
        &self,
        server_id: &str,
        _channel: &ProcessChannel,
        tool_name: &str,
        _arguments: Value,
    ) -> Result<ToolResult, ProtocolError> {
        Err(ProtocolError::Unsupported(format!(
            "'{tool_name}' on '{server_id}': the CLI does not call tools"
        )))
    }
}
