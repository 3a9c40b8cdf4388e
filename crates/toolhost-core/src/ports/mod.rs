//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports define the interfaces the supervisor expects from the outside:
//! an event sink, a log sink, and the tool protocol spoken over a process
//! channel. They use only domain types.

pub mod event_emitter;
pub mod log_sink;
pub mod tool_protocol;

pub use event_emitter::{AppEventEmitter, NoopEmitter};
pub use log_sink::{LogStream, ProcessLogSinkPort};
pub use tool_protocol::{
    ChannelReader, ChannelWriter, ProcessChannel, ProcessProbe, ProtocolError, ToolProtocol,
};
