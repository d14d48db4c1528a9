//! Wire client for the remote-assistant WebSocket protocol: outbound frame
//! builders, inbound frame decoding, and the connected socket wrapper.

pub mod frame;
pub mod ws;

pub use frame::{InboundFrame, OutboundFrame, RequestIds};
pub use ws::{WsClient, WsReader, WsWriter};
