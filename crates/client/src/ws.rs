use std::collections::HashMap;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use ottoengine_core::{Error, Result};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::frame::{InboundFrame, OutboundFrame, RequestIds};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A freshly connected remote-assistant link, not yet split into
/// independent read/write halves.
pub struct WsClient {
    stream: WsStream,
}

impl WsClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::ConnectionLost(format!("connect failed: {e}")))?;
        Ok(Self { stream })
    }

    /// Splits the link so the read loop and the outbound sender never
    /// contend for the same lock: the writer is held behind a mutex for
    /// on-demand service calls, the reader is drained by a dedicated loop.
    pub fn split(self) -> (WsWriter, WsReader) {
        let (sink, stream) = self.stream.split();
        (
            WsWriter {
                sink,
                ids: RequestIds::new(),
            },
            WsReader { stream },
        )
    }
}

/// The write half of a connected remote-assistant link. Each `send_*`
/// helper consumes the request-id counter except `send_auth`.
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
    ids: RequestIds,
}

impl WsWriter {
    pub async fn send_auth(&mut self, access_token: String) -> Result<()> {
        self.send(&OutboundFrame::Auth { access_token }).await
    }

    pub async fn send_ping(&mut self) -> Result<u64> {
        let id = self.ids.next();
        self.send(&OutboundFrame::Ping { id }).await?;
        Ok(id)
    }

    pub async fn send_subscribe_events(&mut self, event_type: Option<String>) -> Result<u64> {
        let id = self.ids.next();
        self.send(&OutboundFrame::SubscribeEvents { id, event_type })
            .await?;
        Ok(id)
    }

    pub async fn send_get_states(&mut self) -> Result<u64> {
        let id = self.ids.next();
        self.send(&OutboundFrame::GetStates { id }).await?;
        Ok(id)
    }

    pub async fn send_get_services(&mut self) -> Result<u64> {
        let id = self.ids.next();
        self.send(&OutboundFrame::GetServices { id }).await?;
        Ok(id)
    }

    pub async fn send_call_service(
        &mut self,
        domain: String,
        service: String,
        service_data: HashMap<String, Value>,
    ) -> Result<u64> {
        let id = self.ids.next();
        self.send(&OutboundFrame::CallService {
            id,
            domain,
            service,
            service_data,
        })
        .await?;
        Ok(id)
    }

    async fn send(&mut self, frame: &OutboundFrame) -> Result<()> {
        let text = serde_json::to_string(frame).map_err(|e| Error::ActionFailed(e.to_string()))?;
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::ConnectionLost(e.to_string()))
    }
}

/// The read half of a connected remote-assistant link.
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

impl WsReader {
    /// Reads the next frame, decoding it. Returns `Ok(None)` on an orderly
    /// close. Malformed payloads decode to `InboundFrame::Unknown` rather
    /// than erroring — only a transport-level failure is an `Err`.
    pub async fn next_frame(&mut self) -> Result<Option<InboundFrame>> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(crate::frame::decode_inbound(&text)))
                }
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::ConnectionLost(e.to_string())),
            }
        }
    }
}
