use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ottoengine_client::{InboundFrame, WsClient, WsWriter};
use ottoengine_core::{Error, InboundEvent, Result, ServiceCall};
use ottoengine_executor::ServiceSender;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::engine::Engine;

/// Connection parameters for the remote link.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub token: String,
    pub tls: bool,
    pub aux_event_type: Option<String>,
}

impl RemoteConfig {
    fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{scheme}://{}:{}/api/websocket", self.host, self.port)
    }
}

/// Sends outbound service calls over the supervised connection. Sharable
/// across rule invocation tasks; internally serializes writes onto the one
/// connection. Holds only the write half, so it never contends with the
/// read loop for a lock.
pub struct ConnectionSender {
    writer: Arc<Mutex<Option<WsWriter>>>,
}

#[async_trait]
impl ServiceSender for ConnectionSender {
    async fn call_service(&self, call: ServiceCall) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(Error::ConnectionLost("no active connection".to_string()));
        };
        writer
            .send_call_service(call.domain, call.service, call.service_data)
            .await?;
        Ok(())
    }
}

/// Drives the connect → authenticate → subscribe → read loop and restarts
/// it from scratch on any read error or orderly close.
pub async fn run_supervisor(
    config: RemoteConfig,
    engine: Arc<Mutex<Engine>>,
    writer_slot: Arc<Mutex<Option<WsWriter>>>,
) {
    loop {
        if let Err(e) = connect_and_serve(&config, &engine, &writer_slot).await {
            error!(error = %e, "connection supervisor restarting");
        }
        *writer_slot.lock().await = None;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Connects, performs the handshake on a local writer, then hands the
/// writer off to the shared slot and drains the reader directly — the read
/// loop never goes through the mutex the sender uses, so an outbound
/// `call_service` is never blocked behind an idle `next_frame` await.
async fn connect_and_serve(
    config: &RemoteConfig,
    engine: &Arc<Mutex<Engine>>,
    writer_slot: &Arc<Mutex<Option<WsWriter>>>,
) -> Result<()> {
    let client = WsClient::connect(&config.url()).await?;
    let (mut writer, mut reader) = client.split();

    if !config.token.is_empty() {
        writer.send_auth(config.token.clone()).await?;
    }
    writer
        .send_subscribe_events(Some("state_changed".to_string()))
        .await?;
    if let Some(aux) = &config.aux_event_type {
        writer.send_subscribe_events(Some(aux.clone())).await?;
    }
    writer.send_get_states().await?;
    writer.send_get_services().await?;

    *writer_slot.lock().await = Some(writer);

    {
        let mut engine = engine.lock().await;
        if let Err(e) = engine.reload().await {
            warn!(error = %e, "rule reload after (re)connect failed");
        }
    }

    loop {
        match reader.next_frame().await? {
            None => return Err(Error::ConnectionLost("remote closed the connection".to_string())),
            Some(frame) => handle_frame(frame, engine).await,
        }
    }
}

async fn handle_frame(frame: InboundFrame, engine: &Arc<Mutex<Engine>>) {
    match frame {
        InboundFrame::AuthOk => info!("authenticated with remote"),
        InboundFrame::Pong => {}
        InboundFrame::ResultFailure { message } => {
            warn!(message = ?message, "remote returned a failure result");
        }
        InboundFrame::ResultSnapshot(entities) => {
            let engine = engine.lock().await;
            for entity in entities {
                if let Err(e) = engine.store.upsert_state(entity).await {
                    warn!(error = %e, "failed to apply initial entity snapshot");
                }
            }
        }
        InboundFrame::ResultServices(services) => {
            engine.lock().await.set_services(services);
        }
        InboundFrame::StateChanged(sc) => {
            let engine = engine.lock().await;
            if let Err(e) = engine.route_event(InboundEvent::StateChanged(sc)).await {
                warn!(error = %e, "failed to route state_changed event");
            }
        }
        InboundFrame::Event(e) => {
            let engine = engine.lock().await;
            if let Err(err) = engine.route_event(InboundEvent::Generic(e)).await {
                warn!(error = %err, "failed to route event");
            }
        }
        InboundFrame::Unknown => {}
    }
}

pub fn new_connection_sender() -> (ConnectionSender, Arc<Mutex<Option<WsWriter>>>) {
    let slot = Arc::new(Mutex::new(None));
    (
        ConnectionSender {
            writer: Arc::clone(&slot),
        },
        slot,
    )
}
