use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

type ClientTx = mpsc::UnboundedSender<Message>;

/// Runs an in-process loopback WebSocket server for offline testing: every
/// frame received from one connected client is rebroadcast to every other
/// currently connected client, standing in for a real remote-assistant link.
pub async fn run_test_server(port: u16) {
    let listener = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(port, error = %e, "test websocket server failed to bind");
            return;
        }
    };
    info!(port, "test websocket server listening");

    let clients: Arc<Mutex<Vec<ClientTx>>> = Arc::new(Mutex::new(Vec::new()));
    loop {
        let (stream, _addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "test websocket server accept failed");
                continue;
            }
        };
        tokio::spawn(serve_connection(stream, Arc::clone(&clients)));
    }
}

async fn serve_connection(stream: TcpStream, clients: Arc<Mutex<Vec<ClientTx>>>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "test websocket handshake failed");
            return;
        }
    };
    info!("test websocket client connected");

    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    clients.lock().await.push(tx.clone());

    let forward = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        if msg.is_close() {
            break;
        }
        let peers = clients.lock().await;
        for peer in peers.iter() {
            if !peer.same_channel(&tx) {
                let _ = peer.send(msg.clone());
            }
        }
    }

    clients.lock().await.retain(|peer| !peer.same_channel(&tx));
    forward.abort();
    info!("test websocket client disconnected");
}
