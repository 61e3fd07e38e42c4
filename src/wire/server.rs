use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::WireError;
use crate::wire::{ChannelKind, Connection, ConnectionRegistry, MessageRouter};

const OUTBOUND_QUEUE: usize = 32;

/// Run both listeners until one of them fails to accept.
pub async fn serve(
    control: TcpListener,
    image: TcpListener,
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
) -> Result<(), WireError> {
    tokio::try_join!(
        accept_loop(control, ChannelKind::Control, &registry, &router),
        accept_loop(image, ChannelKind::ImageStream, &registry, &router),
    )?;
    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    kind: ChannelKind,
    registry: &Arc<ConnectionRegistry>,
    router: &Arc<MessageRouter>,
) -> Result<(), WireError> {
    let local = listener.local_addr()?;
    tracing::info!(%kind, address = %local, "Listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let registry = Arc::clone(registry);
        let router = Arc::clone(router);
        tokio::spawn(async move {
            if let Err(e) = handle_socket(stream, peer, kind, registry, router).await {
                tracing::warn!(%kind, %peer, error = %e, "Connection ended with error");
            }
        });
    }
}

async fn handle_socket(
    stream: TcpStream,
    peer: SocketAddr,
    kind: ChannelKind,
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
) -> Result<(), WireError> {
    let ws = accept_async(stream).await.map_err(|e| WireError::Handshake {
        reason: e.to_string(),
    })?;
    tracing::info!(%kind, %peer, "Accepted connection");

    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_QUEUE);
    let conn = Connection::new(kind, tx);
    let id = conn.id();

    registry.register(conn).await;
    router.on_open(kind).await;

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Binary(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = source.next().await {
        match msg {
            Ok(Message::Binary(data)) => router.on_frame(kind, data.to_vec()).await,
            Ok(Message::Text(text)) => {
                router.on_frame(kind, text.as_str().as_bytes().to_vec()).await
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%kind, %peer, error = %e, "Read error, closing socket");
                break;
            }
        }
    }

    writer.abort();
    registry.unregister(kind, id).await;
    router.on_close(kind).await;
    tracing::info!(%kind, %peer, "Connection closed");
    Ok(())
}
