//! WebSocket transport on the tokio runtime
//!
//! Each `open` spawns one connection task. Its events are tagged with a
//! generation number so anything still in flight from a closed connection
//! is discarded by `poll`.

use std::sync::mpsc as std_mpsc;

use futures::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{Transport, TransportEvent};

type TaggedEvent = (u64, TransportEvent);

/// [`Transport`] backed by `tokio-tungstenite`
pub struct WsTransport {
    runtime: Handle,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    events_tx: std_mpsc::Sender<TaggedEvent>,
    events_rx: std_mpsc::Receiver<TaggedEvent>,
}

impl WsTransport {
    /// Create a transport that runs its connections on `runtime`
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        let (events_tx, events_rx) = std_mpsc::channel();
        Self {
            runtime,
            generation: 0,
            outbound: None,
            events_tx,
            events_rx,
        }
    }

    fn queue(&self, message: Message) -> bool {
        self.outbound
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &str) {
        self.close();
        self.generation += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        self.runtime.spawn(run_connection(
            url.to_string(),
            self.generation,
            rx,
            self.events_tx.clone(),
        ));
    }

    fn close(&mut self) {
        // Dropping the sender ends the connection task
        self.outbound = None;
    }

    fn send_text(&mut self, text: &str) -> bool {
        self.queue(Message::Text(text.to_string()))
    }

    fn send_binary(&mut self, data: &[u8]) -> bool {
        self.queue(Message::Binary(data.to_vec()))
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        while let Ok((generation, event)) = self.events_rx.try_recv() {
            if generation != self.generation || self.outbound.is_none() {
                continue;
            }
            if event == TransportEvent::Disconnected {
                self.outbound = None;
            }
            return Some(event);
        }
        None
    }
}

/// Drive one WebSocket connection until either side closes it
async fn run_connection(
    url: String,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: std_mpsc::Sender<TaggedEvent>,
) {
    let emit = |event: TransportEvent| {
        // Receiver gone means the transport was dropped
        let _ = events.send((generation, event));
    };

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "WebSocket connect failed");
            emit(TransportEvent::Disconnected);
            return;
        }
    };
    tracing::debug!(url = %url, generation, "WebSocket handshake complete");
    emit(TransportEvent::Connected);

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            out = outbound.recv() => {
                let Some(message) = out else {
                    let _ = write.close().await;
                    tracing::debug!(generation, "WebSocket closed locally");
                    return;
                };
                if let Err(e) = write.send(message).await {
                    tracing::warn!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => emit(TransportEvent::Text(text)),
                    Some(Ok(Message::Binary(data))) => emit(TransportEvent::Binary(data)),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(frame = ?frame, "WebSocket closed by peer");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket receive failed");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    emit(TransportEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;

    async fn next_event(transport: &mut WsTransport) -> TransportEvent {
        for _ in 0..200 {
            if let Some(event) = transport.poll() {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no transport event within 2s");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_connect_reports_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut transport = WsTransport::new(Handle::current());
        transport.open(&format!("ws://{addr}/ws"));

        assert_eq!(next_event(&mut transport).await, TransportEvent::Disconnected);
        assert!(!transport.send_text("late"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn echoes_through_a_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() && ws.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let mut transport = WsTransport::new(Handle::current());
        transport.open(&format!("ws://{addr}/ws"));
        assert_eq!(next_event(&mut transport).await, TransportEvent::Connected);

        assert!(transport.send_text(r#"{"type":"ping"}"#));
        assert_eq!(
            next_event(&mut transport).await,
            TransportEvent::Text(r#"{"type":"ping"}"#.to_string())
        );

        transport.close();
        assert!(!transport.send_text("after close"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.poll(), None);
    }
}
