use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, StreamExt};
use tracing::{debug, info, warn};

use pokie_types::events::SessionEvent;

use crate::hub::NotificationHub;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Longest a single frame may wait on a peer that stopped reading.
const SEND_TIMEOUT: Duration = HEARTBEAT_INTERVAL;

/// Serve one session WebSocket.
///
/// The caller has already resolved the token and checked membership at the
/// HTTP upgrade, so this goes straight to Ready and the event loop. The
/// connection is unregistered from the hub as soon as either direction ends.
pub async fn handle_connection(
    socket: WebSocket,
    hub: NotificationHub,
    session_id: String,
    user_id: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let ready = SessionEvent::Ready {
        session_id: session_id.clone(),
        user_id: user_id.clone(),
    };
    let ready = match serde_json::to_string(&ready) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize ready event: {}", e);
            return;
        }
    };
    if !send_within(&mut sender, Message::Text(ready.into()), SEND_TIMEOUT).await {
        return;
    }

    let (conn_id, mut events_rx) = hub.register(&session_id).await;
    info!("{} connected to session {} ({})", user_id, session_id, conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward hub events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = events_rx.recv() => {
                    // None: the hub dropped us
                    let Some(frame) = frame else { break };
                    let msg = Message::Text(frame.to_string().into());
                    if !send_within(&mut sender, msg, SEND_TIMEOUT).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if !send_within(&mut sender, Message::Ping(vec![].into()), SEND_TIMEOUT).await {
                        break;
                    }
                }
            }
        }
    });

    // Clients push nothing but control frames; state changes go through REST
    let recv_user = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Text(text) => {
                    debug!(
                        "{} sent unsolicited text ({} bytes), ignoring",
                        recv_user,
                        text.len()
                    );
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(&session_id, conn_id).await;
    info!("{} disconnected from session {} ({})", user_id, session_id, conn_id);
}

/// Send one frame, giving up after `limit`. False means the connection
/// should be dropped.
async fn send_within<S>(sender: &mut S, msg: Message, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    match tokio::time::timeout(limit, sender.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("WebSocket send failed: {}", e);
            false
        }
        Err(_) => {
            warn!("WebSocket send stalled for {:?}, dropping connection", limit);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::pin::pin;

    use super::*;

    #[tokio::test]
    async fn send_reaches_a_reading_peer() {
        let mut sink: Vec<Message> = Vec::new();
        assert!(send_within(&mut sink, Message::Text("hi".into()), Duration::from_millis(50)).await);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn send_gives_up_on_a_stalled_peer() {
        // Never accepts a frame, like a socket whose buffer is full
        let mut stalled = pin!(futures_util::sink::unfold((), |(), _msg: Message| async {
            std::future::pending::<Result<(), Infallible>>().await
        }));

        let started = tokio::time::Instant::now();
        let sent = send_within(&mut stalled, Message::Ping(vec![].into()), Duration::from_millis(50)).await;

        assert!(!sent);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
