use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use evhub_core::processors::Registration;
use evhub_sdk::objects::{ControlFrame, WsClientMessage};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::api::extractors::StreamAuth;
use crate::state::AppState;

/// `GET /ws?token=...` — live event stream.
///
/// The credential is checked before the upgrade, so a rejected client never
/// receives a frame. The first frame after the upgrade is always the
/// connection acknowledgement; event frames follow as they are published.
pub(super) async fn event_stream_ws(
    State(state): State<AppState>,
    auth: StreamAuth,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_event_stream(socket, state, auth.principal))
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("websocket write failed: {0}")]
    Socket(#[from] axum::Error),
    #[error("websocket write timed out")]
    Timeout,
    #[error("failed to serialize frame: {0}")]
    Json(#[from] serde_json::Error),
}

type Sink = SplitSink<WebSocket, Message>;

async fn send_message(
    sink: &mut Sink,
    message: Message,
    write_timeout: Duration,
) -> Result<(), SendError> {
    tokio::time::timeout(write_timeout, sink.send(message))
        .await
        .map_err(|_| SendError::Timeout)??;
    Ok(())
}

async fn send_text(sink: &mut Sink, text: &str, write_timeout: Duration) -> Result<(), SendError> {
    send_message(sink, Message::Text(text.into()), write_timeout).await
}

async fn send_json<T: serde::Serialize>(
    sink: &mut Sink,
    value: &T,
    write_timeout: Duration,
) -> Result<(), SendError> {
    let text = serde_json::to_string(value)?;
    send_text(sink, &text, write_timeout).await
}

/// Background task that drives a single event-stream connection.
///
/// 1. Registers with the connection manager.
/// 2. Sends the connection frame.
/// 3. Relays broadcast frames, answers JSON pings and sends a transport Ping
///    every keepalive interval until the client leaves, a write fails or the
///    manager drops the connection.
///
/// Client pings and Pongs both count as liveness for the idle sweep.
async fn handle_event_stream(socket: WebSocket, state: AppState, principal: String) {
    let Some(Registration {
        session_id,
        mut frames,
    }) = state.connections.register(principal.clone()).await
    else {
        tracing::warn!(%principal, "WS: connection manager unavailable");
        return;
    };
    tracing::info!(%session_id, %principal, "WS: event stream connected");

    let write_timeout = state.connections.config().write_timeout;
    let keepalive_period = state.connections.config().keepalive_interval;
    let mut keepalive =
        tokio::time::interval_at(Instant::now() + keepalive_period, keepalive_period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let (mut sink, mut stream) = socket.split();

    if let Err(e) = send_json(&mut sink, &ControlFrame::connected(), write_timeout).await {
        tracing::debug!(%session_id, error = %e, "WS: failed to send connection frame");
        state.connections.unregister(session_id).await;
        return;
    }

    loop {
        tokio::select! {
            frame = frames.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = send_text(&mut sink, &frame, write_timeout).await {
                            tracing::debug!(%session_id, error = %e, "WS: dropping connection");
                            break;
                        }
                    }
                    None => {
                        // Dropped by the manager (idle, too slow, or shutdown).
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            _ = keepalive.tick() => {
                let ping = Message::Ping(Default::default());
                if let Err(e) = send_message(&mut sink, ping, write_timeout).await {
                    tracing::debug!(%session_id, error = %e, "WS: keepalive ping failed");
                    break;
                }
            }

            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let keep_open = handle_client_text(
                            &state,
                            session_id,
                            text.as_str(),
                            &mut sink,
                            write_timeout,
                        )
                        .await;
                        if !keep_open {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        state.connections.touch(session_id).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%session_id, error = %e, "WS: read error");
                        break;
                    }
                }
            }
        }
    }

    state.connections.unregister(session_id).await;
    tracing::info!(%session_id, "WS: event stream disconnected");
}

/// Returns `false` if the connection should be closed.
async fn handle_client_text(
    state: &AppState,
    session_id: Uuid,
    text: &str,
    sink: &mut Sink,
    write_timeout: Duration,
) -> bool {
    match serde_json::from_str::<WsClientMessage>(text) {
        Ok(WsClientMessage::Ping) => {
            state.connections.touch(session_id).await;
            send_json(sink, &ControlFrame::Pong, write_timeout).await.is_ok()
        }
        Err(_) => {
            tracing::trace!(%session_id, "WS: ignoring unrecognised client frame");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TEST_TOKEN, spawn_test_server, spawn_test_server_with};
    use evhub_core::config::ConnectionConfig;
    use evhub_core::events::{Event, EventType};
    use evhub_sdk::client::{ClientError, EventStream};
    use evhub_sdk::objects::{EventFrame, WsServerMessage};
    use serde_json::json;

    #[tokio::test]
    async fn rejects_bad_credentials_before_upgrade() {
        let server = spawn_test_server().await;
        match EventStream::connect(&server.ws_url, "wrong").await {
            Err(ClientError::WebSocket(tokio_tungstenite::tungstenite::Error::Http(response))) => {
                assert_eq!(response.status(), 401);
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("upgrade succeeded with a wrong token"),
        }
    }

    #[tokio::test]
    async fn sends_connection_frame_then_events() {
        let server = spawn_test_server().await;
        let mut quiet = EventStream::connect(&server.ws_url, TEST_TOKEN).await.unwrap();
        let mut pinger = EventStream::connect(&server.ws_url, TEST_TOKEN).await.unwrap();

        for stream in [&mut quiet, &mut pinger] {
            match stream.next_message().await.unwrap().unwrap() {
                WsServerMessage::Control(ControlFrame::Connection { status, .. }) => {
                    assert_eq!(status, "connected");
                }
                other => panic!("expected connection frame, got {other:?}"),
            }
        }

        pinger.ping().await.unwrap();
        assert!(matches!(
            pinger.next_message().await.unwrap().unwrap(),
            WsServerMessage::Control(ControlFrame::Pong)
        ));

        // Sessions register before their connection frame is sent.
        assert_eq!(server.state.connections.sessions().await.len(), 2);

        server
            .state
            .dispatcher
            .publish(Event::new(
                EventType::TicketMessageAdded,
                json!({"ticket_id": 3, "body": "hi"}).as_object().cloned().unwrap(),
            ))
            .await
            .unwrap();

        for stream in [&mut quiet, &mut pinger] {
            match stream.next_message().await.unwrap().unwrap() {
                WsServerMessage::Event(EventFrame { event_type, payload, .. }) => {
                    assert_eq!(event_type, EventType::TicketMessageAdded);
                    assert_eq!(payload["body"], "hi");
                }
                other => panic!("expected event frame, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn quiet_clients_answering_keepalive_pings_outlive_idle_timeout() {
        let server = spawn_test_server_with(ConnectionConfig {
            idle_timeout: Some(Duration::from_secs(1)),
            sweep_interval: Duration::from_millis(200),
            keepalive_interval: Duration::from_millis(300),
            ..ConnectionConfig::default()
        })
        .await;
        let mut stream = EventStream::connect(&server.ws_url, TEST_TOKEN).await.unwrap();
        stream.next_message().await.unwrap().unwrap();

        // The client keeps reading, which answers the server's Pings, but
        // never sends a ping of its own.
        let reader = tokio::spawn(async move { stream.next_message().await });

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert_eq!(server.state.connections.sessions().await.len(), 1);

        server
            .state
            .dispatcher
            .publish(Event::new(
                EventType::TicketCreated,
                json!({"ticket_id": 11}).as_object().cloned().unwrap(),
            ))
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("no frame after the idle timeout")
            .unwrap();
        match frame {
            Some(Ok(WsServerMessage::Event(EventFrame { event_type, payload, .. }))) => {
                assert_eq!(event_type, EventType::TicketCreated);
                assert_eq!(payload["ticket_id"], 11);
            }
            other => panic!("expected event frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_client_frames_are_ignored() {
        let server = spawn_test_server().await;
        let mut stream = EventStream::connect(&server.ws_url, TEST_TOKEN).await.unwrap();
        stream.next_message().await.unwrap().unwrap();

        stream.send_text("not json".to_string()).await.unwrap();
        stream.send_text(r#"{"type":"subscribe"}"#.to_string()).await.unwrap();
        stream.ping().await.unwrap();
        assert!(matches!(
            stream.next_message().await.unwrap().unwrap(),
            WsServerMessage::Control(ControlFrame::Pong)
        ));
    }

    #[tokio::test]
    async fn closing_unregisters_the_session() {
        let server = spawn_test_server().await;
        let mut stream = EventStream::connect(&server.ws_url, TEST_TOKEN).await.unwrap();
        stream.next_message().await.unwrap().unwrap();
        assert_eq!(server.state.connections.sessions().await.len(), 1);

        stream.close().await.unwrap();
        for _ in 0..100 {
            if server.state.connections.sessions().await.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session was not unregistered");
    }
}
