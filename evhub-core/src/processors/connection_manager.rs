//! ConnectionManager processor.
//!
//! Owns the set of live event-stream sessions. All mutations and broadcasts
//! go through one actor task, so a broadcast always sees a consistent set of
//! connections and a slow client can never stall delivery to the others:
//!
//! - `register` hands back a session id and a bounded frame queue
//! - `broadcast` serializes an event once and `try_send`s it to every queue;
//!   a full or closed queue drops that connection
//! - a periodic sweep drops sessions that have not been touched within the
//!   idle timeout; socket tasks touch on every client ping and on every Pong
//!   answering their keepalive Ping
//!
//! Dropping a connection drops its queue sender. The socket task sees its
//! frame stream end and closes the socket.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::events::Event;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mailbox size of the actor.
const COMMAND_BUFFER: usize = 1024;

/// One pre-serialized text frame. Shared by all recipients of a broadcast.
pub type Frame = Arc<str>;

/// Returned by [`ConnectionManager::register`].
#[derive(Debug)]
pub struct Registration {
    pub session_id: Uuid,
    /// Frames to write to the socket. `None` means the connection was dropped.
    pub frames: mpsc::Receiver<Frame>,
}

/// Snapshot of one live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub principal: String,
    pub connected_at: OffsetDateTime,
}

enum Command {
    Register {
        principal: String,
        reply: oneshot::Sender<Registration>,
    },
    Unregister {
        session_id: Uuid,
    },
    Touch {
        session_id: Uuid,
    },
    Broadcast {
        frame: Frame,
    },
    Sessions {
        reply: oneshot::Sender<Vec<SessionInfo>>,
    },
}

struct Connection {
    principal: String,
    connected_at: OffsetDateTime,
    /// Last client ping or keepalive Pong.
    last_pong_at: Instant,
    outbound: mpsc::Sender<Frame>,
}

/// Cloneable handle to the connection actor.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::Sender<Command>,
    config: Arc<ConnectionConfig>,
}

/// The actor half. Run it with [`ConnectionActor::run`].
pub struct ConnectionActor {
    commands: mpsc::Receiver<Command>,
    config: Arc<ConnectionConfig>,
    connections: HashMap<Uuid, Connection>,
}

impl ConnectionManager {
    /// Create the handle and the actor that backs it.
    pub fn new(config: Arc<ConnectionConfig>) -> (Self, ConnectionActor) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = Self {
            commands: commands_tx,
            config: config.clone(),
        };
        let actor = ConnectionActor {
            commands: commands_rx,
            config,
            connections: HashMap::new(),
        };
        (handle, actor)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Add a connection for an authenticated principal.
    ///
    /// Returns `None` once the actor has stopped.
    pub async fn register(&self, principal: impl Into<String>) -> Option<Registration> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Register {
            principal: principal.into(),
            reply,
        })
        .await;
        rx.await.ok()
    }

    /// Remove a connection. Unknown ids are ignored.
    pub async fn unregister(&self, session_id: Uuid) {
        self.send(Command::Unregister { session_id }).await;
    }

    /// Record liveness for a session.
    pub async fn touch(&self, session_id: Uuid) {
        self.send(Command::Touch { session_id }).await;
    }

    /// Push an event to every live connection.
    ///
    /// The event is serialized into a single frame before it reaches the
    /// actor. Never fails from the caller's point of view.
    pub async fn broadcast(&self, event: &Event) {
        let frame: Frame = match serde_json::to_string(&event.to_frame()) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(
                    event_type = %event.event_type(),
                    error = %e,
                    "Failed to serialize event frame"
                );
                return;
            }
        };
        self.send(Command::Broadcast { frame }).await;
    }

    /// Currently registered sessions.
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Sessions { reply }).await;
        rx.await.unwrap_or_default()
    }

    async fn send(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            debug!("ConnectionManager stopped, command dropped");
        }
    }
}

impl ConnectionActor {
    /// Run the actor until shutdown is signalled or every handle is dropped.
    ///
    /// On exit all connections are dropped, which ends every frame stream.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("ConnectionManager started");

        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("ConnectionManager received shutdown signal");
                        break;
                    }
                }

                Some(command) = self.commands.recv() => {
                    self.handle(command);
                }

                _ = sweep.tick() => {
                    self.sweep_idle(Instant::now());
                }

                else => break,
            }
        }

        let remaining = self.connections.len();
        self.connections.clear();
        info!(closed = remaining, "ConnectionManager shutdown complete");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { principal, reply } => {
                let session_id = Uuid::now_v7();
                let (outbound, frames) = mpsc::channel(self.config.outbound_buffer.max(1));
                debug!(%session_id, %principal, "Connection registered");
                self.connections.insert(
                    session_id,
                    Connection {
                        principal,
                        connected_at: OffsetDateTime::now_utc(),
                        last_pong_at: Instant::now(),
                        outbound,
                    },
                );
                if reply.send(Registration { session_id, frames }).is_err() {
                    self.connections.remove(&session_id);
                }
            }
            Command::Unregister { session_id } => {
                if self.connections.remove(&session_id).is_some() {
                    debug!(%session_id, "Connection unregistered");
                }
            }
            Command::Touch { session_id } => {
                if let Some(conn) = self.connections.get_mut(&session_id) {
                    conn.last_pong_at = Instant::now();
                }
            }
            Command::Broadcast { frame } => self.broadcast(frame),
            Command::Sessions { reply } => {
                let sessions = self
                    .connections
                    .iter()
                    .map(|(id, conn)| SessionInfo {
                        session_id: *id,
                        principal: conn.principal.clone(),
                        connected_at: conn.connected_at,
                    })
                    .collect();
                let _ = reply.send(sessions);
            }
        }
    }

    fn broadcast(&mut self, frame: Frame) {
        self.connections.retain(|session_id, conn| {
            match conn.outbound.try_send(frame.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        %session_id,
                        principal = %conn.principal,
                        "Connection too slow, dropping"
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(%session_id, "Connection already closed, dropping");
                    false
                }
            }
        });
    }

    fn sweep_idle(&mut self, now: Instant) {
        let Some(idle_timeout) = self.config.idle_timeout else {
            return;
        };
        self.connections.retain(|session_id, conn| {
            let alive = now.duration_since(conn.last_pong_at) <= idle_timeout;
            if !alive {
                info!(
                    %session_id,
                    principal = %conn.principal,
                    "Dropping idle connection"
                );
            }
            alive
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use serde_json::{Map, json};
    use std::time::Duration;

    fn spawn_manager(config: ConnectionConfig) -> (ConnectionManager, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (manager, actor) = ConnectionManager::new(Arc::new(config));
        tokio::spawn(actor.run(shutdown_rx));
        (manager, shutdown_tx)
    }

    fn event() -> Event {
        let payload: Map<_, _> = json!({"ticket_id": 7}).as_object().cloned().unwrap();
        Event::new(EventType::TicketCreated, payload)
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let (manager, _shutdown) = spawn_manager(ConnectionConfig::default());
        let mut a = manager.register("a").await.unwrap();
        let mut b = manager.register("b").await.unwrap();
        assert_ne!(a.session_id, b.session_id);

        manager.broadcast(&event()).await;

        let fa = a.frames.recv().await.unwrap();
        let fb = b.frames.recv().await.unwrap();
        assert_eq!(fa, fb);
        let json: serde_json::Value = serde_json::from_str(&fa).unwrap();
        assert_eq!(json["type"], "ticket.created");
        assert_eq!(json["payload"]["ticket_id"], 7);
    }

    #[tokio::test]
    async fn full_or_closed_queues_are_dropped_without_affecting_others() {
        let (manager, _shutdown) = spawn_manager(ConnectionConfig {
            outbound_buffer: 1,
            ..ConnectionConfig::default()
        });
        let mut healthy = manager.register("healthy").await.unwrap();
        let _slow = manager.register("slow").await.unwrap();
        let closed = manager.register("closed").await.unwrap();
        drop(closed.frames);

        manager.broadcast(&event()).await;
        healthy.frames.recv().await.unwrap();
        assert_eq!(manager.sessions().await.len(), 2);

        // `slow` never reads, so its single slot is still occupied.
        manager.broadcast(&event()).await;
        healthy.frames.recv().await.unwrap();

        let sessions = manager.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, healthy.session_id);
        assert_eq!(sessions[0].principal, "healthy");
    }

    #[tokio::test]
    async fn unregister_and_shutdown_end_frame_streams() {
        let (manager, shutdown) = spawn_manager(ConnectionConfig::default());
        let mut a = manager.register("a").await.unwrap();
        let mut b = manager.register("b").await.unwrap();

        manager.unregister(a.session_id).await;
        assert!(a.frames.recv().await.is_none());
        assert_eq!(manager.sessions().await.len(), 1);

        shutdown.send(true).unwrap();
        assert!(b.frames.recv().await.is_none());
        assert!(manager.register("late").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_swept() {
        let (manager, _shutdown) = spawn_manager(ConnectionConfig {
            idle_timeout: Some(Duration::from_secs(45)),
            sweep_interval: Duration::from_secs(10),
            ..ConnectionConfig::default()
        });
        let mut quiet = manager.register("quiet").await.unwrap();
        let pinging = manager.register("pinging").await.unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(20)).await;
            manager.touch(pinging.session_id).await;
        }

        assert!(quiet.frames.recv().await.is_none());
        let sessions = manager.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, pinging.session_id);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_disabled_without_idle_timeout() {
        let (manager, _shutdown) = spawn_manager(ConnectionConfig {
            idle_timeout: None,
            sweep_interval: Duration::from_secs(1),
            ..ConnectionConfig::default()
        });
        let _quiet = manager.register("quiet").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(manager.sessions().await.len(), 1);
    }
}
