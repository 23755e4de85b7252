//! Server implementation.
//!
//! Task layout:
//! - **Coordinator** (one task): owns the `Relay` and processes
//!   `RelayRequest`s strictly one at a time, in arrival order.
//! - **Accept loop** (one task): accepts TCP connections and spawns a
//!   connection task for each.
//! - **Connection tasks** (one per client): run the `hello` handshake,
//!   register with the coordinator, then run a reader and a writer side by
//!   side. The writer drains the session's bounded outbox; the reader decodes
//!   frames and forwards them to the coordinator.
//!
//! Only the coordinator touches the registry. Connection tasks only ever see
//! their own outbox receiver and the request channel.

use std::{future::Future, net::SocketAddr, time::Duration};

use anyhow::Context;
use arena_shared::{
    config::ArenaConfig,
    net::{
        decode_client_event, ClientEvent, FrameReader, FramedConn, FramedListener, Hello,
        PlayerId, PlayerSnapshot, Rejected, ServerEvent, PROTOCOL_VERSION,
    },
};
use tokio::{
    io::AsyncRead,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    console::ConsoleCommand,
    relay::Relay,
};

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Accepted, waiting for `hello`.
    Connecting,
    /// Registered with the relay.
    Active,
    /// Gone; terminal.
    Disconnected,
}

/// Requests sent from connection tasks (and the handle) to the coordinator.
#[derive(Debug)]
pub enum RelayRequest {
    /// Opens a session whose outbox holds at least `capacity` events.
    Register {
        capacity: usize,
        reply: oneshot::Sender<(PlayerId, mpsc::Receiver<ServerEvent>)>,
    },
    Event {
        player_id: PlayerId,
        event: ClientEvent,
    },
    Disconnected {
        player_id: PlayerId,
    },
    Console {
        line: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    Players {
        reply: oneshot::Sender<Vec<PlayerSnapshot>>,
    },
}

/// A bound but not yet running relay server.
pub struct RelayServer {
    cfg: ArenaConfig,
    listener: FramedListener,
}

impl RelayServer {
    /// Binds the listener described by `cfg.server_addr`.
    pub async fn bind(cfg: ArenaConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = FramedListener::bind(addr, cfg.max_frame_len).await?;
        Ok(Self { cfg, listener })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves in the foreground until `shutdown` resolves, then closes every
    /// session.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let (requests, requests_rx) = self.request_channel();
        let (stop, stop_rx) = watch::channel(false);
        let serve = self.serve(requests, requests_rx, stop_rx);
        tokio::pin!(serve);

        tokio::select! {
            res = &mut serve => return res,
            _ = shutdown => {}
        }
        let _ = stop.send(true);
        serve.await
    }

    /// Starts the relay in the background.
    pub fn spawn(self) -> anyhow::Result<RelayHandle> {
        let local_addr = self.local_addr()?;
        let (requests, requests_rx) = self.request_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(self.serve(requests.clone(), requests_rx, shutdown_rx));
        Ok(RelayHandle {
            local_addr,
            requests,
            shutdown,
            task,
        })
    }

    fn request_channel(&self) -> (mpsc::Sender<RelayRequest>, mpsc::Receiver<RelayRequest>) {
        mpsc::channel(self.cfg.inbound_queue_capacity.max(1))
    }

    /// Runs the coordinator and the accept loop until `shutdown` flips.
    async fn serve(
        self,
        requests: mpsc::Sender<RelayRequest>,
        requests_rx: mpsc::Receiver<RelayRequest>,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let local_addr = self.local_addr()?;
        info!(%local_addr, "Relay listening");
        tokio::join!(
            coordinate(requests_rx, shutdown.clone()),
            accept_loop(self.listener, self.cfg, requests, shutdown),
        );
        Ok(())
    }
}

/// Handle to a running relay.
pub struct RelayHandle {
    local_addr: SocketAddr,
    requests: mpsc::Sender<RelayRequest>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl RelayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Executes a console line on the coordinator.
    pub async fn console(&self, line: &str) -> anyhow::Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(RelayRequest::Console {
                line: line.to_string(),
                reply,
            })
            .await
            .context("relay stopped")?;
        rx.await.context("relay stopped")
    }

    /// Current registry contents in ascending id order.
    pub async fn players(&self) -> anyhow::Result<Vec<PlayerSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(RelayRequest::Players { reply })
            .await
            .context("relay stopped")?;
        rx.await.context("relay stopped")
    }

    /// Signals shutdown and waits for the coordinator and accept loop.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.context("join relay task")??;
        info!("Relay stopped");
        Ok(())
    }
}

async fn coordinate(mut rx: mpsc::Receiver<RelayRequest>, mut shutdown: watch::Receiver<bool>) {
    let mut relay = Relay::new();
    loop {
        tokio::select! {
            req = rx.recv() => match req {
                Some(req) => handle_request(&mut relay, req),
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    // Dropping the relay closes every outbox, which ends every writer.
    info!(sessions = relay.len(), "Coordinator stopped");
}

fn handle_request(relay: &mut Relay, req: RelayRequest) {
    match req {
        RelayRequest::Register { capacity, reply } => {
            let (id, outbox_rx) = relay.open_session(capacity);
            if reply.send((id, outbox_rx)).is_err() {
                // The connection task went away before it learned its id.
                relay.disconnect(id);
            }
        }
        RelayRequest::Event { player_id, event } => {
            relay.handle_event(player_id, event);
        }
        RelayRequest::Disconnected { player_id } => {
            relay.disconnect(player_id);
        }
        RelayRequest::Console { line, reply } => {
            let out = ConsoleCommand::parse(&line).execute(relay);
            let _ = reply.send(out);
        }
        RelayRequest::Players { reply } => {
            let _ = reply.send(relay.players());
        }
    }
}

async fn accept_loop(
    listener: FramedListener,
    cfg: ArenaConfig,
    requests: mpsc::Sender<RelayRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => {
                    tokio::spawn(serve_connection(
                        conn,
                        cfg.clone(),
                        requests.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("Accept loop stopped");
}

/// Reads the first frame and checks it is a compatible `hello`.
async fn read_hello<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    timeout: Duration,
) -> anyhow::Result<Hello> {
    let frame = tokio::time::timeout(timeout, reader.read_frame())
        .await
        .context("handshake timed out")??
        .context("connection closed before hello")?;
    match decode_client_event(&frame)? {
        ClientEvent::Hello(hello) if hello.protocol == PROTOCOL_VERSION => Ok(hello),
        ClientEvent::Hello(hello) => anyhow::bail!(
            "protocol mismatch: server speaks {PROTOCOL_VERSION}, client sent {}",
            hello.protocol
        ),
        other => anyhow::bail!("expected hello, got {}", other.name()),
    }
}

async fn serve_connection(
    conn: FramedConn,
    cfg: ArenaConfig,
    requests: mpsc::Sender<RelayRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    let peer = conn.peer_addr();
    let mut phase = SessionPhase::Connecting;
    debug!(%peer, ?phase, "Connection accepted");

    let (mut reader, mut writer) = conn.into_split();

    if let Err(e) = read_hello(&mut reader, cfg.handshake_timeout()).await {
        warn!(%peer, error = %e, "Handshake failed");
        let rejected = ServerEvent::Rejected(Rejected {
            reason: e.to_string(),
        });
        let _ = writer.send(&rejected).await;
        let _ = writer.shutdown().await;
        return;
    }

    let (reply, reply_rx) = oneshot::channel();
    let register = RelayRequest::Register {
        capacity: cfg.outbound_queue_capacity.max(1),
        reply,
    };
    if requests.send(register).await.is_err() {
        return;
    }
    let Ok((player_id, mut outbox_rx)) = reply_rx.await else {
        return;
    };
    phase = SessionPhase::Active;
    info!(player_id = %player_id, %peer, ?phase, "Player connected");

    let write_side = async {
        while let Some(event) = outbox_rx.recv().await {
            writer.send(&event).await?;
        }
        // Outbox closed: the relay dropped this session.
        writer.shutdown().await
    };

    let read_side = async {
        while let Some(frame) = reader.read_frame().await? {
            match decode_client_event(&frame) {
                Ok(ClientEvent::Hello(_)) => {
                    debug!(player_id = %player_id, "Duplicate hello ignored");
                }
                Ok(event) => {
                    let req = RelayRequest::Event { player_id, event };
                    if requests.send(req).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(player_id = %player_id, error = %e, "Dropping malformed frame");
                }
            }
        }
        Ok::<_, anyhow::Error>(())
    };

    let result = tokio::select! {
        r = write_side => r.context("writer"),
        r = read_side => r.context("reader"),
        _ = shutdown.changed() => Ok(()),
    };

    phase = SessionPhase::Disconnected;
    if let Err(e) = result {
        debug!(player_id = %player_id, error = %e, "Connection ended with error");
    }
    let _ = requests
        .send(RelayRequest::Disconnected { player_id })
        .await;
    info!(player_id = %player_id, %peer, ?phase, "Player disconnected");
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral() -> anyhow::Result<(RelayServer, ArenaConfig)> {
    bind_ephemeral_with(ArenaConfig::default()).await
}

/// Like `bind_ephemeral`, keeping the other fields of `cfg`.
pub async fn bind_ephemeral_with(cfg: ArenaConfig) -> anyhow::Result<(RelayServer, ArenaConfig)> {
    let mut cfg = ArenaConfig {
        server_addr: "127.0.0.1:0".to_string(),
        ..cfg
    };
    let server = RelayServer::bind(cfg.clone()).await?;
    cfg.server_addr = server.local_addr()?.to_string();
    Ok((server, cfg))
}
