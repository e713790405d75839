//! Per-connection tasks.
//!
//! Each accepted connection gets two tasks:
//!   1. a **reader** (this function's own task) that decodes frames and
//!      feeds them to the coordinator, one at a time, in arrival order
//!   2. a **writer** that drains the connection's outbox onto the socket
//!
//! The reader owns a [`DisconnectGuard`]; however it exits, the
//! coordinator hears about the disconnect.

use std::sync::Arc;
use std::time::Instant;

use aetherion_protocol::{Codec, ConnectionId};
use aetherion_session::StatsSource;
use aetherion_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::coordinator::StatsRequest;
use crate::server::ServerState;

/// Tells the coordinator a connection is gone when dropped.
///
/// `Drop` is synchronous, so the locked part runs on a spawned task.
struct DisconnectGuard<S: StatsSource, C: Codec> {
    conn_id: ConnectionId,
    state: Arc<ServerState<S, C>>,
}

impl<S: StatsSource, C: Codec> Drop for DisconnectGuard<S, C> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.coordinator.lock().await.disconnect(conn_id);
        });
    }
}

/// Runs one connection from accept to close.
pub(crate) async fn handle_connection<S, C>(conn: WebSocketConnection, state: Arc<ServerState<S, C>>)
where
    S: StatsSource,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state
        .coordinator
        .lock()
        .await
        .connect(conn_id, conn.identity().clone(), tx);
    let guard = DisconnectGuard {
        conn_id,
        state: Arc::clone(&state),
    };

    let writer = {
        let conn = Arc::clone(&conn);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let text = match state.codec.encode(&envelope) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(%conn_id, error = %e, "failed to encode event");
                        continue;
                    }
                };
                if let Err(e) = conn.send(&text).await {
                    tracing::debug!(%conn_id, error = %e, "send failed");
                    break;
                }
            }
            // Outbox closed: disconnected or evicted by a newer session.
            let _ = conn.close().await;
        })
    };

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "receive failed");
                break;
            }
        };

        let event = match state.codec.decode(&data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "dropping undecodable frame");
                continue;
            }
        };

        let request = state
            .coordinator
            .lock()
            .await
            .handle(conn_id, event, Instant::now());
        if let Some(request) = request {
            spawn_stats_fetch(&state, request);
        }
    }

    drop(guard);
    // The writer drains whatever is queued, then exits once the
    // coordinator drops the outbox.
    if let Err(e) = writer.await {
        tracing::debug!(%conn_id, error = %e, "writer task ended abnormally");
    }
}

/// Loads a joiner's stats without holding the coordinator lock.
fn spawn_stats_fetch<S, C>(state: &Arc<ServerState<S, C>>, request: StatsRequest)
where
    S: StatsSource,
    C: Codec,
{
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let StatsRequest {
            conn_id,
            join_seq,
            user_id,
            character_class,
        } = request;
        match state.stats.load(&user_id, &character_class).await {
            Ok(Some(stats)) => {
                state
                    .coordinator
                    .lock()
                    .await
                    .apply_stats(conn_id, join_seq, stats);
            }
            Ok(None) => {
                tracing::debug!(%conn_id, %user_id, %character_class, "no stored character, keeping baseline")
            }
            Err(e) => {
                tracing::warn!(%conn_id, %user_id, error = %e, "stat load failed, keeping baseline")
            }
        }
    });
}
