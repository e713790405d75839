//! `AetherionServer` builder and server loop.
//!
//! Ties the layers together: transport → protocol → coordinator, plus the
//! phase driver that fires lobby and countdown deadlines.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aetherion_protocol::{Codec, JsonCodec};
use aetherion_session::{BaselineStats, StatsSource};
use aetherion_tick::TickScheduler;
use aetherion_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::coordinator::Coordinator;
use crate::handler::handle_connection;
use crate::{AetherionError, ServerConfig};

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<S: StatsSource, C: Codec> {
    pub(crate) coordinator: Mutex<Coordinator>,
    pub(crate) stats: S,
    pub(crate) codec: C,
}

/// Builder for configuring and starting a server.
///
/// # Example
///
/// ```rust,no_run
/// use aetherion::{AetherionServer, ServerConfig};
/// use aetherion_session::MemoryStats;
///
/// # async fn run() -> Result<(), aetherion::AetherionError> {
/// let server = AetherionServer::builder()
///     .config(ServerConfig::default())
///     .bind("127.0.0.1:3001")
///     .stats(MemoryStats::new())
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct AetherionServerBuilder<S = BaselineStats> {
    config: ServerConfig,
    stats: S,
}

impl AetherionServerBuilder<BaselineStats> {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            stats: BaselineStats,
        }
    }
}

impl Default for AetherionServerBuilder<BaselineStats> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StatsSource> AetherionServerBuilder<S> {
    /// Replaces the whole configuration, listen address included.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the listen address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.listen_addr = addr.to_string();
        self
    }

    /// Sets where character stats are loaded from.
    pub fn stats<T: StatsSource>(self, stats: T) -> AetherionServerBuilder<T> {
        AetherionServerBuilder {
            config: self.config,
            stats,
        }
    }

    /// Binds the listener. Uses [`JsonCodec`] and [`WebSocketTransport`].
    pub async fn build(self) -> Result<AetherionServer<S, JsonCodec>, AetherionError> {
        let transport = WebSocketTransport::bind(&self.config.listen_addr).await?;
        let phase_tick_hz = self.config.phase_tick_hz;
        let state = Arc::new(ServerState {
            coordinator: Mutex::new(Coordinator::new(self.config)),
            stats: self.stats,
            codec: JsonCodec,
        });
        Ok(AetherionServer {
            transport,
            state,
            phase_tick_hz,
        })
    }
}

/// A bound server. Call [`run()`](Self::run) to start accepting.
pub struct AetherionServer<S: StatsSource, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, C>>,
    phase_tick_hz: u32,
}

impl AetherionServer<BaselineStats, JsonCodec> {
    pub fn builder() -> AetherionServerBuilder<BaselineStats> {
        AetherionServerBuilder::new()
    }
}

impl<S: StatsSource, C: Codec> AetherionServer<S, C> {
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Accepts connections until the process ends. A failed accept is
    /// logged and does not stop the loop.
    pub async fn run(mut self) -> Result<(), AetherionError> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, phase_tick_hz = self.phase_tick_hz, "Aetherion server running");
        let _phase_driver = AbortOnDrop(spawn_phase_driver(Arc::clone(&self.state), self.phase_tick_hz));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(handle_connection(conn, state));
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            }
        }
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Pause before a panicked background task is started again.
const RESTART_DELAY: Duration = Duration::from_millis(100);

/// Runs the future built by `make`, building and running a fresh one each
/// time it panics. A normal return ends supervision. Aborting the
/// returned handle also aborts the attempt in flight.
fn spawn_supervised<F, Fut>(task: &'static str, make: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let mut attempt = AbortOnDrop(tokio::spawn(make()));
            match (&mut attempt.0).await {
                Ok(()) => return,
                Err(e) if e.is_panic() => {
                    tracing::error!(task, error = %e, "background task panicked, restarting");
                    tokio::time::sleep(RESTART_DELAY).await;
                }
                Err(_) => return,
            }
        }
    })
}

/// Polls every room's deadlines at `hz`, restarting the poll loop if it
/// panics. A rate of 0 leaves rooms without timed phases; only
/// `start_game` will start them.
fn spawn_phase_driver<S, C>(state: Arc<ServerState<S, C>>, hz: u32) -> JoinHandle<()>
where
    S: StatsSource,
    C: Codec,
{
    spawn_supervised("phase_driver", move || phase_loop(Arc::clone(&state), hz))
}

async fn phase_loop<S, C>(state: Arc<ServerState<S, C>>, hz: u32)
where
    S: StatsSource,
    C: Codec,
{
    let mut clock = TickScheduler::with_rate(hz);
    if clock.is_disabled() {
        tracing::warn!("phase_tick_hz is 0, lobby timers will never fire");
        return;
    }
    loop {
        clock.wait_for_tick().await;
        state.coordinator.lock().await.advance_rooms(Instant::now());
    }
}
