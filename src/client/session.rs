//! Session lifecycle: lazy pool creation, idle recycling, safe close.
//!
//! # State Machine
//! ```text
//!            ensure_open (first caller)          pool built + watchdog spawned
//!   Closed ─────────────────────────────▶ Opening ─────────────────────────────▶ Open
//!     ▲                                     │                                     │
//!     │        connect failed / dropped     │                                     │
//!     ├─────────────────────────────────────┘                                     │
//!     │                     close() or idle watchdog                              │
//!     └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - The state mutex is never held across an `.await`; every transition is
//!   atomic with respect to other tasks
//! - Callers arriving while another caller is `Opening` wait on a `watch`
//!   channel instead of building a second pool
//! - Close moves the session out of shared state before any teardown await,
//!   so concurrent callers see `Closed` and open a fresh pool
//! - Each pool carries a generation number; the watchdog uses it to tell
//!   its own self-close apart from an external one
//! - Handing out the pool and stamping activity happen under the state lock,
//!   and the watchdog re-checks the idle deadline under that same lock, so a
//!   request never receives a pool the watchdog is about to close

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::client::error::{ClientError, ClientResult};
use crate::client::transport::{Connector, Pool};
use crate::config::validation::validate_client;
use crate::config::ClientConfig;

/// Observable session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Closed,
    Opening,
    Open,
}

/// Far-future stand-in for deadlines that overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Who asked for a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseOrigin {
    External,
    /// The idle watchdog of `generation`; closes only once idle for `idle`.
    Watchdog { generation: u64, idle: Duration },
}

struct Session<P> {
    pool: Arc<P>,
    watchdog: JoinHandle<()>,
    generation: u64,
}

enum State<P> {
    Closed,
    Opening,
    Open(Session<P>),
}

enum Claim<P> {
    Ready(Arc<P>),
    Opener,
    Wait,
}

struct Inner<C: Connector> {
    connector: C,
    config: ClientConfig,
    state: Mutex<State<C::Pool>>,
    phase: watch::Sender<SessionPhase>,
    /// Number of pools currently being torn down.
    teardowns: watch::Sender<usize>,
    epoch: Instant,
    /// Microseconds since `epoch` of the most recent request start.
    last_request_us: AtomicU64,
    generation: AtomicU64,
}

/// Owns at most one connection pool and recycles it when idle.
pub struct SessionManager<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> SessionManager<C> {
    pub fn new(connector: C, config: ClientConfig) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Closed);
        let (teardowns, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                state: Mutex::new(State::Closed),
                phase,
                teardowns,
                epoch: Instant::now(),
                last_request_us: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.borrow()
    }

    /// Return true while a live pool is held.
    pub fn is_open(&self) -> bool {
        matches!(&*self.inner.lock_state(), State::Open(_))
    }

    /// Return the live pool, creating it if needed, and record the call as
    /// activity.
    ///
    /// Concurrent callers that find a creation already in flight wait for it
    /// rather than starting their own.
    pub async fn ensure_open(&self) -> ClientResult<Arc<C::Pool>> {
        let mut phase = self.inner.phase.subscribe();

        match self.inner.claim() {
            Claim::Ready(pool) => return Ok(pool),
            Claim::Opener => return self.open().await,
            Claim::Wait => {}
        }

        tracing::debug!("Waiting for session opened by a concurrent request");
        let _ = phase.wait_for(|p| *p != SessionPhase::Opening).await;

        let pool = match &*self.inner.lock_state() {
            State::Open(session) => {
                self.inner.touch();
                Some(session.pool.clone())
            }
            _ => None,
        };
        pool.ok_or_else(|| {
            tracing::error!("Client session is not available after concurrent open");
            ClientError::SessionUnavailable
        })
    }

    /// Close the pool and stop the idle watchdog.
    ///
    /// The watchdog is cancelled unless `wait` is true, in which case this
    /// waits for it to notice the close and finish on its own. When another
    /// close is still tearing a pool down, `wait` also waits for that.
    /// Closing a closed session is otherwise a no-op.
    pub async fn close(&self, wait: bool) {
        self.inner.close(CloseOrigin::External, wait).await;
    }

    async fn open(&self) -> ClientResult<Arc<C::Pool>> {
        let mut guard = OpeningGuard {
            inner: &self.inner,
            armed: true,
        };
        let config = &self.inner.config;

        let errors = validate_client(config);
        if !errors.is_empty() {
            let reason = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            tracing::error!(reason = %reason, "Refusing to open client session");
            return Err(ClientError::PoolConstruction(reason));
        }

        tracing::debug!(
            request_timeout = ?config.request_timeout(),
            connection_limit = config.connection_limit,
            force_close = config.force_close,
            "Opening client session"
        );

        let pool = match self.inner.connector.connect(config).await {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                tracing::error!(error = %e, "Failed to open client session");
                return Err(e);
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.touch();
        let watchdog = tokio::spawn(watch_idle(
            Arc::downgrade(&self.inner),
            self.inner.phase.subscribe(),
            generation,
            config.idle_session_timeout(),
        ));

        {
            let mut state = self.inner.lock_state();
            *state = State::Open(Session {
                pool: pool.clone(),
                watchdog,
                generation,
            });
            self.inner.phase.send_replace(SessionPhase::Open);
        }
        guard.armed = false;

        Ok(pool)
    }
}

impl<C: Connector> Inner<C> {
    fn lock_state(&self) -> MutexGuard<'_, State<C::Pool>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_micros() as u64;
        self.last_request_us.fetch_max(elapsed, Ordering::Relaxed);
    }

    fn last_request(&self) -> Instant {
        self.epoch + Duration::from_micros(self.last_request_us.load(Ordering::Relaxed))
    }

    fn idle_deadline(&self, idle: Duration) -> Instant {
        idle_deadline(self.last_request(), idle)
    }

    fn claim(&self) -> Claim<C::Pool> {
        let mut state = self.lock_state();
        if let State::Open(session) = &*state {
            self.touch();
            return Claim::Ready(session.pool.clone());
        }
        if matches!(&*state, State::Opening) {
            return Claim::Wait;
        }
        *state = State::Opening;
        self.phase.send_replace(SessionPhase::Opening);
        Claim::Opener
    }

    fn is_current(&self, generation: u64) -> bool {
        matches!(&*self.lock_state(), State::Open(s) if s.generation == generation)
    }

    /// Tear down the open session. Returns true if this call closed a pool.
    async fn close(&self, origin: CloseOrigin, wait: bool) -> bool {
        let session = {
            let mut state = self.lock_state();
            if let CloseOrigin::Watchdog { generation, idle } = origin {
                let current = matches!(&*state, State::Open(s) if s.generation == generation);
                if !current || Instant::now() < self.idle_deadline(idle) {
                    return false;
                }
                tracing::warn!(generation, idle = ?idle, "Closing client session by idle timeout");
            }
            match std::mem::replace(&mut *state, State::Closed) {
                State::Open(session) => {
                    self.phase.send_replace(SessionPhase::Closed);
                    self.teardowns.send_modify(|n| *n += 1);
                    Some(session)
                }
                other => {
                    *state = other;
                    None
                }
            }
        };

        let Some(session) = session else {
            // Another close may still be tearing a pool down
            if wait {
                let mut teardowns = self.teardowns.subscribe();
                let _ = teardowns.wait_for(|n| *n == 0).await;
            }
            return false;
        };
        let _teardown = TeardownGuard(&self.teardowns);

        if !session.pool.is_closed() {
            session.pool.close().await;
        }

        match origin {
            // Dropping our own handle detaches; never abort ourselves
            CloseOrigin::Watchdog { generation, .. } if generation == session.generation => {}
            _ if wait => {
                if let Err(e) = session.watchdog.await {
                    if !e.is_cancelled() {
                        tracing::warn!(error = %e, "Session watchdog ended abnormally");
                    }
                }
            }
            _ => session.watchdog.abort(),
        }

        tracing::debug!(generation = session.generation, ?origin, "Client session closed");
        true
    }
}

impl<C: Connector> Drop for Inner<C> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let State::Open(session) = state {
            session.watchdog.abort();
        }
    }
}

/// Idle watchdog for one pool generation.
///
/// Sleeps until the idle deadline, re-checks it against the latest request,
/// and closes the session once it has really been idle that long. Ends on
/// its own as soon as the session is closed elsewhere. Holds only a weak
/// reference so a dropped client ends the loop.
async fn watch_idle<C: Connector>(
    inner: Weak<Inner<C>>,
    mut phase: watch::Receiver<SessionPhase>,
    generation: u64,
    idle: Duration,
) {
    loop {
        let deadline = match inner.upgrade() {
            Some(inner) => inner.idle_deadline(idle),
            None => return,
        };
        tracing::debug!(generation, sleep = ?deadline.saturating_duration_since(Instant::now()), "Session watchdog sleeping");
        tokio::select! {
            _ = time::sleep_until(deadline) => {}
            _ = phase.wait_for(|p| *p == SessionPhase::Closed) => {
                tracing::debug!(generation, "Session closed elsewhere, watchdog exiting");
                return;
            }
        }

        let Some(inner) = inner.upgrade() else { return };
        if !inner.is_current(generation) {
            return;
        }
        if inner.close(CloseOrigin::Watchdog { generation, idle }, true).await {
            return;
        }
        tracing::debug!(generation, "Request seen during idle window, resetting timeout");
    }
}

/// `last_request + idle`, or a far-future instant when that overflows.
fn idle_deadline(last_request: Instant, idle: Duration) -> Instant {
    last_request
        .checked_add(idle)
        .unwrap_or_else(|| last_request + FAR_FUTURE)
}

/// Rolls `Opening` back to `Closed` unless disarmed.
struct OpeningGuard<'a, C: Connector> {
    inner: &'a Inner<C>,
    armed: bool,
}

impl<C: Connector> Drop for OpeningGuard<'_, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.lock_state();
        if matches!(&*state, State::Opening) {
            *state = State::Closed;
            self.inner.phase.send_replace(SessionPhase::Closed);
        }
    }
}

struct TeardownGuard<'a>(&'a watch::Sender<usize>);

impl Drop for TeardownGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}
