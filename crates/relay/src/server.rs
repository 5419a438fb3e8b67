//! TCP listener and the acceptor loop.
//!
//! The acceptor is a single thread sleeping on the listener plus a waker;
//! every accepted connection gets its own named worker thread running a
//! [`Session`](crate::Session). Shutdown sets a flag and fires the waker.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use popol::Sources;
use switchboard_peers::Registry;
use tracing::{error, info, trace};

use crate::session::Session;

/// Default listen address of the relay.
pub const DEFAULT_LISTEN_PORT: u16 = 31227;
/// How long a caller keeps knocking before reporting the number unavailable.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Cadence of dial retries while knocking.
pub const DEFAULT_CALL_RETRY_DELAY: Duration = Duration::from_millis(100);
/// Budget for the partner to clear the link barrier.
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(1);

/// How often parked loops re-check their exit conditions.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Listener backlog.
const BACKLOG: i32 = 128;

/// Tunable knobs of the relay server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on for client connections.
    pub listen: SocketAddr,
    pub call_timeout: Duration,
    pub call_retry_delay: Duration,
    pub accept_timeout: Duration,
    /// How long a waiting session sleeps between liveness checks.
    pub wait_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_LISTEN_PORT)),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            call_retry_delay: DEFAULT_CALL_RETRY_DELAY,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            wait_poll_interval: POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Listener,
    Waker,
}

/// Handle to a running server.
///
/// Dropping the handle leaves the server running detached; call
/// [`ServerHandle::shutdown`] to stop accepting and join the acceptor.
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    waker: Arc<popol::Waker>,
    acceptor: Option<JoinHandle<io::Result<()>>>,
}

impl ServerHandle {
    /// The address the listener actually bound, port resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the acceptor to exit.
    ///
    /// Sessions already in flight keep running on their own threads.
    pub fn shutdown(mut self) -> io::Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        self.waker.wake()?;

        match self.acceptor.take() {
            Some(acceptor) => acceptor
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "acceptor thread panicked"))?,
            None => Ok(()),
        }
    }
}

/// Bind the listener and start the acceptor thread.
pub fn spawn(config: Config, registry: Arc<Registry>) -> io::Result<ServerHandle> {
    let listener = bind(&config.listen)?;
    let local_addr = listener.local_addr()?;

    let mut sources = Sources::new();
    sources.register(Source::Listener, &listener, popol::interest::READ);
    let waker = Arc::new(popol::Waker::new(&mut sources, Source::Waker)?);

    let stop = Arc::new(AtomicBool::new(false));
    let config = Arc::new(config);

    let acceptor = thread::Builder::new().name("acceptor".into()).spawn({
        let stop = Arc::clone(&stop);
        move || accept_loop(listener, sources, registry, config, stop)
    })?;

    Ok(ServerHandle {
        local_addr,
        stop,
        waker,
        acceptor: Some(acceptor),
    })
}

/// `SO_REUSEADDR` so restarts do not trip over lingering sockets.
fn bind(addr: &SocketAddr) -> io::Result<TcpListener> {
    use socket2::{Domain, Socket, Type};

    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, None)?;

    socket.set_reuse_address(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(BACKLOG)?;

    let listener: TcpListener = socket.into();
    listener.set_nonblocking(true)?;

    Ok(listener)
}

fn accept_loop(
    listener: TcpListener,
    mut sources: Sources<Source>,
    registry: Arc<Registry>,
    config: Arc<Config>,
    stop: Arc<AtomicBool>,
) -> io::Result<()> {
    info!("Listening on {}", listener.local_addr()?);

    let mut events = Vec::with_capacity(8);
    loop {
        match sources.wait_timeout(&mut events, POLL_INTERVAL) {
            Ok(_) => {
                for event in events.drain(..) {
                    match event.key {
                        Source::Listener => accept_pending(&listener, &registry, &config),
                        Source::Waker => {
                            popol::Waker::reset(event.source).ok();
                        }
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {}
            Err(err) => return Err(err),
        }

        if stop.load(Ordering::SeqCst) {
            info!("Acceptor shutting down");
            return Ok(());
        }
    }
}

/// Drain the accept queue; the listener is level-triggered and nonblocking.
fn accept_pending(listener: &TcpListener, registry: &Arc<Registry>, config: &Arc<Config>) {
    loop {
        let (stream, addr) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
            Err(err) => {
                error!("Accept error: {err}");
                return;
            }
        };

        // Workers use blocking reads; undo the listener's nonblocking mode.
        if let Err(err) = stream.set_nonblocking(false) {
            error!(client = %addr, "Failed to prepare socket: {err}");
            continue;
        }

        trace!(client = %addr, "Accepted connection");
        let session = Session::new(stream, addr, Arc::clone(registry), Arc::clone(config));
        let spawned = thread::Builder::new()
            .name(format!("session-{addr}"))
            .spawn(move || session.run());
        if let Err(err) = spawned {
            error!(client = %addr, "Failed to spawn session thread: {err}");
        }
    }
}
