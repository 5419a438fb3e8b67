use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Instant;

use popol::Sources;
use switchboard_peers::{AcceptStatus, CallStatus, Peer, Registry, WaitStatus};
use switchboard_storage::{Token, TOKEN_LEN};
use tracing::{info, trace};

use crate::error::SessionError;
use crate::server::Config;
use crate::wire::{self, CallResult, Command, WaitResult, MAGIC, PROTOCOL_VERSION};
use crate::{poll, poll::RelayReadiness};

/// Relay copies at most this many bytes per forwarding step.
const RELAY_CHUNK: usize = 1024;

/// What a session thread sleeps on during negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// The client's own socket.
    Client,
    /// The peer's wakeup pipe.
    Signal,
}

/// One worker per accepted connection.
///
/// Drives the handshake, the command loop and, after a successful
/// negotiation, the relay, then deregisters its peer no matter how the
/// session ended.
pub struct Session {
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<Registry>,
    config: Arc<Config>,
    peer: Option<Arc<Peer>>,
    fresh_login: bool,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<Registry>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            stream,
            addr,
            registry,
            config,
            peer: None,
            fresh_login: false,
        }
    }

    /// Run the session to completion and log how it went.
    pub fn run(mut self) {
        info!(client = %self.addr, "Connected");

        let outcome = self.serve();

        if let Some(peer) = self.peer.take() {
            self.registry.disconnect(&peer);
        }

        match outcome {
            Ok(()) => info!(client = %self.addr, "QUIT: Disconnect"),
            Err(err) => info!(client = %self.addr, "QUIT: {err}"),
        }
    }

    fn serve(&mut self) -> Result<(), SessionError> {
        let peer = self.handshake()?;
        info!(
            client = %self.addr,
            new = self.fresh_login,
            "Logged in as {}", peer.number(),
        );

        loop {
            let mut frame = [0u8; 2];
            if let Err(err) = self.stream.read_exact(&mut frame) {
                // A clean close between commands is the normal way out.
                return match err.kind() {
                    io::ErrorKind::UnexpectedEof => Ok(()),
                    _ => Err(err.into()),
                };
            }

            let [version, command] = frame;
            if version != PROTOCOL_VERSION {
                return Err(SessionError::Protocol("Invalid command"));
            }
            match Command::try_from(command) {
                Ok(Command::Call) => {
                    if self.handle_call(&peer)? {
                        return self.relay(&peer);
                    }
                }
                Ok(Command::Wait) => {
                    if self.handle_wait(&peer)? {
                        return self.relay(&peer);
                    }
                }
                Ok(Command::GetNumber) => self.handle_get_number(&peer)?,
                Err(_) => return Err(SessionError::Protocol("Invalid command")),
            }
        }
    }

    /// Handshake: magic, token flag, optional token; registers the peer and
    /// installs this connection's socket into it.
    fn handshake(&mut self) -> Result<Arc<Peer>, SessionError> {
        let mut magic = [0u8; MAGIC.len()];
        self.stream.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(SessionError::Protocol("Login failed: bad magic"));
        }

        let mut flag = [0u8; 1];
        self.stream.read_exact(&mut flag)?;
        let token = match flag[0] {
            0 => None,
            1 => {
                let mut token = [0u8; TOKEN_LEN];
                self.stream.read_exact(&mut token)?;
                Some(Token::from(token))
            }
            _ => return Err(SessionError::Protocol("Login failed: bad token flag")),
        };
        self.fresh_login = token.is_none();

        let peer = self
            .registry
            .connect(token.as_ref())
            .map_err(SessionError::Login)?;

        let issued = self.fresh_login.then(|| peer.token());
        self.stream.write_all(&wire::handshake_reply(issued))?;

        peer.install_socket(self.stream.try_clone()?);
        self.peer = Some(Arc::clone(&peer));

        Ok(peer)
    }

    /// CALL: dial a number and keep knocking until the callee admits us,
    /// the client backs out, or the attempt times out.
    ///
    /// Returns `true` once the pair is latched and the session must switch
    /// to relaying.
    fn handle_call(&mut self, peer: &Arc<Peer>) -> Result<bool, SessionError> {
        let number = self.read_call_number()?;
        info!(client = %self.addr, "Command: CALL {number}");

        let mut sources = Sources::new();
        sources.register(Source::Client, &self.stream, popol::interest::READ);
        let mut events = Vec::with_capacity(4);

        let started = Instant::now();
        let mut target: Option<Arc<Peer>> = None;
        loop {
            if target.is_none() {
                target = self.registry.dial(&number);
            }
            if let Some(target) = &target {
                match peer.call(target)? {
                    CallStatus::Latched => break,
                    // Not waiting yet; keep knocking until the deadline.
                    CallStatus::Unavailable => {}
                    CallStatus::Busy => {
                        self.stream.write_all(&wire::call_reply(CallResult::Busy))?;
                        return Ok(false);
                    }
                    CallStatus::Internal => {
                        self.stream
                            .write_all(&wire::call_reply(CallResult::Internal))?;
                        return Err(SessionError::Negotiation("caller state is inconsistent"));
                    }
                }
            }

            if started.elapsed() >= self.config.call_timeout {
                // The callee never admitted us; whether the number is offline
                // or just not waiting, to the caller it is unavailable.
                self.stream
                    .write_all(&wire::call_reply(CallResult::Unavailable))?;
                return Ok(false);
            }

            match sources.wait_timeout(&mut events, self.config.call_retry_delay) {
                Ok(_) => {
                    // The client spoke while we were dialing: silently back
                    // out and let the command loop parse what it sent.
                    if events.drain(..).next().is_some() {
                        trace!(client = %self.addr, "call abandoned by client");
                        return Ok(false);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::TimedOut => {}
                Err(err) => return Err(err.into()),
            }
        }

        self.stream
            .write_all(&wire::call_reply(CallResult::Accepted))?;
        peer.call_ready()?;
        Ok(true)
    }

    fn read_call_number(&mut self) -> Result<String, SessionError> {
        let mut len = [0u8; 1];
        self.stream.read_exact(&mut len)?;
        if len[0] == 0 {
            return Err(SessionError::Protocol("empty number in CALL"));
        }

        let mut number = vec![0u8; len[0] as usize];
        self.stream.read_exact(&mut number)?;
        String::from_utf8(number)
            .map_err(|_| SessionError::Protocol("number is not valid UTF-8"))
    }

    /// WAIT: park until a caller latches us or the client bails out.
    fn handle_wait(&mut self, peer: &Arc<Peer>) -> Result<bool, SessionError> {
        info!(client = %self.addr, "Command: WAIT");

        let mut sources = Sources::new();
        sources.register(Source::Client, &self.stream, popol::interest::READ);
        sources.register(Source::Signal, peer.signal(), popol::interest::READ);
        let mut events = Vec::with_capacity(4);

        loop {
            match peer.wait()? {
                WaitStatus::Ready => break,
                WaitStatus::Internal => {
                    self.stream
                        .write_all(&wire::wait_reply(WaitResult::Internal, ""))?;
                    return Err(SessionError::Negotiation("wait state is inconsistent"));
                }
                WaitStatus::Pending => {}
            }

            match sources.wait_timeout(&mut events, self.config.wait_poll_interval) {
                Ok(_) => {
                    let client_woke = events.drain(..).any(|event| event.key == Source::Client);
                    if client_woke {
                        if !peer.wait_stop() {
                            // Too late: a caller already latched us, and it
                            // expects this socket to go live. Tear down.
                            return Err(SessionError::Negotiation(
                                "wait abandoned after being called",
                            ));
                        }
                        trace!(client = %self.addr, "wait abandoned by client");
                        return Ok(false);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::TimedOut => {}
                Err(err) => return Err(err.into()),
            }
        }

        let partner = peer
            .pair_number()
            .ok_or(SessionError::Negotiation("latched without a pair"))?;
        self.stream
            .write_all(&wire::wait_reply(WaitResult::Accepted, &partner))?;
        peer.wait_ready()?;
        Ok(true)
    }

    fn handle_get_number(&mut self, peer: &Arc<Peer>) -> Result<(), SessionError> {
        info!(client = %self.addr, "Command: GET_NUMBER");
        self.stream
            .write_all(&wire::get_number_reply(peer.number()))?;
        Ok(())
    }

    /// Relay: clear the link barrier, then forward bytes both ways until
    /// either side hangs up.
    fn relay(&mut self, peer: &Arc<Peer>) -> Result<(), SessionError> {
        match peer.accept(self.config.accept_timeout)? {
            AcceptStatus::Ready => {}
            AcceptStatus::TimedOut => {
                return Err(SessionError::Negotiation("partner never became ready"))
            }
            AcceptStatus::Internal => {
                return Err(SessionError::Negotiation("link barrier is inconsistent"))
            }
        }

        let partner = peer
            .pair_socket()?
            .ok_or(SessionError::Negotiation("linked peer has no socket"))?;

        info!(client = %self.addr, "Starting relay");
        let mut buffer = [0u8; RELAY_CHUNK];
        loop {
            let RelayReadiness {
                client,
                partner_closed,
            } = poll::wait(&self.stream, &partner)?;

            if client {
                let read = match (&self.stream).read(&mut buffer) {
                    Ok(0) => return Ok(()),
                    Ok(read) => read,
                    Err(err) if is_normal_close(&err) => return Ok(()),
                    Err(err) => return Err(err.into()),
                };
                trace!(client = %self.addr, bytes = read, "relaying");
                if let Err(err) = (&partner).write_all(&buffer[..read]) {
                    if is_normal_close(&err) {
                        return Ok(());
                    }
                    return Err(err.into());
                }
            }
            if partner_closed {
                return Ok(());
            }
        }
    }
}

/// Resets and broken pipes during relay are how clients normally leave.
fn is_normal_close(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
