use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// Tag carried by a single wakeup byte.
///
/// `Waiting` is posted by a caller that has just latched the pair; `Linking`
/// is posted by either side once its protocol reply is on the wire. Every
/// posted tag is consumed exactly once by the receiving worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignalTag {
    Waiting = 1,
    Linking = 2,
}

/// Per-peer wakeup pipe.
///
/// The partner's thread posts one tagged byte; the owning worker either
/// consumes it directly or sleeps on the read end with its poller, next to
/// the client socket. Both ends live inside the `Peer`, so a post can never
/// hit a closed pipe while the peer is alive.
pub struct Signal {
    tx: UnixStream,
    rx: UnixStream,
}

impl Signal {
    pub(crate) fn new() -> io::Result<Self> {
        let (tx, rx) = UnixStream::pair()?;
        Ok(Self { tx, rx })
    }

    /// Post one tagged wakeup byte. Called from the partner's thread.
    pub(crate) fn post(&self, tag: SignalTag) -> io::Result<()> {
        (&self.tx).write_all(&[tag as u8])
    }

    /// Consume one pending byte, if any.
    pub(crate) fn try_recv(&self) -> io::Result<Option<u8>> {
        self.rx.set_nonblocking(true)?;
        let result = self.read_byte();
        self.rx.set_nonblocking(false)?;
        result
    }

    /// Consume one byte, waiting for it up to `timeout`.
    pub(crate) fn recv_timeout(&self, timeout: Duration) -> io::Result<Option<u8>> {
        if timeout.is_zero() {
            return self.try_recv();
        }
        self.rx.set_read_timeout(Some(timeout))?;
        let result = self.read_byte();
        self.rx.set_read_timeout(None)?;
        result
    }

    fn read_byte(&self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            return match (&self.rx).read(&mut byte) {
                Ok(0) => Ok(None),
                Ok(_) => Ok(Some(byte[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.kind() == io::ErrorKind::TimedOut =>
                {
                    Ok(None)
                }
                Err(err) => Err(err),
            };
        }
    }
}

/// Lets the read end register with a poller alongside the client socket.
impl AsRawFd for Signal {
    fn as_raw_fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }
}
