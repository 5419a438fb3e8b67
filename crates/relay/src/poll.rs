//! Relay-phase readiness poll.
//!
//! The forwarding loop needs to sleep on two conditions at once: payload
//! from its own client, and the partner socket going away. The latter means
//! catching a half-close (`POLLRDHUP`), which popol does not expose, so this
//! drops down to `poll(2)` directly.

use std::io;
use std::os::unix::io::AsRawFd;

pub(crate) struct RelayReadiness {
    /// The client socket has payload (or an error condition to read out).
    pub client: bool,
    /// The partner socket hung up or errored; the relay is over.
    pub partner_closed: bool,
}

pub(crate) fn wait(client: &impl AsRawFd, partner: &impl AsRawFd) -> io::Result<RelayReadiness> {
    let mut fds = [
        libc::pollfd {
            fd: client.as_raw_fd(),
            events: libc::POLLIN | libc::POLLPRI,
            revents: 0,
        },
        libc::pollfd {
            fd: partner.as_raw_fd(),
            events: libc::POLLRDHUP,
            revents: 0,
        },
    ];

    loop {
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if ready >= 0 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    let error_mask = libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;
    Ok(RelayReadiness {
        client: fds[0].revents & (libc::POLLIN | libc::POLLPRI | error_mask) != 0,
        partner_closed: fds[1].revents & (libc::POLLRDHUP | error_mask) != 0,
    })
}
