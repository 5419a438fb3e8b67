//! Shared plumbing for the end-to-end suite: an ephemeral-port server with
//! shortened timeouts, and a bare-bones protocol client.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use switchboard_peers::Registry;
use switchboard_relay::server::{self, Config, ServerHandle};
use switchboard_relay::wire;
use switchboard_storage::MemoryIdentityStore;

/// Generous ceiling on every client read; failed expectations should error,
/// not hang the suite.
pub const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// The shortened call-negotiation window used by the suite.
pub const TEST_CALL_TIMEOUT: Duration = Duration::from_secs(1);

pub struct TestServer {
    addr: SocketAddr,
    handle: Option<ServerHandle>,
}

impl TestServer {
    pub fn start() -> Self {
        let registry = Arc::new(Registry::new(Arc::new(MemoryIdentityStore::new())));
        let config = Config {
            listen: "127.0.0.1:0".parse().unwrap(),
            call_timeout: TEST_CALL_TIMEOUT,
            call_retry_delay: Duration::from_millis(25),
            accept_timeout: Duration::from_millis(500),
            wait_poll_interval: Duration::from_millis(100),
        };

        let handle = server::spawn(config, registry).expect("server failed to start");
        Self {
            addr: handle.local_addr(),
            handle: Some(handle),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown().ok();
        }
    }
}

pub struct RelayClient {
    pub stream: TcpStream,
}

impl RelayClient {
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect failed");
        stream
            .set_read_timeout(Some(CLIENT_READ_TIMEOUT))
            .expect("read timeout");
        Self { stream }
    }

    /// Connect and log in without a token, returning the issued one.
    pub fn login(addr: SocketAddr) -> (Self, [u8; 16]) {
        let mut client = Self::connect(addr);
        client.send_handshake(None);
        let token = client.recv_handshake().expect("expected a fresh token");
        (client, token)
    }

    pub fn send_handshake(&mut self, token: Option<&[u8; 16]>) {
        let mut buffer = wire::MAGIC.to_vec();
        match token {
            Some(token) => {
                buffer.push(1);
                buffer.extend_from_slice(token);
            }
            None => buffer.push(0),
        }
        self.stream.write_all(&buffer).unwrap();
    }

    /// Reads the handshake reply; `Some(token)` when the server minted a new
    /// identity for us.
    pub fn recv_handshake(&mut self) -> Option<[u8; 16]> {
        let mut magic = [0u8; 7];
        self.stream.read_exact(&mut magic).unwrap();
        assert_eq!(magic, wire::MAGIC);

        let mut is_new = [0u8; 1];
        self.stream.read_exact(&mut is_new).unwrap();
        match is_new[0] {
            0 => None,
            1 => {
                let mut token = [0u8; 16];
                self.stream.read_exact(&mut token).unwrap();
                Some(token)
            }
            other => panic!("bad is_new flag {other}"),
        }
    }

    pub fn send_call(&mut self, number: &str) {
        let mut buffer = vec![wire::PROTOCOL_VERSION, wire::Command::Call as u8];
        buffer.push(number.len() as u8);
        buffer.extend_from_slice(number.as_bytes());
        self.stream.write_all(&buffer).unwrap();
    }

    pub fn recv_call(&mut self) -> u8 {
        let mut reply = [0u8; 3];
        self.stream.read_exact(&mut reply).unwrap();
        assert_eq!(reply[0], wire::PROTOCOL_VERSION);
        assert_eq!(reply[1], wire::Command::Call as u8);
        reply[2]
    }

    pub fn send_wait(&mut self) {
        self.stream
            .write_all(&[wire::PROTOCOL_VERSION, wire::Command::Wait as u8])
            .unwrap();
    }

    /// Returns the result byte and the partner number (empty unless accepted).
    pub fn recv_wait(&mut self) -> (u8, String) {
        let mut reply = [0u8; 4];
        self.stream.read_exact(&mut reply).unwrap();
        assert_eq!(reply[0], wire::PROTOCOL_VERSION);
        assert_eq!(reply[1], wire::Command::Wait as u8);

        let mut number = vec![0u8; reply[3] as usize];
        self.stream.read_exact(&mut number).unwrap();
        (reply[2], String::from_utf8(number).unwrap())
    }

    pub fn get_number(&mut self) -> String {
        self.stream
            .write_all(&[wire::PROTOCOL_VERSION, wire::Command::GetNumber as u8])
            .unwrap();

        let mut reply = [0u8; 3];
        self.stream.read_exact(&mut reply).unwrap();
        assert_eq!(reply[0], wire::PROTOCOL_VERSION);
        assert_eq!(reply[1], wire::Command::GetNumber as u8);

        let mut number = vec![0u8; reply[2] as usize];
        self.stream.read_exact(&mut number).unwrap();
        String::from_utf8(number).unwrap()
    }

    /// True once the server has closed our connection.
    pub fn reads_eof(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(self.stream.read(&mut byte), Ok(0))
    }
}
