//! Wire protocol constants and frame builders.
//!
//! Every frame is prefixed by the protocol version byte. The handshake magic
//! doubles as the version carrier: its first byte is the version, followed
//! by the service name.

use switchboard_storage::{Token, TOKEN_LEN};

pub const PROTOCOL_VERSION: u8 = 0;

/// Handshake magic: version byte followed by `MOBILE`.
pub const MAGIC: [u8; 7] = [PROTOCOL_VERSION, b'M', b'O', b'B', b'I', b'L', b'E'];

/// Client commands, one byte after the version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Call = 0,
    Wait = 1,
    GetNumber = 2,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        match byte {
            0 => Ok(Command::Call),
            1 => Ok(Command::Wait),
            2 => Ok(Command::GetNumber),
            other => Err(other),
        }
    }
}

/// Result byte of a `CALL` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallResult {
    Accepted = 0,
    Internal = 1,
    Busy = 2,
    Unavailable = 3,
}

/// Result byte of a `WAIT` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WaitResult {
    Accepted = 0,
    Internal = 1,
}

/// Handshake reply: the magic, a new-identity flag, and the freshly issued
/// token when the flag is set.
pub fn handshake_reply(new_token: Option<&Token>) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MAGIC.len() + 1 + TOKEN_LEN);
    frame.extend_from_slice(&MAGIC);
    frame.push(new_token.is_some() as u8);
    if let Some(token) = new_token {
        frame.extend_from_slice(token.as_bytes());
    }
    frame
}

pub fn call_reply(result: CallResult) -> [u8; 3] {
    [PROTOCOL_VERSION, Command::Call as u8, result as u8]
}

/// `WAIT` reply; the partner number is present only on `Accepted`.
pub fn wait_reply(result: WaitResult, partner_number: &str) -> Vec<u8> {
    let number = partner_number.as_bytes();
    debug_assert!(number.len() <= u8::MAX as usize);

    let mut frame = Vec::with_capacity(4 + number.len());
    frame.extend_from_slice(&[PROTOCOL_VERSION, Command::Wait as u8, result as u8]);
    frame.push(number.len() as u8);
    frame.extend_from_slice(number);
    frame
}

pub fn get_number_reply(number: &str) -> Vec<u8> {
    let number = number.as_bytes();
    debug_assert!(number.len() <= u8::MAX as usize);

    let mut frame = Vec::with_capacity(3 + number.len());
    frame.extend_from_slice(&[PROTOCOL_VERSION, Command::GetNumber as u8]);
    frame.push(number.len() as u8);
    frame.extend_from_slice(number);
    frame
}
