mod common;

use std::io::Write;

use common::{RelayClient, TestServer};
use switchboard_relay::wire;

#[test]
fn token_is_issued_once_and_reused() {
    let server = TestServer::start();

    let (mut first, token) = RelayClient::login(server.addr());
    let number = first.get_number();
    assert!(number.len() >= 7, "number too short: {number:?}");
    drop(first);

    // Logging back in with the issued token resolves the same identity and
    // does not mint a new token.
    let mut returning = RelayClient::connect(server.addr());
    returning.send_handshake(Some(&token));
    assert_eq!(returning.recv_handshake(), None);
    assert_eq!(returning.get_number(), number);
}

#[test]
fn get_number_is_pure() {
    let server = TestServer::start();

    let (mut client, _token) = RelayClient::login(server.addr());
    let first = client.get_number();
    let second = client.get_number();
    assert_eq!(first, second);
}

#[test]
fn wrong_magic_closes_the_connection() {
    let server = TestServer::start();

    let mut client = RelayClient::connect(server.addr());
    client.stream.write_all(b"\x00MOBILF\x00").unwrap();
    assert!(client.reads_eof());
}

#[test]
fn bad_token_flag_closes_the_connection() {
    let server = TestServer::start();

    let mut client = RelayClient::connect(server.addr());
    let mut buffer = wire::MAGIC.to_vec();
    buffer.push(2);
    client.stream.write_all(&buffer).unwrap();
    assert!(client.reads_eof());
}

#[test]
fn unknown_token_closes_the_connection() {
    let server = TestServer::start();

    let mut client = RelayClient::connect(server.addr());
    client.send_handshake(Some(&[0xab; 16]));
    assert!(client.reads_eof());
}

#[test]
fn double_login_is_rejected_while_online() {
    let server = TestServer::start();

    let (_first, token) = RelayClient::login(server.addr());

    let mut second = RelayClient::connect(server.addr());
    second.send_handshake(Some(&token));
    assert!(second.reads_eof());
}
