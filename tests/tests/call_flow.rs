mod common;

use std::io::{Read, Write};
use std::time::Instant;

use common::{RelayClient, TestServer, TEST_CALL_TIMEOUT};
use switchboard_relay::wire::{CallResult, WaitResult};

#[test]
fn call_links_and_relays_both_ways() {
    let server = TestServer::start();

    let (mut callee, _) = RelayClient::login(server.addr());
    let callee_number = callee.get_number();
    let (mut caller, _) = RelayClient::login(server.addr());
    let caller_number = caller.get_number();

    callee.send_wait();
    caller.send_call(&callee_number);

    assert_eq!(caller.recv_call(), CallResult::Accepted as u8);
    let (result, announced) = callee.recv_wait();
    assert_eq!(result, WaitResult::Accepted as u8);
    assert_eq!(announced, caller_number);

    // Opaque payload flows both ways from here on.
    caller.stream.write_all(b"hello").unwrap();
    let mut inbound = [0u8; 5];
    callee.stream.read_exact(&mut inbound).unwrap();
    assert_eq!(&inbound, b"hello");

    callee.stream.write_all(b"world").unwrap();
    caller.stream.read_exact(&mut inbound).unwrap();
    assert_eq!(&inbound, b"world");

    // Hanging up one side ends the other.
    drop(caller);
    assert!(callee.reads_eof());
}

#[test]
fn callee_that_never_waits_is_unavailable() {
    let server = TestServer::start();

    let (mut idle, _) = RelayClient::login(server.addr());
    let idle_number = idle.get_number();
    let (mut caller, _) = RelayClient::login(server.addr());

    let started = Instant::now();
    caller.send_call(&idle_number);
    assert_eq!(caller.recv_call(), CallResult::Unavailable as u8);
    assert!(started.elapsed() >= TEST_CALL_TIMEOUT);

    // The caller stays in the command loop after the refusal.
    assert!(!caller.get_number().is_empty());
}

#[test]
fn unknown_number_is_unavailable() {
    let server = TestServer::start();

    let (mut caller, _) = RelayClient::login(server.addr());
    let started = Instant::now();
    caller.send_call("0999999999");
    assert_eq!(caller.recv_call(), CallResult::Unavailable as u8);
    assert!(started.elapsed() >= TEST_CALL_TIMEOUT);
}

#[test]
fn linked_callee_is_busy_immediately() {
    let server = TestServer::start();

    let (mut callee, _) = RelayClient::login(server.addr());
    let callee_number = callee.get_number();
    let (mut caller, _) = RelayClient::login(server.addr());

    callee.send_wait();
    caller.send_call(&callee_number);
    assert_eq!(caller.recv_call(), CallResult::Accepted as u8);
    assert_eq!(callee.recv_wait().0, WaitResult::Accepted as u8);

    let (mut late, _) = RelayClient::login(server.addr());
    let started = Instant::now();
    late.send_call(&callee_number);
    assert_eq!(late.recv_call(), CallResult::Busy as u8);
    assert!(started.elapsed() < TEST_CALL_TIMEOUT);
}

#[test]
fn latched_callee_vanishing_tears_the_caller_down() {
    let server = TestServer::start();

    let (mut callee, _) = RelayClient::login(server.addr());
    let callee_number = callee.get_number();
    let (mut caller, _) = RelayClient::login(server.addr());

    callee.send_wait();
    caller.send_call(&callee_number);
    assert_eq!(caller.recv_call(), CallResult::Accepted as u8);

    // The pair is latched; there is no cancellation from here, only
    // disconnect, which must take the caller down too.
    drop(callee);
    assert!(caller.reads_eof());
}
