mod common;

use std::thread;
use std::time::Duration;

use common::{RelayClient, TestServer};

#[test]
fn wait_is_abandoned_by_the_next_command() {
    let server = TestServer::start();

    let (mut client, _) = RelayClient::login(server.addr());
    client.send_wait();

    // Give the worker a moment to park, then just send the next command.
    // The aborted WAIT produces no reply; the new frame is answered.
    thread::sleep(Duration::from_millis(150));
    let number = client.get_number();
    assert!(!number.is_empty());
}

#[test]
fn call_is_abandoned_by_the_next_command() {
    let server = TestServer::start();

    let (mut idle, _) = RelayClient::login(server.addr());
    let idle_number = idle.get_number();

    let (mut caller, _) = RelayClient::login(server.addr());
    caller.send_call(&idle_number);

    // The target never waits, so the caller is still knocking; speaking
    // abandons the attempt silently and the new frame is answered.
    thread::sleep(Duration::from_millis(150));
    let number = caller.get_number();
    assert!(!number.is_empty());
}
