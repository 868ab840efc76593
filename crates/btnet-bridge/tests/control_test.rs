//! Control channel sessions over a loopback listener.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use btnet_bridge::control::ControlServer;
use btnet_bridge::mock::SharedWriter;
use btnet_bridge::registry::{DeviceHandle, DeviceRegistry};

fn start(registry: DeviceRegistry) -> TcpStream {
    let server = ControlServer::bind("127.0.0.1:0", registry).unwrap();
    let addr = server.local_addr().unwrap();
    server.spawn().unwrap();
    TcpStream::connect(addr).unwrap()
}

fn read_until_done(reader: &mut impl BufRead) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        assert!(reader.read_line(&mut line).unwrap() > 0, "server closed early");
        let line = line.trim_end().to_string();
        if line == "DONE" {
            return lines;
        }
        lines.push(line);
    }
}

#[test]
fn test_list_reports_connected_devices() {
    let registry = DeviceRegistry::new();
    for name in ["pond", "garden"] {
        let (writer, _) = SharedWriter::new();
        registry.publish(name, DeviceHandle::new(Box::new(writer)));
    }

    let stream = start(registry);
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut stream = stream;

    stream.write_all(b"LIST\n").unwrap();
    assert_eq!(read_until_done(&mut reader), vec!["garden", "pond"]);
}

#[test]
fn test_list_empty_registry() {
    let stream = start(DeviceRegistry::new());
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut stream = stream;

    stream.write_all(b"LIST\n").unwrap();
    assert!(read_until_done(&mut reader).is_empty());
}

#[test]
fn test_send_forwards_command_verbatim() {
    let registry = DeviceRegistry::new();
    let (writer, sent) = SharedWriter::new();
    registry.publish("garden", DeviceHandle::new(Box::new(writer)));

    let stream = start(registry);
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut stream = stream;

    stream.write_all(b"SEND garden FEED 60\n").unwrap();
    // LIST is handled after SEND on the same session, so its reply
    // means the forward already happened.
    stream.write_all(b"LIST\n").unwrap();
    read_until_done(&mut reader);

    assert_eq!(*sent.lock(), vec!["FEED 60".to_string()]);
}

#[test]
fn test_send_to_unknown_device_is_ignored() {
    let stream = start(DeviceRegistry::new());
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut stream = stream;

    stream.write_all(b"SEND nosuch PING\n").unwrap();
    stream.write_all(b"LIST\n").unwrap();
    // Session survives the unknown target.
    assert!(read_until_done(&mut reader).is_empty());
}

#[test]
fn test_unknown_commands_and_blank_lines_skipped() {
    let stream = start(DeviceRegistry::new());
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut stream = stream;

    stream.write_all(b"\nBOGUS one two\nSEND\nLIST\n").unwrap();
    assert!(read_until_done(&mut reader).is_empty());
}
