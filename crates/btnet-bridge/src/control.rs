//! TCP control channel.
//!
//! Operators connect with netcat or similar and speak a line protocol:
//!
//! - `LIST`: one connected device name per line, then `DONE`.
//! - `SEND <name> <command...>`: forward a raw command line to the
//!   named device; silently ignored if the device is not connected.
//!
//! Unknown commands and blank lines are ignored. Sessions idle for
//! thirty seconds are dropped.
//!
//! A device only appears here once its worker has sent the session's
//! mode command, so devices mid-handshake or in a RESET session are
//! invisible to `LIST` and unreachable via `SEND` until their next
//! streaming session.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use btnet_protocol::{LineAssembler, LineEvent};

use crate::registry::DeviceRegistry;

const SESSION_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Accepts operator connections and serves them against the registry.
pub struct ControlServer {
    listener: TcpListener,
    registry: DeviceRegistry,
}

impl ControlServer {
    /// Bind the control listener.
    pub fn bind(addr: &str, registry: DeviceRegistry) -> std::io::Result<ControlServer> {
        let listener = TcpListener::bind(addr)?;
        Ok(ControlServer { listener, registry })
    }

    /// Address the listener actually bound (port 0 resolves here).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop on its own thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("control-listener".to_string())
            .spawn(move || self.accept_loop())
    }

    fn accept_loop(self) {
        info!("[control] listening");
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!("[control] accept failed: {}", err);
                    continue;
                }
            };
            let registry = self.registry.clone();
            let spawned = thread::Builder::new()
                .name("control-session".to_string())
                .spawn(move || {
                    info!("[control] connection from {}", peer);
                    if let Err(err) = run_session(stream, &registry) {
                        debug!("[control] session ended: {}", err);
                    }
                    info!("[control] connection from {} closed", peer);
                });
            if let Err(err) = spawned {
                warn!("[control] could not spawn session thread: {}", err);
            }
        }
    }
}

fn run_session(mut stream: TcpStream, registry: &DeviceRegistry) -> std::io::Result<()> {
    stream.set_read_timeout(Some(SESSION_READ_TIMEOUT))?;
    let mut assembler = LineAssembler::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            // Idle timeouts and hard errors both end the session.
            Err(err) => return Err(err),
        }
        let line = match assembler.push(byte[0]) {
            LineEvent::Line(line) => line,
            LineEvent::Pending | LineEvent::Desync(_) => continue,
        };
        if line.is_empty() {
            continue;
        }
        dispatch(&line, &mut stream, registry)?;
    }
}

fn dispatch(
    line: &str,
    stream: &mut TcpStream,
    registry: &DeviceRegistry,
) -> std::io::Result<()> {
    let parts: Vec<&str> = line.split(' ').collect();
    match parts[0] {
        "LIST" => {
            for name in registry.list_names() {
                stream.write_all(name.as_bytes())?;
                stream.write_all(b"\n")?;
            }
            stream.write_all(b"DONE\n")?;
        }
        "SEND" if parts.len() >= 2 => {
            let name = parts[1];
            let command = parts[2..].join(" ");
            match registry.lookup(name) {
                Some(handle) => {
                    info!("[{}] < {} (control)", name, command);
                    handle
                        .send_line(&command)
                        .map_err(std::io::Error::other)?;
                }
                None => debug!("[control] SEND to unknown device {:?}", name),
            }
        }
        other => debug!("[control] ignoring {:?}", other),
    }
    Ok(())
}
