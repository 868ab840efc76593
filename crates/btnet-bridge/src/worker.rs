//! Per-device worker.
//!
//! Each worker owns one device and loops forever over a
//! connect → handshake → stream → teardown cycle. A cycle ends cleanly
//! when the device closes the link or finishes its response, and fails
//! on any transport or protocol error. Repeated failures while a
//! session was live escalate to a `RESET` command on the next
//! reconnect, and every device is reset on a long schedule regardless.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use btnet_protocol::{parse_line, DeviceLine, LineAssembler, LineEvent, ProtocolError};

use crate::carbon::{unix_now, MetricsSink, SinkFactory};
use crate::config::{DeviceConfig, Mode};
use crate::registry::{DeviceHandle, DeviceRegistry};
use crate::transport::{DeviceLink, LinkFactory, TransportError};

/// Live failures before the worker escalates to a device reset.
const RESET_ERROR_THRESHOLD: u32 = 3;
/// PING attempts when waking a sleeping device.
const PING_ATTEMPTS: u32 = 3;
/// Minimum interval between `OK` acknowledgements to the device.
const ACK_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// Types
// ============================================================================

/// Why a cycle failed.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The device never answered the wake-up PING.
    #[error("device did not answer PING after {0} attempts")]
    Handshake(u32),
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    /// The device closed the link or finished its response.
    Clean,
    /// The cycle aborted on an error.
    Failed,
}

/// State that survives across cycles.
struct RuntimeState {
    /// Mode for the next session; differs from the configured mode only
    /// while a reset is pending.
    mode: Mode,
    /// Consecutive failures of sessions that got as far as connecting.
    reset_errors: u32,
    /// Anchor for the scheduled reset countdown.
    epoch: Instant,
}

/// Per-cycle bookkeeping.
struct Session {
    started: Instant,
    /// Set once the device link is up; gates failure escalation.
    live: bool,
    /// Set once the worker published a registry handle.
    published: bool,
    /// Explicit delay before the next cycle; `None` or zero falls back
    /// to the period.
    wait: Option<Duration>,
}

impl Session {
    fn new() -> Self {
        Session {
            started: Instant::now(),
            live: false,
            published: false,
            wait: None,
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Owns one device's link, metrics connection and cycle state.
pub struct DeviceWorker {
    config: DeviceConfig,
    registry: DeviceRegistry,
    links: Arc<dyn LinkFactory>,
    sinks: Arc<dyn SinkFactory>,
    /// Kept across successful cycles; dropped after a failure so the
    /// next cycle reconnects.
    sink: Option<Box<dyn MetricsSink>>,
    /// Minimum time between `OK` acknowledgements.
    ack_interval: Duration,
    state: RuntimeState,
}

impl DeviceWorker {
    pub fn new(
        config: DeviceConfig,
        registry: DeviceRegistry,
        links: Arc<dyn LinkFactory>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Self {
        let mode = config.mode;
        DeviceWorker {
            config,
            registry,
            links,
            sinks,
            sink: None,
            ack_interval: ACK_INTERVAL,
            state: RuntimeState {
                mode,
                reset_errors: 0,
                epoch: Instant::now(),
            },
        }
    }

    /// Override the acknowledgement interval (defaults to 60 s).
    pub fn with_ack_interval(mut self, ack_interval: Duration) -> Self {
        self.ack_interval = ack_interval;
        self
    }

    /// Mode the next session will run in.
    pub fn effective_mode(&self) -> Mode {
        self.state.mode
    }

    /// Consecutive live failures counted toward escalation.
    pub fn consecutive_errors(&self) -> u32 {
        self.state.reset_errors
    }

    /// Cycle forever. Never returns; the thread is torn down with the
    /// process.
    pub fn run(mut self) {
        loop {
            let (_, delay) = self.run_cycle();
            thread::sleep(delay);
        }
    }

    /// One full cycle: session, teardown bookkeeping, escalation and
    /// the delay before the next cycle.
    pub fn run_cycle(&mut self) -> (CycleEnd, Duration) {
        let name = self.config.name.clone();
        let mut session = Session::new();

        let end = match self.run_session(&mut session) {
            Ok(()) => CycleEnd::Clean,
            Err(err) => {
                warn!("[{}] cycle failed: {}", name, err);
                self.record_failure(&name, session.live);
                CycleEnd::Failed
            }
        };

        if session.published {
            self.registry.unpublish(&name);
        }
        info!("[{}] disconnected", name);

        if end == CycleEnd::Failed {
            if self.state.mode == Mode::Reset {
                // The reset never went out; try it again next cycle
                // only if the failure escalates again.
                self.state.mode = self.config.mode;
            } else {
                session.wait = Some(Duration::from_secs(self.config.error_wait));
            }
            if session.live {
                self.state.reset_errors += 1;
                warn!(
                    "[{}] error while connected #{}",
                    name, self.state.reset_errors
                );
                if self.state.reset_errors >= RESET_ERROR_THRESHOLD {
                    self.emit_metric(&name, "resets");
                    self.state.mode = Mode::Reset;
                    self.state.reset_errors = 0;
                    info!("[{}] will reset on reconnect after repeated errors", name);
                }
            }
            // Force a fresh backend connection next cycle.
            self.sink = None;
        }

        if self.state.epoch.elapsed() > Duration::from_secs(self.config.reset_time) {
            self.state.epoch = Instant::now();
            self.state.mode = Mode::Reset;
            info!("[{}] will reset on reconnect on schedule", name);
        }

        let spent = session.started.elapsed();
        let period = Duration::from_secs(self.config.period);
        let delay = delay_for(spent, session.wait, period);
        info!(
            "[{}] spent {:.0?}, waiting {:.0?} (period {}s)",
            name, spent, delay, self.config.period
        );
        (end, delay)
    }

    fn run_session(&mut self, session: &mut Session) -> Result<(), CycleError> {
        let name = self.config.name.clone();

        if self.sink.is_none() {
            info!("[{}] connecting to carbon {}", name, self.config.carbon);
            self.sink = Some(self.sinks.connect(&self.config.carbon)?);
        }

        info!("[{}] connecting to device {}", name, self.config.address);
        let mut link = self.links.connect(&self.config.address)?;
        link.set_read_timeout(Duration::from_secs(self.config.timeout))?;
        info!(
            "[{}] connected to device (timeout {}s)",
            name, self.config.timeout
        );
        session.live = true;

        match self.state.mode {
            Mode::Read => {
                if self.config.sleep {
                    self.wake_device(&name, &mut *link)?;
                }
                info!("[{}] < READ", name);
                link.send_line("READ")?;
            }
            Mode::Feed => {
                let command = format!("FEED {}", self.config.period);
                info!("[{}] < {}", name, command);
                link.send_line(&command)?;
            }
            Mode::Reset => {
                // A reset session never streams and does not count as
                // live for escalation.
                session.live = false;
                session.wait = Some(Duration::from_secs(self.config.error_wait));
                self.state.mode = self.config.mode;
                info!("[{}] < RESET", name);
                link.send_line("RESET")?;
                return Ok(());
            }
        }

        self.registry
            .publish(&name, DeviceHandle::new(link.writer()?));
        session.published = true;

        self.stream_telemetry(&name, &mut *link, session)
    }

    /// PING a sleeping device until it answers PONG.
    fn wake_device(&mut self, name: &str, link: &mut dyn DeviceLink) -> Result<(), CycleError> {
        for _ in 0..PING_ATTEMPTS {
            info!("[{}] < PING", name);
            link.send_line("PING")?;
            let reply = read_wake_reply(link)?;
            debug!("[{}] > {}", name, reply);
            if reply == "PONG" {
                return Ok(());
            }
        }
        Err(CycleError::Handshake(PING_ATTEMPTS))
    }

    fn stream_telemetry(
        &mut self,
        name: &str,
        link: &mut dyn DeviceLink,
        session: &mut Session,
    ) -> Result<(), CycleError> {
        let mut assembler = LineAssembler::new();
        let mut last_ack = Instant::now();
        loop {
            let Some(byte) = link.read_byte()? else {
                return Ok(());
            };
            let line = match assembler.push(byte) {
                LineEvent::Pending => continue,
                LineEvent::Desync(partial) => {
                    debug!("[{}] > {} (noise, resyncing)", name, partial);
                    continue;
                }
                LineEvent::Line(line) => line,
            };
            if line.is_empty() {
                continue;
            }
            debug!("[{}] > {}", name, line);

            match parse_line(&line)? {
                DeviceLine::Heartbeat => {}
                DeviceLine::Rejected => {
                    warn!("[{}] device rejected command", name);
                    self.state.mode = self.config.mode;
                    return Ok(());
                }
                DeviceLine::Done => {
                    if self.state.mode == Mode::Read && self.config.sleep {
                        self.negotiate_sleep(name, link, session)?;
                    }
                    return Ok(());
                }
                DeviceLine::Data(sample) => {
                    let ts = unix_now();
                    let sink = self.sink.as_mut().ok_or_else(|| {
                        TransportError::Io(io::Error::other("metrics sink not connected"))
                    })?;
                    sink.send_line(&format!(
                        "{}.{} {:.2} {}",
                        name, sample.metric, sample.value, ts
                    ))?;
                    sink.send_line(&format!("{}.good 1.0 {}", name, ts))?;
                    self.state.reset_errors = 0;
                    if last_ack.elapsed() > self.ack_interval {
                        debug!("[{}] < OK", name);
                        link.send_line("OK")?;
                        last_ack = Instant::now();
                    }
                }
                DeviceLine::Other(other) => {
                    debug!("[{}] > unhandled: {}", name, other);
                }
            }
        }
    }

    /// Tell the device how long it may sleep before the next cycle.
    fn negotiate_sleep(
        &mut self,
        name: &str,
        link: &mut dyn DeviceLink,
        session: &mut Session,
    ) -> Result<(), CycleError> {
        let spent = session.started.elapsed();
        let period = Duration::from_secs(self.config.period);
        let wait = if spent < period { period - spent } else { period };
        session.wait = Some(wait);
        let amount = wait.as_secs() as i64 - self.config.warm_up as i64;
        if amount > 0 {
            info!("[{}] < SLEEP {}", name, amount);
            link.send_line(&format!("SLEEP {}", amount))?;
        }
        Ok(())
    }

    /// Best-effort error metrics on the current sink after a failed
    /// cycle.
    fn record_failure(&mut self, name: &str, live: bool) {
        let ts = unix_now();
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.send_line(&format!("{}.errors 1.0 {}", name, ts));
            if live {
                let _ = sink.send_line(&format!("{}.resets 1.0 {}", name, ts));
            }
        }
    }

    fn emit_metric(&mut self, name: &str, suffix: &str) {
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.send_line(&format!("{}.{} 1.0 {}", name, suffix, unix_now()));
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Wait for one reply line to a wake-up PING. A noise byte truncates
/// the reply to what arrived before it; devices often append a carriage
/// return, which counts as noise, so the partial still matches PONG.
fn read_wake_reply(link: &mut dyn DeviceLink) -> Result<String, CycleError> {
    let mut assembler = LineAssembler::new();
    loop {
        let Some(byte) = link.read_byte()? else {
            return Err(CycleError::Transport(TransportError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "link closed during wake handshake",
            ))));
        };
        match assembler.push(byte) {
            LineEvent::Pending => continue,
            LineEvent::Desync(partial) => return Ok(partial),
            LineEvent::Line(line) => return Ok(line),
        }
    }
}

/// Delay before the next cycle: an explicit non-zero wait wins,
/// otherwise top the period up by however long the cycle took.
fn delay_for(spent: Duration, wait: Option<Duration>, period: Duration) -> Duration {
    match wait {
        Some(wait) if !wait.is_zero() => wait,
        _ => {
            if spent < period {
                period - spent
            } else {
                period
            }
        }
    }
}

/// Run `worker` on its own named OS thread.
pub fn spawn(worker: DeviceWorker) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("device-{}", worker.config.name))
        .spawn(move || worker.run())
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_delay_tops_up_period() {
        assert_eq!(delay_for(secs(10), None, secs(30)), secs(20));
    }

    #[test]
    fn test_delay_full_period_when_overrun() {
        assert_eq!(delay_for(secs(45), None, secs(30)), secs(30));
    }

    #[test]
    fn test_explicit_wait_wins() {
        assert_eq!(delay_for(secs(10), Some(secs(5)), secs(30)), secs(5));
    }

    #[test]
    fn test_zero_wait_falls_back_to_period() {
        assert_eq!(delay_for(secs(10), Some(secs(0)), secs(30)), secs(20));
    }
}
