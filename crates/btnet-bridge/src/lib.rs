//! btnet bridge daemon.
//!
//! Bridges battery-powered serial sensor devices, reachable over a
//! short-range wireless serial link, to a Carbon/Graphite metrics
//! backend, and exposes a line-oriented TCP control channel for listing
//! connected devices and injecting raw commands into them.
//!
//! ## Architecture
//!
//! - One [`worker::DeviceWorker`] thread per configured device owns its
//!   wireless link and Carbon connection and runs the
//!   connect → handshake → stream → teardown cycle forever.
//! - The [`registry::DeviceRegistry`] maps device names to live write
//!   handles; workers publish/unpublish around each session.
//! - The [`control::ControlServer`] accepts operator connections and
//!   serves `LIST` and `SEND` against the registry.

pub mod carbon;
pub mod config;
pub mod control;
pub mod mock;
pub mod registry;
pub mod transport;
pub mod worker;
