//! Concurrent ICMP echo probing with per-destination statistics.
//!
//! Every destination gets its own probe task; the tasks share a result table and a
//! registry of live tasks, and the [`controller::Controller`] reports once the registry
//! drains. Probing can be bounded or endless, interrupted with a stop request or asked
//! for intermediate statistics without stopping.
//!
//! ## Example
//! Following example probes the hosts given on the command line and lists the reachable ones.
//! Raw ICMP sockets require elevated privileges.
//! ```no_run
#![doc = include_str!("../demos/probe.rs")]
//! ```
//! Probing can be driven with any [`echo::EchoPinger`]; [`icmp::IcmpPinger`] is the raw socket one.

pub mod config;
pub mod controller;
pub mod echo;
pub mod error;
pub mod icmp;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod results;
pub mod sink;
pub mod task;

pub(crate) mod constants;
pub(crate) mod signals;

pub use config::{ProbeConfig, ProbeConfigBuilder, ProtocolPreference};
pub use controller::{ControlEvent, ControlHandle, Controller};
pub use echo::{EchoPinger, EchoReply, EchoRequest, EchoStatus};
pub use icmp::IcmpPinger;
pub use results::{Counters, ProbeResult, Snapshot, TaskId};
