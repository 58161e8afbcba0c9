//! Decentralized two-way-ranging core for a UWB mesh.
//!
//! A single-threaded event loop coordinating four pieces, leaves-first:
//!
//! - [`timestamp`]: a 40-bit wrap-aware tick type with the modular
//!   arithmetic and unit conversions the ranging math needs.
//! - [`peer`]: the per-peer table, the shared-counter desync protocol,
//!   and the hook into [`ranging`]'s DS-TWR formula.
//! - [`frame`]: the wire codec, a pure function over caller-owned
//!   byte buffers, no allocation either direction.
//! - [`mac`]: the token-passing software-TDMA state machine that
//!   orders transmissions by node ID and admits/evicts peers.
//!
//! [`radio`] and [`report`] name the external collaborators (the UWB
//! driver and the line-oriented reporting channel) this crate depends
//! on but does not implement. [`node`] wires everything together into
//! the main-loop integration a board-support crate drives.
//! [`config`] holds the build-time constants and the per-deployment
//! values every node is constructed with.
#![no_std]

pub mod config;
pub mod error;
pub mod frame;
pub mod mac;
pub mod node;
pub mod peer;
pub mod radio;
pub mod ranging;
pub mod report;
pub mod timestamp;

pub use config::{Config, Role, DUMMY_ID};
pub use node::Node;
pub use timestamp::Ticks;
