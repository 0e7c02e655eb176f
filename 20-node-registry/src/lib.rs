//! In-memory membership registry for a fleet of networked nodes.
//!
//! Nodes announce themselves with `POST /register`; the registry polls each
//! known node's `/status` endpoint on a fixed period and drops nodes that stop
//! answering for too many consecutive cycles. Everything lives in one process
//! and is lost on restart.
//!
//! - [`registry`] owns the node list behind a single lock and implements
//!   registration, refresh fan-out and eviction.
//! - [`status`] is the outbound status request, behind the [`status::StatusClient`]
//!   trait so tests can stub the network.
//! - [`scheduler`] runs the periodic refresh cycle.
//! - [`server`] binds the HTTP endpoints and ties the scheduler to the server's
//!   lifetime.
//! - [`model`] holds the JSON shapes exchanged with nodes and listing clients.
//! - [`cli`], [`config`] and [`client`] make up the command-line front end.

pub mod cli;
pub mod client;
pub mod config;
pub mod model;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod status;
