//! # Fleet Dispatch
//!
//! A simulated fleet-dispatch controller: client sessions request trips, a
//! bounded pool of vehicle workers serves them immediately or at a future
//! simulated time, and the controller renegotiates the start time with the
//! client when the fleet is saturated.
//!
//! ## Core Problem Solved
//!
//! Several independent producers (client requests, an admin console, one
//! output stream per running vehicle, and the simulated clock) all mutate a
//! small amount of shared state:
//!
//! - **Sessions**: at most `max_clients` logged-in clients, unique by name
//! - **Fleet**: at most `max_vehicles` occupied slots at any tick
//! - **Schedule**: a bounded table of pending requests with negotiation state
//! - **Odometer**: total distance, only ever increased by a worker's report
//! - **Clock**: simulated time, advanced once per tick
//!
//! Each region has its own lock and no operation holds two of them at once.
//! Channel I/O and worker start-up never happen under a lock.
//!
//! ## Key Features
//!
//! - **Two-phase reap**: a slot's monitor task only flags end-of-stream; the
//!   single reconciliation loop joins the tasks and frees the slot
//! - **Cooperative preemption**: cancelling a running service signals the
//!   worker, which reports its partial distance before it exits
//! - **Renegotiation**: saturated requests get a throttled offer of a later
//!   tick, answered with `decisao <id> <y|n>`
//! - **Fixed-record transport**: 360-byte records over named pipes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fleet_dispatch::builders::ControllerBuilder;
//! use fleet_dispatch::config::ControllerConfig;
//! use fleet_dispatch::infra::{ClientCommand, InMemoryOutbox, Message};
//!
//! let outbox = Arc::new(InMemoryOutbox::new());
//! let controller = ControllerBuilder::new(ControllerConfig::default())
//!     .with_outbox(outbox.clone())
//!     .build()?;
//!
//! controller.handle_message(Message::request(42, ClientCommand::Login, "ana", "")).await;
//! controller.handle_message(Message::request(42, ClientCommand::Schedule, "ana", "0 porto 3")).await;
//! controller.reconcile().await;
//! ```
//!
//! The `controller` binary wires the same controller to named pipes, an admin
//! console on stdin, a clock task and a reconciliation loop.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Controller core: state regions, vehicle lifecycle, dispatch and request processing.
pub mod core;
/// Configuration models for capacities, timing and channels.
pub mod config;
/// Builders to construct a controller from configuration.
pub mod builders;
/// Infrastructure adapters for the message record and client channels.
pub mod infra;
/// Admin console and process bootstrap.
pub mod runtime;
/// Shared utilities.
pub mod util;
