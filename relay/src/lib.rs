//! # Broadcast Relay Library
//!
//! This library provides the bus underneath the quiz phones. It is not a game
//! server. It holds no session state and looks at a message only to check
//! who published it. Every envelope a registered peer publishes is delivered
//! to every registered peer, the publisher included.
//!
//! ## Delivery Guarantees
//!
//! Datagrams are fire-and-forget. A delivery may be lost, duplicated by a
//! retransmitting peer or reordered relative to other deliveries. The phones
//! are written to converge under exactly these conditions, so the relay adds
//! no sequencing or acknowledgement of its own.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! A receiver task decodes datagrams and forwards them to the main loop, which
//! updates the peer registry and queues outgoing packets. A sender task
//! performs the fan-out and a checker task expires silent peers.
//!
//! ## Module Organization
//!
//! ### Peer Manager Module (`peer_manager`)
//! - Join, rejoin and leave handling
//! - Capacity limit
//! - Timeout detection from heartbeats
//!
//! ### Network Module (`network`)
//! - UDP socket management
//! - Packet routing (`route_packet`) and broadcast fan-out
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relay::network::RelayServer;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut relay = RelayServer::new("127.0.0.1:8080", 16, Duration::from_secs(5)).await?;
//!     relay.run().await
//! }
//! ```

pub mod network;
pub mod peer_manager;
