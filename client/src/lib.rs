//! # Quiz Phone Library
//!
//! This library implements one participant ("phone") of a broadcast-synchronized
//! multiplayer quiz. There is no game server: one phone holds host authority and
//! drives the questions, and every phone keeps its own replica of the session
//! that converges using nothing but broadcast messages.
//!
//! ## Architecture Overview
//!
//! The bus underneath is unordered, at-least-once and fire-and-forget. Every
//! handler in this crate is therefore safe under duplication and reordering,
//! and every piece of deferred work can be invalidated by a reset.
//!
//! ### Replicated Lifecycle
//! `waiting → playing → results → leaderboard → playing | ended`, and back to
//! `waiting` on reset. Live broadcasts and late-join snapshots are both turned
//! into canonical lifecycle events, so each state has a single handler.
//!
//! ### One-Shot Awards
//! Points for a question are added at most once, guarded by an explicit award
//! state machine that only a newly presented question re-opens.
//!
//! ### Epoch Discipline
//! Timers are stamped with the epoch they were scheduled in. A reset cancels
//! them and advances the epoch, and a timer that slips through is rejected when
//! it fires.
//!
//! ## Module Organization
//!
//! ### Session Core
//! - `session`: the five-state replica and its progress ordering
//! - `question`: presented question, answer slots and the award guard
//! - `event`: canonical lifecycle events
//! - `settings`: last-writer-wins settings registers
//! - `epoch`: the reset guard for deferred work
//!
//! ### Satellite Protocols
//! - `late_join`: StateRequest / StateResponse reconciliation
//! - `host`: host authority and sender-side gating
//! - `host_controller`: the host's game driver
//! - `roster`: advisory presence and answered sets
//!
//! ### Edges
//! - `phone`: ties the above together behind intents, envelopes and ticks
//! - `snapshot`: what a renderer reads, and the intents it sends back
//! - `hub`: in-process registry that broadcasts between phones
//! - `network`: UDP adapter to the relay and the console front end
//!
//! ## Usage Example
//!
//! ```rust
//! use client::config::SessionConfig;
//! use client::hub::Hub;
//! use client::phone::Phone;
//! use client::questions::QuestionBank;
//! use client::snapshot::{Intent, Screen};
//! use shared::PlayerId;
//!
//! let mut hub = Hub::new();
//! for (id, name) in [(1, "Ada"), (2, "Bo")] {
//!     let config = SessionConfig::default();
//!     hub.register(Phone::new(PlayerId(id), name, config, QuestionBank::builtin()));
//! }
//! hub.start(PlayerId(1), true);
//! hub.start(PlayerId(2), false);
//! hub.advance(1_500);
//!
//! hub.intent(PlayerId(1), Intent::StartGame);
//! hub.advance(100);
//! assert_eq!(hub.snapshot(PlayerId(2)).unwrap().screen, Screen::Question);
//! ```

pub mod config;
pub mod epoch;
pub mod error;
pub mod event;
pub mod focus;
pub mod host;
pub mod host_controller;
pub mod hub;
pub mod late_join;
pub mod network;
pub mod phone;
pub mod question;
pub mod questions;
pub mod roster;
pub mod session;
pub mod settings;
pub mod snapshot;

pub use error::ClientError;
