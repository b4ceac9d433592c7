//! displayswitch: background daemon that turns displays on and off
//!
//! The pieces are usable without the binary so they can be driven by fakes
//! in tests:
//! - display configuration transactions and the persisted registry
//! - global keyboard interception with a panic gesture
//! - a control socket for the settings UI

pub mod actions;
pub mod config;
pub mod context;
pub mod display;
pub mod events;
pub mod hotkey;
pub mod ipc;
pub mod lifecycle;
pub mod store;
