#![allow(dead_code)]

//! Gateway Connector - Remote Termination Protocol Client
//!
//! Speaks the control-plane protocol to the live agent host and mirrors
//! local kill-switch firings onto it. Wired to the rest of the core only
//! through the event bus.

pub mod connector;
pub mod protocol;

pub use connector::{
    subscribe_kill_events, ConnectionState, GatewayConfig, GatewayConnector, GatewayError,
    KillNotice, TerminateMethod, TerminateOutcome,
};
