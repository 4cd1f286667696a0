//! Logic Module - Detection & Response Engines
//!
//! The closed detection-escalation-response loop: Policy Engine and
//! Threat Intelligence classify, the Runtime Monitor orchestrates, the
//! Kill Switch terminates locally, and the Gateway Connector mirrors the
//! kill onto the agent host.

pub mod events;
pub mod gateway;
pub mod intel;
pub mod kill_switch;
pub mod monitor;
pub mod policy;
pub mod store;
