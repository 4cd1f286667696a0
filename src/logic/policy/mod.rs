#![allow(dead_code)]

//! Policy Engine - Stateless Rule Evaluation
//!
//! Holds one merged `SecurityPolicy` and evaluates a single action at a
//! time. No I/O, no shared state - the Runtime Monitor owns the handle.

pub mod config;
pub mod engine;
pub mod types;

pub use config::{
    CostPolicy, FilesystemPolicy, NetworkPolicy, PolicyPatch, ProcessPolicy, SecurityPolicy,
};
pub use engine::PolicyEngine;
pub use types::{signatures, FileOp, ThreatDetection};
