//! Capacity-bounded servers and admission control.
//!
//! This crate provides:
//!
//! - [`Server`]: a request sink with a fixed capacity and a one-way
//!   alive → dead health transition on first overflow.
//! - [`AdmissionController`]: decides whether a server takes a request,
//!   under either the hard capacity check or fair-share shedding.
//! - [`rejection_probability`]: the fair-share shedding formula.

mod controller;
mod server;

pub use controller::{AdmissionController, Verdict, rejection_probability};
pub use server::Server;
