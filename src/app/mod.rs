//! Application layer.
//!
//! The sensing core only talks to hardware through the **port traits** in
//! [`ports`]; [`startup`] wires concrete adapters to sensors at boot.

pub mod ports;
pub mod startup;
