//! Adapters: concrete implementations at the edge of the sensing core.
//!
//! | Adapter    | Implements        | Connects to                 |
//! |------------|-------------------|-----------------------------|
//! | `log_sink` | `Observer<bool>`  | Serial log output           |
//! | `nvs`      | config storage    | NVS / in-memory store       |
//!
//! GPIO and scheduler adapters live in [`crate::drivers`].

pub mod log_sink;
pub mod nvs;
