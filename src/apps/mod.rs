//! Applications running on top of the peripherals.
//!
//! The only application is the etch step loop.

pub mod etch_app;
