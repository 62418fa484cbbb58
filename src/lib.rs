//! Core flow control for the Etch USB stepper-motor driver.
//!
//! The host streams one step pattern per byte over a virtual serial port. The
//! firmware buffers those bytes and, once per timer period, drives the two
//! motor nibble ports with the next pattern and reports the remaining command
//! depth back to the host so it can pace itself.
//!
//! | Module | Purpose |
//! | ------ | ------- |
//! | [`queue`] | Fixed-capacity byte ring used for commands and status |
//! | [`tick`] | Period edge polled by the control loop |
//! | [`motor`] | Nibble split of a step byte onto two output ports |
//! | [`link`] | Nonblocking byte contract towards the host |
//! | [`flow`] | The control loop tying everything together |
//!
//! Everything here is hardware independent; the firmware binary supplies the
//! STM32 implementations of the [`link::HostLink`], [`tick::Clock`] and
//! [`motor::OutputPort`] traits.

#![cfg_attr(not(test), no_std)]

// This must go first so the macros are visible to the other modules
mod fmt;

pub mod config;
pub mod flow;
pub mod link;
pub mod motor;
pub mod queue;
pub mod tick;

pub use flow::{FlowController, FlowStats, Iteration};
pub use link::{HostLink, PipeLink, WouldBlock};
pub use motor::{MotorOutputs, MotorSink, OutputPort, StepCommand};
pub use queue::ByteQueue;
pub use tick::{Clock, PeriodicTick, TickSource};
