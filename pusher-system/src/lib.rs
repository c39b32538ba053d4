//! Foundational process components for the pusher.
//!
//! The [`Controller`] owns the process lifecycle. It translates process signals into a
//! [`Shutdown`] broadcast and into reload notifications, which long running tasks observe through
//! a [`ShutdownHandle`] and a [`ReloadHandle`].
#![warn(missing_docs)]

mod controller;

pub use self::controller::*;
