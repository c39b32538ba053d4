//! Configuration for the prometheus-pusher CLI and server.
//!
//! The configuration is read from YAML files. See [`Config::from_path`] for how files are
//! located and merged, and [`Config::apply_override`] for overrides from the command line and the
//! environment.
#![warn(missing_docs)]

mod config;
mod resource;

pub use self::config::*;
pub use self::resource::*;
