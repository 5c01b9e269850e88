//! recproxy: lifecycle manager for a local record/playback test proxy
//!
//! Test suites that record HTTP interactions route their traffic through a
//! local proxy. This crate makes that proxy available for a session:
//!
//! - **Acquire**: download and unpack the proxy build the repository pins
//! - **Trust**: merge the proxy's development certificate into a CA bundle
//!   and export it to the environment
//! - **Supervise**: reuse or spawn the proxy, poll it until ready, stop it
//! - **Sanitize**: register the rules that mask secrets in recordings
//! - **Config**: hierarchical TOML configuration plus environment inputs

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod acquire;
pub mod cli;
pub mod cli_handler;
pub mod client;
pub mod config;
pub mod platform;
pub mod repo;
pub mod sanitize;
pub mod session;
pub mod supervisor;
pub mod trust;
