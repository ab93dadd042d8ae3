//! # fraudgraph
//!
//! Application layer over `fraudgraph-core`: CSV dataset reading, TOML
//! configuration, the command line interface, and the HTTP API.

pub mod api;
pub mod cli;
pub mod config;
pub mod source;
