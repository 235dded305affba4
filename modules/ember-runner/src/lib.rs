//! Command-line runner for ember training loops.
//!
//! Loads a [`config::Config`] from the environment and flags, wires an
//! engine with [`pipeline::build_engine`], and runs it from a fresh or
//! resumed state.

pub mod config;
pub mod pipeline;
