//! fixq - Failing-test queue CLI
//!
//! Thin layer over `fixq-core`: parses arguments, builds the queue from the
//! resolved configuration, runs one command and renders a [`output::Report`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod output;
