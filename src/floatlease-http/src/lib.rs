//! # floatlease-http
//!
//! HTTP transport for the floatlease floating-license client, plus the
//! `floatlease` command-line tool. The wire format is plain JSON over
//! the lease server's `/api/v1` endpoints; all calls are blocking, so
//! the only background thread in the stack remains the core renewal
//! timer.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type

pub mod client;
pub mod wire;

pub use client::HttpTransport;
