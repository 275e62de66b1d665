//! Plugin runtime IO server and session multiplexer
//!
//! This library hosts user-authored plugin extensions (tools, AI model
//! providers, HTTP endpoints, agent strategies) inside a sandboxed process
//! and lets them communicate bidirectionally with a controlling host
//! ("daemon"). The core of the library is the IO server: a
//! transport-agnostic layer that ingests framed JSON request envelopes over
//! stdio/TCP/HTTP, dispatches them to a worker pool, streams back
//! structured response events that may interleave nested backwards
//! invocations, and correlates replies via an in-process filtered fan-out
//! keyed by session id.
//!
//! # Architecture
//!
//! - `io_server`: framing, transports, the response writer, the request
//!   reader and filtered fan-out, the dispatcher, sessions, the
//!   backwards-invocation client, the worker pool, and the IO server itself.
//! - `registry`: the indexed map of loaded extension classes the dispatcher
//!   consults.
//! - `executor`: the concrete handlers that invoke user code and normalize
//!   its output, including blob-chunk streaming.
//! - `config`: configuration loading, environment/CLI overrides, validation.
//! - `error`: error types and the `Result` alias.
//! - `cli`: command-line interface definition.
//!
//! # Example
//!
//! ```no_run
//! use plugin_runtime::{Config, cli::Cli};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cli = Cli::default();
//!     let config = Config::load("config/config.yaml", &cli)?;
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod io_server;
pub mod registry;

pub use config::Config;
pub use error::{PluginRuntimeError, Result};
