//! The transport-agnostic IO server: framing, fan-out, dispatch, worker
//! pool, backwards invocations, and the two auxiliary wire encodings (blob
//! chunking, HTTP-over-bytes). See `SPEC_FULL.md` §§3-5 for the full shape;
//! `DESIGN.md` traces each submodule back to its grounding in the teacher
//! and the example pack.

pub mod backwards;
pub mod blob;
pub mod codec;
pub mod http_bytes;
pub mod model;
pub mod pool;
pub mod reader;
pub mod router;
pub mod server;
pub mod session;
pub mod transport;
pub mod writer;

pub use model::{Envelope, InboundEvent, InvokeType, OutboundEvent, SessionMessage};
pub use reader::RequestReader;
pub use router::Router;
pub use server::IoServer;
pub use session::Session;
pub use writer::ResponseWriter;
