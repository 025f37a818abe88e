//! procbridge pipe layer: framed pipes and the subprocess handle
//!
//! This crate moves lines between a parent and a child process:
//! - `ReadBuffer` / `WriteBuffer`: newline framing over non-blocking descriptors
//! - `Subprocess`: spawn a child wired to a request pipe and a response pipe,
//!   track its liveness, exchange one line at a time
//! - `ChildEndpoint`: the same pipes from inside the child
//!
//! Lines carry whatever the layer above puts in them; see `procbridge-core`
//! for the wire codec.

mod buffer;
mod endpoint;
pub mod fd;
mod process;

pub use buffer::{ReadBuffer, WriteBuffer};
pub use endpoint::ChildEndpoint;
pub use process::{Entrypoint, ProcessState, Subprocess, SubprocessConfig};
