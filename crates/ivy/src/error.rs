//! Host-facing error type.
//!
//! This is deliberately narrow: compile-time and run-time failures inside the
//! guest language are not represented here. A single `interpret()` call can
//! fail to compile, or fail at run time, and the host (REPL or file runner)
//! needs to keep going afterwards — that is an [`crate::engine::InterpretResult`]
//! outcome code plus diagnostics on the error sink, not a Rust `Result::Err`.
//! `Error` covers the host-side failures that genuinely end the operation:
//! reading a script from disk, and the engine's own allocator giving up.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read script {path}: {source}")]
    ReadSource {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("out of memory")]
    OutOfMemory,
}

pub type Result<T> = std::result::Result<T, Error>;
