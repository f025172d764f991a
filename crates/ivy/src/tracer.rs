//! Pluggable observation hooks.
//!
//! The engine never prints diagnostics on its own initiative beyond what
//! spec.md's external interfaces require (guest `print`, compile/runtime
//! error text). Everything else — GC cycles, instruction counts — goes
//! through a `Tracer` so a host can watch without the engine depending on
//! a logging crate it doesn't otherwise need.

/// Observes engine-internal events. The default [`NoopTracer`] costs nothing.
pub trait Tracer {
    /// Called just before a collection begins, with the current heap size in bytes.
    fn on_gc_begin(&mut self, _bytes_allocated: usize) {}

    /// Called just after a collection completes.
    fn on_gc_end(&mut self, _bytes_before: usize, _bytes_after: usize, _next_gc: usize) {}
}

/// Discards every event. The default for [`crate::engine::Engine`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Prints one line per collection to stderr. Used by tests and by
/// `ivy-cli --trace-gc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrTracer;

impl Tracer for StderrTracer {
    fn on_gc_begin(&mut self, bytes_allocated: usize) {
        eprintln!("-- gc begin ({bytes_allocated} bytes)");
    }

    fn on_gc_end(&mut self, bytes_before: usize, bytes_after: usize, next_gc: usize) {
        eprintln!(
            "-- gc end   collected {} bytes ({} -> {}), next at {}",
            bytes_before.saturating_sub(bytes_after),
            bytes_before,
            bytes_after,
            next_gc
        );
    }
}
