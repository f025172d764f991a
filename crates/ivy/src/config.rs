//! Runtime knobs for the engine.
//!
//! Grounded on the teacher's `sandbox::Limits`: a small, flat struct of the
//! few values spec.md actually names, not a general settings system.

/// Call frames are fixed-size; this is the hard cap before "Stack overflow".
pub const FRAMES_MAX: usize = 64;

/// A chunk's constant pool is addressed by a single byte.
pub const CONSTANTS_MAX: usize = 256;

/// The GC's initial collection threshold, in bytes.
pub const INITIAL_GC_THRESHOLD: usize = 1024 * 1024;

/// Heap-growth-driven trigger: after a collection, `next_gc = bytes_allocated * GC_HEAP_GROW_FACTOR`.
pub const GC_HEAP_GROW_FACTOR: usize = 2;

/// Debug toggles, carried over from the original C implementation's
/// `common.h` `#define`-guarded family. A reusable library can't bake these
/// into a compiled binary, so they become runtime fields instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    /// Force a collection before every allocation. Used to shake out GC bugs;
    /// spec.md's "GC safety" testable property exercises this.
    pub debug_stress_gc: bool,
    /// Emit one line per allocation/free/collection via the active [`crate::tracer::Tracer`].
    pub debug_log_gc: bool,
    /// Print the disassembly of every chunk the compiler produces.
    pub debug_print_code: bool,
    /// Print the disassembly of every instruction as it executes.
    pub debug_trace_execution: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stress_gc(mut self, stress: bool) -> Self {
        self.debug_stress_gc = stress;
        self
    }
}
