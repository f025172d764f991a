//! Top-level orchestrator: wires the compiler and VM together behind a
//! single `interpret(source) -> InterpretResult` entry point.

use crate::config::Config;
use crate::tracer::{NoopTracer, StderrTracer, Tracer};
use crate::vm::Vm;

/// The outcome of one `interpret()` call. Compile and runtime failures are
/// not a Rust `Result::Err` — a REPL must survive either and keep accepting
/// lines, so the diagnostic text travels alongside an outcome code instead
/// of unwinding.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpretResult {
    Ok,
    /// One line per diagnostic; parsing continues past a single bad
    /// statement via panic-mode synchronization, so a single source file can
    /// report more than one compile error.
    CompileError(Vec<String>),
    /// The rendered error message plus stack trace, deepest frame first.
    RuntimeError(String),
}

impl InterpretResult {
    /// The file-runner exit code for this outcome (0/65/70).
    pub fn exit_code(&self) -> i32 {
        match self {
            InterpretResult::Ok => 0,
            InterpretResult::CompileError(_) => 65,
            InterpretResult::RuntimeError(_) => 70,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, InterpretResult::Ok)
    }
}

/// Owns a VM and its heap across many `interpret()` calls, so a REPL session
/// keeps its globals, classes, and GC state between lines.
pub struct Engine {
    vm: Vm,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Engine { vm: Vm::with_tracer(config, Box::new(NoopTracer)) }
    }

    /// An engine that logs every GC cycle to stderr, for `ivy-cli --trace-gc`.
    pub fn with_gc_tracing(config: Config) -> Self {
        Engine { vm: Vm::with_tracer(config, Box::new(StderrTracer)) }
    }

    pub fn with_tracer(config: Config, tracer: Box<dyn Tracer>) -> Self {
        Engine { vm: Vm::with_tracer(config, tracer) }
    }

    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        self.vm.interpret(source)
    }

    /// Compiles `source` and returns its bytecode disassembly without
    /// running it, for `ivy-cli --disassemble`.
    pub fn disassemble(&mut self, source: &str) -> Result<String, Vec<String>> {
        self.vm.disassemble(source)
    }

    /// Whatever guest `print` statements have written since the last call.
    /// The host (REPL/file runner) is responsible for forwarding this to its
    /// own stdout — the engine never writes to a stream directly.
    pub fn take_output(&mut self) -> String {
        self.vm.take_output()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
