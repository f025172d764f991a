//! `ivy` — the file runner, REPL, and bytecode disassembler for the Ivy
//! language. The engine itself only knows `interpret(source) -> InterpretResult`;
//! everything below (argument parsing, exit codes, prompting, printing) is
//! external collaborator, not engine behavior.

use std::io::{self, Write};
use std::process::ExitCode;

use ivy::{Config, Engine, Error, InterpretResult};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut disassemble = false;
    let mut trace_gc = false;
    let mut trace_execution = false;
    let mut stress_gc = false;
    let mut paths = Vec::new();

    for arg in args {
        match arg.as_str() {
            "--disassemble" => disassemble = true,
            "--trace-gc" => trace_gc = true,
            "--trace-execution" => trace_execution = true,
            "--stress-gc" => stress_gc = true,
            _ if arg.starts_with("--") => {
                eprintln!("Unknown flag '{arg}'.");
                return ExitCode::from(64);
            }
            other => paths.push(other.to_string()),
        }
    }

    if paths.len() > 1 {
        eprintln!("Usage: ivy [path] [--disassemble] [--trace-gc] [--trace-execution] [--stress-gc]");
        return ExitCode::from(64);
    }

    let config = Config::new().with_stress_gc(stress_gc);
    let mut config = config;
    config.debug_trace_execution = trace_execution;

    let mut engine = if trace_gc { Engine::with_gc_tracing(config) } else { Engine::new(config) };

    match paths.first() {
        None => run_repl(&mut engine, disassemble),
        Some(path) => run_file(&mut engine, path, disassemble),
    }
}

fn run_repl(engine: &mut Engine, disassemble: bool) -> ExitCode {
    let stdout = io::stdout();
    loop {
        {
            let mut handle = stdout.lock();
            let _ = write!(handle, "> ");
            let _ = handle.flush();
        }

        let mut line = String::new();
        let bytes_read = match io::stdin().read_line(&mut line) {
            Ok(n) => n,
            Err(err) => {
                eprintln!("could not read from stdin: {err}");
                return ExitCode::from(74);
            }
        };
        if bytes_read == 0 {
            println!();
            return ExitCode::SUCCESS;
        }

        if disassemble {
            match engine.disassemble(&line) {
                Ok(text) => print!("{text}"),
                Err(diagnostics) => {
                    for diagnostic in diagnostics {
                        eprintln!("{diagnostic}");
                    }
                }
            }
        }

        let result = engine.interpret(&line);
        print!("{}", engine.take_output());
        report(&result);
        // The REPL never exits on a guest-level error: each line is
        // independent, per spec.md's "both leaving the VM usable for the
        // next REPL line."
    }
}

fn run_file(engine: &mut Engine, path: &str, disassemble: bool) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            let error = Error::ReadSource { path: path.to_string(), source: err };
            eprintln!("{error}");
            return ExitCode::from(74);
        }
    };

    if disassemble {
        match engine.disassemble(&source) {
            Ok(text) => print!("{text}"),
            Err(diagnostics) => {
                for diagnostic in &diagnostics {
                    eprintln!("{diagnostic}");
                }
                return ExitCode::from(65);
            }
        }
    }

    let result = engine.interpret(&source);
    print!("{}", engine.take_output());
    let code = result.exit_code();
    report(&result);
    ExitCode::from(code as u8)
}

fn report(result: &InterpretResult) {
    match result {
        InterpretResult::Ok => {}
        InterpretResult::CompileError(diagnostics) => {
            for diagnostic in diagnostics {
                eprintln!("{diagnostic}");
            }
        }
        InterpretResult::RuntimeError(message) => {
            eprint!("{message}");
        }
    }
}
