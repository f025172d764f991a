//! Diagnostic formatting shared by the compiler and the VM.
//!
//! Grounded on the original implementation's `error.c`: one line-oriented
//! formatter, reused by both error realms (spec.md §6, §7) rather than
//! duplicated between the compiler and the VM.

use std::fmt;

/// Where, relative to the token stream, a compile error was reported.
pub enum ErrorAt<'a> {
    Lexeme(&'a str),
    End,
}

/// `[line N] Error at 'lexeme': message` or `[line N] Error at end: message`,
/// exactly as spec.md §6 specifies.
pub fn format_compile_error(line: u32, at: ErrorAt<'_>, message: &str) -> String {
    match at {
        ErrorAt::Lexeme(lexeme) => format!("[line {line}] Error at '{lexeme}': {message}"),
        ErrorAt::End => format!("[line {line}] Error at end: {message}"),
    }
}

/// One entry of a runtime stack trace: `[line N] in script` or
/// `[line N] in name()`.
pub struct TraceFrame {
    pub line: u32,
    pub name: Option<String>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// Renders a runtime error: the message, then one [`TraceFrame`] per active
/// call, deepest first.
pub fn format_runtime_error(message: &str, frames: &[TraceFrame]) -> String {
    let mut out = String::new();
    out.push_str(message);
    out.push('\n');
    for frame in frames {
        out.push_str(&frame.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_compile_error_at_lexeme() {
        let msg = format_compile_error(3, ErrorAt::Lexeme("}"), "expect expression");
        assert_eq!(msg, "[line 3] Error at '}': expect expression");
    }

    #[test]
    fn formats_compile_error_at_end() {
        let msg = format_compile_error(7, ErrorAt::End, "expect '}' after block");
        assert_eq!(msg, "[line 7] Error at end: expect '}' after block");
    }

    #[test]
    fn formats_runtime_trace() {
        let frames = vec![
            TraceFrame { line: 4, name: Some("inner".to_string()) },
            TraceFrame { line: 9, name: None },
        ];
        let rendered = format_runtime_error("Undefined variable 'x'.", &frames);
        assert_eq!(
            rendered,
            "Undefined variable 'x'.\n[line 4] in inner()\n[line 9] in script\n"
        );
    }
}
