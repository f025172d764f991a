//! Single-pass compiler: scans tokens and emits bytecode directly, with no
//! intermediate AST. A Pratt parser drives expressions; a stack of
//! [`FunctionState`]s (one per nested `fun`/method currently being compiled)
//! stands in for clox's linked list of `Compiler` structs, and a stack of
//! [`ClassState`]s does the same for nested class bodies.

use crate::chunk::{Chunk, OpCode};
use crate::config::Config;
use crate::diagnostic::{format_compile_error, ErrorAt};
use crate::heap::Heap;
use crate::object::{ErasedGcRef, GcRef, ObjFunction, ObjString};
use crate::scanner::Scanner;
use crate::token::{Token, TokenKind};
use crate::tracer::Tracer;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Self {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call | Primary => Primary,
        }
    }
}

fn infix_precedence(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::BangEqual | TokenKind::EqualEqual => Precedence::Equality,
        TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
            Precedence::Comparison
        }
        TokenKind::Plus | TokenKind::Minus => Precedence::Term,
        TokenKind::Star | TokenKind::Slash => Precedence::Factor,
        TokenKind::LeftParen | TokenKind::Dot => Precedence::Call,
        _ => Precedence::None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
}

struct Local<'src> {
    name: Token<'src>,
    /// `None` while the variable's own initializer is still being compiled —
    /// reading it in that window is the "own initializer" edge case.
    depth: Option<u32>,
    is_captured: bool,
}

#[derive(Clone, Copy)]
struct UpvalueDescriptor {
    index: u8,
    is_local: bool,
}

struct FunctionState<'src> {
    name: Option<GcRef<ObjString>>,
    arity: u8,
    chunk: Chunk,
    function_type: FunctionType,
    locals: Vec<Local<'src>>,
    scope_depth: u32,
    upvalues: Vec<UpvalueDescriptor>,
}

impl<'src> FunctionState<'src> {
    fn new(function_type: FunctionType, name: Option<GcRef<ObjString>>) -> Self {
        // Slot 0 is reserved: the receiver for methods/initializers, otherwise
        // an unnamed slot the compiler never exposes to user code.
        let slot_zero = match function_type {
            FunctionType::Method | FunctionType::Initializer => "this",
            _ => "",
        };
        FunctionState {
            name,
            arity: 0,
            chunk: Chunk::new(),
            function_type,
            locals: vec![Local {
                name: Token { kind: TokenKind::Identifier, lexeme: slot_zero, line: 0 },
                depth: Some(0),
                is_captured: false,
            }],
            scope_depth: 0,
            upvalues: Vec::new(),
        }
    }
}

struct ClassState {
    has_superclass: bool,
}

fn synthetic_token(lexeme: &'static str) -> Token<'static> {
    Token { kind: TokenKind::Identifier, lexeme, line: 0 }
}

struct Compiler<'h, 'src> {
    scanner: Scanner<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    diagnostics: Vec<String>,
    heap: &'h mut Heap,
    tracer: &'h mut dyn Tracer,
    config: Config,
    states: Vec<FunctionState<'src>>,
    classes: Vec<ClassState>,
}

/// Compiles `source` into a top-level function ("the script"). On failure,
/// returns every diagnostic collected (parsing continues past each error via
/// panic-mode recovery, per spec.md §6's multi-error batching).
pub fn compile(
    source: &str,
    heap: &mut Heap,
    tracer: &mut dyn Tracer,
    config: Config,
) -> Result<GcRef<ObjFunction>, Vec<String>> {
    let mut compiler = Compiler::new(source, heap, tracer, config);
    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }
    let (function, _upvalues) = compiler.end_compiler();
    if compiler.had_error {
        Err(compiler.diagnostics)
    } else {
        Ok(function)
    }
}

impl<'h, 'src> Compiler<'h, 'src> {
    fn new(source: &'src str, heap: &'h mut Heap, tracer: &'h mut dyn Tracer, config: Config) -> Self {
        let dummy = Token { kind: TokenKind::Eof, lexeme: "", line: 0 };
        Compiler {
            scanner: Scanner::new(source),
            previous: dummy,
            current: dummy,
            had_error: false,
            panic_mode: false,
            diagnostics: Vec::new(),
            heap,
            tracer,
            config,
            states: vec![FunctionState::new(FunctionType::Script, None)],
            classes: Vec::new(),
        }
    }

    // -- token stream -------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.to_string();
            self.error_at_current(&message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // -- error handling -------------------------------------------------

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.error_at(token, message);
    }

    fn error(&mut self, message: &str) {
        let token = self.previous;
        self.error_at(token, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let at = if token.kind == TokenKind::Eof { ErrorAt::End } else { ErrorAt::Lexeme(token.lexeme) };
        self.diagnostics.push(format_compile_error(token.line, at, message));
        self.had_error = true;
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // -- chunk / constant emission -------------------------------------------------

    fn current_chunk(&self) -> &Chunk {
        &self.states.last().unwrap().chunk
    }

    fn current_chunk_mut(&mut self) -> &mut Chunk {
        &mut self.states.last_mut().unwrap().chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk_mut().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_bytes(&mut self, a: u8, b: u8) {
        self.emit_byte(a);
        self.emit_byte(b);
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.current_chunk().code.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk().code.len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let jump = self.current_chunk().code.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        let bytes = (jump as u16).to_be_bytes();
        let chunk = self.current_chunk_mut();
        chunk.code[offset] = bytes[0];
        chunk.code[offset + 1] = bytes[1];
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.current_chunk_mut().add_constant(value) {
            Some(index) => index,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let constant = self.make_constant(value);
        self.emit_bytes(OpCode::Constant as u8, constant);
    }

    fn emit_return(&mut self) {
        if self.states.last().unwrap().function_type == FunctionType::Initializer {
            self.emit_bytes(OpCode::GetLocal as u8, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    fn end_compiler(&mut self) -> (GcRef<ObjFunction>, Vec<UpvalueDescriptor>) {
        self.emit_return();

        if self.config.debug_print_code && !self.had_error {
            let state = self.states.last().unwrap();
            let name = state.name.map(|n| n.as_str().to_string()).unwrap_or_else(|| "script".to_string());
            eprint!("{}", crate::disasm::disassemble_chunk(&state.chunk, &name));
        }

        // Collect while `state` is still on `self.states`, so its
        // not-yet-rooted constants and name are covered by `gc_roots()`;
        // popping first would leave them unrooted for this window.
        self.maybe_collect();
        let state = self.states.pop().unwrap();
        let function = ObjFunction {
            arity: state.arity,
            upvalue_count: state.upvalues.len() as u8,
            name: state.name,
            chunk: state.chunk,
        };
        let handle = self.heap.alloc(function);
        (handle, state.upvalues)
    }

    // -- garbage collection -------------------------------------------------

    /// Allocating string constants during compilation can itself push the
    /// heap over its threshold. The VM's root set doesn't know about
    /// in-progress functions, so the compiler collects with its own roots
    /// (spec.md §4.5's requirement that the active compiler chain counts).
    fn maybe_collect(&mut self) {
        if self.heap.should_collect(self.config.debug_stress_gc) {
            let roots = self.gc_roots();
            self.heap.collect_garbage(roots, &mut *self.tracer);
        }
    }

    fn gc_roots(&self) -> Vec<ErasedGcRef> {
        let mut roots = Vec::new();
        for state in &self.states {
            if let Some(name) = state.name {
                roots.push(name.as_erased());
            }
            for constant in &state.chunk.constants {
                if let Value::Obj(obj) = constant {
                    roots.push(*obj);
                }
            }
        }
        roots
    }

    // -- scopes and variables -------------------------------------------------

    fn begin_scope(&mut self) {
        self.states.last_mut().unwrap().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let depth = {
            let state = self.states.last_mut().unwrap();
            state.scope_depth -= 1;
            state.scope_depth
        };
        loop {
            let should_pop =
                matches!(self.states.last().unwrap().locals.last(), Some(l) if l.depth.map_or(false, |d| d > depth));
            if !should_pop {
                break;
            }
            let is_captured = self.states.last().unwrap().locals.last().unwrap().is_captured;
            self.states.last_mut().unwrap().locals.pop();
            if is_captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
        }
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        self.maybe_collect();
        let handle = self.heap.intern(name);
        self.make_constant(Value::Obj(handle.as_erased()))
    }

    fn add_local(&mut self, name: Token<'src>) {
        if self.states.last().unwrap().locals.len() >= 256 {
            self.error("Too many local variables in function.");
            return;
        }
        self.states.last_mut().unwrap().locals.push(Local { name, depth: None, is_captured: false });
    }

    fn declare_variable(&mut self) {
        let depth = self.states.last().unwrap().scope_depth;
        if depth == 0 {
            return;
        }
        let name = self.previous;
        let mut conflict = false;
        for local in self.states.last().unwrap().locals.iter().rev() {
            if let Some(d) = local.depth {
                if d < depth {
                    break;
                }
            }
            if local.name.lexeme == name.lexeme {
                conflict = true;
                break;
            }
        }
        if conflict {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.states.last().unwrap().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.lexeme)
    }

    fn mark_initialized(&mut self) {
        let state = self.states.last_mut().unwrap();
        if state.scope_depth == 0 {
            return;
        }
        let depth = state.scope_depth;
        if let Some(local) = state.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.states.last().unwrap().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_bytes(OpCode::DefineGlobal as u8, global);
    }

    fn resolve_local(&mut self, state_idx: usize, name: &str) -> Option<usize> {
        let found = {
            let state = &self.states[state_idx];
            state
                .locals
                .iter()
                .enumerate()
                .rev()
                .find(|(_, l)| l.name.lexeme == name)
                .map(|(i, l)| (i, l.depth))
        };
        match found {
            Some((i, None)) => {
                self.error("Can't read local variable in its own initializer.");
                Some(i)
            }
            Some((i, Some(_))) => Some(i),
            None => None,
        }
    }

    fn add_upvalue(&mut self, state_idx: usize, index: u8, is_local: bool) -> u8 {
        let upvalues = &mut self.states[state_idx].upvalues;
        if let Some(pos) = upvalues.iter().position(|u| u.index == index && u.is_local == is_local) {
            return pos as u8;
        }
        if upvalues.len() >= 256 {
            self.error("Too many closure variables in function.");
            return 0;
        }
        upvalues.push(UpvalueDescriptor { index, is_local });
        (upvalues.len() - 1) as u8
    }

    fn resolve_upvalue(&mut self, state_idx: usize, name: &str) -> Option<u8> {
        if state_idx == 0 {
            return None;
        }
        let enclosing = state_idx - 1;
        if let Some(local) = self.resolve_local(enclosing, name) {
            self.states[enclosing].locals[local].is_captured = true;
            return Some(self.add_upvalue(state_idx, local as u8, true));
        }
        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(state_idx, upvalue, false));
        }
        None
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let idx = self.states.len() - 1;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(idx, name.lexeme) {
            (OpCode::GetLocal, OpCode::SetLocal, slot as u8)
        } else if let Some(upvalue) = self.resolve_upvalue(idx, name.lexeme) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, upvalue)
        } else {
            let constant = self.identifier_constant(name.lexeme);
            (OpCode::GetGlobal, OpCode::SetGlobal, constant)
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(set_op as u8, arg);
        } else {
            self.emit_bytes(get_op as u8, arg);
        }
    }

    // -- declarations -------------------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous;
        let name_constant = self.identifier_constant(class_name.lexeme);
        self.declare_variable();

        self.emit_bytes(OpCode::Class as u8, name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassState { has_superclass: false });

        if self.match_token(TokenKind::Extends) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            let superclass_name = self.previous;
            if superclass_name.lexeme == class_name.lexeme {
                self.error("A class can't inherit from itself.");
            }
            self.variable(false);

            self.begin_scope();
            self.add_local(synthetic_token("super"));
            self.define_variable(0);

            self.named_variable(class_name, false);
            self.emit_op(OpCode::Inherit);
            self.classes.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(class_name, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);

        if self.classes.last().unwrap().has_superclass {
            self.end_scope();
        }
        self.classes.pop();
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let method_name = self.previous.lexeme;
        let constant = self.identifier_constant(method_name);
        let function_type =
            if method_name == "init" { FunctionType::Initializer } else { FunctionType::Method };
        self.function(function_type);
        self.emit_bytes(OpCode::Method as u8, constant);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn function(&mut self, function_type: FunctionType) {
        let name = if function_type != FunctionType::Script {
            self.maybe_collect();
            Some(self.heap.intern(self.previous.lexeme))
        } else {
            None
        };
        self.states.push(FunctionState::new(function_type, name));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                {
                    let state = self.states.last_mut().unwrap();
                    state.arity += 1;
                }
                if self.states.last().unwrap().arity > 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let (function, upvalues) = self.end_compiler();
        let constant = self.make_constant(Value::Obj(function.as_erased()));
        self.emit_bytes(OpCode::Closure as u8, constant);
        for upvalue in upvalues {
            self.emit_byte(if upvalue.is_local { 1 } else { 0 });
            self.emit_byte(upvalue.index);
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    // -- statements -------------------------------------------------

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // No initializer clause.
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().code.len();
        let mut exit_jump: Option<usize> = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk().code.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }

        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.states.last().unwrap().function_type == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.states.last().unwrap().function_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    // -- expressions -------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        self.run_prefix(self.previous.kind, can_assign);

        while precedence <= infix_precedence(self.current.kind) {
            self.advance();
            self.run_infix(self.previous.kind, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn run_prefix(&mut self, kind: TokenKind, can_assign: bool) {
        match kind {
            TokenKind::LeftParen => self.grouping(),
            TokenKind::Minus | TokenKind::Bang => self.unary(),
            TokenKind::Number => self.number(),
            TokenKind::String => self.string(),
            TokenKind::Identifier => self.variable(can_assign),
            TokenKind::This => self.this_(),
            TokenKind::Super => self.super_(),
            TokenKind::True | TokenKind::False | TokenKind::Nil => self.literal(kind),
            _ => self.error("Expect expression."),
        }
    }

    fn run_infix(&mut self, kind: TokenKind, can_assign: bool) {
        match kind {
            TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Slash
            | TokenKind::Star
            | TokenKind::BangEqual
            | TokenKind::EqualEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => self.binary(),
            TokenKind::And => self.and_(),
            TokenKind::Or => self.or_(),
            TokenKind::LeftParen => self.call(),
            TokenKind::Dot => self.dot(can_assign),
            _ => unreachable!("infix_precedence admitted a token with no infix rule"),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!(),
        }
    }

    fn binary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(infix_precedence(operator).next());
        match operator {
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => unreachable!(),
        }
    }

    fn and_(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self) {
        let arg_count = self.argument_list();
        self.emit_bytes(OpCode::Call as u8, arg_count);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.identifier_constant(self.previous.lexeme);
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(OpCode::SetProperty as u8, name);
        } else if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_bytes(OpCode::Invoke as u8, name);
            self.emit_byte(arg_count);
        } else {
            self.emit_bytes(OpCode::GetProperty as u8, name);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u8 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count = count.wrapping_add(1);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count
    }

    fn literal(&mut self, kind: TokenKind) {
        match kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => unreachable!(),
        }
    }

    fn number(&mut self) {
        let value: f64 = self.previous.lexeme.parse().unwrap_or(f64::NAN);
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self) {
        let lexeme = self.previous.lexeme;
        let content = &lexeme[1..lexeme.len() - 1];
        self.maybe_collect();
        let handle = self.heap.intern(content);
        self.emit_constant(Value::Obj(handle.as_erased()));
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous, can_assign);
    }

    fn this_(&mut self) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.variable(false);
    }

    fn super_(&mut self) {
        if self.classes.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self.classes.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name = self.identifier_constant(self.previous.lexeme);

        self.named_variable(synthetic_token("this"), false);
        if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable(synthetic_token("super"), false);
            self.emit_bytes(OpCode::SuperInvoke as u8, name);
            self.emit_byte(arg_count);
        } else {
            self.named_variable(synthetic_token("super"), false);
            self.emit_bytes(OpCode::GetSuper as u8, name);
        }
    }
}
