//! Stack-based bytecode virtual machine.
//!
//! Executes the [`crate::chunk::Chunk`]s the compiler produces with a flat
//! fetch-decode-execute loop. Runtime state — the value stack, call frames,
//! globals, and open upvalues — all lives here; the compiler never touches
//! any of it.

use std::cell::{Cell, RefCell};

use crate::chunk::OpCode;
use crate::config::Config;
use crate::diagnostic::{format_runtime_error, TraceFrame};
use crate::disasm;
use crate::engine::InterpretResult;
use crate::heap::Heap;
use crate::object::{
    ErasedGcRef, GcRef, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction, ObjInstance, ObjKind,
    ObjNative, ObjString, ObjUpvalue, UpvalueState,
};
use crate::printer::format_value;
use crate::table::Table;
use crate::tracer::Tracer;
use crate::value::Value;

struct CallFrame {
    closure: GcRef<ObjClosure>,
    ip: usize,
    slot_base: usize,
}

pub struct Vm {
    heap: Heap,
    frames: Vec<CallFrame>,
    stack: Vec<Value>,
    globals: Table,
    open_upvalues: Vec<GcRef<ObjUpvalue>>,
    init_string: GcRef<ObjString>,
    config: Config,
    tracer: Box<dyn Tracer>,
    print_buffer: String,
}

impl Vm {
    pub fn new(config: Config) -> Self {
        Self::with_tracer(config, Box::new(crate::tracer::NoopTracer))
    }

    pub fn with_tracer(config: Config, tracer: Box<dyn Tracer>) -> Self {
        let mut heap = Heap::new();
        let init_string = heap.intern("init");
        let mut vm = Vm {
            heap,
            frames: Vec::new(),
            stack: Vec::new(),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
            config,
            tracer,
            print_buffer: String::new(),
        };
        vm.define_natives();
        vm
    }

    fn define_natives(&mut self) {
        for &(name, arity, function) in crate::natives::NATIVES {
            let native = self.heap.alloc(ObjNative { name, arity, function });
            let interned = self.heap.intern(name);
            self.globals.set(interned, Value::Obj(native.as_erased()));
        }
    }

    /// Whatever guest `print` statements have written since the last call.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.print_buffer)
    }

    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let function = match crate::compiler::compile(source, &mut self.heap, &mut *self.tracer, self.config)
        {
            Ok(function) => function,
            Err(diagnostics) => return InterpretResult::CompileError(diagnostics),
        };

        self.maybe_collect();
        let closure = self.heap.alloc(ObjClosure { function, upvalues: Vec::new() });
        self.push(Value::Obj(closure.as_erased()));
        if let Err(message) = self.call_closure(closure, 0) {
            return self.runtime_error(&message);
        }
        self.run()
    }

    /// Compiles `source` without running it and returns the disassembly of
    /// its top-level chunk and every function nested inside it, for
    /// `ivy-cli --disassemble`.
    pub fn disassemble(&mut self, source: &str) -> Result<String, Vec<String>> {
        let function =
            crate::compiler::compile(source, &mut self.heap, &mut *self.tracer, self.config)?;
        let mut out = String::new();
        self.disassemble_function(function, &mut out);
        Ok(out)
    }

    fn disassemble_function(&self, function: GcRef<ObjFunction>, out: &mut String) {
        let name = function.name.map(|n| n.as_str().to_string()).unwrap_or_else(|| "script".to_string());
        out.push_str(&disasm::disassemble_chunk(&function.chunk, &name));
        for constant in &function.chunk.constants {
            if let Some(nested) = constant.as_obj().and_then(|o| o.downcast::<ObjFunction>()) {
                self.disassemble_function(nested, out);
            }
        }
    }

    // -- stack -------------------------------------------------

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("ivy: stack underflow")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    // -- bytecode reading -------------------------------------------------

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().unwrap();
        let byte = frame.closure.function.chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        ((hi as u16) << 8) | lo as u16
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte();
        self.frames.last().unwrap().closure.function.chunk.constants[index as usize]
    }

    fn read_string(&mut self) -> GcRef<ObjString> {
        self.read_constant().as_string().expect("ivy: string operand was not a string")
    }

    // -- garbage collection -------------------------------------------------

    fn maybe_collect(&mut self) {
        if self.heap.should_collect(self.config.debug_stress_gc) {
            let roots = self.gc_roots();
            self.heap.collect_garbage(roots, &mut *self.tracer);
        }
    }

    fn gc_roots(&self) -> Vec<ErasedGcRef> {
        let mut roots: Vec<ErasedGcRef> = self.stack.iter().filter_map(|v| v.as_obj()).collect();
        for frame in &self.frames {
            roots.push(frame.closure.as_erased());
        }
        for upvalue in &self.open_upvalues {
            roots.push(upvalue.as_erased());
        }
        roots.push(self.init_string.as_erased());
        self.globals.trace(&mut roots);
        roots
    }

    // -- errors -------------------------------------------------

    fn runtime_error(&mut self, message: &str) -> InterpretResult {
        let mut frames = Vec::with_capacity(self.frames.len());
        for frame in self.frames.iter().rev() {
            let function = frame.closure.function;
            let line = function.chunk.lines.get(frame.ip.saturating_sub(1)).copied().unwrap_or(0);
            let name = function.name.map(|n| n.as_str().to_string());
            frames.push(TraceFrame { line, name });
        }
        let rendered = format_runtime_error(message, &frames);
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
        InterpretResult::RuntimeError(rendered)
    }

    // -- calling -------------------------------------------------

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), String> {
        if let Value::Obj(obj) = callee {
            match obj.kind() {
                ObjKind::Closure => {
                    return self.call_closure(obj.downcast().unwrap(), arg_count);
                }
                ObjKind::Native => {
                    let native = obj.downcast::<ObjNative>().unwrap();
                    if let Some(arity) = native.arity {
                        if arity != arg_count {
                            return Err(format!("Expected {arity} arguments but got {arg_count}."));
                        }
                    }
                    let start = self.stack.len() - arg_count as usize;
                    let args: Vec<Value> = self.stack[start..].to_vec();
                    let result = (native.function)(&args)?;
                    self.stack.truncate(start - 1);
                    self.push(result);
                    return Ok(());
                }
                ObjKind::Class => {
                    let class: GcRef<ObjClass> = obj.downcast().unwrap();
                    let instance =
                        self.heap.alloc(ObjInstance { class, fields: RefCell::new(Table::new()) });
                    let start = self.stack.len() - arg_count as usize - 1;
                    self.stack[start] = Value::Obj(instance.as_erased());
                    let initializer = class.methods.borrow().get(self.init_string);
                    match initializer {
                        Some(Value::Obj(init_obj)) => {
                            return self.call_closure(init_obj.downcast().unwrap(), arg_count);
                        }
                        _ if arg_count != 0 => {
                            return Err(format!("Expected 0 arguments but got {arg_count}."));
                        }
                        _ => {}
                    }
                    return Ok(());
                }
                ObjKind::BoundMethod => {
                    let bound: GcRef<ObjBoundMethod> = obj.downcast().unwrap();
                    let start = self.stack.len() - arg_count as usize - 1;
                    self.stack[start] = bound.receiver;
                    return self.call_closure(bound.method, arg_count);
                }
                _ => {}
            }
        }
        Err("Can only call functions and classes.".to_string())
    }

    fn call_closure(&mut self, closure: GcRef<ObjClosure>, arg_count: u8) -> Result<(), String> {
        if arg_count != closure.function.arity {
            return Err(format!(
                "Expected {} arguments but got {}.",
                closure.function.arity, arg_count
            ));
        }
        if self.frames.len() >= crate::config::FRAMES_MAX {
            return Err("Stack overflow.".to_string());
        }
        let slot_base = self.stack.len() - arg_count as usize - 1;
        self.frames.push(CallFrame { closure, ip: 0, slot_base });
        Ok(())
    }

    fn bind_method(&mut self, class: GcRef<ObjClass>, name: GcRef<ObjString>) -> bool {
        let method = class.methods.borrow().get(name);
        if let Some(Value::Obj(obj)) = method {
            let closure: GcRef<ObjClosure> = obj.downcast().unwrap();
            // Collect while the receiver is still on the stack (and thus a
            // root); popping first would leave it unrooted for this window.
            self.maybe_collect();
            let receiver = self.pop();
            let bound = self.heap.alloc(ObjBoundMethod { receiver, method: closure });
            self.push(Value::Obj(bound.as_erased()));
            true
        } else {
            false
        }
    }

    fn invoke_from_class(
        &mut self,
        class: GcRef<ObjClass>,
        name: GcRef<ObjString>,
        arg_count: u8,
    ) -> Result<(), String> {
        let method = class
            .methods
            .borrow()
            .get(name)
            .ok_or_else(|| format!("Undefined property '{}'.", name.as_str()))?;
        match method {
            Value::Obj(obj) => self.call_closure(obj.downcast().unwrap(), arg_count),
            _ => unreachable!("ivy: method table only ever holds closures"),
        }
    }

    fn invoke(&mut self, name: GcRef<ObjString>, arg_count: u8) -> Result<(), String> {
        let receiver = self.peek(arg_count as usize);
        let instance: GcRef<ObjInstance> = receiver
            .as_obj()
            .and_then(|o| o.downcast())
            .ok_or_else(|| "Only instances have methods.".to_string())?;

        if let Some(value) = instance.fields.borrow().get(name) {
            let start = self.stack.len() - arg_count as usize - 1;
            self.stack[start] = value;
            return self.call_value(value, arg_count);
        }
        self.invoke_from_class(instance.class, name, arg_count)
    }

    // -- upvalues -------------------------------------------------

    fn capture_upvalue(&mut self, stack_index: usize) -> GcRef<ObjUpvalue> {
        for upvalue in &self.open_upvalues {
            if matches!(upvalue.state.get(), UpvalueState::Open(i) if i == stack_index) {
                return *upvalue;
            }
        }
        self.maybe_collect();
        let upvalue = self.heap.alloc(ObjUpvalue { state: Cell::new(UpvalueState::Open(stack_index)) });
        self.open_upvalues.push(upvalue);
        upvalue
    }

    fn close_upvalues(&mut self, from_index: usize) {
        let mut i = 0;
        while i < self.open_upvalues.len() {
            let upvalue = self.open_upvalues[i];
            if let UpvalueState::Open(idx) = upvalue.state.get() {
                if idx >= from_index {
                    upvalue.state.set(UpvalueState::Closed(self.stack[idx]));
                    self.open_upvalues.remove(i);
                    continue;
                }
            }
            i += 1;
        }
    }

    // -- the dispatch loop -------------------------------------------------

    fn trace_instruction(&self) {
        let mut stack_repr = String::from("          ");
        for value in &self.stack {
            stack_repr.push_str(&format!("[ {} ]", format_value(value)));
        }
        eprintln!("{stack_repr}");
        let frame = self.frames.last().unwrap();
        let mut out = String::new();
        disasm::disassemble_instruction(&frame.closure.function.chunk, frame.ip, &mut out);
        eprint!("{out}");
    }

    fn run(&mut self) -> InterpretResult {
        loop {
            if self.config.debug_trace_execution {
                self.trace_instruction();
            }

            let byte = self.read_byte();
            let op = match OpCode::try_from(byte) {
                Ok(op) => op,
                Err(byte) => return self.runtime_error(&format!("Unknown opcode {byte}.")),
            };

            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().unwrap().slot_base;
                    self.push(self.stack[base + slot]);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().unwrap().slot_base;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let name = self.read_string();
                    match self.globals.get(name) {
                        Some(value) => self.push(value),
                        None => {
                            return self
                                .runtime_error(&format!("Undefined variable '{}'.", name.as_str()))
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let value = self.pop();
                    self.globals.set(name, value);
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    let value = self.peek(0);
                    if self.globals.set(name, value) {
                        self.globals.delete(name);
                        return self
                            .runtime_error(&format!("Undefined variable '{}'.", name.as_str()));
                    }
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let upvalue = self.frames.last().unwrap().closure.upvalues[slot];
                    let value = match upvalue.state.get() {
                        UpvalueState::Open(idx) => self.stack[idx],
                        UpvalueState::Closed(v) => v,
                    };
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let upvalue = self.frames.last().unwrap().closure.upvalues[slot];
                    let value = self.peek(0);
                    match upvalue.state.get() {
                        UpvalueState::Open(idx) => self.stack[idx] = value,
                        UpvalueState::Closed(_) => upvalue.state.set(UpvalueState::Closed(value)),
                    }
                }
                OpCode::GetProperty => {
                    let name = self.read_string();
                    let receiver = self.peek(0);
                    let instance: Option<GcRef<ObjInstance>> =
                        receiver.as_obj().and_then(|o| o.downcast());
                    let instance = match instance {
                        Some(i) => i,
                        None => return self.runtime_error("Only instances have properties."),
                    };
                    if let Some(value) = instance.fields.borrow().get(name) {
                        self.pop();
                        self.push(value);
                    } else {
                        let class = instance.class;
                        if !self.bind_method(class, name) {
                            return self.runtime_error(&format!(
                                "Undefined property '{}'.",
                                name.as_str()
                            ));
                        }
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_string();
                    let value = self.peek(0);
                    let receiver = self.peek(1);
                    let instance: Option<GcRef<ObjInstance>> =
                        receiver.as_obj().and_then(|o| o.downcast());
                    let instance = match instance {
                        Some(i) => i,
                        None => return self.runtime_error("Only instances have fields."),
                    };
                    instance.fields.borrow_mut().set(name, value);
                    let value = self.pop();
                    self.pop();
                    self.push(value);
                }
                OpCode::GetSuper => {
                    let name = self.read_string();
                    let superclass = self
                        .pop()
                        .as_obj()
                        .and_then(|o| o.downcast::<ObjClass>())
                        .expect("ivy: OP_GET_SUPER operand is always a class");
                    if !self.bind_method(superclass, name) {
                        return self
                            .runtime_error(&format!("Undefined property '{}'.", name.as_str()));
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => {
                    if let Err(e) = self.binary_comparison(|a, b| a > b) {
                        return self.runtime_error(&e);
                    }
                }
                OpCode::Less => {
                    if let Err(e) = self.binary_comparison(|a, b| a < b) {
                        return self.runtime_error(&e);
                    }
                }
                OpCode::Add => {
                    if let Err(e) = self.add() {
                        return self.runtime_error(&e);
                    }
                }
                OpCode::Subtract => {
                    if let Err(e) = self.binary_arith(|a, b| a - b) {
                        return self.runtime_error(&e);
                    }
                }
                OpCode::Multiply => {
                    if let Err(e) = self.binary_arith(|a, b| a * b) {
                        return self.runtime_error(&e);
                    }
                }
                OpCode::Divide => {
                    if let Err(e) = self.binary_arith(|a, b| a / b) {
                        return self.runtime_error(&e);
                    }
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => match self.peek(0).as_number() {
                    Some(n) => {
                        self.pop();
                        self.push(Value::Number(-n));
                    }
                    None => return self.runtime_error("Operand must be a number."),
                },
                OpCode::Print => {
                    let value = self.pop();
                    self.print_buffer.push_str(&format_value(&value));
                    self.print_buffer.push('\n');
                }
                OpCode::Jump => {
                    let offset = self.read_u16();
                    self.frames.last_mut().unwrap().ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16();
                    if self.peek(0).is_falsey() {
                        self.frames.last_mut().unwrap().ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16();
                    self.frames.last_mut().unwrap().ip -= offset as usize;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte();
                    let callee = self.peek(arg_count as usize);
                    if let Err(message) = self.call_value(callee, arg_count) {
                        return self.runtime_error(&message);
                    }
                }
                OpCode::Invoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte();
                    if let Err(message) = self.invoke(name, arg_count) {
                        return self.runtime_error(&message);
                    }
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte();
                    let superclass = self
                        .pop()
                        .as_obj()
                        .and_then(|o| o.downcast::<ObjClass>())
                        .expect("ivy: OP_SUPER_INVOKE operand is always a class");
                    if let Err(message) = self.invoke_from_class(superclass, name, arg_count) {
                        return self.runtime_error(&message);
                    }
                }
                OpCode::Closure => {
                    let function: GcRef<ObjFunction> = self
                        .read_constant()
                        .as_obj()
                        .and_then(|o| o.downcast())
                        .expect("ivy: OP_CLOSURE operand is always a function");
                    let mut upvalues = Vec::with_capacity(function.upvalue_count as usize);
                    for _ in 0..function.upvalue_count {
                        let is_local = self.read_byte() == 1;
                        let index = self.read_byte();
                        if is_local {
                            let base = self.frames.last().unwrap().slot_base;
                            upvalues.push(self.capture_upvalue(base + index as usize));
                        } else {
                            let enclosing = self.frames.last().unwrap().closure;
                            upvalues.push(enclosing.upvalues[index as usize]);
                        }
                    }
                    self.maybe_collect();
                    let closure = self.heap.alloc(ObjClosure { function, upvalues });
                    self.push(Value::Obj(closure.as_erased()));
                }
                OpCode::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().unwrap();
                    self.close_upvalues(frame.slot_base);
                    self.stack.truncate(frame.slot_base);
                    if self.frames.is_empty() {
                        return InterpretResult::Ok;
                    }
                    self.push(result);
                }
                OpCode::Class => {
                    let name = self.read_string();
                    self.maybe_collect();
                    let class = self.heap.alloc(ObjClass { name, methods: RefCell::new(Table::new()) });
                    self.push(Value::Obj(class.as_erased()));
                }
                OpCode::Inherit => {
                    let superclass: Option<GcRef<ObjClass>> =
                        self.peek(1).as_obj().and_then(|o| o.downcast());
                    let superclass = match superclass {
                        Some(c) => c,
                        None => return self.runtime_error("Superclass must be a class."),
                    };
                    let subclass: GcRef<ObjClass> = self
                        .peek(0)
                        .as_obj()
                        .and_then(|o| o.downcast())
                        .expect("ivy: OP_INHERIT subclass operand is always a class");
                    superclass.methods.borrow().add_all(&mut subclass.methods.borrow_mut());
                    self.pop();
                }
                OpCode::Method => {
                    let name = self.read_string();
                    let method = self.peek(0);
                    let class: GcRef<ObjClass> = self
                        .peek(1)
                        .as_obj()
                        .and_then(|o| o.downcast())
                        .expect("ivy: OP_METHOD operand is always a class");
                    class.methods.borrow_mut().set(name, method);
                    self.pop();
                }
            }
        }
    }

    fn binary_arith(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => {
                self.push(Value::Number(op(x, y)));
                Ok(())
            }
            _ => Err("Operands must be numbers.".to_string()),
        }
    }

    fn binary_comparison(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => {
                self.push(Value::Bool(op(x, y)));
                Ok(())
            }
            _ => Err("Operands must be numbers.".to_string()),
        }
    }

    fn add(&mut self) -> Result<(), String> {
        let b = self.peek(0);
        let a = self.peek(1);
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            self.pop();
            self.pop();
            self.push(Value::Number(x + y));
            return Ok(());
        }
        if a.is_obj_kind(ObjKind::Str) && b.is_obj_kind(ObjKind::Str) {
            let sa = a.as_string().unwrap();
            let sb = b.as_string().unwrap();
            let mut combined = String::with_capacity(sa.as_str().len() + sb.as_str().len());
            combined.push_str(sa.as_str());
            combined.push_str(sb.as_str());
            self.pop();
            self.pop();
            self.maybe_collect();
            let handle = self.heap.intern(&combined);
            self.push(Value::Obj(handle.as_erased()));
            return Ok(());
        }
        Err("Operands must be two numbers or two strings.".to_string())
    }
}
