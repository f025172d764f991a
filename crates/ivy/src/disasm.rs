//! Chunk disassembly, shared by [`crate::config::Config::debug_trace_execution`]
//! and `ivy-cli --disassemble`.

use crate::chunk::{Chunk, OpCode};
use crate::object::ObjFunction;
use crate::printer::format_value;
use crate::value::Value;

pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {name} ==\n");
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, &mut out);
    }
    out
}

/// Disassembles one instruction at `offset`, appends its text to `out`, and
/// returns the offset of the next instruction.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    out.push_str(&format!("{offset:04} "));
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        out.push_str("   | ");
    } else {
        out.push_str(&format!("{:4} ", chunk.lines[offset]));
    }

    let byte = chunk.code[offset];
    let op = match OpCode::try_from(byte) {
        Ok(op) => op,
        Err(_) => {
            out.push_str(&format!("Unknown opcode {byte}\n"));
            return offset + 1;
        }
    };

    match op {
        OpCode::Constant => constant_instruction("OP_CONSTANT", chunk, offset, out),
        OpCode::Nil => simple_instruction("OP_NIL", offset, out),
        OpCode::True => simple_instruction("OP_TRUE", offset, out),
        OpCode::False => simple_instruction("OP_FALSE", offset, out),
        OpCode::Pop => simple_instruction("OP_POP", offset, out),
        OpCode::GetLocal => byte_instruction("OP_GET_LOCAL", chunk, offset, out),
        OpCode::SetLocal => byte_instruction("OP_SET_LOCAL", chunk, offset, out),
        OpCode::GetGlobal => constant_instruction("OP_GET_GLOBAL", chunk, offset, out),
        OpCode::DefineGlobal => constant_instruction("OP_DEFINE_GLOBAL", chunk, offset, out),
        OpCode::SetGlobal => constant_instruction("OP_SET_GLOBAL", chunk, offset, out),
        OpCode::GetUpvalue => byte_instruction("OP_GET_UPVALUE", chunk, offset, out),
        OpCode::SetUpvalue => byte_instruction("OP_SET_UPVALUE", chunk, offset, out),
        OpCode::GetProperty => constant_instruction("OP_GET_PROPERTY", chunk, offset, out),
        OpCode::SetProperty => constant_instruction("OP_SET_PROPERTY", chunk, offset, out),
        OpCode::GetSuper => constant_instruction("OP_GET_SUPER", chunk, offset, out),
        OpCode::Equal => simple_instruction("OP_EQUAL", offset, out),
        OpCode::Greater => simple_instruction("OP_GREATER", offset, out),
        OpCode::Less => simple_instruction("OP_LESS", offset, out),
        OpCode::Add => simple_instruction("OP_ADD", offset, out),
        OpCode::Subtract => simple_instruction("OP_SUBTRACT", offset, out),
        OpCode::Multiply => simple_instruction("OP_MULTIPLY", offset, out),
        OpCode::Divide => simple_instruction("OP_DIVIDE", offset, out),
        OpCode::Not => simple_instruction("OP_NOT", offset, out),
        OpCode::Negate => simple_instruction("OP_NEGATE", offset, out),
        OpCode::Print => simple_instruction("OP_PRINT", offset, out),
        OpCode::Jump => jump_instruction("OP_JUMP", 1, chunk, offset, out),
        OpCode::JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset, out),
        OpCode::Loop => jump_instruction("OP_LOOP", -1, chunk, offset, out),
        OpCode::Call => byte_instruction("OP_CALL", chunk, offset, out),
        OpCode::Invoke => invoke_instruction("OP_INVOKE", chunk, offset, out),
        OpCode::SuperInvoke => invoke_instruction("OP_SUPER_INVOKE", chunk, offset, out),
        OpCode::Closure => closure_instruction(chunk, offset, out),
        OpCode::CloseUpvalue => simple_instruction("OP_CLOSE_UPVALUE", offset, out),
        OpCode::Return => simple_instruction("OP_RETURN", offset, out),
        OpCode::Class => constant_instruction("OP_CLASS", chunk, offset, out),
        OpCode::Inherit => simple_instruction("OP_INHERIT", offset, out),
        OpCode::Method => constant_instruction("OP_METHOD", chunk, offset, out),
    }
}

fn simple_instruction(name: &str, offset: usize, out: &mut String) -> usize {
    out.push_str(name);
    out.push('\n');
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let slot = chunk.code[offset + 1];
    out.push_str(&format!("{name:<16} {slot:4}\n"));
    offset + 2
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let jump = (((chunk.code[offset + 1] as u16) << 8) | chunk.code[offset + 2] as u16) as i32;
    let target = offset as i32 + 3 + sign * jump;
    out.push_str(&format!("{name:<16} {offset:4} -> {target}\n"));
    offset + 3
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let constant = chunk.code[offset + 1];
    let value = &chunk.constants[constant as usize];
    out.push_str(&format!("{name:<16} {constant:4} '{}'\n", format_value(value)));
    offset + 2
}

fn invoke_instruction(name: &str, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let constant = chunk.code[offset + 1];
    let arg_count = chunk.code[offset + 2];
    let value = &chunk.constants[constant as usize];
    out.push_str(&format!("{name:<16} ({arg_count} args) {constant:4} '{}'\n", format_value(value)));
    offset + 3
}

fn closure_instruction(chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let mut cursor = offset + 1;
    let constant = chunk.code[cursor];
    cursor += 1;
    let value = &chunk.constants[constant as usize];
    out.push_str(&format!("{:<16} {constant:4} '{}'\n", "OP_CLOSURE", format_value(value)));

    if let Value::Obj(obj) = value {
        if let Some(function) = obj.downcast::<ObjFunction>() {
            for _ in 0..function.upvalue_count {
                let is_local = chunk.code[cursor];
                cursor += 1;
                let index = chunk.code[cursor];
                cursor += 1;
                let kind = if is_local == 1 { "local" } else { "upvalue" };
                out.push_str(&format!("{:04}      |                     {kind} {index}\n", cursor - 2));
            }
        }
    }
    cursor
}
