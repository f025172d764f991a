//! Renders a [`Value`] the way guest `print` and the REPL's echoed result do.

use crate::object::{GcRef, ObjClosure, ObjFunction, ObjKind};
use crate::value::Value;

pub fn format_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Nil => "nil".to_string(),
        Value::Number(n) => format_number(*n),
        Value::Obj(obj) => match obj.kind() {
            ObjKind::Str => obj.downcast::<crate::object::ObjString>().unwrap().as_str().to_string(),
            ObjKind::Function => format_function(obj.downcast::<ObjFunction>().unwrap()),
            ObjKind::Native => "<native fn>".to_string(),
            ObjKind::Upvalue => "upvalue".to_string(),
            ObjKind::Closure => {
                let closure: GcRef<ObjClosure> = obj.downcast::<ObjClosure>().unwrap();
                format_function(closure.function)
            }
            ObjKind::Class => obj.downcast::<crate::object::ObjClass>().unwrap().name.as_str().to_string(),
            ObjKind::Instance => {
                let instance = obj.downcast::<crate::object::ObjInstance>().unwrap();
                format!("{} instance", instance.class.name.as_str())
            }
            ObjKind::BoundMethod => {
                let bound = obj.downcast::<crate::object::ObjBoundMethod>().unwrap();
                format_function(bound.method.function)
            }
        },
    }
}

fn format_function(function: GcRef<ObjFunction>) -> String {
    match function.name {
        Some(name) => format!("<fn {}>", name.as_str()),
        None => "<script>".to_string(),
    }
}

/// Matches the shortest round-trip style spec.md §6 calls for: `3`, not
/// `3.0`; `nan`/`inf` in lowercase for the non-finite cases.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n < 0.0 { "-inf".to_string() } else { "inf".to_string() }
    } else {
        format!("{n}")
    }
}
