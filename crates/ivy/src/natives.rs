//! Native functions installed into every VM's global scope.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::value::Value;

/// Seconds since the process' UNIX epoch reference point, as an f64. Lets
/// guest code benchmark itself without the host needing its own timer API.
pub fn clock(_args: &[Value]) -> Result<Value, String> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| "system clock is before the UNIX epoch".to_string())?;
    Ok(Value::Number(elapsed.as_secs_f64()))
}

/// `(name, arity, function)` triples the VM defines as globals at startup.
pub const NATIVES: &[(&str, Option<u8>, crate::object::NativeFn)] = &[("clock", Some(0), clock)];
