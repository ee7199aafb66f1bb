//! Operator semantics shared by expression evaluation.

use crate::ast::BinaryOp;
use crate::value::Value;

pub(super) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Eq => Value::Bool(loose_eq(left, right)),
        BinaryOp::NotEq => Value::Bool(!loose_eq(left, right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_eq(right)),
        BinaryOp::Lt => compare(left, right, |o| o.is_lt()),
        BinaryOp::LtEq => compare(left, right, |o| o.is_le()),
        BinaryOp::Gt => compare(left, right, |o| o.is_gt()),
        BinaryOp::GtEq => compare(left, right, |o| o.is_ge()),
        BinaryOp::In => Value::Bool(has_property(left, right)),
    }
}

/// `+` concatenates as soon as either side is a string.
fn add(left: &Value, right: &Value) -> Value {
    if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
        Value::string(format!("{}{}", left.to_key(), right.to_key()))
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

fn compare(left: &Value, right: &Value, pick: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    Value::Bool(ordering.is_some_and(pick))
}

/// Loose equality, minus the exotic object-to-primitive corners:
/// `null == undefined`, and mixed primitives compare as numbers.
pub(super) fn loose_eq(left: &Value, right: &Value) -> bool {
    if left.strict_eq(right) {
        return true;
    }
    match (left, right) {
        (Value::Null, Value::Undefined) | (Value::Undefined, Value::Null) => true,
        (Value::Number(_) | Value::Str(_) | Value::Bool(_), Value::Number(_) | Value::Str(_) | Value::Bool(_)) => {
            let a = left.to_number();
            let b = right.to_number();
            a == b
        }
        _ => false,
    }
}

/// `key in container`.
fn has_property(key: &Value, container: &Value) -> bool {
    let key = key.to_key();
    match container {
        Value::Object(obj) => obj.borrow().contains_key(&key),
        Value::Array(arr) => {
            key == "length"
                || key
                    .parse::<usize>()
                    .is_ok_and(|index| index < arr.borrow().len())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_prefers_concatenation() {
        let n = binary(BinaryOp::Add, &Value::Number(1.0), &Value::Number(2.0));
        assert_eq!(n, Value::Number(3.0));
        let s = binary(BinaryOp::Add, &Value::string("a"), &Value::Number(2.0));
        assert_eq!(s, Value::string("a2"));
    }

    #[test]
    fn loose_equality_bridges_null_and_undefined() {
        assert!(loose_eq(&Value::Null, &Value::Undefined));
        assert!(loose_eq(&Value::Number(1.0), &Value::string("1")));
        assert!(!loose_eq(&Value::Number(0.0), &Value::Undefined));
    }

    #[test]
    fn in_checks_presence_not_truthiness() {
        let obj = Value::object([("a", Value::Undefined)]);
        assert!(has_property(&Value::string("a"), &obj));
        assert!(!has_property(&Value::string("b"), &obj));
        let arr = Value::array([Value::Number(1.0)]);
        assert!(has_property(&Value::Number(0.0), &arr));
        assert!(!has_property(&Value::Number(1.0), &arr));
    }
}
