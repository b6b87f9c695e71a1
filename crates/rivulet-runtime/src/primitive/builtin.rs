//! Built-in primitives.

use serde_json::{Number, Value};

use super::FnPrimitive;
use crate::definition::{MAIN_PORT, OperatorDef, PortShape, Properties, PropertyDef, PropertyType};
use crate::error::{Error, Result};

type Func = fn(&Properties, Value) -> Result<Value>;

/// Forwards every message unchanged.
pub fn identity() -> FnPrimitive<Func> {
    let def = OperatorDef::new("identity")
        .with_description("Forwards every message unchanged")
        .with_in(MAIN_PORT, PortShape::Any)
        .with_out(MAIN_PORT, PortShape::Any);
    let func: Func = |_, value| Ok(value);
    FnPrimitive::new(def, func)
}

/// Emits the `value` property for every trigger.
pub fn constant() -> FnPrimitive<Func> {
    let def = OperatorDef::new("constant")
        .with_description("Emits the value property for every trigger")
        .with_property("value", PropertyDef::required(PropertyType::Any))
        .with_in(MAIN_PORT, PortShape::Trigger)
        .with_out(MAIN_PORT, PortShape::Any);
    let func: Func = |values, _| {
        values.get("value").cloned().ok_or_else(|| Error::UnresolvedProperty {
            operator: "constant".into(),
            property: "value".into(),
        })
    };
    FnPrimitive::new(def, func)
}

/// Adds the `a` and `b` entries of each message.
///
/// Integer sums stay integers unless they overflow.
pub fn add() -> FnPrimitive<Func> {
    let def = OperatorDef::new("add")
        .with_description("Adds the a and b entries of each message")
        .with_in(
            MAIN_PORT,
            PortShape::map([("a", PortShape::Number), ("b", PortShape::Number)]),
        )
        .with_out(MAIN_PORT, PortShape::Number);
    let func: Func = |_, value| sum(operand(&value, "a")?, operand(&value, "b")?);
    FnPrimitive::new(def, func)
}

fn operand<'a>(value: &'a Value, key: &str) -> Result<&'a Number> {
    value
        .get(key)
        .and_then(Value::as_number)
        .ok_or_else(|| Error::invalid_message("add:main", format!("'{key}' is not a number")))
}

fn sum(a: &Number, b: &Number) -> Result<Value> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64())
        && let Some(sum) = a.checked_add(b)
    {
        return Ok(Value::from(sum));
    }

    let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
    Number::from_f64(a + b)
        .map(Value::Number)
        .ok_or_else(|| Error::invalid_message("add:main", "sum is not a finite number"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn apply(primitive: &FnPrimitive<Func>, values: &Properties, value: Value) -> Result<Value> {
        (primitive.func)(values, value)
    }

    #[test]
    fn test_identity() {
        assert_eq!(apply(&identity(), &Properties::new(), json!([1, "x"])).unwrap(), json!([1, "x"]));
    }

    #[test]
    fn test_constant() {
        let mut values = Properties::new();
        values.insert("value".into(), json!("hi"));
        assert_eq!(apply(&constant(), &values, json!(null)).unwrap(), json!("hi"));
        assert!(apply(&constant(), &Properties::new(), json!(null)).is_err());
    }

    #[test]
    fn test_add() {
        let add = add();
        let none = Properties::new();
        assert_eq!(apply(&add, &none, json!({"a": 2, "b": 3})).unwrap(), json!(5));
        assert_eq!(apply(&add, &none, json!({"a": 0.5, "b": 1})).unwrap(), json!(1.5));
        assert_eq!(
            apply(&add, &none, json!({"a": i64::MAX, "b": 1})).unwrap(),
            json!(i64::MAX as f64 + 1.0)
        );
        assert!(matches!(
            apply(&add, &none, json!({"a": "x", "b": 1})),
            Err(Error::InvalidMessage { .. })
        ));
    }
}
