/*
gson:Value is roughly a mirror of serde_json::Value
with added support for the concept of "Absent" so we
can differentiate between Null literals and values that
were not provided by the user.

Objects keep their insertion order because sort arguments
and create inputs are order sensitive.
*/
use indexmap::IndexMap;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Absent,
    Null,
    Number(Number),
    String(String),
    Boolean(bool),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Absent and Null are both "no value" for optional inputs
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Absent | Self::Null)
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Object(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(x) => Some(x.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(Number::Integer(x)) => Some(*x),
            _ => None,
        }
    }

    /// Lists accept a single element in place of a one element list
    pub fn iter_list(&self) -> Vec<&Value> {
        match self {
            Self::Absent | Self::Null => vec![],
            Self::Array(x) => x.iter().filter(|v| !v.is_unset()).collect(),
            other => vec![other],
        }
    }

    pub fn get(&self, key: &str) -> &Value {
        match self {
            Self::Object(kv) => kv.get(key).unwrap_or(&Value::Absent),
            _ => &Value::Absent,
        }
    }
}

pub fn json_to_gson(val: &serde_json::Value) -> Result<Value, String> {
    use serde_json::Value as JsonValue;

    let v = match val {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(x) => Value::Boolean(*x),
        JsonValue::String(x) => Value::String(x.to_owned()),
        JsonValue::Array(x) => Value::Array(x.iter().map(json_to_gson).collect::<Result<_, _>>()?),
        JsonValue::Number(x) => match x.as_i64() {
            Some(num) => Value::Number(Number::Integer(num)),
            None => {
                let f_val: f64 = x
                    .as_f64()
                    .ok_or("Failed to handle numeric user input".to_string())?;
                Value::Number(Number::Float(f_val))
            }
        },
        JsonValue::Object(kv) => {
            let mut omap = IndexMap::new();
            for (key, v) in kv.iter() {
                omap.insert(key.to_owned(), json_to_gson(v)?);
            }
            Value::Object(omap)
        }
    };
    Ok(v)
}

pub fn gson_to_json(val: &Value) -> Result<serde_json::Value, String> {
    use serde_json::Value as JsonValue;

    let v = match val {
        Value::Absent => {
            return Err("Encountered `Absent` value while transforming between GraphQL intermediate object notation and JSON".to_string())
        }
        Value::Null => JsonValue::Null,
        Value::Boolean(x) => JsonValue::Bool(*x),
        Value::String(x) => JsonValue::String(x.to_owned()),
        Value::Array(x) => {
            JsonValue::Array(x.iter().map(gson_to_json).collect::<Result<_, _>>()?)
        }
        Value::Number(x) => match x {
            Number::Integer(y) => serde_json::json!(y),
            Number::Float(y) => serde_json::json!(y),
        },
        Value::Object(kv) => {
            let mut omap = serde_json::Map::new();
            for (key, v) in kv.iter().filter(|(_, v)| !v.is_absent()) {
                omap.insert(key.to_owned(), gson_to_json(v)?);
            }
            JsonValue::Object(omap)
        }
    };
    Ok(v)
}

/// Encodes a 64 bit integer the way the Bolt driver serialises `Integer`:
/// two's complement halves as signed 32 bit values.
pub fn int64_to_json(value: i64) -> serde_json::Value {
    let low = (value & 0xFFFF_FFFF) as u32 as i32;
    let high = (value >> 32) as i32;
    serde_json::json!({ "low": low, "high": high })
}

pub fn int64_from_pair(low: i32, high: i32) -> i64 {
    ((high as i64) << 32) | (low as u32 as i64)
}

/// Parses a BigInt scalar input (number or decimal string) into a `{low, high}` pair
pub fn bigint_to_json(val: &Value) -> Result<serde_json::Value, String> {
    match val {
        Value::Null => Ok(serde_json::Value::Null),
        Value::Number(Number::Integer(x)) => Ok(int64_to_json(*x)),
        Value::Number(Number::Float(x)) if x.fract() == 0.0 => Ok(int64_to_json(*x as i64)),
        Value::String(x) => x
            .trim()
            .parse::<i64>()
            .map(int64_to_json)
            .map_err(|_| format!("Value \"{}\" is not a valid BigInt", x)),
        Value::Array(items) => Ok(serde_json::Value::Array(
            items.iter().map(bigint_to_json).collect::<Result<_, _>>()?,
        )),
        _ => Err("Invalid input for BigInt type".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bigint_crossing_the_32_bit_boundary() {
        let encoded = bigint_to_json(&Value::String("2147483648".to_string())).unwrap();
        assert_eq!(encoded, serde_json::json!({"low": -2147483648, "high": 0}));

        let encoded = bigint_to_json(&Value::String("-2147483649".to_string())).unwrap();
        assert_eq!(encoded, serde_json::json!({"low": 2147483647, "high": -1}));

        let encoded = bigint_to_json(&Value::String("4294967296".to_string())).unwrap();
        assert_eq!(encoded, serde_json::json!({"low": 0, "high": 1}));
    }

    #[test]
    fn bigint_rejects_non_numeric_strings() {
        assert!(bigint_to_json(&Value::String("12ab".to_string())).is_err());
        assert!(bigint_to_json(&Value::Boolean(true)).is_err());
    }

    #[test]
    fn object_key_order_is_preserved() {
        let json = serde_json::json!({"title": "ASC", "runtime": "DESC", "id": "ASC"});
        let gson = json_to_gson(&json).unwrap();
        let keys: Vec<&String> = gson.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["title", "runtime", "id"]);
        assert_eq!(gson_to_json(&gson).unwrap(), json);
    }

    #[test]
    fn absent_members_are_dropped_from_json() {
        let mut obj = IndexMap::new();
        obj.insert("a".to_string(), Value::Absent);
        obj.insert("b".to_string(), Value::Null);
        let json = gson_to_json(&Value::Object(obj)).unwrap();
        assert_eq!(json, serde_json::json!({"b": null}));
    }

    proptest! {
        #[test]
        fn int64_pair_is_twos_complement(value in any::<i64>()) {
            let encoded = bigint_to_json(&Value::String(value.to_string())).unwrap();
            let low = encoded["low"].as_i64().unwrap() as i32;
            let high = encoded["high"].as_i64().unwrap() as i32;
            prop_assert_eq!(int64_from_pair(low, high), value);
        }
    }
}
