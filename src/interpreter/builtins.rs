use super::engine::type_mismatch;
use crate::ast::Value;
use crate::error::ScriptError;

fn expect_args(function: &str, args: &[Value], range: (usize, usize)) -> Result<(), ScriptError> {
    let (min, max) = range;
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(ScriptError::ArgumentCount {
            function: function.to_string(),
            expected,
            found: args.len(),
        });
    }
    Ok(())
}

fn expect_str(operation: &str, value: Value) -> Result<String, ScriptError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(type_mismatch(operation, "Str", other)),
    }
}

fn parse_number(text: &str) -> Result<f64, ScriptError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| ScriptError::InvalidNumber(text.to_string()))
}

/// Free functions: `len str int float bool abs`.
pub(super) fn call_function(name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    if !is_builtin(name) {
        return Err(ScriptError::UnknownFunction(name.to_string()));
    }
    expect_args(name, &args, (1, 1))?;
    let arg = args.into_iter().next();

    let value = match (name, arg) {
        ("len", Some(value)) => match value {
            Value::Str(s) => Value::Number(s.chars().count() as f64),
            Value::List(items) => Value::Number(items.len() as f64),
            Value::Map(map) => Value::Number(map.len() as f64),
            other => return Err(type_mismatch("len", "Str, List or Map", other)),
        },
        ("str", Some(value)) => Value::Str(value.to_string()),
        ("int", Some(value)) => match value {
            Value::Number(n) => Value::Number(n.trunc()),
            Value::Bool(b) => Value::Number(if b { 1.0 } else { 0.0 }),
            Value::Str(s) => Value::Number(
                s.trim()
                    .parse::<i64>()
                    .map_err(|_| ScriptError::InvalidNumber(s.clone()))? as f64,
            ),
            other => return Err(type_mismatch("int", "Number, Bool or Str", other)),
        },
        ("float", Some(value)) => match value {
            Value::Number(n) => Value::Number(n),
            Value::Bool(b) => Value::Number(if b { 1.0 } else { 0.0 }),
            Value::Str(s) => Value::Number(parse_number(&s)?),
            other => return Err(type_mismatch("float", "Number, Bool or Str", other)),
        },
        ("bool", Some(value)) => Value::Bool(value.is_truthy()),
        ("abs", Some(value)) => match value {
            Value::Number(n) => Value::Number(n.abs()),
            other => return Err(type_mismatch("abs", "Number", other)),
        },
        _ => return Err(ScriptError::UnknownFunction(name.to_string())),
    };
    Ok(value)
}

fn is_builtin(name: &str) -> bool {
    matches!(name, "len" | "str" | "int" | "float" | "bool" | "abs")
}

/// Methods on strings and maps.
pub(super) fn call_method(
    receiver: Value,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    match receiver {
        Value::Str(s) => string_method(s, method, args),
        Value::Map(map) => match method {
            "get" => {
                expect_args(method, &args, (1, 2))?;
                let mut args = args.into_iter();
                let key = args.next().map(|k| expect_str("get", k)).transpose()?;
                let default = args.next().unwrap_or(Value::Null);
                Ok(key
                    .and_then(|k| map.get(&k).cloned())
                    .unwrap_or(default))
            }
            "keys" => {
                expect_args(method, &args, (0, 0))?;
                Ok(Value::List(map.into_keys().map(Value::Str).collect()))
            }
            _ => Err(ScriptError::UnknownAttribute {
                type_name: "Map",
                attribute: method.to_string(),
            }),
        },
        other => Err(ScriptError::UnknownAttribute {
            type_name: other.type_name(),
            attribute: method.to_string(),
        }),
    }
}

fn string_method(s: String, method: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    let value = match method {
        "lower" => {
            expect_args(method, &args, (0, 0))?;
            Value::Str(s.to_lowercase())
        }
        "upper" => {
            expect_args(method, &args, (0, 0))?;
            Value::Str(s.to_uppercase())
        }
        "strip" => {
            expect_args(method, &args, (0, 0))?;
            Value::Str(s.trim().to_string())
        }
        "startswith" | "endswith" | "find" => {
            expect_args(method, &args, (1, 1))?;
            let needle = args
                .into_iter()
                .next()
                .map(|a| expect_str(method, a))
                .transpose()?
                .unwrap_or_default();
            match method {
                "startswith" => Value::Bool(s.starts_with(needle.as_str())),
                "endswith" => Value::Bool(s.ends_with(needle.as_str())),
                _ => Value::Number(match s.find(needle.as_str()) {
                    Some(byte_index) => s[..byte_index].chars().count() as f64,
                    None => -1.0,
                }),
            }
        }
        "replace" => {
            expect_args(method, &args, (2, 2))?;
            let mut args = args.into_iter().map(|a| expect_str(method, a));
            let from = args.next().transpose()?.unwrap_or_default();
            let to = args.next().transpose()?.unwrap_or_default();
            Value::Str(s.replace(from.as_str(), to.as_str()))
        }
        "split" => {
            expect_args(method, &args, (0, 1))?;
            let separator = args
                .into_iter()
                .next()
                .map(|a| expect_str(method, a))
                .transpose()?;
            let parts: Vec<Value> = match separator {
                Some(sep) if !sep.is_empty() => {
                    s.split(sep.as_str()).map(Value::from).collect()
                }
                _ => s.split_whitespace().map(Value::from).collect(),
            };
            Value::List(parts)
        }
        _ => {
            return Err(ScriptError::UnknownAttribute {
                type_name: "Str",
                attribute: method.to_string(),
            });
        }
    };
    Ok(value)
}
