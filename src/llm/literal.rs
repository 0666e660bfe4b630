//! Lenient parser for list-of-records model output.
//!
//! The span from the first `[` to the last `]` is parsed as a Python
//! expression, so prose or code fences around the list are ignored and any
//! Python literal spelling (raw, triple-quoted or adjacent strings, tuples,
//! trailing commas, `None`/`True`/`False`) is accepted. JSON's
//! `null`/`true`/`false` are read as the matching constants.

use rustpython_parser::ast;
use rustpython_parser::Parse;
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LiteralError {
    #[error("no list literal found")]
    NoList,
    #[error("invalid literal: {0}")]
    Syntax(String),
    #[error("unsupported {0} in literal")]
    Unsupported(String),
    #[error("expected a list, found {0}")]
    NotAList(Value),
    #[error("element {index} is not a mapping: {found}")]
    NotAMapping { index: usize, found: Value },
}

/// Parse `raw` as a list whose every element is a mapping with string keys.
pub fn parse_record_list(raw: &str) -> Result<Vec<Map<String, Value>>, LiteralError> {
    let span = match (raw.find('['), raw.rfind(']')) {
        (Some(s), Some(e)) if s < e => &raw[s..=e],
        _ => return Err(LiteralError::NoList),
    };

    let items = match parse_literal(span)? {
        Value::Array(items) => items,
        other => return Err(LiteralError::NotAList(other)),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(map),
            found => Err(LiteralError::NotAMapping { index, found }),
        })
        .collect()
}

/// Parse one literal expression into JSON.
pub fn parse_literal(src: &str) -> Result<Value, LiteralError> {
    match ast::Expr::parse(src, "<model output>") {
        Ok(expr) => to_value(expr),
        // Strict JSON is the only other shape models produce.
        Err(err) => serde_json::from_str(src).map_err(|_| LiteralError::Syntax(err.to_string())),
    }
}

fn to_value(expr: ast::Expr) -> Result<Value, LiteralError> {
    match expr {
        ast::Expr::List(ast::ExprList { elts, .. }) | ast::Expr::Tuple(ast::ExprTuple { elts, .. }) => {
            elts.into_iter().map(to_value).collect::<Result<Vec<_>, _>>().map(Value::Array)
        }
        ast::Expr::Dict(ast::ExprDict { keys, values, .. }) => {
            let mut map = Map::new();
            for (key, value) in keys.into_iter().zip(values) {
                // `**spread` entries carry no key.
                let key: Option<ast::Expr> = key.into();
                let key = match key.map(to_value).transpose()? {
                    Some(Value::String(key)) => key,
                    Some(other) => {
                        return Err(LiteralError::Unsupported(format!("mapping key {other}")))
                    }
                    None => return Err(LiteralError::Unsupported("mapping spread".to_string())),
                };
                map.insert(key, to_value(value)?);
            }
            Ok(Value::Object(map))
        }
        ast::Expr::Constant(ast::ExprConstant { value, .. }) => constant(value),
        ast::Expr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => {
            let number = match to_value(*operand)? {
                Value::Number(n) => n,
                other => return Err(LiteralError::Unsupported(format!("sign on {other}"))),
            };
            match op {
                ast::UnaryOp::UAdd => Ok(Value::Number(number)),
                ast::UnaryOp::USub => negate(&number),
                _ => Err(LiteralError::Unsupported("unary operator".to_string())),
            }
        }
        ast::Expr::Name(ast::ExprName { id, .. }) => match id.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            other => Err(LiteralError::Unsupported(format!("name '{other}'"))),
        },
        _ => Err(LiteralError::Unsupported("expression".to_string())),
    }
}

fn constant(value: ast::Constant) -> Result<Value, LiteralError> {
    match value {
        ast::Constant::None => Ok(Value::Null),
        ast::Constant::Bool(b) => Ok(Value::Bool(b)),
        ast::Constant::Str(s) => Ok(Value::String(s)),
        ast::Constant::Int(int) => {
            let digits = int.to_string();
            if let Ok(i) = digits.parse::<i64>() {
                Ok(Value::from(i))
            } else if let Ok(u) = digits.parse::<u64>() {
                Ok(Value::from(u))
            } else {
                float(digits.parse::<f64>().unwrap_or(f64::INFINITY))
            }
        }
        ast::Constant::Float(f) => float(f),
        ast::Constant::Tuple(items) => {
            items.into_iter().map(constant).collect::<Result<Vec<_>, _>>().map(Value::Array)
        }
        _ => Err(LiteralError::Unsupported("constant".to_string())),
    }
}

fn float(f: f64) -> Result<Value, LiteralError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| LiteralError::Unsupported(format!("non-finite number {f}")))
}

fn negate(number: &Number) -> Result<Value, LiteralError> {
    match (number.as_i64(), number.as_f64()) {
        (Some(i), _) if i != i64::MIN => Ok(Value::from(-i)),
        (_, Some(f)) => float(-f),
        _ => Err(LiteralError::Unsupported(format!("sign on {number}"))),
    }
}
