//! Default-literal parsing.
use crate::value::{AttributeType, AttributeValue};

/// Parse a field's default literal as a value of `ty`.
///
/// Lists and sets take comma separated elements. Empty pieces are dropped
/// for numeric and boolean elements and kept for strings.
pub fn parse_default(literal: &str, ty: &AttributeType) -> Result<AttributeValue, String> {
    match ty {
        AttributeType::String => Ok(AttributeValue::string(literal)),
        AttributeType::Bool => parse_bool(literal).map(AttributeValue::bool),
        AttributeType::Int64 => parse_int(literal).map(AttributeValue::int64),
        AttributeType::Float64 => literal
            .trim()
            .parse::<f64>()
            .map(AttributeValue::float64)
            .map_err(|e| e.to_string()),
        AttributeType::List(elem) => {
            let items = parse_elements(literal, elem)?;
            AttributeValue::list(elem.as_ref().clone(), items).map_err(|e| e.to_string())
        }
        AttributeType::Set(elem) => {
            let items = parse_elements(literal, elem)?;
            AttributeValue::set(elem.as_ref().clone(), items).map_err(|e| e.to_string())
        }
        other => Err(format!("defaults are not supported for {other}")),
    }
}

fn parse_elements(literal: &str, elem: &AttributeType) -> Result<Vec<AttributeValue>, String> {
    let pieces = literal.split(',');
    match elem {
        AttributeType::String => Ok(pieces.map(AttributeValue::string).collect()),
        AttributeType::Int64 => pieces
            .filter(|p| !p.is_empty())
            .map(|p| parse_int(p).map(AttributeValue::int64))
            .collect(),
        AttributeType::Bool => pieces
            .filter(|p| !p.is_empty())
            .map(|p| parse_bool(p).map(AttributeValue::bool))
            .collect(),
        other => Err(format!("defaults are not supported for elements of type {other}")),
    }
}

fn parse_int(s: &str) -> Result<i64, String> {
    s.trim().parse::<i64>().map_err(|e| format!("`{s}`: {e}"))
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(format!("`{other}` is not a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_literals() {
        assert_eq!(parse_default("eu-west", &AttributeType::String), Ok(AttributeValue::string("eu-west")));
        assert_eq!(parse_default("T", &AttributeType::Bool), Ok(AttributeValue::bool(true)));
        assert_eq!(parse_default("42", &AttributeType::Int64), Ok(AttributeValue::int64(42)));
        assert!(parse_default("forty", &AttributeType::Int64).is_err());
    }

    #[test]
    fn list_and_set_literals() {
        let list = parse_default("1,,2", &AttributeType::list(AttributeType::Int64)).unwrap();
        assert_eq!(
            list,
            AttributeValue::list(
                AttributeType::Int64,
                vec![AttributeValue::int64(1), AttributeValue::int64(2)],
            )
            .unwrap()
        );
        let set = parse_default("a,b", &AttributeType::set(AttributeType::String)).unwrap();
        assert!(matches!(set, AttributeValue::Set { ref items, .. } if items.len() == 2));
        assert!(parse_default("a,a", &AttributeType::set(AttributeType::String)).is_err());
    }

    #[test]
    fn containers_of_records_have_no_default() {
        let err = parse_default("x", &AttributeType::map(AttributeType::String)).unwrap_err();
        assert_eq!(err, "defaults are not supported for map(string)");
    }
}
