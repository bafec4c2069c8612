use crate::sql::types::{DataType, Value};

/// Picks the narrowest type that every non-empty cell of a column parses as.
pub fn infer_type(cells: &[Option<String>]) -> DataType {
    let mut present = cells
        .iter()
        .filter_map(|c| c.as_deref().map(str::trim))
        .filter(|c| !c.is_empty())
        .peekable();

    if present.peek().is_none() {
        return DataType::Null;
    }

    let present: Vec<&str> = present.collect();
    if !present.iter().all(|c| is_numeric_literal(c)) {
        return if present
            .iter()
            .all(|c| c.eq_ignore_ascii_case("true") || c.eq_ignore_ascii_case("false"))
        {
            DataType::Boolean
        } else {
            DataType::Text
        };
    }

    if present.iter().all(|c| c.parse::<i64>().is_ok()) {
        DataType::Integer
    } else if present
        .iter()
        .all(|c| c.parse::<f64>().map(f64::is_finite).unwrap_or(false))
    {
        DataType::Float
    } else {
        DataType::Text
    }
}

/// Plain decimal notation: optional sign, digits with an optional fraction,
/// optional exponent. Words such as `nan` or `inf` and integer parts with a
/// leading zero (`02134`) are not numbers.
fn is_numeric_literal(cell: &str) -> bool {
    let unsigned = cell.strip_prefix(['+', '-']).unwrap_or(cell);
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(at) => (&unsigned[..at], Some(&unsigned[at + 1..])),
        None => (unsigned, None),
    };
    let (whole, fraction) = match mantissa.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (mantissa, None),
    };

    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let mantissa_ok = match fraction {
        Some(fraction) if whole.is_empty() => digits(fraction),
        Some(fraction) => digits(whole) && (fraction.is_empty() || digits(fraction)),
        None => digits(whole),
    };
    if !mantissa_ok || (whole.len() > 1 && whole.starts_with('0')) {
        return false;
    }
    match exponent {
        Some(exp) => digits(exp.strip_prefix(['+', '-']).unwrap_or(exp)),
        None => true,
    }
}

pub fn infer_column(cells: Vec<Option<String>>) -> Vec<Value> {
    let data_type = infer_type(&cells);
    cells
        .into_iter()
        .map(|cell| match cell {
            None => Value::Null,
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Value::Null;
                }
                match data_type {
                    DataType::Integer => trimmed.parse().map(Value::Integer).unwrap_or(Value::Null),
                    DataType::Float => trimmed.parse().map(Value::Float).unwrap_or(Value::Null),
                    DataType::Boolean => Value::Boolean(trimmed.eq_ignore_ascii_case("true")),
                    DataType::Text | DataType::Null => Value::Text(raw),
                }
            }
        })
        .collect()
}
