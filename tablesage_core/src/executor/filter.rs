use std::cmp::Ordering;

use super::aggregate::{Accumulator, AggregateKind};
use crate::sql::error::{EngineError, EngineResult};
use crate::sql::types::Value;
use sqlparser::ast::{
    BinaryOperator, DuplicateTreatment, Expr, Function, FunctionArg, FunctionArgExpr,
    FunctionArguments, UnaryOperator, Value as SqlValue,
};

/// What an expression is evaluated against: one row, or every row of a group.
#[derive(Clone, Copy)]
pub enum Scope<'a> {
    Row(&'a [Value]),
    Group(&'a [&'a [Value]]),
}

pub struct ExpressionEvaluator {
    column_names: Vec<String>,
    qualifiers: Vec<String>,
}

impl ExpressionEvaluator {
    /// `qualifiers` are the names a column may be prefixed with (table name, alias).
    pub fn new(column_names: Vec<String>, qualifiers: Vec<String>) -> Self {
        Self {
            column_names,
            qualifiers,
        }
    }

    /// Evaluates a WHERE/HAVING predicate. Only a TRUE result keeps the row.
    pub fn predicate(&self, expr: &Expr, scope: Scope<'_>) -> EngineResult<bool> {
        let value = self.evaluate(expr, scope)?;
        Ok(truth(&value)?.unwrap_or(false))
    }

    pub fn evaluate(&self, expr: &Expr, scope: Scope<'_>) -> EngineResult<Value> {
        match expr {
            Expr::Identifier(ident) => self.column_value(&ident.value, scope),
            Expr::CompoundIdentifier(parts) => match parts.as_slice() {
                [qualifier, column] => {
                    let known = self
                        .qualifiers
                        .iter()
                        .any(|q| q.eq_ignore_ascii_case(&qualifier.value));
                    if !known {
                        return Err(EngineError::UnknownColumn(format!(
                            "{}.{}",
                            qualifier.value, column.value
                        )));
                    }
                    self.column_value(&column.value, scope)
                }
                _ => Err(EngineError::UnknownColumn(expr.to_string())),
            },
            Expr::Value(sql_val) => convert_sql_value(sql_val),
            Expr::Nested(inner) => self.evaluate(inner, scope),
            Expr::UnaryOp { op, expr } => {
                let value = self.evaluate(expr, scope)?;
                evaluate_unary_op(op, value)
            }
            Expr::BinaryOp { left, op, right } => self.evaluate_binary_op(left, op, right, scope),
            Expr::IsNull(inner) => Ok(Value::Boolean(self.evaluate(inner, scope)?.is_null())),
            Expr::IsNotNull(inner) => Ok(Value::Boolean(!self.evaluate(inner, scope)?.is_null())),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let needle = self.evaluate(expr, scope)?;
                if needle.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let candidate = self.evaluate(item, scope)?;
                    if candidate.is_null() {
                        saw_null = true;
                        continue;
                    }
                    if matches!(compare_values(&needle, &candidate), Ok(Ordering::Equal)) {
                        return Ok(Value::Boolean(!negated));
                    }
                }
                if saw_null {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Boolean(*negated))
                }
            }
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let value = self.evaluate(expr, scope)?;
                let low = self.evaluate(low, scope)?;
                let high = self.evaluate(high, scope)?;
                if value.is_null() || low.is_null() || high.is_null() {
                    return Ok(Value::Null);
                }
                let inside = compare_values(&value, &low)? != Ordering::Less
                    && compare_values(&value, &high)? != Ordering::Greater;
                Ok(Value::Boolean(inside != *negated))
            }
            Expr::Like {
                negated,
                expr,
                pattern,
                ..
            }
            | Expr::ILike {
                negated,
                expr,
                pattern,
                ..
            } => {
                let value = self.evaluate(expr, scope)?;
                let pattern = self.evaluate(pattern, scope)?;
                if value.is_null() || pattern.is_null() {
                    return Ok(Value::Null);
                }
                let matched = like_match(&value.to_string(), &pattern.to_string());
                Ok(Value::Boolean(matched != *negated))
            }
            Expr::Cast {
                expr, data_type, ..
            } => {
                let value = self.evaluate(expr, scope)?;
                cast_value(value, &data_type.to_string())
            }
            Expr::Trim {
                expr,
                trim_where: None,
                trim_what: None,
                ..
            } => match self.evaluate(expr, scope)? {
                Value::Null => Ok(Value::Null),
                other => Ok(Value::Text(other.to_string().trim().to_string())),
            },
            Expr::Function(func) => self.evaluate_function(func, scope),
            _ => Err(EngineError::Unsupported(format!("expression {}", expr))),
        }
    }

    fn resolve_column(&self, col_name: &str) -> EngineResult<usize> {
        if let Some(idx) = self.column_names.iter().position(|name| name == col_name) {
            return Ok(idx);
        }
        let mut matches = self
            .column_names
            .iter()
            .enumerate()
            .filter(|(_, name)| name.eq_ignore_ascii_case(col_name));
        match (matches.next(), matches.next()) {
            (Some((idx, _)), None) => Ok(idx),
            (Some(_), Some(_)) => Err(EngineError::AmbiguousColumn(col_name.to_string())),
            _ => Err(EngineError::UnknownColumn(col_name.to_string())),
        }
    }

    fn column_value(&self, col_name: &str, scope: Scope<'_>) -> EngineResult<Value> {
        let idx = self.resolve_column(col_name)?;
        let row = match scope {
            Scope::Row(row) => Some(row),
            Scope::Group(rows) => rows.first().copied(),
        };
        Ok(row
            .and_then(|values| values.get(idx))
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn evaluate_binary_op(
        &self,
        left: &Expr,
        op: &BinaryOperator,
        right: &Expr,
        scope: Scope<'_>,
    ) -> EngineResult<Value> {
        let left_val = self.evaluate(left, scope)?;
        let right_val = self.evaluate(right, scope)?;

        match op {
            BinaryOperator::And => {
                let (l, r) = (truth(&left_val)?, truth(&right_val)?);
                Ok(match (l, r) {
                    (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            BinaryOperator::Or => {
                let (l, r) = (truth(&left_val)?, truth(&right_val)?);
                Ok(match (l, r) {
                    (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            BinaryOperator::Gt
            | BinaryOperator::Lt
            | BinaryOperator::GtEq
            | BinaryOperator::LtEq
            | BinaryOperator::Eq
            | BinaryOperator::NotEq => {
                if left_val.is_null() || right_val.is_null() {
                    return Ok(Value::Null);
                }
                let ord = match (op, compare_values(&left_val, &right_val)) {
                    (_, Ok(ord)) => ord,
                    // values of unrelated types are simply unequal
                    (BinaryOperator::Eq, Err(_)) => return Ok(Value::Boolean(false)),
                    (BinaryOperator::NotEq, Err(_)) => return Ok(Value::Boolean(true)),
                    (_, Err(e)) => return Err(e),
                };
                Ok(Value::Boolean(match op {
                    BinaryOperator::Eq => ord == Ordering::Equal,
                    BinaryOperator::NotEq => ord != Ordering::Equal,
                    BinaryOperator::Gt => ord == Ordering::Greater,
                    BinaryOperator::Lt => ord == Ordering::Less,
                    BinaryOperator::GtEq => ord != Ordering::Less,
                    _ => ord != Ordering::Greater,
                }))
            }
            BinaryOperator::Plus
            | BinaryOperator::Minus
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Modulo => arithmetic(op, &left_val, &right_val),
            BinaryOperator::StringConcat => {
                if left_val.is_null() || right_val.is_null() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Text(format!("{}{}", left_val, right_val)))
                }
            }
            _ => Err(EngineError::Unsupported(format!("operator {}", op))),
        }
    }

    fn evaluate_function(&self, func: &Function, scope: Scope<'_>) -> EngineResult<Value> {
        let name = func.name.to_string().to_ascii_uppercase();
        let (args, distinct) = function_args(func)?;

        if let Some(kind) = AggregateKind::from_name(&name) {
            let rows = match scope {
                Scope::Group(rows) => rows,
                Scope::Row(_) => return Err(EngineError::AggregateMisuse(name)),
            };
            let mut acc = Accumulator::new(kind, &name, distinct);
            match args.as_slice() {
                [FunctionArgExpr::Wildcard] if kind == AggregateKind::Count => {
                    rows.iter().for_each(|_| acc.update_row());
                }
                [FunctionArgExpr::Expr(arg)] => {
                    for row in rows {
                        acc.update(self.evaluate(arg, Scope::Row(*row))?)?;
                    }
                }
                _ => {
                    return Err(EngineError::InvalidArgument(format!(
                        "wrong number of arguments to {}()",
                        name
                    )))
                }
            }
            return Ok(acc.finish());
        }

        let values = args
            .iter()
            .map(|arg| match arg {
                FunctionArgExpr::Expr(e) => self.evaluate(e, scope),
                _ => Err(EngineError::InvalidArgument(format!("'*' is not valid in {}()", name))),
            })
            .collect::<EngineResult<Vec<_>>>()?;

        scalar_function(&name, values)
    }
}

/// True when the expression contains an aggregate call anywhere inside it.
pub fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Function(func) => {
            if AggregateKind::from_name(&func.name.to_string()).is_some() {
                return true;
            }
            function_args(func)
                .map(|(args, _)| {
                    args.iter().any(|a| match a {
                        FunctionArgExpr::Expr(e) => contains_aggregate(e),
                        _ => false,
                    })
                })
                .unwrap_or(false)
        }
        Expr::Nested(e) | Expr::IsNull(e) | Expr::IsNotNull(e) => contains_aggregate(e),
        Expr::UnaryOp { expr, .. } | Expr::Cast { expr, .. } | Expr::Trim { expr, .. } => {
            contains_aggregate(expr)
        }
        Expr::BinaryOp { left, right, .. } => contains_aggregate(left) || contains_aggregate(right),
        Expr::InList { expr, list, .. } => {
            contains_aggregate(expr) || list.iter().any(contains_aggregate)
        }
        Expr::Between {
            expr, low, high, ..
        } => contains_aggregate(expr) || contains_aggregate(low) || contains_aggregate(high),
        Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
            contains_aggregate(expr) || contains_aggregate(pattern)
        }
        _ => false,
    }
}

fn function_args(func: &Function) -> EngineResult<(Vec<&FunctionArgExpr>, bool)> {
    match &func.args {
        FunctionArguments::None => Ok((Vec::new(), false)),
        FunctionArguments::Subquery(_) => {
            Err(EngineError::Unsupported(format!("subquery in {}", func.name)))
        }
        FunctionArguments::List(list) => {
            let distinct = matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct));
            let args = list
                .args
                .iter()
                .map(|arg| match arg {
                    FunctionArg::Unnamed(arg) => Ok(arg),
                    other => Err(EngineError::Unsupported(format!("named argument {}", other))),
                })
                .collect::<EngineResult<Vec<_>>>()?;
            Ok((args, distinct))
        }
    }
}

fn scalar_function(name: &str, values: Vec<Value>) -> EngineResult<Value> {
    let arity = |n: usize| -> EngineResult<()> {
        if values.len() == n {
            Ok(())
        } else {
            Err(EngineError::InvalidArgument(format!(
                "wrong number of arguments to {}()",
                name
            )))
        }
    };

    match name {
        "LOWER" | "UPPER" | "LENGTH" | "ABS" => {
            arity(1)?;
            let value = &values[0];
            if value.is_null() {
                return Ok(Value::Null);
            }
            Ok(match name {
                "LOWER" => Value::Text(value.to_string().to_lowercase()),
                "UPPER" => Value::Text(value.to_string().to_uppercase()),
                "LENGTH" => Value::Integer(value.to_string().chars().count() as i64),
                _ => match value {
                    Value::Integer(i) => Value::Integer(i.saturating_abs()),
                    other => Value::Float(numeric(other, name)?.abs()),
                },
            })
        }
        "ROUND" => {
            if values.is_empty() || values.len() > 2 {
                return Err(EngineError::InvalidArgument(
                    "wrong number of arguments to ROUND()".to_string(),
                ));
            }
            if values.iter().any(Value::is_null) {
                return Ok(Value::Null);
            }
            let x = numeric(&values[0], name)?;
            let digits = match values.get(1) {
                Some(d) => numeric(d, name)? as i32,
                None => 0,
            };
            let factor = 10f64.powi(digits);
            Ok(Value::Float((x * factor).round() / factor))
        }
        "COALESCE" | "IFNULL" => {
            if values.len() < 2 {
                return Err(EngineError::InvalidArgument(format!(
                    "{}() needs at least two arguments",
                    name
                )));
            }
            Ok(values
                .into_iter()
                .find(|v| !v.is_null())
                .unwrap_or(Value::Null))
        }
        "TRIM" => {
            arity(1)?;
            Ok(match &values[0] {
                Value::Null => Value::Null,
                other => Value::Text(other.to_string().trim().to_string()),
            })
        }
        _ => Err(EngineError::UnknownFunction(name.to_string())),
    }
}

fn convert_sql_value(sql_val: &SqlValue) -> EngineResult<Value> {
    match sql_val {
        SqlValue::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Integer(i))
            } else {
                n.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| EngineError::InvalidArgument(format!("bad number literal {}", n)))
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => Ok(Value::Text(s.clone())),
        SqlValue::Boolean(b) => Ok(Value::Boolean(*b)),
        SqlValue::Null => Ok(Value::Null),
        _ => Err(EngineError::Unsupported(format!("literal {}", sql_val))),
    }
}

fn evaluate_unary_op(op: &UnaryOperator, value: Value) -> EngineResult<Value> {
    match op {
        UnaryOperator::Not => Ok(match truth(&value)? {
            Some(b) => Value::Boolean(!b),
            None => Value::Null,
        }),
        UnaryOperator::Plus => Ok(value),
        UnaryOperator::Minus => match value {
            Value::Null => Ok(Value::Null),
            Value::Integer(i) => Ok(i
                .checked_neg()
                .map(Value::Integer)
                .unwrap_or(Value::Float(-(i as f64)))),
            other => Ok(Value::Float(-numeric(&other, "-")?)),
        },
        _ => Err(EngineError::Unsupported(format!("unary operator {}", op))),
    }
}

/// SQL truth value; numbers are true when non-zero.
fn truth(value: &Value) -> EngineResult<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Integer(i) => Ok(Some(*i != 0)),
        Value::Float(f) => Ok(Some(*f != 0.0)),
        Value::Text(s) => Err(EngineError::TypeMismatch(format!(
            "'{}' used as a boolean",
            s
        ))),
    }
}

fn numeric(value: &Value, context: &str) -> EngineResult<f64> {
    value.as_f64().ok_or_else(|| {
        EngineError::TypeMismatch(format!("'{}' is not numeric in {}", value, context))
    })
}

/// Compares two non-null values. Numeric text is coerced when the other side is a number.
pub fn compare_values(left: &Value, right: &Value) -> EngineResult<Ordering> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => Ok(l.cmp(r)),
        (Value::Text(l), Value::Text(r)) => Ok(l.cmp(r)),
        (Value::Boolean(l), Value::Boolean(r)) => Ok(l.cmp(r)),
        (Value::Null, Value::Null) => Ok(Ordering::Equal),
        (Value::Text(_), _) | (_, Value::Text(_)) => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => Ok(l.partial_cmp(&r).unwrap_or(Ordering::Equal)),
            _ => Err(EngineError::TypeMismatch(format!(
                "cannot compare '{}' with '{}'",
                left, right
            ))),
        },
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => Ok(l.partial_cmp(&r).unwrap_or(Ordering::Equal)),
            _ => Err(EngineError::TypeMismatch(format!(
                "cannot compare '{}' with '{}'",
                left, right
            ))),
        },
    }
}

fn arithmetic(op: &BinaryOperator, left: &Value, right: &Value) -> EngineResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    if let (Value::Integer(l), Value::Integer(r)) = (left, right) {
        let result = match op {
            BinaryOperator::Plus => l.checked_add(*r),
            BinaryOperator::Minus => l.checked_sub(*r),
            BinaryOperator::Multiply => l.checked_mul(*r),
            BinaryOperator::Divide if *r == 0 => return Ok(Value::Null),
            BinaryOperator::Divide => l.checked_div(*r),
            BinaryOperator::Modulo if *r == 0 => return Ok(Value::Null),
            _ => l.checked_rem(*r),
        };
        if let Some(v) = result {
            return Ok(Value::Integer(v));
        }
    }

    let context = op.to_string();
    let l = numeric(left, &context)?;
    let r = numeric(right, &context)?;
    Ok(match op {
        BinaryOperator::Plus => Value::Float(l + r),
        BinaryOperator::Minus => Value::Float(l - r),
        BinaryOperator::Multiply => Value::Float(l * r),
        _ if r == 0.0 => Value::Null,
        BinaryOperator::Divide => Value::Float(l / r),
        _ => Value::Float(l % r),
    })
}

fn cast_value(value: Value, target: &str) -> EngineResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let target = target.to_ascii_uppercase();
    if target.starts_with("INT") || target.starts_with("BIGINT") || target.starts_with("SMALLINT") {
        return Ok(match &value {
            Value::Integer(i) => Value::Integer(*i),
            other => other
                .as_f64()
                .map(|f| Value::Integer(f.trunc() as i64))
                .unwrap_or(Value::Integer(0)),
        });
    }
    if ["REAL", "FLOAT", "DOUBLE", "DECIMAL", "NUMERIC"]
        .iter()
        .any(|t| target.starts_with(t))
    {
        return Ok(Value::Float(value.as_f64().unwrap_or(0.0)));
    }
    if ["TEXT", "VARCHAR", "CHAR", "STRING"]
        .iter()
        .any(|t| target.starts_with(t))
    {
        return Ok(Value::Text(value.to_string()));
    }
    if target.starts_with("BOOL") {
        return Ok(Value::Boolean(match &value {
            Value::Text(s) => s.eq_ignore_ascii_case("true") || s.trim() == "1",
            other => other.as_f64().map(|f| f != 0.0).unwrap_or(false),
        }));
    }
    Err(EngineError::Unsupported(format!("CAST to {}", target)))
}

/// Case-insensitive LIKE with `%` and `_` wildcards.
pub fn like_match(value: &str, pattern: &str) -> bool {
    let value: Vec<char> = value.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    let (mut v, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while v < value.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == value[v]) {
            v += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, v));
            p += 1;
        } else if let Some((bp, bv)) = backtrack {
            p = bp + 1;
            v = bv + 1;
            backtrack = Some((bp, bv + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}
