use std::collections::HashSet;

use crate::sql::error::{EngineError, EngineResult};
use crate::sql::types::{KeyPart, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateKind::Count),
            "SUM" => Some(AggregateKind::Sum),
            "AVG" => Some(AggregateKind::Avg),
            "MIN" => Some(AggregateKind::Min),
            "MAX" => Some(AggregateKind::Max),
            _ => None,
        }
    }
}

/// Running state for one aggregate call over one group.
pub struct Accumulator {
    kind: AggregateKind,
    name: String,
    count: i64,
    int_sum: i64,
    float_sum: f64,
    saw_float: bool,
    overflowed: bool,
    best: Option<Value>,
    seen: Option<HashSet<KeyPart>>,
}

impl Accumulator {
    pub fn new(kind: AggregateKind, name: &str, distinct: bool) -> Self {
        Self {
            kind,
            name: name.to_string(),
            count: 0,
            int_sum: 0,
            float_sum: 0.0,
            saw_float: false,
            overflowed: false,
            best: None,
            seen: distinct.then(HashSet::new),
        }
    }

    /// Counts a row for `COUNT(*)`.
    pub fn update_row(&mut self) {
        self.count += 1;
    }

    pub fn update(&mut self, value: Value) -> EngineResult<()> {
        if value.is_null() {
            return Ok(());
        }
        if let Some(seen) = &mut self.seen {
            if !seen.insert(KeyPart::from(&value)) {
                return Ok(());
            }
        }
        self.count += 1;

        match self.kind {
            AggregateKind::Count => {}
            AggregateKind::Sum | AggregateKind::Avg => self.add(&value)?,
            AggregateKind::Min | AggregateKind::Max => {
                let replace = match &self.best {
                    None => true,
                    Some(best) => {
                        let ord = value.sort_cmp(best);
                        if self.kind == AggregateKind::Min {
                            ord.is_lt()
                        } else {
                            ord.is_gt()
                        }
                    }
                };
                if replace {
                    self.best = Some(value);
                }
            }
        }
        Ok(())
    }

    fn add(&mut self, value: &Value) -> EngineResult<()> {
        match value {
            Value::Integer(i) if !self.saw_float && !self.overflowed => {
                match self.int_sum.checked_add(*i) {
                    Some(sum) => self.int_sum = sum,
                    None => self.overflowed = true,
                }
                self.float_sum += *i as f64;
            }
            other => {
                let n = other.as_f64().ok_or_else(|| {
                    EngineError::TypeMismatch(format!("{}() over non-numeric value '{}'", self.name, other))
                })?;
                if !matches!(other, Value::Integer(_)) {
                    self.saw_float = true;
                }
                self.float_sum += n;
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Value {
        match self.kind {
            AggregateKind::Count => Value::Integer(self.count),
            AggregateKind::Sum if self.count == 0 => Value::Null,
            AggregateKind::Sum if self.saw_float || self.overflowed => Value::Float(self.float_sum),
            AggregateKind::Sum => Value::Integer(self.int_sum),
            AggregateKind::Avg if self.count == 0 => Value::Null,
            AggregateKind::Avg => Value::Float(self.float_sum / self.count as f64),
            AggregateKind::Min | AggregateKind::Max => self.best.unwrap_or(Value::Null),
        }
    }
}
