use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use sqlparser::ast::{Expr, Value as SqlValue};

use super::filter::{contains_aggregate, ExpressionEvaluator, Scope};
use crate::sql::error::{EngineError, EngineResult};
use crate::sql::parser::Parser;
use crate::sql::types::{row_key, KeyPart, OrderKey, Projection, SelectQuery, Value};
use crate::table::{to_records, CanonicalTable};

/// Column names and rows produced by a query, in result order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn records(&self) -> Vec<Map<String, JsonValue>> {
        to_records(&self.columns, &self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// In-memory relational engine. Tables are keyed by lowercase name.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    tables: HashMap<String, CanonicalTable>,
}

/// Rows a query projects from: plain rows, or groups of rows.
enum Source<'a> {
    Rows(Vec<&'a [Value]>),
    Groups(Vec<Vec<&'a [Value]>>),
}

impl Source<'_> {
    fn len(&self) -> usize {
        match self {
            Source::Rows(rows) => rows.len(),
            Source::Groups(groups) => groups.len(),
        }
    }

    fn scope(&self, i: usize) -> Scope<'_> {
        match self {
            Source::Rows(rows) => Scope::Row(rows[i]),
            Source::Groups(groups) => Scope::Group(&groups[i]),
        }
    }
}

#[derive(Clone, Copy)]
enum OutputColumn<'q> {
    Column(usize),
    Expr(&'q Expr),
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `table` under `name`, replacing any table already stored there.
    pub fn load_table(&mut self, name: &str, table: &CanonicalTable) {
        self.tables.insert(name.to_lowercase(), table.clone());
    }

    pub fn query(&self, sql: &str) -> EngineResult<ResultSet> {
        let query = Parser::parse(sql)?;
        self.run(&query)
    }

    fn run(&self, query: &SelectQuery) -> EngineResult<ResultSet> {
        let table = self
            .tables
            .get(&query.table.to_lowercase())
            .ok_or_else(|| EngineError::UnknownTable(query.table.clone()))?;

        let mut qualifiers = vec![query.table.clone()];
        qualifiers.extend(query.table_alias.clone());
        let evaluator = ExpressionEvaluator::new(table.columns().to_vec(), qualifiers);

        let mut filtered: Vec<&[Value]> = Vec::with_capacity(table.row_count());
        for row in table.rows() {
            let keep = match &query.selection {
                Some(predicate) => evaluator.predicate(predicate, Scope::Row(row))?,
                None => true,
            };
            if keep {
                filtered.push(row);
            }
        }

        let (columns, outputs) = output_columns(table, &query.projection);

        let source = if is_aggregate_query(query) {
            let keys = resolve_group_by(&query.group_by, table.columns(), &columns, &outputs)?;
            let groups = group_rows(&evaluator, &keys, filtered)?;
            let mut kept = Vec::with_capacity(groups.len());
            for group in groups {
                let keep = match &query.having {
                    Some(predicate) => evaluator.predicate(predicate, Scope::Group(&group))?,
                    None => true,
                };
                if keep {
                    kept.push(group);
                }
            }
            Source::Groups(kept)
        } else {
            Source::Rows(filtered)
        };

        let mut produced: Vec<(Vec<Value>, Vec<Value>)> = Vec::with_capacity(source.len());
        for i in 0..source.len() {
            let scope = source.scope(i);
            let row = outputs
                .iter()
                .map(|out| match out {
                    OutputColumn::Column(idx) => Ok(column_in_scope(scope, *idx)),
                    OutputColumn::Expr(expr) => evaluator.evaluate(expr, scope),
                })
                .collect::<EngineResult<Vec<_>>>()?;
            let keys = sort_keys(&evaluator, &query.order_by, &columns, &row, scope)?;
            produced.push((row, keys));
        }

        if query.distinct {
            let mut seen: HashSet<Vec<KeyPart>> = HashSet::new();
            produced.retain(|(row, _)| seen.insert(row_key(row)));
        }

        if !query.order_by.is_empty() {
            produced.sort_by(|(_, a), (_, b)| compare_keys(a, b, &query.order_by));
        }

        let rows = produced
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(row, _)| row)
            .collect();

        Ok(ResultSet { columns, rows })
    }
}

fn is_aggregate_query(query: &SelectQuery) -> bool {
    !query.group_by.is_empty()
        || query.having.is_some()
        || query.projection.iter().any(|p| match p {
            Projection::Expr { expr, .. } => contains_aggregate(expr),
            Projection::Wildcard => false,
        })
        || query.order_by.iter().any(|o| contains_aggregate(&o.expr))
}

/// GROUP BY terms resolve as an output ordinal, then an output alias that
/// does not shadow a source column, then an expression over the source row.
fn resolve_group_by<'q>(
    group_by: &'q [Expr],
    source_columns: &[String],
    names: &[String],
    outputs: &[OutputColumn<'q>],
) -> EngineResult<Vec<OutputColumn<'q>>> {
    group_by
        .iter()
        .map(|expr| {
            let resolved = match expr {
                Expr::Value(SqlValue::Number(n, _)) => {
                    let position = n.parse::<usize>().ok().filter(|p| (1..=outputs.len()).contains(p));
                    match position {
                        Some(p) => outputs[p - 1],
                        None => {
                            return Err(EngineError::InvalidArgument(format!(
                                "GROUP BY term {} is out of range, the result has {} columns",
                                n,
                                outputs.len()
                            )))
                        }
                    }
                }
                Expr::Identifier(ident) if output_position(source_columns, &ident.value).is_none() => {
                    match output_position(names, &ident.value) {
                        Some(idx) => outputs[idx],
                        None => OutputColumn::Expr(expr),
                    }
                }
                other => OutputColumn::Expr(other),
            };
            if let OutputColumn::Expr(inner) = resolved {
                if contains_aggregate(inner) {
                    return Err(EngineError::AggregateMisuse(format!(
                        "GROUP BY term {} refers to an aggregate",
                        expr
                    )));
                }
            }
            Ok(resolved)
        })
        .collect()
}

/// Groups rows by the GROUP BY key in first-seen order. Without GROUP BY
/// every row falls into one group, which exists even when there are no rows.
fn group_rows<'a>(
    evaluator: &ExpressionEvaluator,
    group_by: &[OutputColumn<'_>],
    rows: Vec<&'a [Value]>,
) -> EngineResult<Vec<Vec<&'a [Value]>>> {
    if group_by.is_empty() {
        return Ok(vec![rows]);
    }

    let mut index: HashMap<Vec<KeyPart>, usize> = HashMap::new();
    let mut groups: Vec<Vec<&'a [Value]>> = Vec::new();
    for row in rows {
        let key = group_by
            .iter()
            .map(|key| match key {
                OutputColumn::Column(idx) => Ok(column_in_scope(Scope::Row(row), *idx)),
                OutputColumn::Expr(expr) => evaluator.evaluate(expr, Scope::Row(row)),
            })
            .collect::<EngineResult<Vec<_>>>()?;
        let slot = *index.entry(row_key(&key)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row);
    }
    Ok(groups)
}

fn output_columns<'q>(table: &CanonicalTable, projection: &'q [Projection]) -> (Vec<String>, Vec<OutputColumn<'q>>) {
    let mut names = Vec::new();
    let mut outputs = Vec::new();
    for item in projection {
        match item {
            Projection::Wildcard => {
                for (idx, name) in table.columns().iter().enumerate() {
                    names.push(name.clone());
                    outputs.push(OutputColumn::Column(idx));
                }
            }
            Projection::Expr { expr, name } => {
                names.push(name.clone());
                outputs.push(OutputColumn::Expr(expr));
            }
        }
    }
    (names, outputs)
}

fn column_in_scope(scope: Scope<'_>, idx: usize) -> Value {
    let row = match scope {
        Scope::Row(row) => Some(row),
        Scope::Group(rows) => rows.first().copied(),
    };
    row.and_then(|r| r.get(idx)).cloned().unwrap_or(Value::Null)
}

/// ORDER BY terms resolve as an output ordinal, then an output column name,
/// then an expression over the source row or group.
fn sort_keys(
    evaluator: &ExpressionEvaluator,
    order_by: &[OrderKey],
    columns: &[String],
    row: &[Value],
    scope: Scope<'_>,
) -> EngineResult<Vec<Value>> {
    order_by
        .iter()
        .map(|key| match &key.expr {
            Expr::Value(SqlValue::Number(n, _)) => {
                let position = n.parse::<usize>().ok().filter(|p| (1..=row.len()).contains(p));
                match position {
                    Some(p) => Ok(row[p - 1].clone()),
                    None => Err(EngineError::InvalidArgument(format!(
                        "ORDER BY term {} is out of range, the result has {} columns",
                        n,
                        row.len()
                    ))),
                }
            }
            Expr::Identifier(ident) => match output_position(columns, &ident.value) {
                Some(idx) => Ok(row[idx].clone()),
                None => evaluator.evaluate(&key.expr, scope),
            },
            other => evaluator.evaluate(other, scope),
        })
        .collect()
}

fn output_position(columns: &[String], name: &str) -> Option<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
}

fn compare_keys(a: &[Value], b: &[Value], order_by: &[OrderKey]) -> Ordering {
    for ((x, y), key) in a.iter().zip(b).zip(order_by) {
        let ord = x.sort_cmp(y);
        let ord = if key.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
