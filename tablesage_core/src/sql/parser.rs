use super::error::{EngineError, EngineResult};
use super::types::{OrderKey, Projection, SelectQuery};
use sqlparser::ast::{
    self, Distinct, Expr, GroupByExpr, SelectItem, SetExpr, Statement as SqlStatement, TableFactor,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

pub struct Parser;

impl Parser {
    /// Parses exactly one SELECT statement into the engine's query shape.
    pub fn parse(sql: &str) -> EngineResult<SelectQuery> {
        let dialect = GenericDialect {};
        let statements = SqlParser::parse_sql(&dialect, sql)?;

        match statements.as_slice() {
            [] => Err(EngineError::Unsupported("no statements found".to_string())),
            [stmt] => Self::convert_statement(stmt),
            _ => Err(EngineError::Unsupported(
                "only a single statement can be executed".to_string(),
            )),
        }
    }

    fn convert_statement(stmt: &SqlStatement) -> EngineResult<SelectQuery> {
        let query = match stmt {
            SqlStatement::Query(query) => query,
            _ => {
                return Err(EngineError::Unsupported(
                    "only SELECT statements are allowed".to_string(),
                ))
            }
        };

        if query.with.is_some() {
            return Err(EngineError::Unsupported("WITH clauses".to_string()));
        }

        let select = match &*query.body {
            SetExpr::Select(select) => select,
            SetExpr::Query(_) => return Err(EngineError::Unsupported("nested queries".to_string())),
            other => return Err(EngineError::Unsupported(format!("query body {}", other))),
        };

        let (table, table_alias) = Self::convert_from(&select.from)?;

        let distinct = match &select.distinct {
            None => false,
            Some(Distinct::Distinct) => true,
            Some(Distinct::On(_)) => return Err(EngineError::Unsupported("DISTINCT ON".to_string())),
        };

        let projection = select
            .projection
            .iter()
            .map(Self::convert_select_item)
            .collect::<EngineResult<Vec<_>>>()?;

        let group_by = match &select.group_by {
            GroupByExpr::Expressions(exprs, ..) => exprs.clone(),
            GroupByExpr::All(..) => return Err(EngineError::Unsupported("GROUP BY ALL".to_string())),
        };

        let order_by = match &query.order_by {
            Some(order_by) => order_by
                .exprs
                .iter()
                .map(|o| OrderKey {
                    expr: o.expr.clone(),
                    ascending: o.asc.unwrap_or(true),
                })
                .collect(),
            None => Vec::new(),
        };

        let limit = query.limit.as_ref().map(|e| Self::convert_count(e, "LIMIT")).transpose()?;
        let offset = match &query.offset {
            Some(offset) => Self::convert_count(&offset.value, "OFFSET")?,
            None => 0,
        };

        Ok(SelectQuery {
            table,
            table_alias,
            distinct,
            projection,
            selection: select.selection.clone(),
            group_by,
            having: select.having.clone(),
            order_by,
            limit,
            offset,
        })
    }

    fn convert_from(from: &[ast::TableWithJoins]) -> EngineResult<(String, Option<String>)> {
        let table = match from {
            [] => return Err(EngineError::Unsupported("SELECT without FROM".to_string())),
            [table] => table,
            _ => return Err(EngineError::Unsupported("multiple tables in FROM".to_string())),
        };
        if !table.joins.is_empty() {
            return Err(EngineError::Unsupported("JOIN".to_string()));
        }
        match &table.relation {
            TableFactor::Table { name, alias, .. } => {
                let table_name = name
                    .0
                    .last()
                    .map(|ident| ident.value.clone())
                    .unwrap_or_default();
                Ok((table_name, alias.as_ref().map(|a| a.name.value.clone())))
            }
            other => Err(EngineError::Unsupported(format!("table reference {}", other))),
        }
    }

    fn convert_select_item(item: &SelectItem) -> EngineResult<Projection> {
        match item {
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => Ok(Projection::Wildcard),
            SelectItem::UnnamedExpr(expr) => Ok(Projection::Expr {
                expr: expr.clone(),
                name: Self::output_name(expr),
            }),
            SelectItem::ExprWithAlias { expr, alias } => Ok(Projection::Expr {
                expr: expr.clone(),
                name: alias.value.clone(),
            }),
        }
    }

    /// Bare and qualified column references keep the column name; anything else uses its SQL text.
    fn output_name(expr: &Expr) -> String {
        match expr {
            Expr::Identifier(ident) => ident.value.clone(),
            Expr::CompoundIdentifier(parts) => parts
                .last()
                .map(|ident| ident.value.clone())
                .unwrap_or_default(),
            other => other.to_string(),
        }
    }

    fn convert_count(expr: &Expr, clause: &str) -> EngineResult<usize> {
        match expr {
            Expr::Value(ast::Value::Number(n, _)) => n.parse::<usize>().map_err(|_| {
                EngineError::InvalidArgument(format!("{} must be a non-negative integer, got {}", clause, n))
            }),
            other => Err(EngineError::InvalidArgument(format!(
                "{} must be an integer literal, got {}",
                clause, other
            ))),
        }
    }
}
