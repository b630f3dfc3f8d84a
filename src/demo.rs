// # Demo / test harness
//
// `ToySqlCompiler` and `ToyQueryEngine` are fixture-only stand-ins for the
// real SQL compiler and the real lakehouse columnar engine, both out of
// scope here. They exist so the secure execution pipeline (`gateway`)
// can be exercised end-to-end in tests and in the demo binary without a
// real engine. `ToySqlCompiler` understands exactly one shape —
// `SELECT <cols> FROM <table> [LIMIT n]` — via `sqlparser`, and DML/DDL
// statements for statement-kind classification; it builds no joins, no
// aggregates, no expressions beyond a bare column list.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlparser::ast::{SetExpr, Statement, TableFactor};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::engine::{QueryEngine, Rows, SqlCompiler, StatementKind};
use crate::error::{GatewayError, Result};
use crate::relplan::{Anchor, BaseSchema, Expression, Literal, NamedTable, Plan, PlanRelation, ReadRel, Rel};

#[derive(Clone, Default)]
pub struct ToySqlCompiler {
    schemas: Arc<RwLock<HashMap<String, BaseSchema>>>,
}

impl ToySqlCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&self, name: impl Into<String>, schema: BaseSchema) {
        self.schemas.write().insert(name.into(), schema);
    }
}

#[async_trait]
impl SqlCompiler for ToySqlCompiler {
    async fn compile(&self, sql: &str) -> Result<(Plan, StatementKind)> {
        let statements = Parser::parse_sql(&GenericDialect {}, sql)?;
        let statement = statements
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::validation("no statement parsed"))?;

        match statement {
            Statement::Query(query) => self.compile_query(&query),
            Statement::Insert { .. } => Ok((Plan::new(vec![]), StatementKind::Insert)),
            Statement::Update { .. } => Ok((Plan::new(vec![]), StatementKind::Update)),
            Statement::Delete { .. } => Ok((Plan::new(vec![]), StatementKind::Delete)),
            Statement::CreateTable { .. }
            | Statement::AlterTable { .. }
            | Statement::Drop { .. }
            | Statement::CreateIndex { .. } => Ok((Plan::new(vec![]), StatementKind::Ddl)),
            other => Err(GatewayError::validation(format!("unsupported statement: {other}"))),
        }
    }
}

impl ToySqlCompiler {
    fn compile_query(&self, query: &sqlparser::ast::Query) -> Result<(Plan, StatementKind)> {
        let SetExpr::Select(select) = query.body.as_ref() else {
            return Err(GatewayError::validation("only a plain SELECT is supported"));
        };
        let table = select
            .from
            .first()
            .ok_or_else(|| GatewayError::validation("SELECT with no FROM is not supported"))?;
        let TableFactor::Table { name, .. } = &table.relation else {
            return Err(GatewayError::validation("only a bare table reference is supported"));
        };
        let table_name = name.0.last().map(|ident| ident.value.clone()).ok_or_else(|| GatewayError::validation("empty table name"))?;

        let schema = self.schemas.read().get(&table_name).cloned();
        let names = schema
            .as_ref()
            .map(|s| s.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default();

        let read = Rel::Read(ReadRel { named_table: NamedTable::single(table_name), base_schema: schema, filter: None });

        let limit = query
            .limit
            .as_ref()
            .and_then(|expr| match expr {
                sqlparser::ast::Expr::Value(sqlparser::ast::Value::Number(n, _)) => n.parse::<u64>().ok(),
                _ => None,
            });

        let root = if let Some(limit) = limit {
            Rel::Fetch(crate::relplan::FetchRel { input: Box::new(read), offset: 0, limit: Some(limit) })
        } else {
            read
        };

        Ok((Plan::new(vec![PlanRelation::Root { input: root, names }]), StatementKind::Query))
    }
}

/// An in-memory table: fixed columns plus canned rows of typed values,
/// filtered in-process by whatever expression the rewriter injected.
#[derive(Clone)]
struct CannedTable {
    columns: Vec<String>,
    rows: Vec<Vec<Literal>>,
}

#[derive(Clone, Default)]
pub struct ToyQueryEngine {
    tables: Arc<RwLock<HashMap<String, CannedTable>>>,
}

impl ToyQueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&self, name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<Literal>>) {
        self.tables.write().insert(name.into(), CannedTable { columns, rows });
    }
}

struct CannedRows {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<Literal>>,
}

impl Rows for CannedRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Option<Vec<String>> {
        self.rows.next().map(|row| row.into_iter().map(display).collect())
    }
}

fn display(literal: Literal) -> String {
    match literal {
        Literal::I8(v) => v.to_string(),
        Literal::I16(v) => v.to_string(),
        Literal::I32(v) => v.to_string(),
        Literal::I64(v) => v.to_string(),
        Literal::Fp32(v) => v.to_string(),
        Literal::Fp64(v) => v.to_string(),
        Literal::Bool(v) => v.to_string(),
        Literal::String(v) | Literal::Varchar(v) | Literal::FixedChar(v) => v,
        Literal::Date(v) => v.to_string(),
        Literal::Timestamp(v) => v.to_string(),
        Literal::Decimal { precision, scale, .. } => format!("decimal({precision},{scale})"),
    }
}

#[async_trait]
impl QueryEngine for ToyQueryEngine {
    async fn execute(&self, plan: &Plan) -> Result<Box<dyn Rows>> {
        let relation = plan
            .relations
            .first()
            .ok_or_else(|| GatewayError::validation("plan has no relations to execute"))?;

        let (read, limit) = unwrap_read(relation.rel())?;
        let table_name = read
            .named_table
            .resolved_name()
            .ok_or_else(|| GatewayError::validation("read has no resolved table name"))?;

        let tables = self.tables.read();
        let table = tables.get(table_name).ok_or_else(|| GatewayError::not_found(format!("table `{table_name}`")))?;

        let mut matching: Vec<Vec<Literal>> = table
            .rows
            .iter()
            .filter(|row| match &read.filter {
                Some(expr) => matches!(eval(expr, plan, row), Literal::Bool(true)),
                None => true,
            })
            .cloned()
            .collect();

        if let Some(limit) = limit {
            matching.truncate(limit as usize);
        }

        Ok(Box::new(CannedRows { columns: table.columns.clone(), rows: matching.into_iter() }))
    }
}

fn unwrap_read(rel: &Rel) -> Result<(&ReadRel, Option<u64>)> {
    match rel {
        Rel::Read(read) => Ok((read, None)),
        Rel::Fetch(fetch) => match fetch.input.as_ref() {
            Rel::Read(read) => Ok((read, fetch.limit)),
            _ => Err(GatewayError::validation("toy engine only executes a bare Read, optionally under Fetch")),
        },
        _ => Err(GatewayError::validation("toy engine only executes a bare Read, optionally under Fetch")),
    }
}

fn eval(expr: &Expression, plan: &Plan, row: &[Literal]) -> Literal {
    match expr {
        Expression::Literal(l) => l.clone(),
        Expression::FieldRef(index) => row[*index].clone(),
        Expression::ScalarFunction { function_anchor, args, .. } => {
            let evaluated: Vec<Literal> = args.iter().map(|a| eval(a, plan, row)).collect();
            apply_function(*function_anchor, plan, &evaluated)
        }
    }
}

fn function_name(anchor: Anchor, plan: &Plan) -> &str {
    plan.extensions
        .iter()
        .find(|f| f.anchor == anchor)
        .map(|f| f.function_name.as_str())
        .unwrap_or("")
}

fn apply_function(anchor: Anchor, plan: &Plan, args: &[Literal]) -> Literal {
    let name = function_name(anchor, plan);
    let op = name.split(':').next().unwrap_or("");

    if op == "and" {
        let all_true = args.iter().all(|a| matches!(a, Literal::Bool(true)));
        return Literal::Bool(all_true);
    }

    let ordering = compare(&args[0], &args[1]);
    let result = match (op, ordering) {
        ("equal", Some(std::cmp::Ordering::Equal)) => true,
        ("not_equal", Some(ord)) => ord != std::cmp::Ordering::Equal,
        ("lt", Some(std::cmp::Ordering::Less)) => true,
        ("lte", Some(ord)) => ord != std::cmp::Ordering::Greater,
        ("gt", Some(std::cmp::Ordering::Greater)) => true,
        ("gte", Some(ord)) => ord != std::cmp::Ordering::Less,
        _ => false,
    };
    Literal::Bool(result)
}

fn compare(a: &Literal, b: &Literal) -> Option<std::cmp::Ordering> {
    use Literal::*;
    match (a, b) {
        (I8(x), I8(y)) => x.partial_cmp(y),
        (I16(x), I16(y)) => x.partial_cmp(y),
        (I32(x), I32(y)) => x.partial_cmp(y),
        (I64(x), I64(y)) => x.partial_cmp(y),
        (Fp32(x), Fp32(y)) => x.partial_cmp(y),
        (Fp64(x), Fp64(y)) => x.partial_cmp(y),
        (Bool(x), Bool(y)) => x.partial_cmp(y),
        (String(x), String(y)) | (Varchar(x), Varchar(y)) | (FixedChar(x), FixedChar(y)) => x.partial_cmp(y),
        (Date(x), Date(y)) => x.partial_cmp(y),
        (Timestamp(x), Timestamp(y)) => x.partial_cmp(y),
        _ => None,
    }
}
