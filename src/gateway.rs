// # Secure execution pipeline
//
// `Gateway::query` is the one entry point module G names: compile,
// admit, resolve, rewrite, execute, audit. Every step that can deny or fail
// produces exactly one audit entry before returning.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::audit::{ActionOutcome, AuditEntry, AuditLogger};
use crate::engine::{QueryEngine, Rows, SqlCompiler, StatementKind};
use crate::error::{GatewayError, Result};
use crate::policy::model::{MaskingFunction, Privilege};
use crate::policy::resolver::{PolicyResolver, SecurableChain};
use crate::policy::store::{PolicyStore, RequestContext};
use crate::relplan::predicate::combine_row_filters;
use crate::relplan::rewriter::rewrite;
use crate::relplan::walker::extract_table_names;
use crate::relplan::{BaseSchema, Expression, Plan, ReadRel};

/// Maps a resolved table name to the securable ids `PolicyResolver` needs.
/// Hierarchy lookup is catalog metadata, outside the resolver's own
/// dependency surface, so it is kept as a small side table here
/// rather than folded into `PolicyStore`.
#[derive(Clone, Default)]
pub struct TableCatalog {
    chains: Arc<RwLock<HashMap<String, SecurableChain>>>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, table_name: impl Into<String>, chain: SecurableChain) {
        self.chains.write().insert(table_name.into(), chain);
    }

    pub fn resolve(&self, table_name: &str) -> Option<SecurableChain> {
        self.chains.read().get(table_name).copied()
    }
}

pub struct Gateway<S: PolicyStore> {
    resolver: PolicyResolver<S>,
    catalog: TableCatalog,
    compiler: Arc<dyn SqlCompiler>,
    engine: Arc<dyn QueryEngine>,
    audit: Arc<AuditLogger>,
}

/// A masked result cursor: wraps the engine's rows and blanks out any
/// column this principal does not see unmasked.
struct MaskedRows {
    inner: Box<dyn Rows>,
    masked_columns: HashSet<usize>,
    functions: HashMap<usize, MaskingFunction>,
}

impl Rows for MaskedRows {
    fn columns(&self) -> &[String] {
        self.inner.columns()
    }

    fn next_row(&mut self) -> Option<Vec<String>> {
        let mut row = self.inner.next_row()?;
        for index in &self.masked_columns {
            if let Some(cell) = row.get_mut(*index) {
                *cell = apply_mask(self.functions[index], cell);
            }
        }
        Some(row)
    }
}

fn apply_mask(function: MaskingFunction, value: &str) -> String {
    match function {
        MaskingFunction::Null => String::new(),
        MaskingFunction::Redact => "****".to_string(),
        MaskingFunction::Hash => format!("#{:x}", simple_hash(value)),
        MaskingFunction::PartialReveal => {
            let tail: String = value.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            format!("***{tail}")
        }
    }
}

fn simple_hash(value: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in value.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

impl<S: PolicyStore + 'static> Gateway<S> {
    pub fn new(
        resolver: PolicyResolver<S>,
        catalog: TableCatalog,
        compiler: Arc<dyn SqlCompiler>,
        engine: Arc<dyn QueryEngine>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self { resolver, catalog, compiler, engine, audit }
    }

    /// Compile, admit, resolve, rewrite, execute, and audit one query
    ///.
    #[tracing::instrument(skip(self, sql), fields(principal = %principal_name))]
    pub async fn query(&self, ctx: &RequestContext, principal_name: &str, sql: &str) -> Result<Box<dyn Rows>> {
        if sql.trim().is_empty() {
            return Err(GatewayError::validation("empty sql"));
        }

        let start = std::time::Instant::now();
        let (plan, statement_kind) = self.compiler.compile(sql).await?;
        let tables = extract_table_names(&plan);

        let chains = self.resolve_chains(&tables)?;

        match statement_kind {
            StatementKind::Query => self.run_query(ctx, principal_name, sql, plan, tables, chains, start).await,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
                self.run_dml(ctx, principal_name, sql, statement_kind, plan, tables, chains, start).await
            }
            StatementKind::Ddl => self.run_ddl(ctx, principal_name, sql, plan, tables, chains, start).await,
        }
    }

    fn resolve_chains(&self, tables: &[String]) -> Result<HashMap<String, SecurableChain>> {
        let mut chains = HashMap::new();
        for table in tables {
            let chain = self
                .catalog
                .resolve(table)
                .ok_or_else(|| GatewayError::not_found(format!("table `{table}`")))?;
            chains.insert(table.clone(), chain);
        }
        Ok(chains)
    }

    async fn deny(
        &self,
        principal_name: &str,
        sql: &str,
        statement_kind: StatementKind,
        tables: Vec<String>,
        table: &str,
        start: std::time::Instant,
    ) -> GatewayError {
        self.audit
            .log(AuditEntry::new(
                Utc::now(),
                principal_name,
                sql,
                statement_kind,
                tables,
                elapsed_ms(start),
                ActionOutcome::Denied,
                Some(table.to_string()),
            ))
            .await;
        GatewayError::access_denied(table)
    }

    async fn run_query(
        &self,
        ctx: &RequestContext,
        principal_name: &str,
        sql: &str,
        plan: Plan,
        tables: Vec<String>,
        chains: HashMap<String, SecurableChain>,
        start: std::time::Instant,
    ) -> Result<Box<dyn Rows>> {
        for table in &tables {
            let chain = &chains[table];
            if !self.resolver.check_access(ctx, principal_name, chain).await? {
                return Err(self.deny(principal_name, sql, StatementKind::Query, tables, table, start).await);
            }
        }

        let mut rules_by_table: HashMap<String, Expression> = HashMap::new();
        let mut masks_by_table: HashMap<String, HashMap<String, MaskingFunction>> = HashMap::new();
        let mut rewritten_plan = plan;

        for table in &tables {
            let chain = &chains[table];
            let effective = self.resolver.effective_rules(ctx, principal_name, chain).await?;

            if !effective.row_filters.is_empty() {
                let schema = find_base_schema(&rewritten_plan, table)
                    .ok_or_else(|| GatewayError::validation(format!("`{table}` has no base schema")))?;
                if let Some(combined) = combine_row_filters(&mut rewritten_plan, &schema, &effective.row_filters)? {
                    rules_by_table.insert(table.clone(), combined);
                }
            }

            if !effective.column_masks.is_empty() {
                masks_by_table.insert(table.clone(), effective.column_masks);
            }
        }

        let rewritten_plan = rewrite(rewritten_plan, &rules_by_table)?;
        let executable_plan = self.compiler.reserialize(&rewritten_plan).await?;
        let rows = self.engine.execute(&executable_plan).await?;

        let rows = apply_column_masks(rows, &masks_by_table, &tables);

        self.audit
            .log(AuditEntry::new(
                Utc::now(),
                principal_name,
                sql,
                StatementKind::Query,
                tables,
                elapsed_ms(start),
                ActionOutcome::Success,
                None,
            ))
            .await;

        Ok(rows)
    }

    /// DML bypasses row filters and column masks entirely; it is admitted
    /// purely by privilege, classifying the statement from the compiled
    /// plan rather than gating it through the row-filter rewrite.
    async fn run_dml(
        &self,
        ctx: &RequestContext,
        principal_name: &str,
        sql: &str,
        statement_kind: StatementKind,
        plan: Plan,
        tables: Vec<String>,
        chains: HashMap<String, SecurableChain>,
        start: std::time::Instant,
    ) -> Result<Box<dyn Rows>> {
        let required = match statement_kind {
            StatementKind::Insert => Privilege::Insert,
            StatementKind::Update => Privilege::Update,
            StatementKind::Delete => Privilege::Delete,
            _ => unreachable!("run_dml only called for Insert/Update/Delete"),
        };

        for table in &tables {
            let chain = &chains[table];
            let admitted = self.resolver.check_privilege(ctx, principal_name, chain, required).await?;
            if !admitted {
                return Err(self.deny(principal_name, sql, statement_kind, tables, table, start).await);
            }
        }

        let rows = self.engine.execute(&plan).await?;
        self.audit
            .log(AuditEntry::new(
                Utc::now(),
                principal_name,
                sql,
                statement_kind,
                tables,
                elapsed_ms(start),
                ActionOutcome::Success,
                None,
            ))
            .await;
        Ok(rows)
    }

    /// DDL is admitted by `ManageCompute`/`AllPrivileges` on the touched
    /// securables and, like DML, never goes through RLS/masking rewriting.
    async fn run_ddl(
        &self,
        ctx: &RequestContext,
        principal_name: &str,
        sql: &str,
        plan: Plan,
        tables: Vec<String>,
        chains: HashMap<String, SecurableChain>,
        start: std::time::Instant,
    ) -> Result<Box<dyn Rows>> {
        for table in &tables {
            let chain = &chains[table];
            let admitted = self.resolver.check_privilege(ctx, principal_name, chain, Privilege::ManageCompute).await?;
            if !admitted {
                return Err(self.deny(principal_name, sql, StatementKind::Ddl, tables, table, start).await);
            }
        }

        let rows = self.engine.execute(&plan).await?;
        self.audit
            .log(AuditEntry::new(
                Utc::now(),
                principal_name,
                sql,
                StatementKind::Ddl,
                tables,
                elapsed_ms(start),
                ActionOutcome::Success,
                None,
            ))
            .await;
        Ok(rows)
    }
}

fn elapsed_ms(start: std::time::Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn find_base_schema(plan: &Plan, table: &str) -> Option<BaseSchema> {
    fn walk(rel: &crate::relplan::Rel, table: &str) -> Option<BaseSchema> {
        use crate::relplan::Rel;
        match rel {
            Rel::Read(ReadRel { named_table, base_schema, .. }) => {
                if named_table.resolved_name() == Some(table) {
                    base_schema.clone()
                } else {
                    None
                }
            }
            Rel::Project(r) => walk(&r.input, table),
            Rel::Filter(r) => walk(&r.input, table),
            Rel::Fetch(r) => walk(&r.input, table),
            Rel::Sort(r) => walk(&r.input, table),
            Rel::Aggregate(r) => walk(&r.input, table),
            Rel::Join(r) => walk(&r.left, table).or_else(|| walk(&r.right, table)),
            Rel::Cross(r) => walk(&r.left, table).or_else(|| walk(&r.right, table)),
            Rel::HashJoin(r) => walk(&r.left, table).or_else(|| walk(&r.right, table)),
            Rel::MergeJoin(r) => walk(&r.left, table).or_else(|| walk(&r.right, table)),
            Rel::Set(r) => r.inputs.iter().find_map(|input| walk(input, table)),
            Rel::ExtensionSingle(r) => walk(&r.input, table),
            Rel::ExtensionMulti(r) => r.inputs.iter().find_map(|input| walk(input, table)),
        }
    }

    plan.relations.iter().find_map(|relation| walk(relation.rel(), table))
}

fn apply_column_masks(
    rows: Box<dyn Rows>,
    masks_by_table: &HashMap<String, HashMap<String, MaskingFunction>>,
    tables: &[String],
) -> Box<dyn Rows> {
    let mut merged: HashMap<String, MaskingFunction> = HashMap::new();
    for table in tables {
        if let Some(masks) = masks_by_table.get(table) {
            for (column, function) in masks {
                merged.insert(column.clone(), *function);
            }
        }
    }
    if merged.is_empty() {
        return rows;
    }

    let mut masked_columns = HashSet::new();
    let mut functions = HashMap::new();
    for (index, name) in rows.columns().iter().enumerate() {
        if let Some(function) = merged.get(name) {
            masked_columns.insert(index);
            functions.insert(index, *function);
        }
    }

    Box::new(MaskedRows { inner: rows, masked_columns, functions })
}
