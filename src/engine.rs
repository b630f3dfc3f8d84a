// # Compiler and engine interfaces
//
// The two collaborator traits the secure execution pipeline depends on.
// Neither has a real implementation in this crate — the SQL compiler and
// the columnar engine are out of scope — only the narrow contract
// `gateway::Query` needs.

use async_trait::async_trait;

use crate::error::Result;
use crate::relplan::Plan;

/// What kind of statement a compiled plan represents, classified from the
/// plan itself rather than by regexing the source SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Insert,
    Update,
    Delete,
    Ddl,
}

/// Compiles SQL text into a structured plan plus its statement kind. The
/// real compiler lives outside this crate; `demo::ToySqlCompiler` is a
/// fixture-only stand-in used by tests and the demo binary.
#[async_trait]
pub trait SqlCompiler: Send + Sync {
    async fn compile(&self, sql: &str) -> Result<(Plan, StatementKind)>;

    /// Re-serialize a rewritten plan back into whatever wire form `execute`
    /// expects. Most engines take the `Plan` directly; this indirection
    /// exists for engines that compile to a different execution form.
    async fn reserialize(&self, plan: &Plan) -> Result<Plan> {
        Ok(plan.clone())
    }
}

/// A forward-only result cursor.
pub trait Rows: Send {
    /// Column names, in output order.
    fn columns(&self) -> &[String];

    /// Advance and return the next row's cell values as display strings, or
    /// `None` when exhausted. A trait object keeps the gateway decoupled
    /// from the engine's native value representation.
    fn next_row(&mut self) -> Option<Vec<String>>;
}

/// Executes a structured plan against the lakehouse columnar engine. The
/// real engine lives outside this crate; `demo::ToyQueryEngine` is a
/// fixture-only stand-in.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute(&self, plan: &Plan) -> Result<Box<dyn Rows>>;
}
