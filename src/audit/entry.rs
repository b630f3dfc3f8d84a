// # Audit entry shape
//
// The persistent record one query produces, independent
// of whether the query was admitted, rewritten, or denied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::StatementKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Success,
    Denied,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub principal: String,
    pub sql: String,
    pub statement_kind: String,
    pub tables: Vec<String>,
    pub duration_ms: u64,
    pub outcome: ActionOutcome,
    /// Denied securable name, error message, or rewrite summary, depending
    /// on `outcome`.
    pub detail: Option<String>,
}

impl AuditEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: DateTime<Utc>,
        principal: impl Into<String>,
        sql: impl Into<String>,
        statement_kind: StatementKind,
        tables: Vec<String>,
        duration_ms: u64,
        outcome: ActionOutcome,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            principal: principal.into(),
            sql: sql.into(),
            statement_kind: format!("{statement_kind:?}"),
            tables,
            duration_ms,
            outcome,
            detail,
        }
    }
}
