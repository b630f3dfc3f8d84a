// # Policy domain model
//
// Principals, the group-membership graph, hierarchical securables, grants,
// row filters and column masks, modeled the way the reference
// catalog models schemas/tables: plain owned structs, `Serialize`/
// `Deserialize` for wire/storage round-tripping, no behavior beyond simple
// accessors — the resolver (module D) owns all policy logic.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::relplan::predicate::FilterRule;

pub type PrincipalId = Uuid;
pub type SecurableId = Uuid;
pub type GrantId = Uuid;
pub type RowFilterId = Uuid;
pub type ColumnMaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    Group,
}

/// A user or group identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub name: String,
    pub kind: PrincipalKind,
    /// Bypasses RLS/masking but is still subject to RBAC admission.
    pub is_admin: bool,
}

impl Principal {
    pub fn new(name: impl Into<String>, kind: PrincipalKind) -> Self {
        Self { id: Uuid::new_v4(), name: name.into(), kind, is_admin: false }
    }
}

/// A directed `member -> group` edge in the membership graph. Traversed by
/// BFS with a visited set to tolerate cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub member: PrincipalId,
    pub group: PrincipalId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurableKind {
    Catalog,
    Schema,
    Table,
    ComputeEndpoint,
}

/// A hierarchical securable: `catalog > schema > table | compute_endpoint`
///. `parent` is `None` only for a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Securable {
    pub id: SecurableId,
    pub kind: SecurableKind,
    pub name: String,
    pub parent: Option<SecurableId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Privilege {
    Usage,
    Select,
    Insert,
    Update,
    Delete,
    ManageCompute,
    /// Implies every other privilege on the same securable.
    AllPrivileges,
}

impl Privilege {
    /// Whether holding `self` satisfies a requirement for `required`.
    pub fn implies(self, required: Privilege) -> bool {
        self == required || self == Privilege::AllPrivileges
    }
}

/// One `GRANT <privilege> ON <securable> TO <principal>` record. Immutable
/// once issued except via explicit revoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    pub principal: PrincipalId,
    pub securable: SecurableId,
    pub privilege: Privilege,
}

/// A row-filter policy attached to a table: the predicate itself plus the
/// set of principals it binds to. Distinct bindings of the same table
/// OR-combine at resolution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub id: RowFilterId,
    pub table: SecurableId,
    pub rule: FilterRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilterBinding {
    pub row_filter: RowFilterId,
    pub principal: PrincipalId,
}

/// A masking function applied to a column unless the bound principal holds
/// `see_original`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskingFunction {
    Null,
    Redact,
    Hash,
    PartialReveal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMask {
    pub id: ColumnMaskId,
    pub table: SecurableId,
    pub column: String,
    pub function: MaskingFunction,
}

/// Binds a principal to a column mask. `see_original` grants that principal
/// the original, unmasked value for this column regardless of mask id
/// ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMaskBinding {
    pub column_mask: ColumnMaskId,
    pub principal: PrincipalId,
    pub see_original: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_privileges_implies_any_requirement() {
        assert!(Privilege::AllPrivileges.implies(Privilege::Select));
        assert!(Privilege::AllPrivileges.implies(Privilege::Delete));
    }

    #[test]
    fn a_specific_privilege_does_not_imply_another() {
        assert!(!Privilege::Select.implies(Privilege::Insert));
        assert!(Privilege::Select.implies(Privilege::Select));
    }
}
