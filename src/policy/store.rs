// # Policy store
//
// The resolver's only dependency surface: five read operations over
// principals, group memberships, grants, row filters, and column masks. The
// trait is async (`async-trait`, matching other collaborator traits in this
// crate) and every operation takes a `RequestContext` so a caller can
// cancel a slow lookup without the resolver needing its own timeout logic.
//
// `InMemoryPolicyStore` is the only implementation in this crate: a
// `parking_lot::RwLock`-guarded set of tables, following the
// `Arc<RwLock<HashMap<...>>>` shape used throughout the reference catalog.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{GatewayError, Result};
use crate::policy::model::{
    ColumnMask, ColumnMaskBinding, ColumnMaskId, Grant, GrantId, GroupMembership, Principal, PrincipalId,
    RowFilter, RowFilterBinding, RowFilterId, Securable, SecurableId, SecurableKind,
};

/// Cooperative cancellation signal threaded through every store call. The
/// resolver checks it before and after each store round-trip.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    canceled: Arc<std::sync::atomic::AtomicBool>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(GatewayError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// The five read operations the resolver depends on. Each observes a
/// consistent snapshot of the store for the duration of the call. Grants,
/// row filters, and column masks all take the resolver's full
/// transitive-principal set in one call rather than one round-trip per
/// principal, so the filtering against "does this apply to any of these
/// principals" happens at the store boundary, not in the resolver.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn get_principal_by_name(&self, ctx: &RequestContext, name: &str) -> Result<Option<Principal>>;

    /// Direct memberships only; transitive closure is the resolver's job.
    async fn groups_of(&self, ctx: &RequestContext, principal: PrincipalId) -> Result<Vec<GroupMembership>>;

    /// Every grant held by any of `principal_ids` on a securable of one of
    /// `securable_kinds`.
    async fn grants_for(
        &self,
        ctx: &RequestContext,
        principal_ids: &[PrincipalId],
        securable_kinds: &[SecurableKind],
    ) -> Result<Vec<Grant>>;

    /// Row filters on `table` with at least one binding to a principal in
    /// `principal_ids`.
    async fn row_filters_for(
        &self,
        ctx: &RequestContext,
        table: SecurableId,
        principal_ids: &[PrincipalId],
    ) -> Result<Vec<RowFilter>>;

    /// Column masks on `table` with at least one binding to a principal in
    /// `principal_ids`, paired with whether any such binding grants
    /// `see_original`.
    async fn column_masks_for(
        &self,
        ctx: &RequestContext,
        table: SecurableId,
        principal_ids: &[PrincipalId],
    ) -> Result<Vec<(ColumnMask, bool)>>;
}

#[derive(Default)]
struct Tables {
    principals: HashMap<PrincipalId, Principal>,
    principals_by_name: HashMap<String, PrincipalId>,
    memberships: Vec<GroupMembership>,
    securables: HashMap<SecurableId, Securable>,
    grants: HashMap<GrantId, Grant>,
    row_filters: HashMap<RowFilterId, RowFilter>,
    row_filter_bindings: Vec<RowFilterBinding>,
    column_masks: HashMap<ColumnMaskId, ColumnMask>,
    column_mask_bindings: Vec<ColumnMaskBinding>,
}

/// An in-memory `PolicyStore`, plus mutating convenience methods for
/// building fixtures and demo data. These CRUD methods are not part of the resolver's
/// dependency surface — the resolver only ever calls the five trait methods
/// above.
#[derive(Clone, Default)]
pub struct InMemoryPolicyStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_principal(&self, principal: Principal) {
        let mut tables = self.tables.write();
        tables.principals_by_name.insert(principal.name.clone(), principal.id);
        tables.principals.insert(principal.id, principal);
    }

    pub fn add_membership(&self, membership: GroupMembership) {
        self.tables.write().memberships.push(membership);
    }

    pub fn put_securable(&self, securable: Securable) {
        self.tables.write().securables.insert(securable.id, securable);
    }

    pub fn get_securable(&self, id: SecurableId) -> Option<Securable> {
        self.tables.read().securables.get(&id).cloned()
    }

    /// Issue a grant. Grants are append-only; use `revoke_grant` to remove
    /// one.
    pub fn grant(&self, grant: Grant) {
        self.tables.write().grants.insert(grant.id, grant);
    }

    pub fn revoke_grant(&self, grant_id: GrantId) -> bool {
        self.tables.write().grants.remove(&grant_id).is_some()
    }

    pub fn bind_row_filter(&self, row_filter: RowFilter, bindings: Vec<RowFilterBinding>) {
        let mut tables = self.tables.write();
        tables.row_filters.insert(row_filter.id, row_filter);
        tables.row_filter_bindings.extend(bindings);
    }

    pub fn unbind_row_filter(&self, row_filter_id: RowFilterId) {
        let mut tables = self.tables.write();
        tables.row_filters.remove(&row_filter_id);
        tables.row_filter_bindings.retain(|b| b.row_filter != row_filter_id);
    }

    pub fn bind_column_mask(&self, column_mask: ColumnMask, bindings: Vec<ColumnMaskBinding>) {
        let mut tables = self.tables.write();
        tables.column_masks.insert(column_mask.id, column_mask);
        tables.column_mask_bindings.extend(bindings);
    }

    pub fn unbind_column_mask(&self, column_mask_id: ColumnMaskId) {
        let mut tables = self.tables.write();
        tables.column_masks.remove(&column_mask_id);
        tables.column_mask_bindings.retain(|b| b.column_mask != column_mask_id);
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get_principal_by_name(&self, ctx: &RequestContext, name: &str) -> Result<Option<Principal>> {
        ctx.check()?;
        let tables = self.tables.read();
        Ok(tables.principals_by_name.get(name).and_then(|id| tables.principals.get(id)).cloned())
    }

    async fn groups_of(&self, ctx: &RequestContext, principal: PrincipalId) -> Result<Vec<GroupMembership>> {
        ctx.check()?;
        let tables = self.tables.read();
        Ok(tables.memberships.iter().filter(|m| m.member == principal).cloned().collect())
    }

    async fn grants_for(
        &self,
        ctx: &RequestContext,
        principal_ids: &[PrincipalId],
        securable_kinds: &[SecurableKind],
    ) -> Result<Vec<Grant>> {
        ctx.check()?;
        let tables = self.tables.read();
        let principal_set: HashSet<_> = principal_ids.iter().copied().collect();
        Ok(tables
            .grants
            .values()
            .filter(|g| principal_set.contains(&g.principal))
            .filter(|g| {
                securable_kinds.is_empty()
                    || tables.securables.get(&g.securable).map_or(true, |s| securable_kinds.contains(&s.kind))
            })
            .cloned()
            .collect())
    }

    async fn row_filters_for(
        &self,
        ctx: &RequestContext,
        table: SecurableId,
        principal_ids: &[PrincipalId],
    ) -> Result<Vec<RowFilter>> {
        ctx.check()?;
        let tables = self.tables.read();
        let principal_set: HashSet<_> = principal_ids.iter().copied().collect();
        Ok(tables
            .row_filters
            .values()
            .filter(|rf| rf.table == table)
            .filter(|rf| {
                tables.row_filter_bindings.iter().any(|b| b.row_filter == rf.id && principal_set.contains(&b.principal))
            })
            .cloned()
            .collect())
    }

    async fn column_masks_for(
        &self,
        ctx: &RequestContext,
        table: SecurableId,
        principal_ids: &[PrincipalId],
    ) -> Result<Vec<(ColumnMask, bool)>> {
        ctx.check()?;
        let tables = self.tables.read();
        let principal_set: HashSet<_> = principal_ids.iter().copied().collect();
        Ok(tables
            .column_masks
            .values()
            .filter(|cm| cm.table == table)
            .filter_map(|cm| {
                let applicable: Vec<&ColumnMaskBinding> = tables
                    .column_mask_bindings
                    .iter()
                    .filter(|b| b.column_mask == cm.id && principal_set.contains(&b.principal))
                    .collect();
                if applicable.is_empty() {
                    None
                } else {
                    let see_original = applicable.iter().any(|b| b.see_original);
                    Some((cm.clone(), see_original))
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::model::{PrincipalKind, SecurableKind};

    #[tokio::test]
    async fn get_principal_by_name_round_trips() {
        let store = InMemoryPolicyStore::new();
        let principal = Principal::new("alice", PrincipalKind::User);
        store.put_principal(principal.clone());

        let ctx = RequestContext::new();
        let found = store.get_principal_by_name(&ctx, "alice").await.unwrap();
        assert_eq!(found, Some(principal));
    }

    #[tokio::test]
    async fn unknown_principal_name_is_none_not_an_error() {
        let store = InMemoryPolicyStore::new();
        let ctx = RequestContext::new();
        assert_eq!(store.get_principal_by_name(&ctx, "nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn canceled_context_short_circuits_every_call() {
        let store = InMemoryPolicyStore::new();
        let ctx = RequestContext::new();
        ctx.cancel();
        assert!(matches!(store.get_principal_by_name(&ctx, "alice").await, Err(GatewayError::Canceled)));
    }

    #[tokio::test]
    async fn revoke_removes_a_previously_issued_grant() {
        let store = InMemoryPolicyStore::new();
        let ctx = RequestContext::new();
        let securable = Securable { id: SecurableId::new_v4(), kind: SecurableKind::Table, name: "t".into(), parent: None };
        store.put_securable(securable.clone());
        let principal = Principal::new("alice", PrincipalKind::User);
        store.put_principal(principal.clone());

        let grant = Grant {
            id: GrantId::new_v4(),
            principal: principal.id,
            securable: securable.id,
            privilege: crate::policy::model::Privilege::Select,
        };
        store.grant(grant.clone());
        assert_eq!(store.grants_for(&ctx, &[principal.id], &[]).await.unwrap().len(), 1);

        assert!(store.revoke_grant(grant.id));
        assert!(store.grants_for(&ctx, &[principal.id], &[]).await.unwrap().is_empty());
    }
}
