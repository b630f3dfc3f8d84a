// # Policy resolver
//
// The only component that turns raw policy records into an access decision
// and a concrete set of row filters / column masks for one query.
// Depends on nothing but the five `PolicyStore` read operations — it never
// touches plan shapes (module A/E/F) or the store's mutating convenience
// methods.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{GatewayError, Result};
use crate::policy::model::{MaskingFunction, PrincipalId, Privilege, SecurableId, SecurableKind};
use crate::policy::store::{PolicyStore, RequestContext};
use crate::relplan::predicate::FilterRule;

/// Securable kinds the resolver ever needs grants on: catalogs, schemas,
/// and tables for RLS/RBAC admission, compute endpoints for `MANAGE_COMPUTE`.
const RELEVANT_SECURABLE_KINDS: &[SecurableKind] =
    &[SecurableKind::Catalog, SecurableKind::Schema, SecurableKind::Table, SecurableKind::ComputeEndpoint];

/// The resolved `catalog > schema > table` securable ids a query's table
/// reference maps to. Securable hierarchy lookup lives outside the
/// resolver's dependency surface; callers supply it already
/// resolved, typically from catalog metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurableChain {
    pub catalog: SecurableId,
    pub schema: SecurableId,
    pub table: SecurableId,
}

/// The row filters and column masks in effect for one principal against one
/// table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveRules {
    /// Distinct row-filter policies that apply. These are OR-combined at
    /// the predicate-builder boundary (each is an additive visibility
    /// window); existential membership within a single policy's bindings
    /// is already resolved here.
    pub row_filters: Vec<FilterRule>,
    /// Column name to masking function, for columns this principal does
    /// not see unmasked.
    pub column_masks: HashMap<String, MaskingFunction>,
}

pub struct PolicyResolver<S: PolicyStore> {
    store: Arc<S>,
    max_group_depth: usize,
}

impl<S: PolicyStore> PolicyResolver<S> {
    pub fn new(store: Arc<S>, max_group_depth: usize) -> Self {
        Self { store, max_group_depth }
    }

    /// BFS closure of `principal`'s transitive group memberships, including
    /// `principal` itself, bounded by `max_group_depth` and guarded against
    /// cycles with a visited set.
    #[tracing::instrument(skip(self, ctx))]
    async fn transitive_principals(&self, ctx: &RequestContext, principal: PrincipalId) -> Result<Vec<PrincipalId>> {
        let mut visited = HashSet::new();
        let mut frontier = vec![principal];
        visited.insert(principal);
        let mut all = vec![principal];

        let mut depth = 0;
        while !frontier.is_empty() && depth < self.max_group_depth {
            let mut next_frontier = Vec::new();
            for member in &frontier {
                let memberships = self.store.groups_of(ctx, *member).await?;
                for membership in memberships {
                    if visited.insert(membership.group) {
                        all.push(membership.group);
                        next_frontier.push(membership.group);
                    }
                }
            }
            frontier = next_frontier;
            depth += 1;
        }

        Ok(all)
    }

    /// Every `(securable, privilege)` pair any of `principal_ids` holds,
    /// fetched in a single batched store call.
    async fn effective_grants(&self, ctx: &RequestContext, principal_ids: &[PrincipalId]) -> Result<Vec<(SecurableId, Privilege)>> {
        Ok(self
            .store
            .grants_for(ctx, principal_ids, RELEVANT_SECURABLE_KINDS)
            .await?
            .into_iter()
            .map(|g| (g.securable, g.privilege))
            .collect())
    }

    /// Whether `principal_name` (or a transitive group of it) holds a
    /// grant implying `privilege` on `chain`'s target securable, directly or
    /// via an `ALL_PRIVILEGES` grant on an ancestor (schema or catalog) —
    /// `ALL_PRIVILEGES` on a securable implies every privilege on it and on
    /// every securable it contains (spec.md §3.1).
    #[tracing::instrument(skip(self, ctx))]
    pub async fn check_privilege(
        &self,
        ctx: &RequestContext,
        principal_name: &str,
        chain: &SecurableChain,
        privilege: Privilege,
    ) -> Result<bool> {
        let principal = self
            .store
            .get_principal_by_name(ctx, principal_name)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("principal `{principal_name}`")))?;

        if principal.is_admin {
            return Ok(true);
        }

        let principal_ids = self.transitive_principals(ctx, principal.id).await?;
        let grants = self.effective_grants(ctx, &principal_ids).await?;
        Ok(grants.iter().any(|(s, p)| {
            (*s == chain.table && p.implies(privilege))
                || (*s == chain.schema && *p == Privilege::AllPrivileges)
                || (*s == chain.catalog && *p == Privilege::AllPrivileges)
        }))
    }

    /// `CheckAccess`: `catalog`-wide `Select`/`AllPrivileges`, or
    /// `schema` `Usage` plus `table` `Select`/`AllPrivileges`; an
    /// `ALL_PRIVILEGES` grant on the schema satisfies both halves of the
    /// latter by containment. Admins are always admitted.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn check_access(&self, ctx: &RequestContext, principal_name: &str, chain: &SecurableChain) -> Result<bool> {
        let principal = self
            .store
            .get_principal_by_name(ctx, principal_name)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("principal `{principal_name}`")))?;

        if principal.is_admin {
            return Ok(true);
        }

        let principal_ids = self.transitive_principals(ctx, principal.id).await?;
        let grants = self.effective_grants(ctx, &principal_ids).await?;

        let catalog_wildcard = grants
            .iter()
            .any(|(s, p)| *s == chain.catalog && (p.implies(Privilege::Select) || *p == Privilege::AllPrivileges));
        if catalog_wildcard {
            return Ok(true);
        }

        let schema_usage = grants.iter().any(|(s, p)| *s == chain.schema && p.implies(Privilege::Usage));
        let table_select = grants.iter().any(|(s, p)| {
            (*s == chain.table && (p.implies(Privilege::Select) || *p == Privilege::AllPrivileges))
                || (*s == chain.schema && *p == Privilege::AllPrivileges)
        });

        let allowed = schema_usage && table_select;
        if !allowed {
            tracing::warn!(principal = %principal_name, table = %chain.table, "access denied");
        }
        Ok(allowed)
    }

    /// The row filters and column masks to apply for `principal_name`
    /// against `chain.table`. Admins bypass both: an admin sees
    /// raw rows once admitted.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn effective_rules(&self, ctx: &RequestContext, principal_name: &str, chain: &SecurableChain) -> Result<EffectiveRules> {
        let principal = self
            .store
            .get_principal_by_name(ctx, principal_name)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("principal `{principal_name}`")))?;

        if principal.is_admin {
            return Ok(EffectiveRules::default());
        }

        let principal_ids = self.transitive_principals(ctx, principal.id).await?;

        // Row filters with at least one binding to an applicable principal
        // are already resolved by the store; distinct bindings' filters are
        // OR-combined downstream at the predicate-builder boundary, never
        // here and never by the rewriter.
        let row_filters: Vec<FilterRule> = self
            .store
            .row_filters_for(ctx, chain.table, &principal_ids)
            .await?
            .into_iter()
            .map(|rf| rf.rule)
            .collect();

        let mut by_column: HashMap<String, Vec<(u128, MaskingFunction, bool)>> = HashMap::new();
        for (mask, see_original) in self.store.column_masks_for(ctx, chain.table, &principal_ids).await? {
            by_column.entry(mask.column.clone()).or_default().push((mask.id.as_u128(), mask.function, see_original));
        }

        let mut column_masks = HashMap::new();
        for (column, mut candidates) in by_column {
            if candidates.iter().any(|(_, _, see_original)| *see_original) {
                tracing::debug!(%column, "see_original dominance, column left unmasked");
                continue;
            }
            candidates.sort_by_key(|(id, _, _)| *id);
            if let Some((_, function, _)) = candidates.into_iter().next() {
                column_masks.insert(column, function);
            }
        }

        Ok(EffectiveRules { row_filters, column_masks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::model::{
        ColumnMask, ColumnMaskBinding, Grant, GroupMembership, Principal, PrincipalKind, RowFilter, RowFilterBinding,
    };
    use crate::policy::store::InMemoryPolicyStore;
    use crate::relplan::predicate::Operator;
    use crate::relplan::Literal;
    use uuid::Uuid;

    fn chain() -> (InMemoryPolicyStore, SecurableChain) {
        let store = InMemoryPolicyStore::new();
        let chain = SecurableChain { catalog: Uuid::new_v4(), schema: Uuid::new_v4(), table: Uuid::new_v4() };
        (store, chain)
    }

    #[tokio::test]
    async fn admin_bypasses_admission_and_rules() {
        let (store, chain) = chain();
        let mut admin = Principal::new("root", PrincipalKind::User);
        admin.is_admin = true;
        store.put_principal(admin.clone());

        let resolver = PolicyResolver::new(Arc::new(store), 64);
        let ctx = RequestContext::new();
        assert!(resolver.check_access(&ctx, "root", &chain).await.unwrap());
        assert_eq!(resolver.effective_rules(&ctx, "root", &chain).await.unwrap(), EffectiveRules::default());
    }

    #[tokio::test]
    async fn denies_without_any_grant() {
        let (store, chain) = chain();
        let user = Principal::new("alice", PrincipalKind::User);
        store.put_principal(user.clone());

        let resolver = PolicyResolver::new(Arc::new(store), 64);
        let ctx = RequestContext::new();
        assert!(!resolver.check_access(&ctx, "alice", &chain).await.unwrap());
    }

    #[tokio::test]
    async fn schema_usage_plus_table_select_admits() {
        let (store, chain) = chain();
        let user = Principal::new("alice", PrincipalKind::User);
        store.put_principal(user.clone());
        store.grant(Grant { id: Uuid::new_v4(), principal: user.id, securable: chain.schema, privilege: Privilege::Usage });
        store.grant(Grant { id: Uuid::new_v4(), principal: user.id, securable: chain.table, privilege: Privilege::Select });

        let resolver = PolicyResolver::new(Arc::new(store), 64);
        let ctx = RequestContext::new();
        assert!(resolver.check_access(&ctx, "alice", &chain).await.unwrap());
    }

    #[tokio::test]
    async fn grant_via_transitive_group_is_honored() {
        let (store, chain) = chain();
        let user = Principal::new("alice", PrincipalKind::User);
        let group = Principal::new("analysts", PrincipalKind::Group);
        store.put_principal(user.clone());
        store.put_principal(group.clone());
        store.add_membership(GroupMembership { member: user.id, group: group.id });
        store.grant(Grant { id: Uuid::new_v4(), principal: group.id, securable: chain.catalog, privilege: Privilege::AllPrivileges });

        let resolver = PolicyResolver::new(Arc::new(store), 64);
        let ctx = RequestContext::new();
        assert!(resolver.check_access(&ctx, "alice", &chain).await.unwrap());
    }

    #[tokio::test]
    async fn row_filter_applies_when_any_binding_matches() {
        let (store, chain) = chain();
        let user = Principal::new("alice", PrincipalKind::User);
        store.put_principal(user.clone());

        let rule = FilterRule { column: "region".into(), operator: Operator::Eq, literal: Literal::String("us".into()) };
        let row_filter = RowFilter { id: Uuid::new_v4(), table: chain.table, rule: rule.clone() };
        store.bind_row_filter(row_filter, vec![RowFilterBinding { row_filter: Uuid::new_v4(), principal: user.id }]);

        // rebind with the correct row_filter id
        let rf_id = Uuid::new_v4();
        let row_filter = RowFilter { id: rf_id, table: chain.table, rule: rule.clone() };
        store.bind_row_filter(row_filter, vec![RowFilterBinding { row_filter: rf_id, principal: user.id }]);

        let resolver = PolicyResolver::new(Arc::new(store), 64);
        let ctx = RequestContext::new();
        let rules = resolver.effective_rules(&ctx, "alice", &chain).await.unwrap();
        assert!(rules.row_filters.iter().any(|r| *r == rule));
    }

    #[tokio::test]
    async fn see_original_dominates_other_masks_on_the_same_column() {
        let (store, chain) = chain();
        let user = Principal::new("alice", PrincipalKind::User);
        store.put_principal(user.clone());

        let low_id = ColumnMask { id: Uuid::new_v4(), table: chain.table, column: "ssn".into(), function: MaskingFunction::Hash };
        let high_id = ColumnMask { id: Uuid::new_v4(), table: chain.table, column: "ssn".into(), function: MaskingFunction::Null };
        store.bind_column_mask(low_id.clone(), vec![ColumnMaskBinding { column_mask: low_id.id, principal: user.id, see_original: false }]);
        store.bind_column_mask(
            high_id.clone(),
            vec![ColumnMaskBinding { column_mask: high_id.id, principal: user.id, see_original: true }],
        );

        let resolver = PolicyResolver::new(Arc::new(store), 64);
        let ctx = RequestContext::new();
        let rules = resolver.effective_rules(&ctx, "alice", &chain).await.unwrap();
        assert!(!rules.column_masks.contains_key("ssn"));
    }

    #[tokio::test]
    async fn lowest_mask_id_wins_without_see_original() {
        let (store, chain) = chain();
        let user = Principal::new("alice", PrincipalKind::User);
        store.put_principal(user.clone());

        let first = ColumnMask { id: Uuid::new_v4(), table: chain.table, column: "ssn".into(), function: MaskingFunction::Hash };
        let second = ColumnMask { id: Uuid::new_v4(), table: chain.table, column: "ssn".into(), function: MaskingFunction::Null };
        let (lower, higher) = if first.id < second.id { (first, second) } else { (second, first) };

        store.bind_column_mask(lower.clone(), vec![ColumnMaskBinding { column_mask: lower.id, principal: user.id, see_original: false }]);
        store.bind_column_mask(higher.clone(), vec![ColumnMaskBinding { column_mask: higher.id, principal: user.id, see_original: false }]);

        let resolver = PolicyResolver::new(Arc::new(store), 64);
        let ctx = RequestContext::new();
        let rules = resolver.effective_rules(&ctx, "alice", &chain).await.unwrap();
        assert_eq!(rules.column_masks.get("ssn"), Some(&lower.function));
    }
}
