// # Plan rewriter
//
// Splices one already-combined row-filter expression into every `Read` of a
// matching table name, never mutating the caller's plan and never
// introducing a wrapping `Filter` node — the predicate lands directly in the
// Read's own `filter` field so later steps keep seeing a single Read per
// table.
//
// Combining multiple row-filter bindings on the same table is the predicate
// builder's job ([`crate::relplan::predicate::combine_row_filters`], OR'd
// together), not this module's — by the time a table's entry reaches
// `rewrite`, it is already a single `Expression`. The `and:bool?` this
// module builds is reserved for one purpose only: splicing the new
// predicate onto a Read that already carries a filter.

use std::collections::HashMap;

use crate::config::BOOLEAN_EXTENSION_URI;
use crate::error::{GatewayError, Result};
use crate::relplan::{Expression, Plan, Rel};

const AND_FUNCTION_NAME: &str = "and:bool?";

/// Rewrite every `Read` in `plan` whose resolved table name has an entry in
/// `rules_by_table`, splicing that table's (already-combined) row-filter
/// expression into the Read's `filter`.
///
/// - A table with no entry is left untouched.
/// - An empty `rules_by_table` is the identity: `plan` is returned unchanged
///   with no traversal or clone performed.
/// - A Read matched by `rules_by_table` but missing a `base_schema` is a
///   validation error — the predicate builder cannot have produced field
///   references against an unknown schema.
/// - A Read with no pre-existing filter gets the new expression spliced in
///   directly.
/// - A Read that already carries a filter keeps it as the *first* argument
///   of a new `and:bool?`, so the injected predicate can never reorder or
///   shadow a pre-existing business filter.
#[tracing::instrument(skip(plan, rules_by_table))]
pub fn rewrite(plan: Plan, rules_by_table: &HashMap<String, Expression>) -> Result<Plan> {
    if rules_by_table.is_empty() {
        return Ok(plan);
    }

    let mut rewritten = plan;
    let and_uri_anchor = rewritten.register_uri(BOOLEAN_EXTENSION_URI);
    let and_function_anchor = rewritten.register_function(and_uri_anchor, AND_FUNCTION_NAME);

    for relation in &mut rewritten.relations {
        rewrite_rel(relation.rel_mut(), rules_by_table, and_function_anchor)?;
    }

    Ok(rewritten)
}

fn rewrite_rel(
    rel: &mut Rel,
    rules_by_table: &HashMap<String, Expression>,
    and_function_anchor: crate::relplan::Anchor,
) -> Result<()> {
    match rel {
        Rel::Read(read) => {
            let Some(table_name) = read.named_table.resolved_name().map(str::to_string) else {
                return Ok(());
            };
            let Some(new_expr) = rules_by_table.get(&table_name) else {
                return Ok(());
            };
            if read.base_schema.is_none() {
                return Err(GatewayError::validation(format!(
                    "cannot inject row filter into `{table_name}`: Read has no base_schema"
                )));
            }

            read.filter = Some(match read.filter.take() {
                Some(existing) => and_of(existing, new_expr.clone(), and_function_anchor),
                None => new_expr.clone(),
            });
            Ok(())
        }
        Rel::Project(r) => rewrite_rel(&mut r.input, rules_by_table, and_function_anchor),
        Rel::Filter(r) => rewrite_rel(&mut r.input, rules_by_table, and_function_anchor),
        Rel::Fetch(r) => rewrite_rel(&mut r.input, rules_by_table, and_function_anchor),
        Rel::Sort(r) => rewrite_rel(&mut r.input, rules_by_table, and_function_anchor),
        Rel::Aggregate(r) => rewrite_rel(&mut r.input, rules_by_table, and_function_anchor),
        Rel::Join(r) => {
            rewrite_rel(&mut r.left, rules_by_table, and_function_anchor)?;
            rewrite_rel(&mut r.right, rules_by_table, and_function_anchor)
        }
        Rel::Cross(r) => {
            rewrite_rel(&mut r.left, rules_by_table, and_function_anchor)?;
            rewrite_rel(&mut r.right, rules_by_table, and_function_anchor)
        }
        Rel::HashJoin(r) => {
            rewrite_rel(&mut r.left, rules_by_table, and_function_anchor)?;
            rewrite_rel(&mut r.right, rules_by_table, and_function_anchor)
        }
        Rel::MergeJoin(r) => {
            rewrite_rel(&mut r.left, rules_by_table, and_function_anchor)?;
            rewrite_rel(&mut r.right, rules_by_table, and_function_anchor)
        }
        Rel::Set(r) => {
            for input in &mut r.inputs {
                rewrite_rel(input, rules_by_table, and_function_anchor)?;
            }
            Ok(())
        }
        Rel::ExtensionSingle(r) => rewrite_rel(&mut r.input, rules_by_table, and_function_anchor),
        Rel::ExtensionMulti(r) => {
            for input in &mut r.inputs {
                rewrite_rel(input, rules_by_table, and_function_anchor)?;
            }
            Ok(())
        }
    }
}

fn and_of(left: Expression, right: Expression, and_function_anchor: crate::relplan::Anchor) -> Expression {
    Expression::ScalarFunction {
        function_anchor: and_function_anchor,
        output_type: crate::relplan::ScalarType::Bool,
        nullable: false,
        args: vec![left, right],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relplan::{BaseSchema, Field, Literal, NamedTable, PlanRelation, ReadRel, ScalarType};

    fn read_plan(table: &str, existing_filter: Option<Expression>) -> Plan {
        let rel = Rel::Read(ReadRel {
            named_table: NamedTable::single(table),
            base_schema: Some(BaseSchema::new(vec![Field { name: "id".into(), data_type: ScalarType::I64 }])),
            filter: existing_filter,
        });
        Plan::new(vec![PlanRelation::Bare(rel)])
    }

    fn literal_expr(v: i64) -> Expression {
        Expression::Literal(Literal::I64(v))
    }

    #[test]
    fn empty_rules_is_identity_with_no_clone_needed() {
        let plan = read_plan("t", None);
        let before = plan.clone();
        let after = rewrite(plan, &HashMap::new()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn unmatched_table_is_untouched() {
        let plan = read_plan("t", None);
        let mut rules = HashMap::new();
        rules.insert("other".to_string(), literal_expr(1));
        let after = rewrite(plan.clone(), &rules).unwrap();
        assert_eq!(plan, after);
    }

    #[test]
    fn single_rule_is_spliced_in_directly() {
        let plan = read_plan("t", None);
        let mut rules = HashMap::new();
        rules.insert("t".to_string(), literal_expr(1));
        let after = rewrite(plan, &rules).unwrap();
        match &after.relations[0].rel() {
            Rel::Read(r) => assert_eq!(r.filter, Some(literal_expr(1))),
            _ => panic!("expected a read"),
        }
    }

    #[test]
    fn existing_filter_is_kept_as_the_first_and_argument() {
        let plan = read_plan("t", Some(literal_expr(99)));
        let mut rules = HashMap::new();
        rules.insert("t".to_string(), literal_expr(1));
        let after = rewrite(plan, &rules).unwrap();
        match &after.relations[0].rel() {
            Rel::Read(r) => match r.filter.as_ref().unwrap() {
                Expression::ScalarFunction { args, .. } => {
                    assert_eq!(args[0], literal_expr(99));
                    assert_eq!(args[1], literal_expr(1));
                }
                _ => panic!("expected a scalar function"),
            },
            _ => panic!("expected a read"),
        }
    }

    #[test]
    fn missing_base_schema_is_a_validation_error() {
        let rel = Rel::Read(ReadRel { named_table: NamedTable::single("t"), base_schema: None, filter: None });
        let plan = Plan::new(vec![PlanRelation::Bare(rel)]);
        let mut rules = HashMap::new();
        rules.insert("t".to_string(), literal_expr(1));
        assert!(matches!(rewrite(plan, &rules), Err(GatewayError::Validation(_))));
    }

    #[test]
    fn rewrite_does_not_mutate_the_original_via_shared_substructure() {
        let plan = read_plan("t", None);
        let original_clone = plan.clone();
        let mut rules = HashMap::new();
        rules.insert("t".to_string(), literal_expr(1));
        let _after = rewrite(plan, &rules).unwrap();
        // original_clone was taken before rewriting; it must still reflect
        // the pre-rewrite shape since Plan contains no Rc/Arc sharing.
        match original_clone.relations[0].rel() {
            Rel::Read(r) => assert_eq!(r.filter, None),
            _ => panic!("expected a read"),
        }
    }
}
