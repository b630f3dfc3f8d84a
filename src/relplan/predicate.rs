// # Predicate builder
//
// Turns one row-filter rule (a column name, a comparison operator, and a
// typed literal) into a `ScalarFunction` expression referencing the target
// Read's base schema, registering the comparison extension as needed.

use crate::config::{BOOLEAN_EXTENSION_URI, COMPARISON_EXTENSION_URI};
use crate::error::{GatewayError, Result};
use crate::relplan::{BaseSchema, Expression, Literal, Plan};

const OR_FUNCTION_NAME: &str = "or:bool?";

/// A comparison operator a row-filter rule may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    /// The `op` fragment of the extension function name, e.g. `equal` in
    /// `equal:i64_i64`.
    fn op_name(self) -> &'static str {
        match self {
            Operator::Eq => "equal",
            Operator::NotEq => "not_equal",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
        }
    }
}

/// One row-filter rule: `column <op> literal`, prior to binding against any
/// particular Read.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FilterRule {
    pub column: String,
    pub operator: Operator,
    pub literal: Literal,
}

/// Build a `ScalarFunction` expression for `rule` against `schema`,
/// registering the comparison function in `plan` and returning the field
/// reference + function-call expression ready to splice into a Read's
/// filter.
///
/// Steps, in order:
/// 1. Resolve `rule.column` in `schema`; first occurrence wins on duplicate
///    names. Unknown column is a validation error.
/// 2. Resolve the field's declared type.
/// 3. Reject a type mismatch between the rule's literal and the column
///    type.
/// 4. Build `FieldRef(index)` and `Literal(...)` as the two arguments.
/// 5. Find-or-register the comparison extension URI and function name,
///    idempotently.
#[tracing::instrument(skip(plan, schema), fields(column = %rule.column))]
pub fn build_predicate(plan: &mut Plan, schema: &BaseSchema, rule: &FilterRule) -> Result<Expression> {
    let index = schema.index_of(&rule.column).ok_or_else(|| {
        GatewayError::validation(format!("unknown column `{}` in row filter", rule.column))
    })?;

    let column_type = schema.type_at(index).expect("index_of returned a valid index");

    if !rule.literal.matches_type(column_type) {
        return Err(GatewayError::validation(format!(
            "row filter literal type mismatch for column `{}`",
            rule.column
        )));
    }

    let uri_anchor = plan.register_uri(COMPARISON_EXTENSION_URI);
    let function_name = format!(
        "{}:{}_{}",
        rule.operator.op_name(),
        column_type.wire_name(),
        rule.literal.wire_name()
    );
    let function_anchor = plan.register_function(uri_anchor, &function_name);

    Ok(Expression::ScalarFunction {
        function_anchor,
        output_type: crate::relplan::ScalarType::Bool,
        nullable: false,
        args: vec![Expression::FieldRef(index), Expression::Literal(rule.literal.clone())],
    })
}

/// Build every rule in `rules` via [`build_predicate`] and OR-combine them
/// into a single predicate. Distinct row-filter bindings on the same table
/// are additive visibility windows (spec.md §4.D: "combined with logical OR
/// at the predicate-builder boundary"), so the combination happens here,
/// before the rewriter ever sees the result — the rewriter's own `and:bool?`
/// step is reserved for splicing onto a Read's pre-existing filter, never
/// for re-combining filters from different bindings.
///
/// Returns `None` for an empty rule list; a single rule is returned as-is
/// with no `or:bool?` registered.
pub fn combine_row_filters(plan: &mut Plan, schema: &BaseSchema, rules: &[FilterRule]) -> Result<Option<Expression>> {
    let mut exprs = Vec::with_capacity(rules.len());
    for rule in rules {
        exprs.push(build_predicate(plan, schema, rule)?);
    }

    let mut iter = exprs.into_iter();
    let Some(first) = iter.next() else {
        return Ok(None);
    };

    let rest: Vec<Expression> = iter.collect();
    if rest.is_empty() {
        return Ok(Some(first));
    }

    let uri_anchor = plan.register_uri(BOOLEAN_EXTENSION_URI);
    let or_anchor = plan.register_function(uri_anchor, OR_FUNCTION_NAME);

    let mut acc = first;
    for expr in rest {
        acc = Expression::ScalarFunction {
            function_anchor: or_anchor,
            output_type: crate::relplan::ScalarType::Bool,
            nullable: false,
            args: vec![acc, expr],
        };
    }
    Ok(Some(acc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relplan::{Field, ScalarType};

    fn schema() -> BaseSchema {
        BaseSchema::new(vec![
            Field { name: "Pclass".into(), data_type: ScalarType::I64 },
            Field { name: "Country".into(), data_type: ScalarType::String },
        ])
    }

    #[test]
    fn builds_a_field_ref_and_literal_comparison() {
        let mut plan = Plan::new(vec![]);
        let rule = FilterRule { column: "Pclass".into(), operator: Operator::Eq, literal: Literal::I64(1) };
        let expr = build_predicate(&mut plan, &schema(), &rule).unwrap();
        match expr {
            Expression::ScalarFunction { args, .. } => {
                assert_eq!(args[0], Expression::FieldRef(0));
                assert_eq!(args[1], Expression::Literal(Literal::I64(1)));
            }
            _ => panic!("expected a scalar function expression"),
        }
    }

    #[test]
    fn unknown_column_is_a_validation_error() {
        let mut plan = Plan::new(vec![]);
        let rule = FilterRule { column: "Nope".into(), operator: Operator::Eq, literal: Literal::I64(1) };
        assert!(matches!(build_predicate(&mut plan, &schema(), &rule), Err(GatewayError::Validation(_))));
    }

    #[test]
    fn type_mismatch_is_a_validation_error() {
        let mut plan = Plan::new(vec![]);
        let rule = FilterRule { column: "Pclass".into(), operator: Operator::Eq, literal: Literal::Bool(true) };
        assert!(matches!(build_predicate(&mut plan, &schema(), &rule), Err(GatewayError::Validation(_))));
    }

    #[test]
    fn function_name_follows_the_op_type_type_convention() {
        let mut plan = Plan::new(vec![]);
        let rule = FilterRule { column: "Pclass".into(), operator: Operator::Gte, literal: Literal::I64(2) };
        build_predicate(&mut plan, &schema(), &rule).unwrap();
        assert_eq!(plan.extensions[0].function_name, "gte:i64_i64");
    }

    #[test]
    fn repeated_registration_is_idempotent() {
        let mut plan = Plan::new(vec![]);
        let rule = FilterRule { column: "Pclass".into(), operator: Operator::Eq, literal: Literal::I64(1) };
        build_predicate(&mut plan, &schema(), &rule).unwrap();
        build_predicate(&mut plan, &schema(), &rule).unwrap();
        assert_eq!(plan.extension_uris.len(), 1);
        assert_eq!(plan.extensions.len(), 1);
    }

    #[test]
    fn combine_row_filters_is_none_for_an_empty_rule_list() {
        let mut plan = Plan::new(vec![]);
        assert_eq!(combine_row_filters(&mut plan, &schema(), &[]).unwrap(), None);
    }

    #[test]
    fn combine_row_filters_returns_a_single_rule_directly_with_no_or_registered() {
        let mut plan = Plan::new(vec![]);
        let rule = FilterRule { column: "Pclass".into(), operator: Operator::Eq, literal: Literal::I64(1) };
        let combined = combine_row_filters(&mut plan, &schema(), std::slice::from_ref(&rule)).unwrap().unwrap();
        assert_eq!(combined, build_predicate(&mut Plan::new(vec![]), &schema(), &rule).unwrap());
        assert!(plan.extensions.iter().all(|f| f.function_name != OR_FUNCTION_NAME));
    }

    #[test]
    fn combine_row_filters_ors_distinct_bindings_instead_of_anding_them() {
        let mut plan = Plan::new(vec![]);
        let us = FilterRule { column: "Country".into(), operator: Operator::Eq, literal: Literal::String("us".into()) };
        let eu = FilterRule { column: "Country".into(), operator: Operator::Eq, literal: Literal::String("eu".into()) };
        let combined = combine_row_filters(&mut plan, &schema(), &[us.clone(), eu.clone()]).unwrap().unwrap();

        match combined {
            Expression::ScalarFunction { function_anchor, args, .. } => {
                let name = plan.extensions.iter().find(|f| f.anchor == function_anchor).unwrap();
                assert_eq!(name.function_name, OR_FUNCTION_NAME);
                assert_eq!(args[0], build_predicate(&mut plan.clone(), &schema(), &us).unwrap());
                assert_eq!(args[1], build_predicate(&mut plan.clone(), &schema(), &eu).unwrap());
            }
            _ => panic!("expected an or:bool? scalar function"),
        }
    }
}
