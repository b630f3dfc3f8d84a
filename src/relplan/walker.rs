// # Table-name extraction
//
// A single depth-first pass over a plan collecting every `Read`'s resolved
// table name, used by the secure execution pipeline to know which
// securables a query touches before any rule is applied.

use super::{Plan, Rel};

/// Every distinct table name reached by a `Read` anywhere in `plan`, in
/// first-seen order. Descends into root-wrapped and bare top-level
/// relations alike. An empty plan yields an empty list.
pub fn extract_table_names(plan: &Plan) -> Vec<String> {
    let mut seen = Vec::new();
    for relation in &plan.relations {
        walk(relation.rel(), &mut seen);
    }
    seen
}

fn walk(rel: &Rel, seen: &mut Vec<String>) {
    match rel {
        Rel::Read(read) => {
            if let Some(name) = read.named_table.resolved_name() {
                if !seen.iter().any(|existing| existing == name) {
                    seen.push(name.to_string());
                }
            }
        }
        Rel::Project(r) => walk(&r.input, seen),
        Rel::Filter(r) => walk(&r.input, seen),
        Rel::Fetch(r) => walk(&r.input, seen),
        Rel::Sort(r) => walk(&r.input, seen),
        Rel::Aggregate(r) => walk(&r.input, seen),
        Rel::Join(r) => {
            walk(&r.left, seen);
            walk(&r.right, seen);
        }
        Rel::Cross(r) => {
            walk(&r.left, seen);
            walk(&r.right, seen);
        }
        Rel::HashJoin(r) => {
            walk(&r.left, seen);
            walk(&r.right, seen);
        }
        Rel::MergeJoin(r) => {
            walk(&r.left, seen);
            walk(&r.right, seen);
        }
        Rel::Set(r) => {
            for input in &r.inputs {
                walk(input, seen);
            }
        }
        Rel::ExtensionSingle(r) => walk(&r.input, seen),
        Rel::ExtensionMulti(r) => {
            for input in &r.inputs {
                walk(input, seen);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relplan::{BaseSchema, Field, JoinType, JoinRel, NamedTable, PlanRelation, ReadRel, ScalarType};

    fn read(table: &str) -> Rel {
        Rel::Read(ReadRel {
            named_table: NamedTable::single(table),
            base_schema: Some(BaseSchema::new(vec![Field {
                name: "id".into(),
                data_type: ScalarType::I64,
            }])),
            filter: None,
        })
    }

    #[test]
    fn empty_plan_has_no_tables() {
        let plan = Plan::new(vec![]);
        assert!(extract_table_names(&plan).is_empty());
    }

    #[test]
    fn single_read_is_extracted() {
        let plan = Plan::new(vec![PlanRelation::Bare(read("titanic"))]);
        assert_eq!(extract_table_names(&plan), vec!["titanic".to_string()]);
    }

    #[test]
    fn duplicate_reads_are_deduplicated_in_first_seen_order() {
        let join = Rel::Join(JoinRel {
            left: Box::new(read("orders")),
            right: Box::new(read("orders")),
            condition: None,
            join_type: JoinType::Inner,
        });
        let plan = Plan::new(vec![PlanRelation::Bare(join)]);
        assert_eq!(extract_table_names(&plan), vec!["orders".to_string()]);
    }

    #[test]
    fn root_wrapped_and_bare_relations_are_both_walked() {
        let plan = Plan::new(vec![
            PlanRelation::Root { input: read("a"), names: vec!["id".into()] },
            PlanRelation::Bare(read("b")),
        ]);
        assert_eq!(extract_table_names(&plan), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn table_name_extraction_is_case_sensitive() {
        let join = Rel::Join(JoinRel {
            left: Box::new(read("Orders")),
            right: Box::new(read("orders")),
            condition: None,
            join_type: JoinType::Inner,
        });
        let plan = Plan::new(vec![PlanRelation::Bare(join)]);
        assert_eq!(extract_table_names(&plan), vec!["Orders".to_string(), "orders".to_string()]);
    }
}
