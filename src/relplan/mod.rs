// # RelPlan model
//
// The in-memory relational-algebra tree and its two extension
// registries. Every type here is plain owned data (`String`, `Vec`,
// `Box<Rel>`) rather than `Rc`/`Arc`, so `#[derive(Clone)]` already gives the
// "total" deep clone module A requires: a cloned `Plan` shares no
// substructure with its source.

pub mod literal;
pub mod predicate;
pub mod rewriter;
pub mod walker;

pub use literal::{Literal, ScalarType};

use serde::{Deserialize, Serialize};

/// Monotonically increasing identifier for an extension URI or function,
/// unique within one plan.
pub type Anchor = u32;

/// An ordered, 1-3 element compound identifier: `[catalog?, schema?, table]`.
/// The resolved table name is always the last element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTable {
    pub names: Vec<String>,
}

impl NamedTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn single(table: impl Into<String>) -> Self {
        Self { names: vec![table.into()] }
    }

    /// The resolved table name: the last element of the identifier list, or
    /// `None` for an empty (malformed) identifier.
    pub fn resolved_name(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }
}

/// A single `(name, type)` pair in a Read's base schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: ScalarType,
}

/// The ordered field list a Read exposes before any projection. Field
/// indices into this schema are stable across the lifetime of the Read and
/// are what the predicate builder and rewriter reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSchema {
    pub fields: Vec<Field>,
}

impl BaseSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Resolve a column name to its field index. First occurrence wins on
    /// duplicate names.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == column)
    }

    pub fn type_at(&self, index: usize) -> Option<&ScalarType> {
        self.fields.get(index).map(|f| &f.data_type)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A scalar expression: a typed literal, a field reference resolved against
/// the enclosing relation's schema, or a scalar-function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(Literal),
    /// Index into the enclosing relation's (or Read's base) schema.
    FieldRef(usize),
    ScalarFunction {
        function_anchor: Anchor,
        output_type: ScalarType,
        nullable: bool,
        args: Vec<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetOp {
    Union,
    UnionAll,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub field_index: usize,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadRel {
    pub named_table: NamedTable,
    pub base_schema: Option<BaseSchema>,
    pub filter: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRel {
    pub input: Box<Rel>,
    pub expressions: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRel {
    pub input: Box<Rel>,
    pub condition: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRel {
    pub input: Box<Rel>,
    pub offset: u64,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortRel {
    pub input: Box<Rel>,
    pub sort_fields: Vec<SortField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRel {
    pub input: Box<Rel>,
    pub groupings: Vec<usize>,
    pub measures: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRel {
    pub left: Box<Rel>,
    pub right: Box<Rel>,
    pub condition: Option<Expression>,
    pub join_type: JoinType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRel {
    pub left: Box<Rel>,
    pub right: Box<Rel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashJoinRel {
    pub left: Box<Rel>,
    pub right: Box<Rel>,
    pub left_keys: Vec<usize>,
    pub right_keys: Vec<usize>,
    pub join_type: JoinType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeJoinRel {
    pub left: Box<Rel>,
    pub right: Box<Rel>,
    pub left_keys: Vec<usize>,
    pub right_keys: Vec<usize>,
    pub join_type: JoinType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRel {
    pub inputs: Vec<Rel>,
    pub op: SetOp,
}

/// Opaque single-input extension operator. The rewriter must still descend
/// through `input` even though it does not understand `detail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionSingleRel {
    pub input: Box<Rel>,
    pub detail: serde_json::Value,
}

/// Opaque n-ary extension operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionMultiRel {
    pub inputs: Vec<Rel>,
    pub detail: serde_json::Value,
}

/// A relational-algebra node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Rel {
    Read(ReadRel),
    Project(ProjectRel),
    Filter(FilterRel),
    Fetch(FetchRel),
    Sort(SortRel),
    Aggregate(AggregateRel),
    Join(JoinRel),
    Cross(CrossRel),
    HashJoin(HashJoinRel),
    MergeJoin(MergeJoinRel),
    Set(SetRel),
    ExtensionSingle(ExtensionSingleRel),
    ExtensionMulti(ExtensionMultiRel),
}

/// One top-level entry in a plan's relation list: either the query root
/// (carrying the output field names) or a bare subordinate relation —
/// every top-level relation, root-wrapped or bare, is a valid walk/rewrite
/// target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanRelation {
    Root { input: Rel, names: Vec<String> },
    Bare(Rel),
}

impl PlanRelation {
    pub fn rel(&self) -> &Rel {
        match self {
            PlanRelation::Root { input, .. } => input,
            PlanRelation::Bare(rel) => rel,
        }
    }

    pub fn rel_mut(&mut self) -> &mut Rel {
        match self {
            PlanRelation::Root { input, .. } => input,
            PlanRelation::Bare(rel) => rel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionUriRegistration {
    pub anchor: Anchor,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionFunctionRegistration {
    pub anchor: Anchor,
    pub uri_anchor: Anchor,
    /// `op:type_type`, e.g. `equal:i64_i64`.
    pub function_name: String,
}

/// A versioned, structured plan message: a relation tree plus the two
/// extension registries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub version: u32,
    pub extension_uris: Vec<ExtensionUriRegistration>,
    pub extensions: Vec<ExtensionFunctionRegistration>,
    pub relations: Vec<PlanRelation>,
}

pub const PLAN_WIRE_VERSION: u32 = 1;

impl Plan {
    pub fn new(relations: Vec<PlanRelation>) -> Self {
        Self {
            version: PLAN_WIRE_VERSION,
            extension_uris: Vec::new(),
            extensions: Vec::new(),
            relations,
        }
    }

    /// Find-or-insert an extension URI, idempotent per unique `uri`.
    pub fn register_uri(&mut self, uri: &str) -> Anchor {
        if let Some(existing) = self.extension_uris.iter().find(|u| u.uri == uri) {
            return existing.anchor;
        }
        let anchor = self.next_anchor();
        self.extension_uris.push(ExtensionUriRegistration { anchor, uri: uri.to_string() });
        anchor
    }

    /// Find-or-insert an extension function, idempotent per unique
    /// `(name, uri_anchor)` pair: anchors of two identical pairs are equal.
    pub fn register_function(&mut self, uri_anchor: Anchor, function_name: &str) -> Anchor {
        if let Some(existing) = self
            .extensions
            .iter()
            .find(|f| f.function_name == function_name && f.uri_anchor == uri_anchor)
        {
            return existing.anchor;
        }
        let anchor = self.next_anchor();
        self.extensions.push(ExtensionFunctionRegistration {
            anchor,
            uri_anchor,
            function_name: function_name.to_string(),
        });
        anchor
    }

    /// `max_anchor + 1` across both registries.
    fn next_anchor(&self) -> Anchor {
        let max_uri = self.extension_uris.iter().map(|u| u.anchor).max();
        let max_fn = self.extensions.iter().map(|f| f.anchor).max();
        max_uri.into_iter().chain(max_fn).max().map_or(0, |m| m + 1)
    }

    /// Serialize to the plan's wire representation. Round-tripping through
    /// `from_wire` is the identity on any plan this crate produces.
    pub fn to_wire(&self) -> crate::error::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Into::into)
    }

    pub fn from_wire(bytes: &[u8]) -> crate::error::Result<Self> {
        serde_json::from_slice(bytes).map_err(Into::into)
    }
}
