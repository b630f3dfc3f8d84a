// # Typed literals and scalar types
//
// The predicate builder (module E) only ever needs to compare a column's
// declared type against the type of a rule's literal value, so the two are
// modeled as parallel enums: `ScalarType` describes a schema field or an
// expression's output type, `Literal` carries a concrete typed value. Each
// literal type has exactly one wire representation.

use serde::{Deserialize, Serialize};

/// A declared column or expression type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarType {
    I8,
    I16,
    I32,
    I64,
    Fp32,
    Fp64,
    Bool,
    String,
    Varchar(u32),
    FixedChar(u32),
    /// Days since the Unix epoch.
    Date,
    /// Microseconds since the Unix epoch.
    Timestamp,
    Decimal { precision: u8, scale: u8 },
}

impl ScalarType {
    /// The `type_type` fragment used when naming extension functions, e.g.
    /// `i64` in `equal:i64_i64`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ScalarType::I8 => "i8",
            ScalarType::I16 => "i16",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::Fp32 => "fp32",
            ScalarType::Fp64 => "fp64",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Varchar(_) => "varchar",
            ScalarType::FixedChar(_) => "fixedchar",
            ScalarType::Date => "date",
            ScalarType::Timestamp => "timestamp",
            ScalarType::Decimal { .. } => "decimal",
        }
    }
}

/// A typed literal value. Each variant corresponds one-to-one with a
/// `ScalarType` variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Fp32(f32),
    Fp64(f64),
    Bool(bool),
    String(String),
    Varchar(String),
    FixedChar(String),
    Date(i32),
    Timestamp(i64),
    /// 16-byte two's-complement unscaled value plus precision/scale.
    Decimal { value: [u8; 16], precision: u8, scale: u8 },
}

impl Literal {
    /// The `ScalarType` this literal is an instance of. For `Varchar` and
    /// `FixedChar` the declared length is not recoverable from the value
    /// alone, so callers that need type-compatibility with a schema field
    /// should use `matches_type` instead of comparing this directly.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Literal::I8(_) => ScalarType::I8,
            Literal::I16(_) => ScalarType::I16,
            Literal::I32(_) => ScalarType::I32,
            Literal::I64(_) => ScalarType::I64,
            Literal::Fp32(_) => ScalarType::Fp32,
            Literal::Fp64(_) => ScalarType::Fp64,
            Literal::Bool(_) => ScalarType::Bool,
            Literal::String(_) => ScalarType::String,
            Literal::Varchar(s) => ScalarType::Varchar(s.len() as u32),
            Literal::FixedChar(s) => ScalarType::FixedChar(s.len() as u32),
            Literal::Date(_) => ScalarType::Date,
            Literal::Timestamp(_) => ScalarType::Timestamp,
            Literal::Decimal { precision, scale, .. } => {
                ScalarType::Decimal { precision: *precision, scale: *scale }
            }
        }
    }

    /// Whether this literal is a valid value for a field declared as
    /// `column_type`.
    pub fn matches_type(&self, column_type: &ScalarType) -> bool {
        match (self, column_type) {
            (Literal::I8(_), ScalarType::I8)
            | (Literal::I16(_), ScalarType::I16)
            | (Literal::I32(_), ScalarType::I32)
            | (Literal::I64(_), ScalarType::I64)
            | (Literal::Fp32(_), ScalarType::Fp32)
            | (Literal::Fp64(_), ScalarType::Fp64)
            | (Literal::Bool(_), ScalarType::Bool)
            | (Literal::String(_), ScalarType::String)
            | (Literal::Varchar(_), ScalarType::Varchar(_))
            | (Literal::FixedChar(_), ScalarType::FixedChar(_))
            | (Literal::Date(_), ScalarType::Date)
            | (Literal::Timestamp(_), ScalarType::Timestamp)
            | (Literal::Decimal { .. }, ScalarType::Decimal { .. }) => true,
            _ => false,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        self.scalar_type().wire_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_type_accepts_same_variant() {
        assert!(Literal::I64(1).matches_type(&ScalarType::I64));
        assert!(Literal::Bool(true).matches_type(&ScalarType::Bool));
        assert!(Literal::Varchar("x".into()).matches_type(&ScalarType::Varchar(10)));
    }

    #[test]
    fn matches_type_rejects_cross_variant() {
        assert!(!Literal::I64(1).matches_type(&ScalarType::I32));
        assert!(!Literal::String("x".into()).matches_type(&ScalarType::Varchar(10)));
    }

    #[test]
    fn wire_name_matches_the_operator_naming_convention() {
        assert_eq!(ScalarType::I64.wire_name(), "i64");
        assert_eq!(ScalarType::Bool.wire_name(), "bool");
    }
}
