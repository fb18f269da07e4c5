//! Query shapes and the predicate-safety guard for `query_by_field`.

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct ConeSearchHit {
    pub obj_name: String,
    pub ra: f64,
    pub dec: f64,
    pub distance_deg: f64,
}

/// Operators allowed in an `ANY ... SATISFIES x.value OP literal END`
/// predicate (`SPEC_FULL.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Lt,
    Gt,
    Eq,
    Le,
    Ge,
    In,
    Like,
}

impl FieldOp {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Eq => "=",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::In => "IN",
            Self::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldPredicate {
    pub field: String,
    pub op: FieldOp,
    pub literal: String,
}

/// The tokens the store must reject in literal positions, per `SPEC_FULL.md`
/// §4.5: `;`, `--`, `/*`, `*/`.
const FORBIDDEN_TOKENS: &[&str] = &[";", "--", "/*", "*/"];

/// Reject predicates whose literal contains a disallowed SQL-injection
/// token.
///
/// # Errors
/// Returns `StoreError::UnsafePredicate` if `literal` contains `;`, `--`,
/// `/*`, or `*/`.
pub fn validate_predicate(predicate: &FieldPredicate) -> Result<(), StoreError> {
    for token in FORBIDDEN_TOKENS {
        if predicate.literal.contains(token) || predicate.field.contains(token) {
            return Err(StoreError::UnsafePredicate);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predicate(literal: &str) -> FieldPredicate {
        FieldPredicate { field: "identifiers".into(), op: FieldOp::Eq, literal: literal.into() }
    }

    #[test]
    fn rejects_semicolon() {
        assert!(validate_predicate(&predicate("x; DROP TABLE objects")).is_err());
    }

    #[test]
    fn rejects_sql_comment() {
        assert!(validate_predicate(&predicate("x -- comment")).is_err());
        assert!(validate_predicate(&predicate("x /* comment */")).is_err());
    }

    #[test]
    fn accepts_plain_literal() {
        assert!(validate_predicate(&predicate("2025abc")).is_ok());
    }
}
