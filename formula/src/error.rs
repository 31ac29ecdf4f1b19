// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The error taxonomy shared by every layer of the formula API.

use thiserror::Error;

use crate::sorts::Sort;

/// An error from building, transforming, or solving formulas.
///
/// Usage errors ([`SortMismatch`](FormulaError::SortMismatch) through
/// [`InvalidArgument`](FormulaError::InvalidArgument)) are programming mistakes
/// reported at the API boundary. [`Unsupported`](FormulaError::Unsupported) is
/// kept separate from solver failures so callers can pick a fallback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    /// An operand or branch had the wrong sort.
    #[error("expected {expected} but found {found}")]
    #[allow(missing_docs)]
    SortMismatch { expected: Sort, found: Sort },
    /// A symbol was declared again with a different signature.
    #[error("symbol {name} is already declared as {existing} and cannot be redeclared as {requested}")]
    #[allow(missing_docs)]
    SignatureClash {
        name: String,
        existing: String,
        requested: String,
    },
    /// A variable or function name that SMT-LIB does not allow.
    #[error("invalid name {0:?}")]
    InvalidName(String),
    /// A cast between sorts that has no meaning.
    #[error("cannot cast from {from} to {to}")]
    #[allow(missing_docs)]
    MalformedCast { from: Sort, to: Sort },
    /// Any other malformed argument (out-of-range constants, bad extract
    /// bounds, non-variables used as binders, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The backend does not implement this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// The backend failed on a well-formed query.
    #[error("solver failed: {0}")]
    Solver(String),
    /// The backend ran out of stack or memory.
    #[error("solver ran out of resources: {0}")]
    ResourceExhausted(String),
    /// The operation was cancelled.
    #[error("interrupted")]
    Interrupted,
}

impl FormulaError {
    /// Whether this is the capability-unsupported signal.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, FormulaError::Unsupported(_))
    }

    /// Whether this error is a programming mistake on the caller's side.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            FormulaError::SortMismatch { .. }
                | FormulaError::SignatureClash { .. }
                | FormulaError::InvalidName(_)
                | FormulaError::MalformedCast { .. }
                | FormulaError::InvalidArgument(_)
        )
    }

    /// Classify a raw backend error message. Stack and memory exhaustion get
    /// actionable guidance; everything else is a plain solver failure.
    pub fn from_solver_message(msg: &str) -> Self {
        let lower = msg.to_lowercase();
        if lower.contains("stack overflow") || lower.contains("stackoverflow") {
            FormulaError::ResourceExhausted(format!(
                "ran out of stack memory, try increasing the stack size ({msg})"
            ))
        } else if lower.contains("out of memory") || lower.contains("memout") {
            FormulaError::ResourceExhausted(format!(
                "ran out of memory, try increasing the memory limit ({msg})"
            ))
        } else {
            FormulaError::Solver(msg.to_string())
        }
    }

    /// Fail with [`FormulaError::SortMismatch`] unless the sorts are equal.
    pub fn expect_sort(expected: &Sort, found: &Sort) -> Result<(), Self> {
        if expected != found {
            return Err(FormulaError::SortMismatch {
                expected: expected.clone(),
                found: found.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_messages() {
        assert!(matches!(
            FormulaError::from_solver_message("Stack overflow in rewriter"),
            FormulaError::ResourceExhausted(_)
        ));
        assert!(matches!(
            FormulaError::from_solver_message("out of memory"),
            FormulaError::ResourceExhausted(_)
        ));
        assert_eq!(
            FormulaError::from_solver_message("unknown constant x"),
            FormulaError::Solver("unknown constant x".to_string())
        );
    }

    #[test]
    fn test_display() {
        let e = FormulaError::SortMismatch {
            expected: Sort::Integer,
            found: Sort::Bitvector(8),
        };
        insta::assert_display_snapshot!(e, @"expected Int but found (_ BitVec 8)");
        assert!(e.is_usage_error());
        assert!(FormulaError::Unsupported("qe".to_string()).is_unsupported());
    }
}
