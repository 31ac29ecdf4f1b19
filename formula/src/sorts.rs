// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The closed set of sorts a formula can have.

use serde::Serialize;
use std::fmt;

use crate::error::FormulaError;

/// The semantic type of a formula.
///
/// Sorts are plain values and compare structurally. Parameterized sorts carry
/// their parameters, which every backend has to preserve across wrapping and
/// unwrapping.
#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord, Serialize)]
pub enum Sort {
    /// Boolean sort
    Boolean,
    /// Mathematical integers
    Integer,
    /// Rational (real) numbers
    Rational,
    /// Fixed-width bitvectors with a positive width
    Bitvector(u32),
    /// IEEE floating point. The mantissa width does not include the hidden
    /// bit, so single precision is `exponent: 8, mantissa: 23`.
    #[allow(missing_docs)]
    FloatingPoint { exponent: u32, mantissa: u32 },
    /// Arrays from the first sort (index) to the second (element)
    Array(Box<Sort>, Box<Sort>),
    /// The rounding modes of the floating point theory
    RoundingMode,
}

impl Sort {
    /// Smart constructor for bitvector sorts that rejects zero widths.
    pub fn bitvector(width: u32) -> Result<Self, FormulaError> {
        if width == 0 {
            return Err(FormulaError::InvalidArgument(
                "bitvector width must be positive".to_string(),
            ));
        }
        Ok(Sort::Bitvector(width))
    }

    /// Smart constructor for floating point sorts that rejects zero widths.
    pub fn floating_point(exponent: u32, mantissa: u32) -> Result<Self, FormulaError> {
        if exponent == 0 || mantissa == 0 {
            return Err(FormulaError::InvalidArgument(format!(
                "floating point sort needs positive widths, got ({exponent}, {mantissa})"
            )));
        }
        Ok(Sort::FloatingPoint { exponent, mantissa })
    }

    /// IEEE 754 binary32.
    pub fn single_precision() -> Self {
        Sort::FloatingPoint {
            exponent: 8,
            mantissa: 23,
        }
    }

    /// IEEE 754 binary64.
    pub fn double_precision() -> Self {
        Sort::FloatingPoint {
            exponent: 11,
            mantissa: 52,
        }
    }

    /// Smart constructor for array sorts.
    pub fn array(index: Sort, element: Sort) -> Self {
        Sort::Array(Box::new(index), Box::new(element))
    }

    /// Integer or rational.
    pub fn is_numeral(&self) -> bool {
        matches!(self, Sort::Integer | Sort::Rational)
    }

    /// The width of a bitvector sort.
    pub fn bitvector_width(&self) -> Option<u32> {
        match self {
            Sort::Bitvector(w) => Some(*w),
            _ => None,
        }
    }

    /// The total number of bits of a floating point sort, including the sign
    /// bit, which is the width of its IEEE bitvector encoding.
    pub fn floating_point_width(&self) -> Option<u32> {
        match self {
            Sort::FloatingPoint { exponent, mantissa } => Some(1 + exponent + mantissa),
            _ => None,
        }
    }

    /// The index and element sorts of an array sort.
    pub fn array_sorts(&self) -> Option<(&Sort, &Sort)> {
        match self {
            Sort::Array(index, element) => Some((index, element)),
            _ => None,
        }
    }

    /// A short name used to derive names of auxiliary symbols (for example the
    /// uninterpreted functions approximating non-linear arithmetic).
    pub fn symbol_suffix(&self) -> String {
        match self {
            Sort::Boolean => "Bool".to_string(),
            Sort::Integer => "Int".to_string(),
            Sort::Rational => "Real".to_string(),
            Sort::Bitvector(w) => format!("BV{w}"),
            Sort::FloatingPoint { exponent, mantissa } => format!("FP{exponent}_{mantissa}"),
            Sort::Array(index, element) => {
                format!("Array_{}_{}", index.symbol_suffix(), element.symbol_suffix())
            }
            Sort::RoundingMode => "RM".to_string(),
        }
    }
}

/// Sorts print in SMT-LIB syntax.
impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Boolean => write!(f, "Bool"),
            Sort::Integer => write!(f, "Int"),
            Sort::Rational => write!(f, "Real"),
            Sort::Bitvector(w) => write!(f, "(_ BitVec {w})"),
            Sort::FloatingPoint { exponent, mantissa } => {
                write!(f, "(_ FloatingPoint {exponent} {})", mantissa + 1)
            }
            Sort::Array(index, element) => write!(f, "(Array {index} {element})"),
            Sort::RoundingMode => write!(f, "RoundingMode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let sorts = [
            Sort::Boolean,
            Sort::Integer,
            Sort::Rational,
            Sort::Bitvector(8),
            Sort::single_precision(),
            Sort::array(Sort::Integer, Sort::array(Sort::Bitvector(4), Sort::Boolean)),
            Sort::RoundingMode,
        ];
        let printed = sorts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        insta::assert_snapshot!(printed.join("\n"), @r###"
        Bool
        Int
        Real
        (_ BitVec 8)
        (_ FloatingPoint 8 24)
        (Array Int (Array (_ BitVec 4) Bool))
        RoundingMode
        "###);
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(
            Sort::array(Sort::Integer, Sort::Bitvector(3)),
            Sort::array(Sort::Integer, Sort::Bitvector(3))
        );
        assert_ne!(Sort::Bitvector(3), Sort::Bitvector(4));
        assert_eq!(Sort::floating_point(8, 23), Ok(Sort::single_precision()));
    }

    #[test]
    fn test_zero_widths_rejected() {
        assert!(Sort::bitvector(0).is_err());
        assert!(Sort::floating_point(0, 3).is_err());
        assert_eq!(Sort::double_precision().floating_point_width(), Some(64));
    }
}
