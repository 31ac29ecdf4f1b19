// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Typed formula handles and function declarations.

use serde::Serialize;
use std::fmt;

use crate::{error::FormulaError, sorts::Sort};

/// A typed handle: a sort paired with an opaque backend term.
///
/// Handles are values. Two handles are equal exactly when they wrap the same
/// backend term with the same sort, so backends must give their terms an
/// equality that identifies the underlying object (pointer or id equality,
/// or structural equality for hash-consed terms).
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct Formula<T> {
    sort: Sort,
    term: T,
}

impl<T> Formula<T> {
    /// Pair a term with its sort without consulting the backend. Use
    /// [`FormulaCreator::encapsulate`](crate::FormulaCreator::encapsulate)
    /// unless the sort is already known to be right.
    pub(crate) fn new_unchecked(sort: Sort, term: T) -> Self {
        Formula { sort, term }
    }

    /// The sort of this formula.
    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// The wrapped backend term.
    pub fn term(&self) -> &T {
        &self.term
    }

    /// Unwrap into the backend term.
    pub fn into_term(self) -> T {
        self.term
    }

    /// Whether this formula has sort Boolean.
    pub fn is_boolean(&self) -> bool {
        self.sort == Sort::Boolean
    }
}

impl<T: fmt::Display> fmt::Display for Formula<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.term)
    }
}

/// A quantifier
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord, Serialize)]
pub enum Quantifier {
    Forall,
    Exists,
}

impl Quantifier {
    /// The dual quantifier (for pushing negations inward).
    pub fn dual(self) -> Self {
        match self {
            Quantifier::Forall => Quantifier::Exists,
            Quantifier::Exists => Quantifier::Forall,
        }
    }
}

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantifier::Forall => write!(f, "forall"),
            Quantifier::Exists => write!(f, "exists"),
        }
    }
}

/// The kind of a function declaration.
///
/// Indexed operators carry their indices. Anything a backend cannot classify
/// is [`FunctionKind::Other`] with the backend's own operator name.
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord, Serialize)]
pub enum FunctionKind {
    // boolean and core
    And,
    Or,
    Not,
    Xor,
    Iff,
    Implies,
    Ite,
    Eq,
    Distinct,

    // integer and rational arithmetic
    Uminus,
    Add,
    Sub,
    Mul,
    Div,
    Modulo,
    Lt,
    Lte,
    Gt,
    Gte,
    ToReal,
    Floor,

    // arrays
    Select,
    Store,
    /// A constant array over the given index sort
    ConstArray(Sort),

    // bitvectors
    BvNeg,
    BvAdd,
    BvSub,
    BvMul,
    BvUdiv,
    BvSdiv,
    BvUrem,
    BvSrem,
    BvNot,
    BvAnd,
    BvOr,
    BvXor,
    BvShl,
    BvLshr,
    BvAshr,
    BvConcat,
    BvExtract { msb: u32, lsb: u32 },
    BvZeroExtend(u32),
    BvSignExtend(u32),
    BvUlt,
    BvUle,
    BvUgt,
    BvUge,
    BvSlt,
    BvSle,
    BvSgt,
    BvSge,
    BvToNat,
    NatToBv(u32),

    // floating point
    FpNeg,
    FpAbs,
    FpMax,
    FpMin,
    FpSqrt,
    FpAdd,
    FpSub,
    FpMul,
    FpDiv,
    FpRoundToIntegral,
    FpEq,
    FpLt,
    FpLe,
    FpGt,
    FpGe,
    FpIsNan,
    FpIsInfinite,
    FpIsZero,
    FpIsSubnormal,
    FpIsNormal,
    FpIsNegative,
    /// Reinterpret an IEEE bitvector as a float
    FpFromIeeeBv { exponent: u32, mantissa: u32 },
    /// Convert a float, real, or signed bitvector to a float
    FpToFp { exponent: u32, mantissa: u32 },
    /// Convert an unsigned bitvector to a float
    FpToFpUnsigned { exponent: u32, mantissa: u32 },
    FpToUbv(u32),
    FpToSbv(u32),
    FpToReal,
    /// The IEEE bitvector encoding of a float
    FpToIeeeBv,

    /// An uninterpreted function
    Uf,
    /// A backend operator with no counterpart in this enumeration
    Other(String),
}

impl FunctionKind {
    /// Whether this is one of the propositional connectives.
    pub fn is_connective(&self) -> bool {
        matches!(
            self,
            FunctionKind::And
                | FunctionKind::Or
                | FunctionKind::Not
                | FunctionKind::Xor
                | FunctionKind::Iff
                | FunctionKind::Implies
        )
    }

    /// The SMT-LIB spelling of this operator when applied to arguments of the
    /// given sorts, or `None` for uninterpreted functions.
    pub fn smt_name(&self, arg_sorts: &[Sort]) -> Option<String> {
        use FunctionKind::*;
        let name = match self {
            And => "and",
            Or => "or",
            Not => "not",
            Xor => "xor",
            Iff | Eq => "=",
            Implies => "=>",
            Ite => "ite",
            Distinct => "distinct",
            Uminus | Sub => "-",
            Add => "+",
            Mul => "*",
            Div => match arg_sorts.first() {
                Some(Sort::Integer) => "div",
                _ => "/",
            },
            Modulo => "mod",
            Lt => "<",
            Lte => "<=",
            Gt => ">",
            Gte => ">=",
            ToReal => "to_real",
            Floor => "to_int",
            Select => "select",
            Store => "store",
            ConstArray(index) => {
                let element = arg_sorts.first().cloned().unwrap_or(Sort::Boolean);
                return Some(format!(
                    "(as const {})",
                    Sort::array(index.clone(), element)
                ));
            }
            BvNeg => "bvneg",
            BvAdd => "bvadd",
            BvSub => "bvsub",
            BvMul => "bvmul",
            BvUdiv => "bvudiv",
            BvSdiv => "bvsdiv",
            BvUrem => "bvurem",
            BvSrem => "bvsrem",
            BvNot => "bvnot",
            BvAnd => "bvand",
            BvOr => "bvor",
            BvXor => "bvxor",
            BvShl => "bvshl",
            BvLshr => "bvlshr",
            BvAshr => "bvashr",
            BvConcat => "concat",
            BvExtract { msb, lsb } => return Some(format!("(_ extract {msb} {lsb})")),
            BvZeroExtend(n) => return Some(format!("(_ zero_extend {n})")),
            BvSignExtend(n) => return Some(format!("(_ sign_extend {n})")),
            BvUlt => "bvult",
            BvUle => "bvule",
            BvUgt => "bvugt",
            BvUge => "bvuge",
            BvSlt => "bvslt",
            BvSle => "bvsle",
            BvSgt => "bvsgt",
            BvSge => "bvsge",
            BvToNat => "bv2nat",
            NatToBv(w) => return Some(format!("(_ int2bv {w})")),
            FpNeg => "fp.neg",
            FpAbs => "fp.abs",
            FpMax => "fp.max",
            FpMin => "fp.min",
            FpSqrt => "fp.sqrt",
            FpAdd => "fp.add",
            FpSub => "fp.sub",
            FpMul => "fp.mul",
            FpDiv => "fp.div",
            FpRoundToIntegral => "fp.roundToIntegral",
            FpEq => "fp.eq",
            FpLt => "fp.lt",
            FpLe => "fp.leq",
            FpGt => "fp.gt",
            FpGe => "fp.geq",
            FpIsNan => "fp.isNaN",
            FpIsInfinite => "fp.isInfinite",
            FpIsZero => "fp.isZero",
            FpIsSubnormal => "fp.isSubnormal",
            FpIsNormal => "fp.isNormal",
            FpIsNegative => "fp.isNegative",
            FpFromIeeeBv { exponent, mantissa } | FpToFp { exponent, mantissa } => {
                return Some(format!("(_ to_fp {exponent} {})", mantissa + 1))
            }
            FpToFpUnsigned { exponent, mantissa } => {
                return Some(format!("(_ to_fp_unsigned {exponent} {})", mantissa + 1))
            }
            FpToUbv(w) => return Some(format!("(_ fp.to_ubv {w})")),
            FpToSbv(w) => return Some(format!("(_ fp.to_sbv {w})")),
            FpToReal => "fp.to_real",
            FpToIeeeBv => "fp.to_ieee_bv",
            Uf => return None,
            Other(name) => name,
        };
        Some(name.to_string())
    }

    /// Check the argument sorts of a built-in operator and compute the sort
    /// of its application.
    pub fn result_sort(&self, args: &[Sort]) -> Result<Sort, FormulaError> {
        use FunctionKind::*;
        let arity = |n: usize| -> Result<(), FormulaError> {
            if args.len() != n {
                return Err(FormulaError::InvalidArgument(format!(
                    "{self:?} expects {n} arguments but got {}",
                    args.len()
                )));
            }
            Ok(())
        };
        let at_least = |n: usize| -> Result<(), FormulaError> {
            if args.len() < n {
                return Err(FormulaError::InvalidArgument(format!(
                    "{self:?} expects at least {n} arguments but got {}",
                    args.len()
                )));
            }
            Ok(())
        };
        let all = |sort: &Sort| -> Result<(), FormulaError> {
            args.iter()
                .try_for_each(|arg| FormulaError::expect_sort(sort, arg))
        };
        let numeral = |sort: &Sort| -> Result<(), FormulaError> {
            if !sort.is_numeral() {
                return Err(FormulaError::SortMismatch {
                    expected: Sort::Integer,
                    found: sort.clone(),
                });
            }
            Ok(())
        };
        let bitvector = |sort: &Sort| -> Result<u32, FormulaError> {
            sort.bitvector_width()
                .ok_or_else(|| FormulaError::InvalidArgument(format!("{sort} is not a bitvector")))
        };
        let float = |sort: &Sort| -> Result<(), FormulaError> {
            match sort {
                Sort::FloatingPoint { .. } => Ok(()),
                _ => Err(FormulaError::InvalidArgument(format!(
                    "{sort} is not a floating point sort"
                ))),
            }
        };
        let fp_sort = |exponent: u32, mantissa: u32| Sort::floating_point(exponent, mantissa);

        let sort = match self {
            And | Or => {
                at_least(1)?;
                all(&Sort::Boolean)?;
                Sort::Boolean
            }
            Not => {
                arity(1)?;
                all(&Sort::Boolean)?;
                Sort::Boolean
            }
            Xor | Iff | Implies => {
                arity(2)?;
                all(&Sort::Boolean)?;
                Sort::Boolean
            }
            Ite => {
                arity(3)?;
                FormulaError::expect_sort(&Sort::Boolean, &args[0])?;
                FormulaError::expect_sort(&args[1], &args[2])?;
                args[1].clone()
            }
            Eq | Distinct => {
                at_least(2)?;
                all(&args[0])?;
                Sort::Boolean
            }
            Uminus => {
                arity(1)?;
                numeral(&args[0])?;
                args[0].clone()
            }
            Add | Sub | Mul => {
                at_least(2)?;
                numeral(&args[0])?;
                all(&args[0])?;
                args[0].clone()
            }
            Div => {
                arity(2)?;
                numeral(&args[0])?;
                all(&args[0])?;
                args[0].clone()
            }
            Modulo => {
                arity(2)?;
                all(&Sort::Integer)?;
                Sort::Integer
            }
            Lt | Lte | Gt | Gte => {
                arity(2)?;
                numeral(&args[0])?;
                all(&args[0])?;
                Sort::Boolean
            }
            ToReal => {
                arity(1)?;
                all(&Sort::Integer)?;
                Sort::Rational
            }
            Floor => {
                arity(1)?;
                all(&Sort::Rational)?;
                Sort::Integer
            }
            Select => {
                arity(2)?;
                let (index, element) = array_sorts(&args[0])?;
                FormulaError::expect_sort(index, &args[1])?;
                element.clone()
            }
            Store => {
                arity(3)?;
                let (index, element) = array_sorts(&args[0])?;
                FormulaError::expect_sort(index, &args[1])?;
                FormulaError::expect_sort(element, &args[2])?;
                args[0].clone()
            }
            ConstArray(index) => {
                arity(1)?;
                Sort::array(index.clone(), args[0].clone())
            }
            BvNeg | BvNot => {
                arity(1)?;
                bitvector(&args[0])?;
                args[0].clone()
            }
            BvAdd | BvSub | BvMul | BvUdiv | BvSdiv | BvUrem | BvSrem | BvAnd | BvOr | BvXor
            | BvShl | BvLshr | BvAshr => {
                arity(2)?;
                bitvector(&args[0])?;
                all(&args[0])?;
                args[0].clone()
            }
            BvUlt | BvUle | BvUgt | BvUge | BvSlt | BvSle | BvSgt | BvSge => {
                arity(2)?;
                bitvector(&args[0])?;
                all(&args[0])?;
                Sort::Boolean
            }
            BvConcat => {
                arity(2)?;
                Sort::Bitvector(bitvector(&args[0])? + bitvector(&args[1])?)
            }
            BvExtract { msb, lsb } => {
                arity(1)?;
                let width = bitvector(&args[0])?;
                if lsb > msb || *msb >= width {
                    return Err(FormulaError::InvalidArgument(format!(
                        "cannot extract bits {msb}..{lsb} from a bitvector of width {width}"
                    )));
                }
                Sort::Bitvector(msb - lsb + 1)
            }
            BvZeroExtend(n) | BvSignExtend(n) => {
                arity(1)?;
                Sort::Bitvector(bitvector(&args[0])? + n)
            }
            BvToNat => {
                arity(1)?;
                bitvector(&args[0])?;
                Sort::Integer
            }
            NatToBv(w) => {
                arity(1)?;
                all(&Sort::Integer)?;
                Sort::bitvector(*w)?
            }
            FpNeg | FpAbs => {
                arity(1)?;
                float(&args[0])?;
                args[0].clone()
            }
            FpMax | FpMin => {
                arity(2)?;
                float(&args[0])?;
                all(&args[0])?;
                args[0].clone()
            }
            FpSqrt | FpRoundToIntegral => {
                arity(2)?;
                FormulaError::expect_sort(&Sort::RoundingMode, &args[0])?;
                float(&args[1])?;
                args[1].clone()
            }
            FpAdd | FpSub | FpMul | FpDiv => {
                arity(3)?;
                FormulaError::expect_sort(&Sort::RoundingMode, &args[0])?;
                float(&args[1])?;
                FormulaError::expect_sort(&args[1], &args[2])?;
                args[1].clone()
            }
            FpEq | FpLt | FpLe | FpGt | FpGe => {
                arity(2)?;
                float(&args[0])?;
                all(&args[0])?;
                Sort::Boolean
            }
            FpIsNan | FpIsInfinite | FpIsZero | FpIsSubnormal | FpIsNormal | FpIsNegative => {
                arity(1)?;
                float(&args[0])?;
                Sort::Boolean
            }
            FpFromIeeeBv { exponent, mantissa } => {
                arity(1)?;
                FormulaError::expect_sort(&Sort::Bitvector(1 + exponent + mantissa), &args[0])?;
                fp_sort(*exponent, *mantissa)?
            }
            FpToFp { exponent, mantissa } => {
                arity(2)?;
                FormulaError::expect_sort(&Sort::RoundingMode, &args[0])?;
                match &args[1] {
                    Sort::FloatingPoint { .. } | Sort::Rational | Sort::Bitvector(_) => {}
                    other => {
                        return Err(FormulaError::MalformedCast {
                            from: other.clone(),
                            to: fp_sort(*exponent, *mantissa)?,
                        })
                    }
                }
                fp_sort(*exponent, *mantissa)?
            }
            FpToFpUnsigned { exponent, mantissa } => {
                arity(2)?;
                FormulaError::expect_sort(&Sort::RoundingMode, &args[0])?;
                bitvector(&args[1])?;
                fp_sort(*exponent, *mantissa)?
            }
            FpToUbv(w) | FpToSbv(w) => {
                arity(2)?;
                FormulaError::expect_sort(&Sort::RoundingMode, &args[0])?;
                float(&args[1])?;
                Sort::bitvector(*w)?
            }
            FpToReal => {
                arity(1)?;
                float(&args[0])?;
                Sort::Rational
            }
            FpToIeeeBv => {
                arity(1)?;
                float(&args[0])?;
                Sort::Bitvector(args[0].floating_point_width().unwrap_or_default())
            }
            Uf | Other(_) => {
                return Err(FormulaError::InvalidArgument(format!(
                    "{self:?} is not a built-in operator"
                )))
            }
        };
        Ok(sort)
    }
}

fn array_sorts(sort: &Sort) -> Result<(&Sort, &Sort), FormulaError> {
    sort.array_sorts()
        .ok_or_else(|| FormulaError::InvalidArgument(format!("{sort} is not an array sort")))
}

/// A declared function or operator.
///
/// `decl` is the backend's own reference to the declaration; the rest
/// describes it in backend-independent terms.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct FunctionDeclaration<D> {
    /// The function's name (for built-in operators, the SMT-LIB name)
    pub name: String,
    /// What the declaration denotes
    pub kind: FunctionKind,
    /// The sorts of the arguments, in order
    pub arg_sorts: Vec<Sort>,
    /// The sort of an application
    pub result_sort: Sort,
    /// The backend-specific declaration
    pub decl: D,
}

impl<D> FunctionDeclaration<D> {
    /// Whether this declares an uninterpreted function.
    pub fn is_uf(&self) -> bool {
        self.kind == FunctionKind::Uf
    }

    /// The signature as text, used in error messages.
    pub fn signature(&self) -> String {
        signature(&self.arg_sorts, &self.result_sort)
    }
}

pub(crate) fn signature(args: &[Sort], result: &Sort) -> String {
    let args = args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    format!("({}) -> {result}", args.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_sorts() {
        let bv8 = Sort::Bitvector(8);
        assert_eq!(
            FunctionKind::BvConcat.result_sort(&[bv8.clone(), Sort::Bitvector(4)]),
            Ok(Sort::Bitvector(12))
        );
        assert_eq!(
            FunctionKind::BvExtract { msb: 7, lsb: 4 }.result_sort(&[bv8.clone()]),
            Ok(Sort::Bitvector(4))
        );
        assert!(FunctionKind::BvExtract { msb: 8, lsb: 0 }
            .result_sort(&[bv8.clone()])
            .is_err());
        assert_eq!(
            FunctionKind::Ite.result_sort(&[Sort::Boolean, Sort::Integer, Sort::Rational]),
            Err(FormulaError::SortMismatch {
                expected: Sort::Integer,
                found: Sort::Rational
            })
        );
        assert_eq!(
            FunctionKind::Select.result_sort(&[
                Sort::array(Sort::Integer, bv8.clone()),
                Sort::Integer
            ]),
            Ok(bv8)
        );
        assert_eq!(
            FunctionKind::FpToIeeeBv.result_sort(&[Sort::double_precision()]),
            Ok(Sort::Bitvector(64))
        );
        assert!(FunctionKind::Uf.result_sort(&[]).is_err());
    }

    #[test]
    fn test_smt_names() {
        assert_eq!(
            FunctionKind::Div.smt_name(&[Sort::Integer, Sort::Integer]),
            Some("div".to_string())
        );
        assert_eq!(
            FunctionKind::Div.smt_name(&[Sort::Rational, Sort::Rational]),
            Some("/".to_string())
        );
        insta::assert_display_snapshot!(
            FunctionKind::FpToFp { exponent: 8, mantissa: 23 }.smt_name(&[]).unwrap(),
            @"(_ to_fp 8 24)"
        );
        insta::assert_display_snapshot!(
            FunctionKind::ConstArray(Sort::Integer).smt_name(&[Sort::Boolean]).unwrap(),
            @"(as const (Array Int Bool))"
        );
        assert_eq!(FunctionKind::Uf.smt_name(&[]), None);
    }
}
