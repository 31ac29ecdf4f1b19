// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Fixed-width bitvectors.

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed, Zero};
use std::sync::Arc;

use crate::{
    creator::FormulaCreator,
    error::FormulaError,
    formula::{Formula, FunctionKind},
    sorts::Sort,
    theories::{BitvectorTheory, BooleanTheory, NumeralTheory},
    value::Value,
};

/// Bitvector formulas over a backend.
///
/// Binary operations require both operands to have the same width.
pub struct BitvectorManager<C: FormulaCreator> {
    creator: Arc<C>,
}

impl<C: BitvectorTheory> BitvectorManager<C> {
    /// A manager over `creator`.
    pub fn new(creator: Arc<C>) -> Self {
        BitvectorManager { creator }
    }

    fn op(
        &self,
        kind: FunctionKind,
        args: &[&Formula<C::Term>],
    ) -> Result<Formula<C::Term>, FormulaError> {
        let sorts = args.iter().map(|a| a.sort().clone()).collect::<Vec<_>>();
        let sort = kind.result_sort(&sorts)?;
        let terms = args.iter().map(|a| a.term().clone()).collect::<Vec<_>>();
        let term = self.creator.make_bitvector_op(&kind, &terms)?;
        Ok(self.creator.encapsulate(sort, term))
    }

    fn width(f: &Formula<C::Term>) -> Result<u32, FormulaError> {
        f.sort().bitvector_width().ok_or_else(|| {
            FormulaError::InvalidArgument(format!("{} is not a bitvector", f.sort()))
        })
    }

    /// A constant. Negative values are encoded in two's complement; the value
    /// must fit in `width` bits either as a signed or an unsigned number.
    pub fn make_bitvector(
        &self,
        width: u32,
        value: impl Into<BigInt>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let sort = Sort::bitvector(width)?;
        let value = value.into();
        let modulus = BigInt::one() << width;
        let min = -(BigInt::one() << (width - 1));
        if value < min || value >= modulus {
            return Err(FormulaError::InvalidArgument(format!(
                "{value} does not fit in a bitvector of width {width}"
            )));
        }
        let unsigned = if value.is_negative() {
            value + modulus
        } else {
            value
        };
        let value = Value::Bitvector {
            width,
            value: unsigned.to_biguint().unwrap_or_else(BigUint::zero),
        };
        let term = self.creator.make_constant(&value, &sort)?;
        Ok(self.creator.encapsulate(sort, term))
    }

    /// Get the variable with this name and width.
    pub fn make_variable(&self, width: u32, name: &str) -> Result<Formula<C::Term>, FormulaError> {
        self.creator.variable(&Sort::bitvector(width)?, name)
    }

    /// The width of a bitvector formula.
    pub fn get_length(&self, f: &Formula<C::Term>) -> Result<u32, FormulaError> {
        Self::width(f)
    }

    /// Two's complement negation.
    pub fn negate(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::BvNeg, &[f])
    }

    /// `a + b`, wrapping.
    pub fn add(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::BvAdd, &[a, b])
    }

    /// `a - b`, wrapping.
    pub fn subtract(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::BvSub, &[a, b])
    }

    /// `a * b`, wrapping.
    pub fn multiply(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::BvMul, &[a, b])
    }

    /// Division, signed or unsigned.
    pub fn divide(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
        signed: bool,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let kind = if signed { FunctionKind::BvSdiv } else { FunctionKind::BvUdiv };
        self.op(kind, &[a, b])
    }

    /// Remainder; the signed remainder takes the sign of the dividend.
    pub fn modulo(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
        signed: bool,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let kind = if signed { FunctionKind::BvSrem } else { FunctionKind::BvUrem };
        self.op(kind, &[a, b])
    }

    /// `a = b`
    pub fn equal(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        Self::width(a)?;
        self.op(FunctionKind::Eq, &[a, b])
    }

    /// `a > b`, signed or unsigned.
    pub fn greater_than(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
        signed: bool,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let kind = if signed { FunctionKind::BvSgt } else { FunctionKind::BvUgt };
        self.op(kind, &[a, b])
    }

    /// `a >= b`, signed or unsigned.
    pub fn greater_or_equal(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
        signed: bool,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let kind = if signed { FunctionKind::BvSge } else { FunctionKind::BvUge };
        self.op(kind, &[a, b])
    }

    /// `a < b`, signed or unsigned.
    pub fn less_than(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
        signed: bool,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let kind = if signed { FunctionKind::BvSlt } else { FunctionKind::BvUlt };
        self.op(kind, &[a, b])
    }

    /// `a <= b`, signed or unsigned.
    pub fn less_or_equal(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
        signed: bool,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let kind = if signed { FunctionKind::BvSle } else { FunctionKind::BvUle };
        self.op(kind, &[a, b])
    }

    /// Bitwise not.
    pub fn not(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::BvNot, &[f])
    }

    /// Bitwise and.
    pub fn and(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::BvAnd, &[a, b])
    }

    /// Bitwise or.
    pub fn or(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::BvOr, &[a, b])
    }

    /// Bitwise xor.
    pub fn xor(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::BvXor, &[a, b])
    }

    /// `a << b`
    pub fn shift_left(
        &self,
        f: &Formula<C::Term>,
        by: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::BvShl, &[f, by])
    }

    /// Arithmetic shift if `signed`, logical otherwise.
    pub fn shift_right(
        &self,
        f: &Formula<C::Term>,
        by: &Formula<C::Term>,
        signed: bool,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let kind = if signed { FunctionKind::BvAshr } else { FunctionKind::BvLshr };
        self.op(kind, &[f, by])
    }

    /// `prefix` becomes the most significant bits of the result.
    pub fn concat(
        &self,
        prefix: &Formula<C::Term>,
        suffix: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::BvConcat, &[prefix, suffix])
    }

    /// Bits `msb` down to `lsb`, inclusive.
    pub fn extract(
        &self,
        f: &Formula<C::Term>,
        msb: u32,
        lsb: u32,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::BvExtract { msb, lsb }, &[f])
    }

    /// Add `bits` bits, copying the sign bit if `signed`.
    pub fn extend(
        &self,
        f: &Formula<C::Term>,
        bits: u32,
        signed: bool,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let kind = if signed {
            FunctionKind::BvSignExtend(bits)
        } else {
            FunctionKind::BvZeroExtend(bits)
        };
        self.op(kind, &[f])
    }

    /// Convert an integer formula to a bitvector, modulo `2^width`.
    pub fn from_integer(
        &self,
        width: u32,
        f: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::NatToBv(width), &[f])
    }
}

impl<C: BitvectorTheory + NumeralTheory + BooleanTheory> BitvectorManager<C> {
    /// The integer value of a bitvector, in two's complement if `signed`.
    pub fn to_integer(
        &self,
        f: &Formula<C::Term>,
        signed: bool,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let width = Self::width(f)?;
        let unsigned = self.op(FunctionKind::BvToNat, &[f])?;
        if !signed {
            return Ok(unsigned);
        }
        let zero = self.make_bitvector(width, 0)?;
        let negative = self.less_than(f, &zero, true)?;
        let modulus = self
            .creator
            .make_constant(&Value::Int(BigInt::one() << width), &Sort::Integer)?;
        let shifted = self
            .creator
            .make_numeral_op(&FunctionKind::Sub, &[unsigned.term().clone(), modulus])?;
        let term = self.creator.make_boolean_op(
            &FunctionKind::Ite,
            &[negative.into_term(), shifted, unsigned.into_term()],
        )?;
        Ok(self.creator.encapsulate(Sort::Integer, term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    #[test]
    fn test_constants_range_checked() {
        let ctx = Arc::new(TestContext::new());
        let bvmgr = BitvectorManager::new(ctx.clone());
        assert_eq!(
            ctx.constant_value(&bvmgr.make_bitvector(4, -1).unwrap()),
            Some(Value::Bitvector {
                width: 4,
                value: BigUint::from(15u32)
            })
        );
        assert_eq!(
            bvmgr.make_bitvector(4, 15).unwrap(),
            bvmgr.make_bitvector(4, -1).unwrap()
        );
        assert!(bvmgr.make_bitvector(4, 16).is_err());
        assert!(bvmgr.make_bitvector(4, -9).is_err());
        assert!(bvmgr.make_bitvector(4, -8).is_ok());
        assert!(bvmgr.make_bitvector(0, 0).is_err());
    }

    #[test]
    fn test_width_checks() {
        let ctx = Arc::new(TestContext::new());
        let bvmgr = BitvectorManager::new(ctx);
        let a = bvmgr.make_variable(8, "a").unwrap();
        let b = bvmgr.make_variable(4, "b").unwrap();
        assert!(matches!(
            bvmgr.add(&a, &b),
            Err(FormulaError::SortMismatch { .. })
        ));
        assert_eq!(bvmgr.concat(&a, &b).unwrap().sort(), &Sort::Bitvector(12));
        assert_eq!(bvmgr.extract(&a, 3, 0).unwrap().sort(), &Sort::Bitvector(4));
        assert!(bvmgr.extract(&a, 8, 0).is_err());
        assert!(bvmgr.extract(&a, 2, 3).is_err());
        assert_eq!(bvmgr.extend(&b, 4, true).unwrap().sort(), &Sort::Bitvector(8));
        assert_eq!(bvmgr.get_length(&a), Ok(8));
        assert!(bvmgr.less_than(&a, &a, true).unwrap().is_boolean());
    }

    #[test]
    fn test_integer_conversion() {
        let ctx = Arc::new(TestContext::new());
        let bvmgr = BitvectorManager::new(ctx.clone());
        let a = bvmgr.make_variable(8, "a").unwrap();
        assert_eq!(bvmgr.to_integer(&a, false).unwrap().sort(), &Sort::Integer);
        assert_eq!(bvmgr.to_integer(&a, true).unwrap().sort(), &Sort::Integer);
        let i = ctx.variable(&Sort::Integer, "i").unwrap();
        assert_eq!(bvmgr.from_integer(16, &i).unwrap().sort(), &Sort::Bitvector(16));
        assert!(bvmgr.from_integer(16, &a).is_err());
    }
}
