// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! IEEE floating point.

use fxhash::FxHashMap;
use num_rational::BigRational;
use std::sync::{Arc, Mutex};

use crate::{
    creator::FormulaCreator,
    error::FormulaError,
    formula::{Formula, FunctionKind},
    sorts::Sort,
    theories::{FloatingPointTheory, NumeralTheory},
    value::{parse_rational, FloatValue, RoundingMode, Value},
};

/// Floating point formulas over a backend.
///
/// Operations that round take an optional [`RoundingMode`]; `None` uses the
/// manager's default.
pub struct FloatingPointManager<C: FormulaCreator> {
    creator: Arc<C>,
    default_rounding_mode: RoundingMode,
    rounding_modes: Mutex<FxHashMap<RoundingMode, Formula<C::Term>>>,
}

fn widths(sort: &Sort) -> Result<(u32, u32), FormulaError> {
    match sort {
        Sort::FloatingPoint { exponent, mantissa } => Ok((*exponent, *mantissa)),
        _ => Err(FormulaError::InvalidArgument(format!(
            "{sort} is not a floating point sort"
        ))),
    }
}

impl<C: FloatingPointTheory> FloatingPointManager<C> {
    /// A manager that rounds with `default_rounding_mode` unless told otherwise.
    pub fn new(creator: Arc<C>, default_rounding_mode: RoundingMode) -> Self {
        FloatingPointManager {
            creator,
            default_rounding_mode,
            rounding_modes: Mutex::new(FxHashMap::default()),
        }
    }

    /// The rounding mode used when none is given.
    pub fn default_rounding_mode(&self) -> RoundingMode {
        self.default_rounding_mode
    }

    /// The formula for a rounding mode.
    pub fn make_rounding_mode(&self, rm: RoundingMode) -> Result<Formula<C::Term>, FormulaError> {
        let mut modes = self.rounding_modes.lock().unwrap();
        if let Some(f) = modes.get(&rm) {
            return Ok(f.clone());
        }
        let term = self
            .creator
            .make_constant(&Value::RoundingMode(rm), &Sort::RoundingMode)?;
        let f = self.creator.encapsulate(Sort::RoundingMode, term);
        modes.insert(rm, f.clone());
        Ok(f)
    }

    fn rounding(&self, rm: Option<RoundingMode>) -> Result<Formula<C::Term>, FormulaError> {
        self.make_rounding_mode(rm.unwrap_or(self.default_rounding_mode))
    }

    fn op(
        &self,
        kind: FunctionKind,
        args: &[&Formula<C::Term>],
    ) -> Result<Formula<C::Term>, FormulaError> {
        let sorts = args.iter().map(|a| a.sort().clone()).collect::<Vec<_>>();
        let sort = kind.result_sort(&sorts)?;
        let terms = args.iter().map(|a| a.term().clone()).collect::<Vec<_>>();
        let term = self.creator.make_floating_point_op(&kind, &terms)?;
        Ok(self.creator.encapsulate(sort, term))
    }

    fn rounded_op(
        &self,
        kind: FunctionKind,
        rm: Option<RoundingMode>,
        args: &[&Formula<C::Term>],
    ) -> Result<Formula<C::Term>, FormulaError> {
        let rm = self.rounding(rm)?;
        let mut all = vec![&rm];
        all.extend_from_slice(args);
        self.op(kind, &all)
    }

    fn make_value(&self, value: FloatValue) -> Result<Formula<C::Term>, FormulaError> {
        let sort = value.sort();
        let term = self.creator.make_constant(&Value::Float(value), &sort)?;
        Ok(self.creator.encapsulate(sort, term))
    }

    /// Get the variable with this name; `sort` must be a floating point sort.
    pub fn make_variable(&self, sort: &Sort, name: &str) -> Result<Formula<C::Term>, FormulaError> {
        widths(sort)?;
        self.creator.variable(sort, name)
    }

    /// A constant from an `f64`, rounded to `sort` if it is not exactly
    /// representable.
    pub fn make_number(
        &self,
        sort: &Sort,
        value: f64,
        rm: Option<RoundingMode>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let (e, m) = widths(sort)?;
        if let Some(exact) = FloatValue::from_f64(e, m, value) {
            return self.make_value(exact);
        }
        match BigRational::from_float(value) {
            Some(r) => self.make_rational(sort, r, rm),
            None => self.make_nan(sort),
        }
    }

    /// A constant from a rational, rounded to `sort` if it is not exactly
    /// representable.
    pub fn make_rational(
        &self,
        sort: &Sort,
        value: BigRational,
        rm: Option<RoundingMode>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let (e, m) = widths(sort)?;
        if let Some(exact) = FloatValue::from_rational(e, m, &value) {
            return self.make_value(exact);
        }
        let real = self
            .creator
            .make_constant(&Value::Rational(value), &Sort::Rational)?;
        let real = self.creator.encapsulate(Sort::Rational, real);
        self.rounded_op(
            FunctionKind::FpToFp {
                exponent: e,
                mantissa: m,
            },
            rm,
            &[&real],
        )
    }

    /// A constant from a decimal or fraction string, or one of `NaN`, `inf`
    /// and `-inf`.
    pub fn make_number_from_str(
        &self,
        sort: &Sort,
        text: &str,
        rm: Option<RoundingMode>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        match text.trim() {
            "NaN" | "nan" => self.make_nan(sort),
            "inf" | "+inf" | "Infinity" => self.make_plus_infinity(sort),
            "-inf" | "-Infinity" => self.make_minus_infinity(sort),
            text => {
                let r = parse_rational(text).ok_or_else(|| {
                    FormulaError::InvalidArgument(format!("{text:?} is not a number"))
                })?;
                self.make_rational(sort, r, rm)
            }
        }
    }

    /// Positive infinity of a floating-point sort.
    pub fn make_plus_infinity(&self, sort: &Sort) -> Result<Formula<C::Term>, FormulaError> {
        let (e, m) = widths(sort)?;
        self.make_value(FloatValue::infinity(e, m, false))
    }

    /// Negative infinity of a floating-point sort.
    pub fn make_minus_infinity(&self, sort: &Sort) -> Result<Formula<C::Term>, FormulaError> {
        let (e, m) = widths(sort)?;
        self.make_value(FloatValue::infinity(e, m, true))
    }

    /// NaN of a floating-point sort.
    pub fn make_nan(&self, sort: &Sort) -> Result<Formula<C::Term>, FormulaError> {
        let (e, m) = widths(sort)?;
        self.make_value(FloatValue::nan(e, m))
    }

    /// Reinterpret an IEEE bitvector as a float of sort `target`.
    pub fn from_ieee_bitvector(
        &self,
        bits: &Formula<C::Term>,
        target: &Sort,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let (exponent, mantissa) = widths(target)?;
        self.op(FunctionKind::FpFromIeeeBv { exponent, mantissa }, &[bits])
    }

    /// The IEEE bitvector encoding of a float.
    pub fn to_ieee_bitvector(
        &self,
        f: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpToIeeeBv, &[f])
    }

    /// `-f`
    pub fn negate(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpNeg, &[f])
    }

    /// `|f|`
    pub fn abs(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpAbs, &[f])
    }

    /// The larger operand.
    pub fn max(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpMax, &[a, b])
    }

    /// The smaller operand.
    pub fn min(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpMin, &[a, b])
    }

    /// Square root, rounded with `rm` or the default mode.
    pub fn sqrt(
        &self,
        f: &Formula<C::Term>,
        rm: Option<RoundingMode>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.rounded_op(FunctionKind::FpSqrt, rm, &[f])
    }

    /// `a + b`, rounded with the default mode.
    pub fn add(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
        rm: Option<RoundingMode>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.rounded_op(FunctionKind::FpAdd, rm, &[a, b])
    }

    /// `a - b`, rounded with the default mode.
    pub fn subtract(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
        rm: Option<RoundingMode>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.rounded_op(FunctionKind::FpSub, rm, &[a, b])
    }

    /// Multiplication; an uninterpreted function if the backend has none.
    pub fn multiply(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
        rm: Option<RoundingMode>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        match self.rounded_op(FunctionKind::FpMul, rm, &[a, b]) {
            Err(e) if e.is_unsupported() => self.abstraction("*", a, b),
            result => result,
        }
    }

    /// Division; an uninterpreted function if the backend has none.
    pub fn divide(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
        rm: Option<RoundingMode>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        match self.rounded_op(FunctionKind::FpDiv, rm, &[a, b]) {
            Err(e) if e.is_unsupported() => self.abstraction("/", a, b),
            result => result,
        }
    }

    fn abstraction(
        &self,
        symbol: &str,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        widths(a.sort())?;
        FormulaError::expect_sort(a.sort(), b.sort())?;
        let sort = a.sort();
        let name = format!("_{symbol}_{}", sort.symbol_suffix());
        log::debug!("backend has no floating point {symbol}, using {name}");
        let decl = self
            .creator
            .declare_uf(&name, &[sort.clone(), sort.clone()], sort)?;
        self.creator.make_application(&decl, &[a.clone(), b.clone()])
    }

    /// Round to an integral value, staying a float.
    pub fn round(
        &self,
        f: &Formula<C::Term>,
        rm: Option<RoundingMode>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.rounded_op(FunctionKind::FpRoundToIntegral, rm, &[f])
    }

    /// Structural equality, under which `NaN` equals itself and the two zeros
    /// differ.
    pub fn assignment(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        widths(a.sort())?;
        self.op(FunctionKind::Eq, &[a, b])
    }

    /// IEEE equality, under which `NaN` equals nothing and the two zeros are
    /// equal.
    pub fn equal_with_fp_semantics(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpEq, &[a, b])
    }

    /// `a > b`
    pub fn greater_than(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpGt, &[a, b])
    }

    /// `a >= b`
    pub fn greater_or_equal(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpGe, &[a, b])
    }

    /// `a < b`
    pub fn less_than(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpLt, &[a, b])
    }

    /// `a <= b`
    pub fn less_or_equal(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpLe, &[a, b])
    }

    /// Whether `f` is NaN.
    pub fn is_nan(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpIsNan, &[f])
    }

    /// Whether `f` is an infinity.
    pub fn is_infinity(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpIsInfinite, &[f])
    }

    /// Whether `f` is a zero.
    pub fn is_zero(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpIsZero, &[f])
    }

    /// Whether `f` is subnormal.
    pub fn is_subnormal(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpIsSubnormal, &[f])
    }

    /// Whether `f` is normal.
    pub fn is_normal(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpIsNormal, &[f])
    }

    /// Whether `f` is negative.
    pub fn is_negative(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::FpIsNegative, &[f])
    }
}

impl<C: FloatingPointTheory + NumeralTheory> FloatingPointManager<C> {
    /// Convert a number (integer, rational, bitvector or float) to the
    /// floating point sort `target`. Bitvectors are read as signed numbers
    /// if `signed`.
    pub fn cast_from(
        &self,
        number: &Formula<C::Term>,
        signed: bool,
        target: &Sort,
        rm: Option<RoundingMode>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let (exponent, mantissa) = widths(target)?;
        match number.sort() {
            Sort::Integer => {
                let term = self
                    .creator
                    .make_numeral_op(&FunctionKind::ToReal, &[number.term().clone()])?;
                let real = self.creator.encapsulate(Sort::Rational, term);
                self.rounded_op(FunctionKind::FpToFp { exponent, mantissa }, rm, &[&real])
            }
            Sort::Bitvector(_) if !signed => self.rounded_op(
                FunctionKind::FpToFpUnsigned { exponent, mantissa },
                rm,
                &[number],
            ),
            Sort::Rational | Sort::Bitvector(_) | Sort::FloatingPoint { .. } => {
                self.rounded_op(FunctionKind::FpToFp { exponent, mantissa }, rm, &[number])
            }
            other => Err(FormulaError::MalformedCast {
                from: other.clone(),
                to: target.clone(),
            }),
        }
    }

    /// Convert a float to `target`: another floating point sort, a
    /// bitvector (signed or unsigned), a rational, or an integer (rounded by
    /// `rm` first).
    pub fn cast_to(
        &self,
        f: &Formula<C::Term>,
        signed: bool,
        target: &Sort,
        rm: Option<RoundingMode>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        widths(f.sort())?;
        match target {
            Sort::FloatingPoint { exponent, mantissa } => self.rounded_op(
                FunctionKind::FpToFp {
                    exponent: *exponent,
                    mantissa: *mantissa,
                },
                rm,
                &[f],
            ),
            Sort::Bitvector(width) => {
                let kind = if signed {
                    FunctionKind::FpToSbv(*width)
                } else {
                    FunctionKind::FpToUbv(*width)
                };
                self.rounded_op(kind, rm, &[f])
            }
            Sort::Rational => self.op(FunctionKind::FpToReal, &[f]),
            Sort::Integer => {
                let rounded = self.round(f, rm)?;
                let real = self.op(FunctionKind::FpToReal, &[&rounded])?;
                let term = self
                    .creator
                    .make_numeral_op(&FunctionKind::Floor, &[real.into_term()])?;
                Ok(self.creator.encapsulate(Sort::Integer, term))
            }
            other => Err(FormulaError::MalformedCast {
                from: f.sort().clone(),
                to: other.clone(),
            }),
        }
    }
}
