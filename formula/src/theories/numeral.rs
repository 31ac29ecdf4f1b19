// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Integer and rational arithmetic, including the non-linear arithmetic
//! policy.

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    creator::FormulaCreator,
    error::FormulaError,
    formula::{Formula, FunctionKind},
    sorts::Sort,
    theories::NumeralTheory,
    value::{parse_rational, Value},
};

/// How to handle multiplication, division and modulo between non-constant
/// operands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum NonLinearArithmetic {
    /// Pass non-linear operations to the backend
    #[default]
    Use,
    /// Always replace non-linear operations with uninterpreted functions
    ApproximateAlways,
    /// Pass non-linear operations to the backend, and use uninterpreted
    /// functions if it does not support them
    ApproximateFallback,
}

/// Quotient of Euclidean division: the remainder `n - d * q` is never
/// negative. `d` must be non-zero.
pub fn euclidean_div(n: &BigInt, d: &BigInt) -> BigInt {
    if d.is_positive() {
        n.div_floor(d)
    } else {
        -n.div_floor(&-d)
    }
}

/// Remainder of Euclidean division, in `0..|d|`. `d` must be non-zero.
pub fn euclidean_mod(n: &BigInt, d: &BigInt) -> BigInt {
    n - d * euclidean_div(n, d)
}

/// Arithmetic over one numeral sort ([`Sort::Integer`] or
/// [`Sort::Rational`]).
///
/// Rational operations accept integer operands and convert them with
/// `to_real`.
pub struct NumeralManager<C: FormulaCreator> {
    creator: Arc<C>,
    sort: Sort,
    non_linear: NonLinearArithmetic,
}

#[derive(Clone, Copy, Debug)]
enum NonLinearOp {
    Multiply,
    Divide,
    Modulo,
}

impl NonLinearOp {
    fn kind(self) -> FunctionKind {
        match self {
            NonLinearOp::Multiply => FunctionKind::Mul,
            NonLinearOp::Divide => FunctionKind::Div,
            NonLinearOp::Modulo => FunctionKind::Modulo,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            NonLinearOp::Multiply => "*",
            NonLinearOp::Divide => "/",
            NonLinearOp::Modulo => "%",
        }
    }
}

impl<C: NumeralTheory> NumeralManager<C> {
    /// A manager for integer arithmetic.
    pub fn integer(creator: Arc<C>, non_linear: NonLinearArithmetic) -> Self {
        NumeralManager {
            creator,
            sort: Sort::Integer,
            non_linear,
        }
    }

    /// A manager for rational arithmetic.
    pub fn rational(creator: Arc<C>, non_linear: NonLinearArithmetic) -> Self {
        NumeralManager {
            creator,
            sort: Sort::Rational,
            non_linear,
        }
    }

    /// The sort this manager builds.
    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    fn is_integer(&self) -> bool {
        self.sort == Sort::Integer
    }

    /// Bring an operand to this manager's sort.
    fn lift(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        if self.sort == Sort::Rational && f.sort() == &Sort::Integer {
            if let Some(Value::Int(i)) = self.creator.constant_value(f) {
                return self.make_rational(BigRational::from_integer(i));
            }
            let term = self
                .creator
                .make_numeral_op(&FunctionKind::ToReal, &[f.term().clone()])?;
            return Ok(self.creator.encapsulate(Sort::Rational, term));
        }
        FormulaError::expect_sort(&self.sort, f.sort())?;
        Ok(f.clone())
    }

    fn op(
        &self,
        kind: FunctionKind,
        args: &[&Formula<C::Term>],
    ) -> Result<Formula<C::Term>, FormulaError> {
        let args = args
            .iter()
            .map(|a| self.lift(a))
            .collect::<Result<Vec<_>, _>>()?;
        let sorts = args.iter().map(|a| a.sort().clone()).collect::<Vec<_>>();
        let sort = kind.result_sort(&sorts)?;
        let terms = args.iter().map(|a| a.term().clone()).collect::<Vec<_>>();
        let term = self.creator.make_numeral_op(&kind, &terms)?;
        Ok(self.creator.encapsulate(sort, term))
    }

    fn value_of(&self, f: &Formula<C::Term>) -> Option<BigRational> {
        self.creator.constant_value(f)?.as_rational()
    }

    fn make_value(&self, r: BigRational) -> Result<Formula<C::Term>, FormulaError> {
        if self.is_integer() {
            if !r.is_integer() {
                return Err(FormulaError::InvalidArgument(format!(
                    "{r} is not an integer"
                )));
            }
            return self.make_number(r.to_integer());
        }
        self.make_rational(r)
    }

    /// Get the variable with this name.
    pub fn make_variable(&self, name: &str) -> Result<Formula<C::Term>, FormulaError> {
        self.creator.variable(&self.sort, name)
    }

    /// An integer constant of this manager's sort.
    pub fn make_number(&self, n: impl Into<BigInt>) -> Result<Formula<C::Term>, FormulaError> {
        let n = n.into();
        if !self.is_integer() {
            return self.make_rational(BigRational::from_integer(n));
        }
        let term = self.creator.make_constant(&Value::Int(n), &Sort::Integer)?;
        Ok(self.creator.encapsulate(Sort::Integer, term))
    }

    /// A rational constant. Integer managers only accept integral values.
    pub fn make_rational(&self, r: BigRational) -> Result<Formula<C::Term>, FormulaError> {
        if self.is_integer() {
            return self.make_value(r);
        }
        let term = self
            .creator
            .make_constant(&Value::Rational(r), &Sort::Rational)?;
        Ok(self.creator.encapsulate(Sort::Rational, term))
    }

    /// A constant from an integer, fraction or decimal string.
    pub fn make_number_from_str(&self, text: &str) -> Result<Formula<C::Term>, FormulaError> {
        let r = parse_rational(text)
            .ok_or_else(|| FormulaError::InvalidArgument(format!("{text:?} is not a number")))?;
        self.make_value(r)
    }

    /// `-f`
    pub fn negate(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Uminus, &[f])
    }

    /// `a + b`
    pub fn add(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Add, &[a, b])
    }

    /// The sum of any number of operands; the empty sum is zero.
    pub fn sum(&self, operands: &[Formula<C::Term>]) -> Result<Formula<C::Term>, FormulaError> {
        match operands {
            [] => self.make_number(0),
            [single] => self.lift(single),
            [first, rest @ ..] => rest
                .iter()
                .try_fold(self.lift(first)?, |acc, f| self.add(&acc, f)),
        }
    }

    /// `a - b`
    pub fn subtract(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Sub, &[a, b])
    }

    /// `a = b`
    pub fn equal(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Eq, &[a, b])
    }

    /// Pairwise distinctness; fewer than two operands are trivially distinct.
    pub fn distinct(
        &self,
        operands: &[Formula<C::Term>],
    ) -> Result<Formula<C::Term>, FormulaError> {
        if operands.len() < 2 {
            let term = self
                .creator
                .make_constant(&Value::Bool(true), &Sort::Boolean)?;
            return Ok(self.creator.encapsulate(Sort::Boolean, term));
        }
        self.op(FunctionKind::Distinct, &operands.iter().collect::<Vec<_>>())
    }

    /// `a > b`
    pub fn greater_than(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Gt, &[a, b])
    }

    /// `a >= b`
    pub fn greater_or_equal(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Gte, &[a, b])
    }

    /// `a < b`
    pub fn less_than(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Lt, &[a, b])
    }

    /// `a <= b`
    pub fn less_or_equal(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Lte, &[a, b])
    }

    /// `a * b`; a non-linear product follows the configured policy.
    pub fn multiply(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let (a, b) = (self.lift(a)?, self.lift(b)?);
        match (self.value_of(&a), self.value_of(&b)) {
            (Some(x), Some(y)) => self.make_value(x * y),
            (Some(_), None) | (None, Some(_)) => self.op(FunctionKind::Mul, &[&a, &b]),
            (None, None) => self.non_linear(NonLinearOp::Multiply, &a, &b),
        }
    }

    /// Division with SMT-LIB semantics: Euclidean for integers.
    pub fn divide(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.div_or_mod(NonLinearOp::Divide, a, b)
    }

    /// Euclidean remainder. Only defined for integers.
    pub fn modulo(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        if !self.is_integer() {
            return Err(FormulaError::InvalidArgument(
                "modulo is only defined for integers".to_string(),
            ));
        }
        self.div_or_mod(NonLinearOp::Modulo, a, b)
    }

    fn div_or_mod(
        &self,
        op: NonLinearOp,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let (a, b) = (self.lift(a)?, self.lift(b)?);
        let divisor = self.value_of(&b).filter(|d| !d.is_zero());
        match (self.value_of(&a), divisor) {
            (Some(n), Some(d)) => {
                let folded = match (op, self.is_integer()) {
                    (NonLinearOp::Modulo, _) => BigRational::from_integer(euclidean_mod(
                        &n.to_integer(),
                        &d.to_integer(),
                    )),
                    (_, true) => BigRational::from_integer(euclidean_div(
                        &n.to_integer(),
                        &d.to_integer(),
                    )),
                    (_, false) => n / d,
                };
                self.make_value(folded)
            }
            (_, Some(_))
                if !(self.is_integer()
                    && self.non_linear == NonLinearArithmetic::ApproximateAlways) =>
            {
                self.op(op.kind(), &[&a, &b])
            }
            _ => self.non_linear(op, &a, &b),
        }
    }

    fn non_linear(
        &self,
        op: NonLinearOp,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        match self.non_linear {
            NonLinearArithmetic::Use => self.op(op.kind(), &[a, b]),
            NonLinearArithmetic::ApproximateAlways => self.abstraction(op, a, b),
            NonLinearArithmetic::ApproximateFallback => match self.op(op.kind(), &[a, b]) {
                Err(e) if e.is_unsupported() => {
                    log::debug!("backend rejected non-linear {op:?}, using an abstraction");
                    self.abstraction(op, a, b)
                }
                result => result,
            },
        }
    }

    fn abstraction(
        &self,
        op: NonLinearOp,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let name = format!("_{}_{}", op.symbol(), self.sort.symbol_suffix());
        let decl = self.creator.declare_uf(
            &name,
            &[self.sort.clone(), self.sort.clone()],
            &self.sort,
        )?;
        self.creator.make_application(&decl, &[a.clone(), b.clone()])
    }

    /// `a` and `b` are congruent modulo `m`: `(a - b) mod m = 0`. `m` must be
    /// positive.
    pub fn modular_congruence(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
        m: impl Into<BigInt>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let m = m.into();
        if !m.is_positive() {
            return Err(FormulaError::InvalidArgument(format!(
                "modulus {m} is not positive"
            )));
        }
        let difference = self.subtract(a, b)?;
        let m = self.make_number(m)?;
        let zero = self.make_number(0)?;
        self.equal(&self.modulo(&difference, &m)?, &zero)
    }

    /// The largest integer not greater than a rational operand.
    pub fn floor(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        if self.is_integer() {
            FormulaError::expect_sort(&Sort::Integer, f.sort())?;
            return Ok(f.clone());
        }
        self.op(FunctionKind::Floor, &[f])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creator::FormulaShape;
    use crate::testing::TestContext;

    fn int(n: i64) -> BigInt {
        BigInt::from(n)
    }

    #[test]
    fn test_euclidean() {
        assert_eq!(euclidean_div(&int(7), &int(-2)), int(-3));
        assert_eq!(euclidean_mod(&int(7), &int(-2)), int(1));
        assert_eq!(euclidean_div(&int(-7), &int(2)), int(-4));
        assert_eq!(euclidean_mod(&int(-7), &int(2)), int(1));
        assert_eq!(euclidean_div(&int(-7), &int(-2)), int(4));
        assert_eq!(euclidean_mod(&int(-7), &int(-2)), int(1));
    }

    #[test]
    fn test_constant_folding() {
        let ctx = Arc::new(TestContext::new());
        let imgr = NumeralManager::integer(ctx.clone(), NonLinearArithmetic::Use);
        let n = |i: i64| imgr.make_number(i).unwrap();
        assert_eq!(imgr.divide(&n(7), &n(-2)).unwrap(), n(-3));
        assert_eq!(imgr.modulo(&n(7), &n(-2)).unwrap(), n(1));
        assert_eq!(imgr.divide(&n(-7), &n(2)).unwrap(), n(-4));
        assert_eq!(imgr.modulo(&n(-7), &n(2)).unwrap(), n(1));
        assert_eq!(imgr.multiply(&n(6), &n(7)).unwrap(), n(42));

        let rmgr = NumeralManager::rational(ctx, NonLinearArithmetic::Use);
        let half = rmgr.make_number_from_str("0.5").unwrap();
        let three = rmgr.make_number(3).unwrap();
        assert_eq!(
            rmgr.divide(&half, &three).unwrap(),
            rmgr.make_number_from_str("1/6").unwrap()
        );
        // integer constants are lifted without to_real
        assert_eq!(rmgr.multiply(&n(2), &half).unwrap(), rmgr.make_number(1).unwrap());
    }

    #[test]
    fn test_linear_operations_reach_backend() {
        let ctx = Arc::new(TestContext::new());
        let imgr = NumeralManager::integer(ctx.clone(), NonLinearArithmetic::Use);
        let x = imgr.make_variable("x").unwrap();
        let two = imgr.make_number(2).unwrap();
        for f in [
            imgr.multiply(&x, &two).unwrap(),
            imgr.multiply(&two, &x).unwrap(),
            imgr.divide(&x, &two).unwrap(),
            imgr.modulo(&x, &two).unwrap(),
        ] {
            match ctx.shape(&f) {
                FormulaShape::Application { decl, .. } => assert!(!decl.is_uf()),
                shape => panic!("unexpected {shape:?}"),
            }
        }
    }

    #[test]
    fn test_non_linear_policy() {
        let ctx = Arc::new(TestContext::new());
        let x = ctx.variable(&Sort::Integer, "x").unwrap();
        let y = ctx.variable(&Sort::Integer, "y").unwrap();

        let use_backend = NumeralManager::integer(ctx.clone(), NonLinearArithmetic::Use);
        assert!(use_backend.multiply(&x, &y).unwrap_err().is_unsupported());

        let fallback =
            NumeralManager::integer(ctx.clone(), NonLinearArithmetic::ApproximateFallback);
        let product = fallback.multiply(&x, &y).unwrap();
        match ctx.shape(&product) {
            FormulaShape::Application { decl, args } => {
                assert!(decl.is_uf());
                assert_eq!(decl.name, "_*_Int");
                assert_eq!(args, vec![x.clone(), y.clone()]);
            }
            shape => panic!("unexpected {shape:?}"),
        }

        // integer division is abstracted even by a constant
        let always = NumeralManager::integer(ctx.clone(), NonLinearArithmetic::ApproximateAlways);
        let three = always.make_number(3).unwrap();
        let quotient = always.divide(&x, &three).unwrap();
        assert!(matches!(
            ctx.shape(&quotient),
            FormulaShape::Application { decl, .. } if decl.name == "_/_Int"
        ));
        // but linear multiplication is not
        let scaled = always.multiply(&x, &three).unwrap();
        assert!(matches!(
            ctx.shape(&scaled),
            FormulaShape::Application { decl, .. } if decl.kind == FunctionKind::Mul
        ));

        let nonlinear_ctx = Arc::new(TestContext::with_nonlinear());
        let imgr = NumeralManager::integer(nonlinear_ctx.clone(), NonLinearArithmetic::Use);
        let x = imgr.make_variable("x").unwrap();
        let y = imgr.make_variable("y").unwrap();
        assert!(matches!(
            nonlinear_ctx.shape(&imgr.modulo(&x, &y).unwrap()),
            FormulaShape::Application { decl, .. } if decl.kind == FunctionKind::Modulo
        ));
    }

    #[test]
    fn test_rational_lifting() {
        let ctx = Arc::new(TestContext::new());
        let imgr = NumeralManager::integer(ctx.clone(), NonLinearArithmetic::Use);
        let rmgr = NumeralManager::rational(ctx.clone(), NonLinearArithmetic::Use);
        let i = imgr.make_variable("i").unwrap();
        let r = rmgr.make_variable("r").unwrap();
        let sum = rmgr.add(&i, &r).unwrap();
        assert_eq!(sum.sort(), &Sort::Rational);
        assert!(imgr.add(&i, &r).is_err());
        assert_eq!(rmgr.floor(&r).unwrap().sort(), &Sort::Integer);
        assert!(rmgr.modulo(&r, &r).is_err());
        assert!(imgr.make_number_from_str("1.5").is_err());
        assert_eq!(
            imgr.sum(&[]).unwrap(),
            imgr.make_number(0).unwrap()
        );
    }

    #[test]
    fn test_modular_congruence() {
        let ctx = Arc::new(TestContext::new());
        let imgr = NumeralManager::integer(ctx, NonLinearArithmetic::Use);
        let a = imgr.make_variable("a").unwrap();
        let b = imgr.make_variable("b").unwrap();
        let f = imgr.modular_congruence(&a, &b, 4).unwrap();
        assert!(f.is_boolean());
        assert!(imgr.modular_congruence(&a, &b, 0).is_err());
    }
}
