// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Boolean formulas.

use fxhash::FxHashSet;
use std::sync::{Arc, OnceLock};

use crate::{
    creator::{FormulaCreator, FormulaShape},
    error::FormulaError,
    formula::{Formula, FunctionKind, Quantifier},
    sorts::Sort,
    theories::BooleanTheory,
    value::Value,
    visitor::TraversalProcess,
};

/// Dispatch on the Boolean structure of a formula.
///
/// Anything that is not a connective, a Boolean `ite`, a constant, a bound
/// variable or a quantifier is an atom.
pub trait BooleanFormulaVisitor<T> {
    /// The result of a visit.
    type Output;

    /// `true` or `false`
    fn visit_constant(&mut self, value: bool) -> Self::Output;
    /// A bound Boolean variable.
    fn visit_bound_variable(&mut self, var: &Formula<T>, index: usize) -> Self::Output;
    /// A free variable or a non-Boolean predicate.
    fn visit_atom(&mut self, atom: &Formula<T>) -> Self::Output;
    /// `not`
    fn visit_not(&mut self, operand: &Formula<T>) -> Self::Output;
    /// `and`
    fn visit_and(&mut self, operands: &[Formula<T>]) -> Self::Output;
    /// `or`
    fn visit_or(&mut self, operands: &[Formula<T>]) -> Self::Output;
    /// `xor`
    fn visit_xor(&mut self, a: &Formula<T>, b: &Formula<T>) -> Self::Output;
    /// `=` on Booleans
    fn visit_equivalence(&mut self, a: &Formula<T>, b: &Formula<T>) -> Self::Output;
    /// `=>`
    fn visit_implication(&mut self, a: &Formula<T>, b: &Formula<T>) -> Self::Output;
    /// `ite` with a Boolean result
    fn visit_ite(
        &mut self,
        cond: &Formula<T>,
        then: &Formula<T>,
        otherwise: &Formula<T>,
    ) -> Self::Output;
    /// A quantified formula.
    fn visit_quantifier(
        &mut self,
        quantifier: Quantifier,
        bound: &[Formula<T>],
        body: &Formula<T>,
    ) -> Self::Output;
}

pub(crate) enum BooleanShape<T> {
    Constant(bool),
    Bound(usize),
    Atom,
    Not(Formula<T>),
    And(Vec<Formula<T>>),
    Or(Vec<Formula<T>>),
    Xor(Formula<T>, Formula<T>),
    Iff(Formula<T>, Formula<T>),
    Implies(Formula<T>, Formula<T>),
    Ite(Formula<T>, Formula<T>, Formula<T>),
    Quantifier(Quantifier, Vec<Formula<T>>, Formula<T>),
}

impl<T: Clone> BooleanShape<T> {
    fn children(&self) -> Vec<Formula<T>> {
        match self {
            BooleanShape::Constant(_) | BooleanShape::Bound(_) | BooleanShape::Atom => vec![],
            BooleanShape::Not(a) => vec![a.clone()],
            BooleanShape::And(args) | BooleanShape::Or(args) => args.clone(),
            BooleanShape::Xor(a, b) | BooleanShape::Iff(a, b) | BooleanShape::Implies(a, b) => {
                vec![a.clone(), b.clone()]
            }
            BooleanShape::Ite(c, t, e) => vec![c.clone(), t.clone(), e.clone()],
            BooleanShape::Quantifier(_, _, body) => vec![body.clone()],
        }
    }
}

/// Boolean formulas over a backend.
pub struct BooleanManager<C: FormulaCreator> {
    creator: Arc<C>,
    true_formula: OnceLock<Formula<C::Term>>,
    false_formula: OnceLock<Formula<C::Term>>,
}

impl<C: BooleanTheory> BooleanManager<C> {
    /// A manager over `creator`.
    pub fn new(creator: Arc<C>) -> Self {
        BooleanManager {
            creator,
            true_formula: OnceLock::new(),
            false_formula: OnceLock::new(),
        }
    }

    fn op(
        &self,
        kind: FunctionKind,
        args: &[&Formula<C::Term>],
    ) -> Result<Formula<C::Term>, FormulaError> {
        let sorts = args.iter().map(|a| a.sort().clone()).collect::<Vec<_>>();
        let sort = kind.result_sort(&sorts)?;
        let terms = args.iter().map(|a| a.term().clone()).collect::<Vec<_>>();
        let term = self.creator.make_boolean_op(&kind, &terms)?;
        Ok(self.creator.encapsulate(sort, term))
    }

    /// Get the Boolean variable with this name.
    pub fn make_variable(&self, name: &str) -> Result<Formula<C::Term>, FormulaError> {
        self.creator.variable(&Sort::Boolean, name)
    }

    /// The constant `true`.
    pub fn make_true(&self) -> Result<Formula<C::Term>, FormulaError> {
        self.constant(&self.true_formula, true)
    }

    /// The constant `false`.
    pub fn make_false(&self) -> Result<Formula<C::Term>, FormulaError> {
        self.constant(&self.false_formula, false)
    }

    /// A Boolean constant.
    pub fn make_boolean(&self, value: bool) -> Result<Formula<C::Term>, FormulaError> {
        if value {
            self.make_true()
        } else {
            self.make_false()
        }
    }

    fn constant(
        &self,
        cell: &OnceLock<Formula<C::Term>>,
        value: bool,
    ) -> Result<Formula<C::Term>, FormulaError> {
        if let Some(f) = cell.get() {
            return Ok(f.clone());
        }
        let term = self
            .creator
            .make_constant(&Value::Bool(value), &Sort::Boolean)?;
        Ok(cell
            .get_or_init(|| self.creator.encapsulate(Sort::Boolean, term))
            .clone())
    }

    /// `not f`
    pub fn not(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Not, &[f])
    }

    /// `a and b`
    pub fn and(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::And, &[a, b])
    }

    /// `a or b`
    pub fn or(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Or, &[a, b])
    }

    /// `a xor b`
    pub fn xor(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Xor, &[a, b])
    }

    /// `a = b`
    pub fn equivalence(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Iff, &[a, b])
    }

    /// `a => b`, as `(or (not a) b)` if the backend has no native implication.
    pub fn implication(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        match self.op(FunctionKind::Implies, &[a, b]) {
            Err(e) if e.is_unsupported() => self.or(&self.not(a)?, b),
            result => result,
        }
    }

    /// `(ite cond then otherwise)`. Both branches must have the same sort.
    pub fn ifthenelse(
        &self,
        cond: &Formula<C::Term>,
        then: &Formula<C::Term>,
        otherwise: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        FormulaError::expect_sort(then.sort(), otherwise.sort())?;
        self.op(FunctionKind::Ite, &[cond, then, otherwise])
    }

    /// The conjunction of any number of formulas. The empty conjunction is
    /// `true` and a single formula is returned unchanged.
    pub fn and_all<I>(&self, fs: I) -> Result<Formula<C::Term>, FormulaError>
    where
        I: IntoIterator<Item = Formula<C::Term>>,
    {
        let mut fs = fs.into_iter();
        let Some(first) = fs.next() else {
            return self.make_true();
        };
        FormulaError::expect_sort(&Sort::Boolean, first.sort())?;
        fs.try_fold(first, |acc, f| self.and(&acc, &f))
    }

    /// The disjunction of any number of formulas. The empty disjunction is
    /// `false` and a single formula is returned unchanged.
    pub fn or_all<I>(&self, fs: I) -> Result<Formula<C::Term>, FormulaError>
    where
        I: IntoIterator<Item = Formula<C::Term>>,
    {
        let mut fs = fs.into_iter();
        let Some(first) = fs.next() else {
            return self.make_false();
        };
        FormulaError::expect_sort(&Sort::Boolean, first.sort())?;
        fs.try_fold(first, |acc, f| self.or(&acc, &f))
    }

    /// Whether `f` is the constant `true`.
    pub fn is_true(&self, f: &Formula<C::Term>) -> bool {
        self.creator.constant_value(f) == Some(Value::Bool(true))
    }

    /// Whether `f` is the constant `false`.
    pub fn is_false(&self, f: &Formula<C::Term>) -> bool {
        self.creator.constant_value(f) == Some(Value::Bool(false))
    }

    /// The conjuncts of `f`, without duplicates and without `true`. With
    /// `flatten`, nested conjunctions are split as well.
    pub fn to_conjunction_args(
        &self,
        f: &Formula<C::Term>,
        flatten: bool,
    ) -> Vec<Formula<C::Term>> {
        self.to_args(f, flatten, FunctionKind::And, true)
    }

    /// The disjuncts of `f`, without duplicates and without `false`. With
    /// `flatten`, nested disjunctions are split as well.
    pub fn to_disjunction_args(
        &self,
        f: &Formula<C::Term>,
        flatten: bool,
    ) -> Vec<Formula<C::Term>> {
        self.to_args(f, flatten, FunctionKind::Or, false)
    }

    fn to_args(
        &self,
        f: &Formula<C::Term>,
        flatten: bool,
        kind: FunctionKind,
        identity: bool,
    ) -> Vec<Formula<C::Term>> {
        let mut args = vec![];
        let mut seen = FxHashSet::default();
        let mut stack = vec![f.clone()];
        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if flatten || &next == f {
                if let FormulaShape::Application {
                    decl,
                    args: children,
                } = self.creator.shape(&next)
                {
                    if decl.kind == kind {
                        stack.extend(children.into_iter().rev());
                        continue;
                    }
                }
            }
            if self.creator.constant_value(&next) != Some(Value::Bool(identity)) {
                args.push(next);
            }
        }
        args
    }

    pub(crate) fn boolean_shape(&self, f: &Formula<C::Term>) -> BooleanShape<C::Term> {
        match self.creator.shape(f) {
            FormulaShape::Constant(Value::Bool(b)) => BooleanShape::Constant(b),
            FormulaShape::BoundVariable { index, .. } => BooleanShape::Bound(index),
            FormulaShape::Quantifier {
                quantifier,
                bound,
                body,
            } => BooleanShape::Quantifier(quantifier, bound, body),
            FormulaShape::Application { decl, mut args } => {
                let boolean_args = args.iter().all(|a| a.is_boolean());
                match (&decl.kind, args.len()) {
                    (FunctionKind::Not, 1) => BooleanShape::Not(args.remove(0)),
                    (FunctionKind::And, _) => BooleanShape::And(args),
                    (FunctionKind::Or, _) => BooleanShape::Or(args),
                    (FunctionKind::Xor, 2) => {
                        let b = args.remove(1);
                        BooleanShape::Xor(args.remove(0), b)
                    }
                    (FunctionKind::Iff, 2) | (FunctionKind::Eq, 2) if boolean_args => {
                        let b = args.remove(1);
                        BooleanShape::Iff(args.remove(0), b)
                    }
                    (FunctionKind::Implies, 2) => {
                        let b = args.remove(1);
                        BooleanShape::Implies(args.remove(0), b)
                    }
                    (FunctionKind::Ite, 3) if f.is_boolean() => {
                        let e = args.remove(2);
                        let t = args.remove(1);
                        BooleanShape::Ite(args.remove(0), t, e)
                    }
                    _ => BooleanShape::Atom,
                }
            }
            _ => BooleanShape::Atom,
        }
    }

    /// Visit the top-level Boolean structure of `f`.
    pub fn visit<V>(&self, f: &Formula<C::Term>, visitor: &mut V) -> V::Output
    where
        V: BooleanFormulaVisitor<C::Term> + ?Sized,
    {
        match self.boolean_shape(f) {
            BooleanShape::Constant(b) => visitor.visit_constant(b),
            BooleanShape::Bound(index) => visitor.visit_bound_variable(f, index),
            BooleanShape::Atom => visitor.visit_atom(f),
            BooleanShape::Not(a) => visitor.visit_not(&a),
            BooleanShape::And(args) => visitor.visit_and(&args),
            BooleanShape::Or(args) => visitor.visit_or(&args),
            BooleanShape::Xor(a, b) => visitor.visit_xor(&a, &b),
            BooleanShape::Iff(a, b) => visitor.visit_equivalence(&a, &b),
            BooleanShape::Implies(a, b) => visitor.visit_implication(&a, &b),
            BooleanShape::Ite(c, t, e) => visitor.visit_ite(&c, &t, &e),
            BooleanShape::Quantifier(q, bound, body) => visitor.visit_quantifier(q, &bound, &body),
        }
    }

    /// Visit the Boolean structure of `f`, each distinct node once. Atoms are
    /// visited but not descended into.
    pub fn visit_recursively<V>(&self, f: &Formula<C::Term>, visitor: &mut V)
    where
        V: BooleanFormulaVisitor<C::Term, Output = TraversalProcess> + ?Sized,
    {
        let mut seen = FxHashSet::default();
        let mut stack = vec![f.clone()];
        seen.insert(f.clone());
        while let Some(next) = stack.pop() {
            match self.visit(&next, visitor) {
                TraversalProcess::Continue => {
                    for child in self.boolean_shape(&next).children() {
                        if child.is_boolean() && seen.insert(child.clone()) {
                            stack.push(child);
                        }
                    }
                }
                TraversalProcess::Skip => {}
                TraversalProcess::Abort => return,
            }
        }
    }
}
