// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The bundle of theory managers over one backend context.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::{
    error::FormulaError,
    extract,
    formula::Formula,
    names,
    sorts::Sort,
    tactic::{self, Tactic},
    theories::{
        ArrayManager, ArrayTheory, BitvectorManager, BitvectorTheory, BooleanManager,
        BooleanTheory, FloatingPointManager, FloatingPointTheory, NonLinearArithmetic,
        NumeralManager, NumeralTheory, QuantifierManager, QuantifierTheory, TacticTheory,
        UfManager,
    },
    value::RoundingMode,
    visitor::{self, FormulaTransformer, FormulaVisitor, TraversalProcess},
    FormulaCreator,
};

/// A backend that supports every theory (possibly by reporting
/// [`FormulaError::Unsupported`] for some operations).
pub trait SolverTheories:
    BooleanTheory
    + NumeralTheory
    + BitvectorTheory
    + FloatingPointTheory
    + QuantifierTheory
    + ArrayTheory
    + TacticTheory
{
}

impl<C> SolverTheories for C where
    C: BooleanTheory
        + NumeralTheory
        + BitvectorTheory
        + FloatingPointTheory
        + QuantifierTheory
        + ArrayTheory
        + TacticTheory
{
}

/// A backend that can read and print SMT-LIB text.
pub trait SmtLibText: FormulaCreator {
    /// Parse an SMT-LIB script into the conjunction of its assertions.
    /// Declarations in the script go through the context's symbol cache.
    fn parse_smtlib(&self, text: &str) -> Result<Self::Term, FormulaError>;

    /// Print the declarations a term needs followed by `(assert term)`.
    fn dump_smtlib(&self, term: &Self::Term) -> String;
}

/// Policies fixed when a [`FormulaManager`] is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FormulaConf {
    /// How to handle non-linear integer and rational arithmetic
    pub non_linear_arithmetic: NonLinearArithmetic,
    /// Rounding mode for floating point operations without an explicit one
    pub rounding_mode: RoundingMode,
}

impl Default for FormulaConf {
    fn default() -> Self {
        FormulaConf {
            non_linear_arithmetic: NonLinearArithmetic::Use,
            rounding_mode: RoundingMode::NearestTiesToEven,
        }
    }
}

/// All theory managers over one backend context, plus the traversal and
/// rewriting operations.
pub struct FormulaManager<C: SolverTheories> {
    creator: Arc<C>,
    conf: FormulaConf,
    boolean: BooleanManager<C>,
    integer: NumeralManager<C>,
    rational: NumeralManager<C>,
    bitvector: BitvectorManager<C>,
    floating_point: FloatingPointManager<C>,
    quantifier: QuantifierManager<C>,
    array: ArrayManager<C>,
    uf: UfManager<C>,
}

impl<C: SolverTheories> FormulaManager<C> {
    /// A manager over `creator` with one theory manager per theory.
    pub fn new(creator: Arc<C>, conf: FormulaConf) -> Self {
        FormulaManager {
            boolean: BooleanManager::new(creator.clone()),
            integer: NumeralManager::integer(creator.clone(), conf.non_linear_arithmetic),
            rational: NumeralManager::rational(creator.clone(), conf.non_linear_arithmetic),
            bitvector: BitvectorManager::new(creator.clone()),
            floating_point: FloatingPointManager::new(creator.clone(), conf.rounding_mode),
            quantifier: QuantifierManager::new(creator.clone()),
            array: ArrayManager::new(creator.clone()),
            uf: UfManager::new(creator.clone()),
            creator,
            conf,
        }
    }

    /// The backend context.
    pub fn creator(&self) -> &Arc<C> {
        &self.creator
    }

    /// The configuration this manager was created with.
    pub fn conf(&self) -> &FormulaConf {
        &self.conf
    }

    /// Boolean formulas.
    pub fn boolean(&self) -> &BooleanManager<C> {
        &self.boolean
    }

    /// Integer arithmetic.
    pub fn integer(&self) -> &NumeralManager<C> {
        &self.integer
    }

    /// Rational (real) arithmetic.
    pub fn rational(&self) -> &NumeralManager<C> {
        &self.rational
    }

    /// Fixed-width bitvectors.
    pub fn bitvector(&self) -> &BitvectorManager<C> {
        &self.bitvector
    }

    /// IEEE floating point.
    pub fn floating_point(&self) -> &FloatingPointManager<C> {
        &self.floating_point
    }

    /// Quantifiers.
    pub fn quantifier(&self) -> &QuantifierManager<C> {
        &self.quantifier
    }

    /// Arrays.
    pub fn array(&self) -> &ArrayManager<C> {
        &self.array
    }

    /// Uninterpreted functions.
    pub fn uf(&self) -> &UfManager<C> {
        &self.uf
    }

    /// A variable of any sort.
    pub fn make_variable(&self, sort: &Sort, name: &str) -> Result<Formula<C::Term>, FormulaError> {
        self.creator.variable(sort, name)
    }

    /// See [`visitor::visit`].
    pub fn visit<V>(&self, f: &Formula<C::Term>, visitor: &mut V) -> V::Output
    where
        V: FormulaVisitor<C::Term, C::Decl> + ?Sized,
    {
        visitor::visit(self.creator.as_ref(), f, visitor)
    }

    /// See [`visitor::visit_recursively`].
    pub fn visit_recursively<V, P>(&self, f: &Formula<C::Term>, visitor: &mut V, should_process: P)
    where
        V: FormulaVisitor<C::Term, C::Decl, Output = TraversalProcess> + ?Sized,
        P: FnMut(&Formula<C::Term>) -> bool,
    {
        visitor::visit_recursively(self.creator.as_ref(), f, visitor, should_process)
    }

    /// See [`visitor::transform_recursively`].
    pub fn transform_recursively<X, P>(
        &self,
        f: &Formula<C::Term>,
        transformer: &mut X,
        should_process: P,
    ) -> Result<Formula<C::Term>, FormulaError>
    where
        X: FormulaTransformer<C> + ?Sized,
        P: FnMut(&Formula<C::Term>) -> bool,
    {
        visitor::transform_recursively(self.creator.as_ref(), f, transformer, should_process)
    }

    /// See [`extract::extract_variables`].
    pub fn extract_variables(&self, f: &Formula<C::Term>) -> BTreeMap<String, Formula<C::Term>> {
        extract::extract_variables(self.creator.as_ref(), f)
    }

    /// See [`extract::extract_variables_and_ufs`].
    pub fn extract_variables_and_ufs(
        &self,
        f: &Formula<C::Term>,
    ) -> BTreeMap<String, Formula<C::Term>> {
        extract::extract_variables_and_ufs(self.creator.as_ref(), f)
    }

    /// See [`extract::substitute`].
    pub fn substitute(
        &self,
        f: &Formula<C::Term>,
        mapping: &HashMap<Formula<C::Term>, Formula<C::Term>>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        extract::substitute(self.creator.as_ref(), f, mapping)
    }

    /// Rewrite a Boolean formula with a tactic. NNF is computed here; the
    /// other tactics need backend support.
    pub fn apply_tactic(
        &self,
        f: &Formula<C::Term>,
        tactic: Tactic,
    ) -> Result<Formula<C::Term>, FormulaError> {
        match tactic {
            Tactic::Nnf => tactic::nnf(&self.boolean, self.creator.as_ref(), f),
            _ => {
                FormulaError::expect_sort(&Sort::Boolean, f.sort())?;
                let term = self.creator.apply_tactic(tactic, f.term())?;
                Ok(self.creator.encapsulate(Sort::Boolean, term))
            }
        }
    }

    /// An equivalent, possibly simpler formula.
    pub fn simplify(&self, f: &Formula<C::Term>) -> Result<Formula<C::Term>, FormulaError> {
        let term = self.creator.simplify(f.term())?;
        Ok(self.creator.encapsulate(f.sort().clone(), term))
    }

    /// Copy a formula built by `other` into this manager's context.
    pub fn translate_from(
        &self,
        f: &Formula<C::Term>,
        other: &FormulaManager<C>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        visitor::translate(other.creator.as_ref(), self.creator.as_ref(), f)
    }

    /// See [`names::is_valid_name`].
    pub fn is_valid_name(&self, name: &str) -> bool {
        names::is_valid_name(name)
    }

    /// See [`names::escape_name`].
    pub fn escape(&self, name: &str) -> String {
        names::escape_name(name)
    }

    /// See [`names::unescape_name`].
    pub fn unescape(&self, name: &str) -> String {
        names::unescape_name(name)
    }
}

impl<C: SolverTheories + SmtLibText> FormulaManager<C> {
    /// Parse an SMT-LIB script into the conjunction of its assertions.
    pub fn parse(&self, text: &str) -> Result<Formula<C::Term>, FormulaError> {
        let term = self.creator.parse_smtlib(text)?;
        let f = self.creator.encapsulate_with_type_of(term);
        FormulaError::expect_sort(&Sort::Boolean, f.sort())?;
        Ok(f)
    }

    /// Print a formula as an SMT-LIB script.
    pub fn dump_formula(&self, f: &Formula<C::Term>) -> String {
        self.creator.dump_smtlib(f.term())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    #[test]
    fn test_managers_share_context() {
        let ctx = Arc::new(TestContext::new());
        let fmgr = FormulaManager::new(ctx.clone(), FormulaConf::default());
        assert_eq!(fmgr.integer().sort(), &Sort::Integer);
        assert_eq!(fmgr.rational().sort(), &Sort::Rational);
        assert_eq!(
            fmgr.floating_point().default_rounding_mode(),
            RoundingMode::NearestTiesToEven
        );

        let x = fmgr.make_variable(&Sort::Integer, "x").unwrap();
        assert_eq!(fmgr.integer().make_variable("x").unwrap(), x);
        assert!(fmgr.boolean().make_variable("x").is_err());
        assert!(!fmgr.is_valid_name("assert"));
        assert_eq!(fmgr.unescape(&fmgr.escape("assert")), "assert");
        assert!(fmgr.is_valid_name(&fmgr.escape("a|b")));
    }

    #[test]
    fn test_translate_between_managers() {
        let source = FormulaManager::new(Arc::new(TestContext::new()), FormulaConf::default());
        let target = FormulaManager::new(Arc::new(TestContext::new()), FormulaConf::default());
        let x = source.rational().make_variable("x").unwrap();
        let half = source.rational().make_number_from_str("0.5").unwrap();
        let f = source.rational().less_than(&x, &half).unwrap();

        let g = target.translate_from(&f, &source).unwrap();
        assert_eq!(
            target.extract_variables(&g).keys().collect::<Vec<_>>(),
            vec!["x"]
        );
        let expected = target
            .rational()
            .less_than(
                &target.rational().make_variable("x").unwrap(),
                &target.rational().make_number_from_str("1/2").unwrap(),
            )
            .unwrap();
        assert_eq!(g, expected);
    }

    #[test]
    fn test_backend_tactics_default_to_unsupported() {
        let fmgr = FormulaManager::new(Arc::new(TestContext::new()), FormulaConf::default());
        let p = fmgr.boolean().make_variable("p").unwrap();
        for tactic in [Tactic::TseitinCnf, Tactic::QeLight, Tactic::Ackermannization] {
            let err = fmgr.apply_tactic(&p, tactic).unwrap_err();
            assert!(err.is_unsupported(), "{tactic}: {err}");
        }
        assert_eq!(fmgr.apply_tactic(&p, Tactic::Nnf).unwrap(), p);
    }
}
