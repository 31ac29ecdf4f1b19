// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Quantified formulas.

use std::sync::Arc;

use crate::{
    creator::{FormulaCreator, FormulaShape},
    error::FormulaError,
    formula::{Formula, Quantifier},
    sorts::Sort,
    theories::QuantifierTheory,
};

/// Quantified formulas over a backend.
pub struct QuantifierManager<C: FormulaCreator> {
    creator: Arc<C>,
}

impl<C: QuantifierTheory> QuantifierManager<C> {
    /// A manager over `creator`.
    pub fn new(creator: Arc<C>) -> Self {
        QuantifierManager { creator }
    }

    /// Bind the free variables `bound` in `body`. Binding nothing returns the
    /// body unchanged.
    pub fn mk_quantifier(
        &self,
        quantifier: Quantifier,
        bound: &[Formula<C::Term>],
        body: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        FormulaError::expect_sort(&Sort::Boolean, body.sort())?;
        if bound.is_empty() {
            return Ok(body.clone());
        }
        for var in bound {
            if !matches!(self.creator.shape(var), FormulaShape::FreeVariable(_)) {
                return Err(FormulaError::InvalidArgument(format!(
                    "only variables can be bound, not {var:?}"
                )));
            }
        }
        let bound = bound.iter().map(|v| v.term().clone()).collect::<Vec<_>>();
        let term = self.creator.mk_quantifier(quantifier, &bound, body.term())?;
        Ok(self.creator.encapsulate(Sort::Boolean, term))
    }

    /// `forall bound. body`
    pub fn forall(
        &self,
        bound: &[Formula<C::Term>],
        body: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.mk_quantifier(Quantifier::Forall, bound, body)
    }

    /// `exists bound. body`
    pub fn exists(
        &self,
        bound: &[Formula<C::Term>],
        body: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.mk_quantifier(Quantifier::Exists, bound, body)
    }

    /// An equivalent quantifier-free formula, if the backend can compute one.
    pub fn eliminate_quantifiers(
        &self,
        f: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        let term = self.creator.eliminate_quantifiers(f.term())?;
        Ok(self.creator.encapsulate(f.sort().clone(), term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;
    use crate::theories::BooleanManager;

    #[test]
    fn test_quantifier_validation() {
        let ctx = Arc::new(TestContext::new());
        let qmgr = QuantifierManager::new(ctx.clone());
        let bmgr = BooleanManager::new(ctx.clone());
        let x = bmgr.make_variable("x").unwrap();
        let y = bmgr.make_variable("y").unwrap();
        let body = bmgr.or(&x, &y).unwrap();

        assert_eq!(qmgr.forall(&[], &body).unwrap(), body);
        let not_x = bmgr.not(&x).unwrap();
        assert!(matches!(
            qmgr.exists(&[not_x], &body),
            Err(FormulaError::InvalidArgument(_))
        ));
        let i = ctx.variable(&Sort::Integer, "i").unwrap();
        assert!(matches!(
            qmgr.forall(&[x.clone()], &i),
            Err(FormulaError::SortMismatch { .. })
        ));

        let f = qmgr.forall(&[x.clone()], &body).unwrap();
        match ctx.shape(&f) {
            FormulaShape::Quantifier {
                quantifier,
                bound,
                body: inner,
            } => {
                assert_eq!(quantifier, Quantifier::Forall);
                assert_eq!(bound, vec![x]);
                assert_ne!(inner, body);
            }
            shape => panic!("unexpected {shape:?}"),
        }
        assert!(qmgr.eliminate_quantifiers(&f).unwrap_err().is_unsupported());
    }
}
