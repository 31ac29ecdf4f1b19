// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Arrays.

use std::sync::Arc;

use crate::{
    creator::FormulaCreator,
    error::FormulaError,
    formula::{Formula, FunctionKind},
    sorts::Sort,
    theories::ArrayTheory,
};

/// Array formulas over a backend.
pub struct ArrayManager<C: FormulaCreator> {
    creator: Arc<C>,
}

impl<C: ArrayTheory> ArrayManager<C> {
    /// A manager over `creator`.
    pub fn new(creator: Arc<C>) -> Self {
        ArrayManager { creator }
    }

    fn op(
        &self,
        kind: FunctionKind,
        args: &[&Formula<C::Term>],
    ) -> Result<Formula<C::Term>, FormulaError> {
        let sorts = args.iter().map(|a| a.sort().clone()).collect::<Vec<_>>();
        let sort = kind.result_sort(&sorts)?;
        let terms = args.iter().map(|a| a.term().clone()).collect::<Vec<_>>();
        let term = self.creator.make_array_op(&kind, &terms)?;
        Ok(self.creator.encapsulate(sort, term))
    }

    /// Get the array variable with this name and sort.
    pub fn make_variable(
        &self,
        name: &str,
        index: &Sort,
        element: &Sort,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.creator
            .variable(&Sort::array(index.clone(), element.clone()), name)
    }

    /// The array mapping every index of sort `index` to `element`.
    pub fn make_array(
        &self,
        index: &Sort,
        element: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::ConstArray(index.clone()), &[element])
    }

    /// The element of `array` at `index`.
    pub fn select(
        &self,
        array: &Formula<C::Term>,
        index: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Select, &[array, index])
    }

    /// `array` with the element at `index` replaced by `value`.
    pub fn store(
        &self,
        array: &Formula<C::Term>,
        index: &Formula<C::Term>,
        value: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.op(FunctionKind::Store, &[array, index, value])
    }

    /// Extensional equality of two arrays of the same sort.
    pub fn equivalence(
        &self,
        a: &Formula<C::Term>,
        b: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        if a.sort().array_sorts().is_none() {
            return Err(FormulaError::InvalidArgument(format!(
                "{} is not an array sort",
                a.sort()
            )));
        }
        self.op(FunctionKind::Eq, &[a, b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    #[test]
    fn test_array_sorts() {
        let ctx = Arc::new(TestContext::new());
        let amgr = ArrayManager::new(ctx.clone());
        let a = amgr
            .make_variable("a", &Sort::Integer, &Sort::Bitvector(8))
            .unwrap();
        let i = ctx.variable(&Sort::Integer, "i").unwrap();
        let v = ctx.variable(&Sort::Bitvector(8), "v").unwrap();
        let stored = amgr.store(&a, &i, &v).unwrap();
        assert_eq!(stored.sort(), a.sort());
        assert_eq!(amgr.select(&stored, &i).unwrap().sort(), &Sort::Bitvector(8));
        assert!(matches!(
            amgr.select(&a, &v),
            Err(FormulaError::SortMismatch { .. })
        ));
        assert!(amgr.store(&a, &i, &i).is_err());
        let zero = amgr.make_array(&Sort::Integer, &v).unwrap();
        assert_eq!(zero.sort(), a.sort());
        assert!(amgr.equivalence(&a, &zero).unwrap().is_boolean());
        assert!(amgr.equivalence(&i, &i).is_err());
    }
}
