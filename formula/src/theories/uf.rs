// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Uninterpreted functions.

use std::sync::Arc;

use crate::{
    creator::FormulaCreator,
    error::FormulaError,
    formula::{Formula, FunctionDeclaration},
    sorts::Sort,
};

/// Declares and applies uninterpreted functions.
pub struct UfManager<C: FormulaCreator> {
    creator: Arc<C>,
}

impl<C: FormulaCreator> UfManager<C> {
    /// A manager over `creator`.
    pub fn new(creator: Arc<C>) -> Self {
        UfManager { creator }
    }

    /// Declare a function; redeclaring the same signature returns the same
    /// declaration.
    pub fn declare_uf(
        &self,
        name: &str,
        result: &Sort,
        args: &[Sort],
    ) -> Result<FunctionDeclaration<C::Decl>, FormulaError> {
        self.creator.declare_uf(name, args, result)
    }

    /// Apply a declared function, checking arity and argument sorts.
    pub fn call_uf(
        &self,
        decl: &FunctionDeclaration<C::Decl>,
        args: &[Formula<C::Term>],
    ) -> Result<Formula<C::Term>, FormulaError> {
        self.creator.make_application(decl, args)
    }

    /// Declare a function for the sorts of `args` and apply it.
    pub fn declare_and_call_uf(
        &self,
        name: &str,
        result: &Sort,
        args: &[Formula<C::Term>],
    ) -> Result<Formula<C::Term>, FormulaError> {
        let sorts = args.iter().map(|a| a.sort().clone()).collect::<Vec<_>>();
        let decl = self.declare_uf(name, result, &sorts)?;
        self.call_uf(&decl, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    #[test]
    fn test_declare_and_call() {
        let ctx = Arc::new(TestContext::new());
        let ufmgr = UfManager::new(ctx.clone());
        let x = ctx.variable(&Sort::Integer, "x").unwrap();
        let fx = ufmgr
            .declare_and_call_uf("f", &Sort::Boolean, &[x.clone()])
            .unwrap();
        let decl = ufmgr.declare_uf("f", &Sort::Boolean, &[Sort::Integer]).unwrap();
        assert_eq!(ufmgr.call_uf(&decl, &[x.clone()]).unwrap(), fx);
        assert!(ufmgr
            .declare_and_call_uf("f", &Sort::Integer, &[x])
            .is_err());
    }
}
