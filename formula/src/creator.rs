// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The boundary between typed formula handles and opaque backend terms.
//!
//! A backend implements [`FormulaCreator`] once. The required methods are the
//! primitive capabilities (allocation, sort introspection, decomposition and
//! rebuilding); the provided methods implement wrapping and the context-owned
//! symbol caches on top of them, identically for every backend.

use fxhash::FxHashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Mutex;

use crate::{
    error::FormulaError,
    formula::{signature, Formula, FunctionDeclaration, FunctionKind, Quantifier},
    names::is_valid_name,
    sorts::Sort,
    value::Value,
};

/// The top-level shape of a backend term, with its children as raw terms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TermShape<T, D> {
    /// A constant with its value
    Constant(Value),
    /// A free variable (nullary uninterpreted constant)
    FreeVariable(String),
    /// A variable bound by an enclosing quantifier; `index` is its position in
    /// that quantifier's binder list.
    #[allow(missing_docs)]
    BoundVariable { name: String, index: usize },
    /// An application of a built-in operator or uninterpreted function
    #[allow(missing_docs)]
    Application {
        decl: FunctionDeclaration<D>,
        args: Vec<T>,
    },
    /// A quantified formula. `bound` holds the binders as free-variable terms
    /// and `body` refers to them through bound-variable leaves.
    #[allow(missing_docs)]
    Quantifier {
        quantifier: Quantifier,
        bound: Vec<T>,
        body: T,
    },
}

/// A [`TermShape`] with its children wrapped as typed formulas.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormulaShape<T, D> {
    Constant(Value),
    FreeVariable(String),
    BoundVariable {
        name: String,
        index: usize,
    },
    Application {
        decl: FunctionDeclaration<D>,
        args: Vec<Formula<T>>,
    },
    Quantifier {
        quantifier: Quantifier,
        bound: Vec<Formula<T>>,
        body: Formula<T>,
    },
}

#[derive(Debug)]
struct Symbols<T, D> {
    variables: FxHashMap<String, Formula<T>>,
    functions: FxHashMap<String, FunctionDeclaration<D>>,
}

/// Context-owned caches of variables (by name) and uninterpreted functions (by
/// name and signature).
///
/// Both caches share one namespace, only grow, and live exactly as long as the
/// context that owns them.
#[derive(Debug)]
pub struct SymbolCache<T, D>(Mutex<Symbols<T, D>>);

impl<T, D> Default for SymbolCache<T, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, D> SymbolCache<T, D> {
    /// Create empty caches.
    pub fn new() -> Self {
        SymbolCache(Mutex::new(Symbols {
            variables: FxHashMap::default(),
            functions: FxHashMap::default(),
        }))
    }
}

impl<T: Clone, D: Clone> SymbolCache<T, D> {
    /// Look up a cached variable.
    pub fn variable(&self, name: &str) -> Option<Formula<T>> {
        self.0.lock().unwrap().variables.get(name).cloned()
    }

    /// Look up a cached uninterpreted function.
    pub fn function(&self, name: &str) -> Option<FunctionDeclaration<D>> {
        self.0.lock().unwrap().functions.get(name).cloned()
    }

    /// All cached variables, sorted by name.
    pub fn variables(&self) -> Vec<Formula<T>> {
        let symbols = self.0.lock().unwrap();
        let mut names = symbols.variables.keys().collect::<Vec<_>>();
        names.sort();
        names
            .into_iter()
            .map(|name| symbols.variables[name].clone())
            .collect()
    }

    /// All cached uninterpreted functions, sorted by name.
    pub fn functions(&self) -> Vec<FunctionDeclaration<D>> {
        let symbols = self.0.lock().unwrap();
        let mut names = symbols.functions.keys().collect::<Vec<_>>();
        names.sort();
        names
            .into_iter()
            .map(|name| symbols.functions[name].clone())
            .collect()
    }
}

/// The per-backend authority for allocating terms and for converting between
/// opaque terms and typed [`Formula`] handles.
///
/// Terms must be cheap to clone, and their equality must identify the
/// underlying backend object. Declarations of built-in operators (everything
/// other than [`FunctionKind::Uf`]) must be plain values that are meaningful
/// in every context of the same backend type, so that formulas can be
/// translated between contexts.
pub trait FormulaCreator: Send + Sync {
    /// The backend's term representation
    type Term: Clone + Eq + Hash + fmt::Debug + Send + Sync;
    /// The backend's function declaration representation
    type Decl: Clone + Eq + Hash + fmt::Debug + Send + Sync;

    /// The caches owned by this context.
    fn symbols(&self) -> &SymbolCache<Self::Term, Self::Decl>;

    /// The sort the backend assigned to a term.
    fn term_sort(&self, term: &Self::Term) -> Sort;

    /// Allocate a free variable. This is not cached; use
    /// [`variable`](Self::variable) to get referentially stable variables.
    fn make_variable(&self, sort: &Sort, name: &str) -> Result<Self::Term, FormulaError>;

    /// Allocate a constant of the given sort.
    fn make_constant(&self, value: &Value, sort: &Sort) -> Result<Self::Term, FormulaError>;

    /// Allocate a bound-variable leaf, for rebuilding quantifier bodies.
    fn make_bound_variable(
        &self,
        sort: &Sort,
        name: &str,
        index: usize,
    ) -> Result<Self::Term, FormulaError>;

    /// Declare an uninterpreted function in the backend. This is not cached;
    /// use [`declare_uf`](Self::declare_uf).
    fn declare_function(
        &self,
        name: &str,
        arg_sorts: &[Sort],
        result_sort: &Sort,
    ) -> Result<Self::Decl, FormulaError>;

    /// Apply a declaration (an uninterpreted function, or a built-in operator
    /// obtained from [`decompose`](Self::decompose)) to arguments.
    fn apply_function(
        &self,
        decl: &FunctionDeclaration<Self::Decl>,
        args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError>;

    /// Rebuild a quantifier around a body that refers to its binders through
    /// bound-variable leaves.
    fn rebuild_quantifier(
        &self,
        quantifier: Quantifier,
        bound: &[Self::Term],
        body: &Self::Term,
    ) -> Result<Self::Term, FormulaError>;

    /// Classify the top-level shape of a term.
    fn decompose(&self, term: &Self::Term) -> TermShape<Self::Term, Self::Decl>;

    /// Wrap a term whose sort is known. The sort must be the one the backend
    /// assigned to the term; this is checked in debug builds.
    fn encapsulate(&self, sort: Sort, term: Self::Term) -> Formula<Self::Term> {
        debug_assert_eq!(
            self.term_sort(&term),
            sort,
            "cannot encapsulate term {term:?} with the wrong sort"
        );
        Formula::new_unchecked(sort, term)
    }

    /// Wrap a term with the sort the backend reports for it.
    fn encapsulate_with_type_of(&self, term: Self::Term) -> Formula<Self::Term> {
        let sort = self.term_sort(&term);
        Formula::new_unchecked(sort, term)
    }

    /// Classify the top-level shape of a formula, wrapping its children.
    fn shape(&self, f: &Formula<Self::Term>) -> FormulaShape<Self::Term, Self::Decl> {
        match self.decompose(f.term()) {
            TermShape::Constant(value) => FormulaShape::Constant(value),
            TermShape::FreeVariable(name) => FormulaShape::FreeVariable(name),
            TermShape::BoundVariable { name, index } => FormulaShape::BoundVariable { name, index },
            TermShape::Application { decl, args } => FormulaShape::Application {
                decl,
                args: args
                    .into_iter()
                    .map(|t| self.encapsulate_with_type_of(t))
                    .collect(),
            },
            TermShape::Quantifier {
                quantifier,
                bound,
                body,
            } => FormulaShape::Quantifier {
                quantifier,
                bound: bound
                    .into_iter()
                    .map(|t| self.encapsulate_with_type_of(t))
                    .collect(),
                body: self.encapsulate(Sort::Boolean, body),
            },
        }
    }

    /// The value of a constant formula.
    fn constant_value(&self, f: &Formula<Self::Term>) -> Option<Value> {
        match self.decompose(f.term()) {
            TermShape::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Unwrap a handle into its backend term.
    fn extract_info<'a>(&self, f: &'a Formula<Self::Term>) -> &'a Self::Term {
        f.term()
    }

    /// Get the variable with this name and sort, creating it on first use.
    ///
    /// Fails if the name is invalid or already used with another sort or for
    /// an uninterpreted function.
    fn variable(&self, sort: &Sort, name: &str) -> Result<Formula<Self::Term>, FormulaError> {
        if !is_valid_name(name) {
            return Err(FormulaError::InvalidName(name.to_string()));
        }
        let mut symbols = self.symbols().0.lock().unwrap();
        if let Some(existing) = symbols.variables.get(name) {
            if existing.sort() != sort {
                return Err(FormulaError::SignatureClash {
                    name: name.to_string(),
                    existing: existing.sort().to_string(),
                    requested: sort.to_string(),
                });
            }
            return Ok(existing.clone());
        }
        if let Some(decl) = symbols.functions.get(name) {
            return Err(FormulaError::SignatureClash {
                name: name.to_string(),
                existing: decl.signature(),
                requested: sort.to_string(),
            });
        }
        let term = self.make_variable(sort, name)?;
        let f = self.encapsulate(sort.clone(), term);
        symbols.variables.insert(name.to_string(), f.clone());
        log::debug!("declared variable {name}: {sort}");
        Ok(f)
    }

    /// Declare an uninterpreted function. Declaring the same signature again
    /// returns the identical declaration; a different signature for the same
    /// name is a [`FormulaError::SignatureClash`].
    fn declare_uf(
        &self,
        name: &str,
        arg_sorts: &[Sort],
        result_sort: &Sort,
    ) -> Result<FunctionDeclaration<Self::Decl>, FormulaError> {
        if !is_valid_name(name) {
            return Err(FormulaError::InvalidName(name.to_string()));
        }
        let mut symbols = self.symbols().0.lock().unwrap();
        if let Some(existing) = symbols.functions.get(name) {
            if existing.arg_sorts != arg_sorts || &existing.result_sort != result_sort {
                return Err(FormulaError::SignatureClash {
                    name: name.to_string(),
                    existing: existing.signature(),
                    requested: signature(arg_sorts, result_sort),
                });
            }
            return Ok(existing.clone());
        }
        if let Some(var) = symbols.variables.get(name) {
            return Err(FormulaError::SignatureClash {
                name: name.to_string(),
                existing: var.sort().to_string(),
                requested: signature(arg_sorts, result_sort),
            });
        }
        let decl = FunctionDeclaration {
            name: name.to_string(),
            kind: FunctionKind::Uf,
            arg_sorts: arg_sorts.to_vec(),
            result_sort: result_sort.clone(),
            decl: self.declare_function(name, arg_sorts, result_sort)?,
        };
        symbols.functions.insert(name.to_string(), decl.clone());
        log::debug!("declared function {name}: {}", decl.signature());
        Ok(decl)
    }

    /// Apply a declaration to typed arguments, checking the arity and argument
    /// sorts of uninterpreted functions.
    fn make_application(
        &self,
        decl: &FunctionDeclaration<Self::Decl>,
        args: &[Formula<Self::Term>],
    ) -> Result<Formula<Self::Term>, FormulaError> {
        if decl.is_uf() {
            if decl.arg_sorts.len() != args.len() {
                return Err(FormulaError::InvalidArgument(format!(
                    "{} expects {} arguments but got {}",
                    decl.name,
                    decl.arg_sorts.len(),
                    args.len()
                )));
            }
            for (expected, arg) in decl.arg_sorts.iter().zip(args) {
                FormulaError::expect_sort(expected, arg.sort())?;
            }
        }
        let terms = args.iter().map(|a| a.term().clone()).collect::<Vec<_>>();
        let term = self.apply_function(decl, &terms)?;
        Ok(self.encapsulate_with_type_of(term))
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::TestContext;
    use crate::{FormulaCreator, FormulaError, Sort};

    #[test]
    fn test_encapsulate_roundtrip() {
        let ctx = TestContext::new();
        let sorts = [
            Sort::Boolean,
            Sort::Integer,
            Sort::Rational,
            Sort::Bitvector(12),
            Sort::single_precision(),
            Sort::array(Sort::Integer, Sort::Boolean),
            Sort::RoundingMode,
        ];
        for (i, sort) in sorts.into_iter().enumerate() {
            let term = ctx.make_variable(&sort, &format!("v{i}")).unwrap();
            let f = ctx.encapsulate(sort.clone(), term.clone());
            assert_eq!(f.sort(), &sort);
            assert_eq!(ctx.extract_info(&f), &term);
            assert_eq!(ctx.encapsulate(sort, term), f);
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "wrong sort")]
    fn test_encapsulate_wrong_sort() {
        let ctx = TestContext::new();
        let term = ctx.make_variable(&Sort::Integer, "x").unwrap();
        let _ = ctx.encapsulate(Sort::Boolean, term);
    }

    #[test]
    fn test_variables_are_cached() {
        let ctx = TestContext::new();
        let x1 = ctx.variable(&Sort::Integer, "x").unwrap();
        let x2 = ctx.variable(&Sort::Integer, "x").unwrap();
        assert_eq!(x1, x2);
        assert!(matches!(
            ctx.variable(&Sort::Boolean, "x"),
            Err(FormulaError::SignatureClash { .. })
        ));
        assert_eq!(
            ctx.variable(&Sort::Boolean, "let"),
            Err(FormulaError::InvalidName("let".to_string()))
        );
        assert_eq!(ctx.symbols().variables(), vec![x1]);
    }

    #[test]
    fn test_declare_uf_idempotent() {
        let ctx = TestContext::new();
        let f1 = ctx
            .declare_uf("f", &[Sort::Integer, Sort::Boolean], &Sort::Integer)
            .unwrap();
        let f2 = ctx
            .declare_uf("f", &[Sort::Integer, Sort::Boolean], &Sort::Integer)
            .unwrap();
        assert_eq!(f1, f2);
        let clash = ctx
            .declare_uf("f", &[Sort::Integer], &Sort::Integer)
            .unwrap_err();
        insta::assert_display_snapshot!(clash, @"symbol f is already declared as (Int, Bool) -> Int and cannot be redeclared as (Int) -> Int");
        ctx.variable(&Sort::Integer, "g").unwrap();
        assert!(ctx.declare_uf("g", &[], &Sort::Integer).is_err());
    }

    #[test]
    fn test_application_checks_sorts() {
        let ctx = TestContext::new();
        let f = ctx.declare_uf("f", &[Sort::Integer], &Sort::Boolean).unwrap();
        let x = ctx.variable(&Sort::Integer, "x").unwrap();
        let b = ctx.variable(&Sort::Boolean, "b").unwrap();
        let app = ctx.make_application(&f, &[x.clone()]).unwrap();
        assert_eq!(app.sort(), &Sort::Boolean);
        assert!(matches!(
            ctx.make_application(&f, &[b]),
            Err(FormulaError::SortMismatch { .. })
        ));
        assert!(matches!(
            ctx.make_application(&f, &[x.clone(), x]),
            Err(FormulaError::InvalidArgument(_))
        ));
    }
}
