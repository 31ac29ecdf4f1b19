// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A minimal hash-consed backend for testing the backend-independent layers.

use fxhash::FxHashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::{
    creator::{FormulaCreator, SymbolCache, TermShape},
    formula::{Formula, FunctionDeclaration, FunctionKind, Quantifier},
    theories::{
        ArrayTheory, BitvectorTheory, BooleanTheory, FloatingPointTheory, NumeralTheory,
        QuantifierTheory, TacticTheory,
    },
    visitor::{transform_recursively, FormulaTransformer},
    FormulaError, Sort, Value,
};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum Op {
    Constant(Value),
    Variable(String),
    Bound(String, usize),
    Builtin(FunctionKind),
    Uf(String),
    Quantifier(Quantifier, Vec<TestTerm>),
}

#[derive(Debug)]
struct Node {
    id: usize,
    sort: Sort,
    op: Op,
    args: Vec<TestTerm>,
}

impl Drop for Node {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.args);
        while let Some(term) = stack.pop() {
            if let Ok(mut node) = Arc::try_unwrap(term.0) {
                stack.append(&mut node.args);
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct TestTerm(Arc<Node>);

impl PartialEq for TestTerm {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for TestTerm {}

impl Hash for TestTerm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state)
    }
}

/// Terms are interned, so structurally equal terms are the same node.
pub struct TestContext {
    symbols: SymbolCache<TestTerm, ()>,
    table: Mutex<FxHashMap<(Op, Vec<usize>, Sort), TestTerm>>,
    nonlinear: bool,
}

impl TestContext {
    /// A context whose arithmetic rejects non-linear operations.
    pub fn new() -> Self {
        TestContext {
            symbols: SymbolCache::new(),
            table: Mutex::new(FxHashMap::default()),
            nonlinear: false,
        }
    }

    pub fn with_nonlinear() -> Self {
        TestContext {
            nonlinear: true,
            ..Self::new()
        }
    }

    fn intern(&self, op: Op, args: Vec<TestTerm>, sort: Sort) -> TestTerm {
        let mut table = self.table.lock().unwrap();
        let key = (op, args.iter().map(|a| a.0.id).collect(), sort);
        let id = table.len();
        table
            .entry(key.clone())
            .or_insert_with(|| {
                TestTerm(Arc::new(Node {
                    id,
                    sort: key.2,
                    op: key.0,
                    args,
                }))
            })
            .clone()
    }

    fn builtin(&self, kind: &FunctionKind, args: &[TestTerm]) -> Result<TestTerm, FormulaError> {
        let sorts = args.iter().map(|a| a.0.sort.clone()).collect::<Vec<_>>();
        let sort = kind.result_sort(&sorts)?;
        Ok(self.intern(Op::Builtin(kind.clone()), args.to_vec(), sort))
    }

    fn is_constant(term: &TestTerm) -> bool {
        matches!(term.0.op, Op::Constant(_))
    }
}

impl FormulaCreator for TestContext {
    type Term = TestTerm;
    type Decl = ();

    fn symbols(&self) -> &SymbolCache<TestTerm, ()> {
        &self.symbols
    }

    fn term_sort(&self, term: &TestTerm) -> Sort {
        term.0.sort.clone()
    }

    fn make_variable(&self, sort: &Sort, name: &str) -> Result<TestTerm, FormulaError> {
        Ok(self.intern(Op::Variable(name.to_string()), vec![], sort.clone()))
    }

    fn make_constant(&self, value: &Value, sort: &Sort) -> Result<TestTerm, FormulaError> {
        if let Some(found) = value.sort() {
            FormulaError::expect_sort(sort, &found)?;
        }
        Ok(self.intern(Op::Constant(value.clone()), vec![], sort.clone()))
    }

    fn make_bound_variable(
        &self,
        sort: &Sort,
        name: &str,
        index: usize,
    ) -> Result<TestTerm, FormulaError> {
        Ok(self.intern(Op::Bound(name.to_string(), index), vec![], sort.clone()))
    }

    fn declare_function(
        &self,
        _name: &str,
        _arg_sorts: &[Sort],
        _result_sort: &Sort,
    ) -> Result<(), FormulaError> {
        Ok(())
    }

    fn apply_function(
        &self,
        decl: &FunctionDeclaration<()>,
        args: &[TestTerm],
    ) -> Result<TestTerm, FormulaError> {
        if decl.is_uf() {
            return Ok(self.intern(
                Op::Uf(decl.name.clone()),
                args.to_vec(),
                decl.result_sort.clone(),
            ));
        }
        self.builtin(&decl.kind, args)
    }

    fn rebuild_quantifier(
        &self,
        quantifier: Quantifier,
        bound: &[TestTerm],
        body: &TestTerm,
    ) -> Result<TestTerm, FormulaError> {
        FormulaError::expect_sort(&Sort::Boolean, &body.0.sort)?;
        Ok(self.intern(
            Op::Quantifier(quantifier, bound.to_vec()),
            vec![body.clone()],
            Sort::Boolean,
        ))
    }

    fn decompose(&self, term: &TestTerm) -> TermShape<TestTerm, ()> {
        let node = &term.0;
        match &node.op {
            Op::Constant(value) => TermShape::Constant(value.clone()),
            Op::Variable(name) => TermShape::FreeVariable(name.clone()),
            Op::Bound(name, index) => TermShape::BoundVariable {
                name: name.clone(),
                index: *index,
            },
            Op::Builtin(kind) => {
                let arg_sorts = node.args.iter().map(|a| a.0.sort.clone()).collect::<Vec<_>>();
                TermShape::Application {
                    decl: FunctionDeclaration {
                        name: kind.smt_name(&arg_sorts).unwrap_or_default(),
                        kind: kind.clone(),
                        arg_sorts,
                        result_sort: node.sort.clone(),
                        decl: (),
                    },
                    args: node.args.clone(),
                }
            }
            Op::Uf(name) => TermShape::Application {
                decl: FunctionDeclaration {
                    name: name.clone(),
                    kind: FunctionKind::Uf,
                    arg_sorts: node.args.iter().map(|a| a.0.sort.clone()).collect(),
                    result_sort: node.sort.clone(),
                    decl: (),
                },
                args: node.args.clone(),
            },
            Op::Quantifier(quantifier, bound) => TermShape::Quantifier {
                quantifier: *quantifier,
                bound: bound.clone(),
                body: node.args[0].clone(),
            },
        }
    }
}

impl BooleanTheory for TestContext {
    fn make_boolean_op(
        &self,
        kind: &FunctionKind,
        args: &[TestTerm],
    ) -> Result<TestTerm, FormulaError> {
        self.builtin(kind, args)
    }
}

impl NumeralTheory for TestContext {
    fn make_numeral_op(
        &self,
        kind: &FunctionKind,
        args: &[TestTerm],
    ) -> Result<TestTerm, FormulaError> {
        let nonlinear = match kind {
            FunctionKind::Mul => args.iter().filter(|a| !Self::is_constant(a)).count() > 1,
            FunctionKind::Div | FunctionKind::Modulo => !Self::is_constant(&args[1]),
            _ => false,
        };
        if nonlinear && !self.nonlinear {
            return Err(FormulaError::Unsupported(format!("non-linear {kind:?}")));
        }
        self.builtin(kind, args)
    }
}

impl BitvectorTheory for TestContext {
    fn make_bitvector_op(
        &self,
        kind: &FunctionKind,
        args: &[TestTerm],
    ) -> Result<TestTerm, FormulaError> {
        self.builtin(kind, args)
    }
}

impl FloatingPointTheory for TestContext {
    fn make_floating_point_op(
        &self,
        kind: &FunctionKind,
        args: &[TestTerm],
    ) -> Result<TestTerm, FormulaError> {
        match kind {
            FunctionKind::FpMul | FunctionKind::FpDiv => {
                Err(FormulaError::Unsupported(format!("{kind:?}")))
            }
            _ => self.builtin(kind, args),
        }
    }
}

impl ArrayTheory for TestContext {
    fn make_array_op(
        &self,
        kind: &FunctionKind,
        args: &[TestTerm],
    ) -> Result<TestTerm, FormulaError> {
        self.builtin(kind, args)
    }
}

struct Abstract<'a> {
    bound: &'a [TestTerm],
}

impl FormulaTransformer<TestContext> for Abstract<'_> {
    fn free_variable(
        &mut self,
        creator: &TestContext,
        f: &Formula<TestTerm>,
        name: &str,
    ) -> Result<Formula<TestTerm>, FormulaError> {
        match self.bound.iter().position(|b| b == f.term()) {
            Some(index) => {
                let term = creator.make_bound_variable(f.sort(), name, index)?;
                Ok(creator.encapsulate(f.sort().clone(), term))
            }
            None => Ok(f.clone()),
        }
    }
}

impl QuantifierTheory for TestContext {
    fn mk_quantifier(
        &self,
        quantifier: Quantifier,
        bound: &[TestTerm],
        body: &TestTerm,
    ) -> Result<TestTerm, FormulaError> {
        let body = self.encapsulate_with_type_of(body.clone());
        let body = transform_recursively(self, &body, &mut Abstract { bound }, |_| true)?;
        self.rebuild_quantifier(quantifier, bound, body.term())
    }
}

impl TacticTheory for TestContext {}
