// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A backend that talks SMT-LIB 2 to an external solver process.
//!
//! Terms are built entirely in-process: an [`SmtContext`] owns a hash-consing
//! table of [`SmtTerm`] nodes and never starts a solver to build a formula.
//! Solving happens in an [`SmtProver`], which owns one solver process and
//! sends it the printed form of its assertions. Quantifier elimination,
//! tactics and simplification start a short-lived process of the context's
//! solver.

use fxhash::FxHashMap;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use formula::{
    creator::{FormulaCreator, SymbolCache, TermShape},
    FormulaError, FunctionDeclaration, FunctionKind, Quantifier, SmtLibText, Sort, Value,
};
use smtlib::{
    proc::{SmtProc, SolverError},
    sexp::{self, app, atom_s, sexp_l, Sexp},
};

use crate::{
    basics::solver_error,
    conf::{SolverConf, SolverType},
    prover::{ProverOptions, SolverContext},
};

mod lower;
mod model;
mod prover;
mod reader;
mod term;
mod theories;

pub use prover::{SmtCanceler, SmtId, SmtProver};
pub use term::{SmtDecl, SmtTerm};

use term::{SmtNode, SmtOp};

type InternKey = (SmtOp, Vec<usize>, Sort);

/// The formula context of one SMT-LIB solver.
pub struct SmtContext {
    solver: SolverType,
    conf: SolverConf,
    symbols: SymbolCache<SmtTerm, SmtDecl>,
    table: Mutex<FxHashMap<InternKey, SmtTerm>>,
}

/// A free symbol of a term, with the signature to declare it with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FreeSymbol {
    pub(crate) name: String,
    pub(crate) args: Vec<Sort>,
    pub(crate) sort: Sort,
}

impl FreeSymbol {
    pub(crate) fn declaration(&self) -> Sexp {
        app(
            "declare-fun",
            [
                atom_s(&self.name),
                sexp_l(self.args.iter().map(lower::sort_sexp)),
                lower::sort_sexp(&self.sort),
            ],
        )
    }
}

impl SmtContext {
    /// A context for the given solver. `conf` supplies the timeout, seed and
    /// tee directory of the processes the context and its provers start.
    pub fn new(solver: SolverType, conf: SolverConf) -> Self {
        SmtContext {
            solver,
            conf,
            symbols: SymbolCache::new(),
            table: Mutex::new(FxHashMap::default()),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::new(SolverType::Z3, SolverConf::default())
    }

    /// The solver this context's provers run.
    pub fn solver(&self) -> SolverType {
        self.solver
    }

    /// The configuration provers of this context start their solvers with.
    pub fn conf(&self) -> &SolverConf {
        &self.conf
    }

    /// The number of distinct terms built so far.
    pub fn num_terms(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    fn intern(&self, op: SmtOp, args: Vec<SmtTerm>, sort: Sort) -> SmtTerm {
        let mut table = self.table.lock().unwrap();
        let key = (op, args.iter().map(|a| a.id()).collect(), sort);
        let id = table.len();
        table
            .entry(key.clone())
            .or_insert_with(|| {
                let has_bound =
                    matches!(key.0, SmtOp::Bound(..)) || args.iter().any(|a| a.node().has_bound);
                SmtTerm(Arc::new(SmtNode {
                    id,
                    sort: key.2,
                    op: key.0,
                    args,
                    has_bound,
                }))
            })
            .clone()
    }

    pub(crate) fn builtin(
        &self,
        kind: &FunctionKind,
        args: &[SmtTerm],
    ) -> Result<SmtTerm, FormulaError> {
        let sorts = args.iter().map(|a| a.sort().clone()).collect_vec();
        let sort = kind.result_sort(&sorts)?;
        Ok(self.intern(SmtOp::Builtin(kind.clone()), args.to_vec(), sort))
    }

    pub(crate) fn constant(&self, value: Value) -> Result<SmtTerm, FormulaError> {
        let sort = value.sort().ok_or_else(|| {
            FormulaError::InvalidArgument(format!("{value} has no sort of its own"))
        })?;
        self.make_constant(&value, &sort)
    }

    /// The free variables and uninterpreted functions of some terms, sorted by
    /// name.
    pub(crate) fn free_symbols<'a, I>(&self, terms: I) -> Vec<FreeSymbol>
    where
        I: IntoIterator<Item = &'a SmtTerm>,
    {
        let mut found: BTreeMap<String, FreeSymbol> = BTreeMap::new();
        let mut seen = fxhash::FxHashSet::default();
        let mut stack = terms.into_iter().cloned().collect_vec();
        while let Some(term) = stack.pop() {
            if !seen.insert(term.id()) {
                continue;
            }
            let node = term.node();
            match &node.op {
                SmtOp::Variable(name) => {
                    found.entry(name.clone()).or_insert_with(|| FreeSymbol {
                        name: name.clone(),
                        args: vec![],
                        sort: node.sort.clone(),
                    });
                }
                SmtOp::Uf(name) => {
                    found.entry(name.clone()).or_insert_with(|| FreeSymbol {
                        name: name.clone(),
                        args: node.args.iter().map(|a| a.sort().clone()).collect(),
                        sort: node.sort.clone(),
                    });
                }
                _ => {}
            }
            stack.extend(node.args.iter().cloned());
        }
        found.into_values().collect()
    }

    /// Start a solver process for a single command.
    pub(crate) fn start_process(&self) -> Result<SmtProc, FormulaError> {
        let cmd = self.conf.cmd(self.solver);
        log::debug!("starting {} for a one-off command", self.solver);
        SmtProc::new(cmd, self.conf.tee.as_deref()).map_err(solver_error)
    }

    /// Run one command about `term` in a fresh process, after declaring the
    /// term's symbols (and asserting it, if `assert` is set).
    pub(crate) fn one_off(
        &self,
        term: &SmtTerm,
        assert: bool,
        command: Sexp,
    ) -> Result<Sexp, FormulaError> {
        let mut proc = self.start_process()?;
        for symbol in self.free_symbols([term]) {
            proc.send(&symbol.declaration());
        }
        if assert {
            proc.send(&app("assert", [lower::lower(term)]));
        }
        let resp = proc.expensive_call(&command);
        if resp.is_err() {
            proc.save_tee();
        }
        resp.map_err(|err| match err {
            SolverError::UnexpectedClose(msg) if msg.contains("unsupported") => {
                FormulaError::Unsupported(format!("{}: {msg}", self.solver))
            }
            err => solver_error(err),
        })
    }

    /// Read a term printed by the solver.
    pub(crate) fn read(&self, s: &Sexp) -> Result<SmtTerm, FormulaError> {
        reader::Reader::new(self).term(s)
    }
}

impl FormulaCreator for SmtContext {
    type Term = SmtTerm;
    type Decl = SmtDecl;

    fn symbols(&self) -> &SymbolCache<SmtTerm, SmtDecl> {
        &self.symbols
    }

    fn term_sort(&self, term: &SmtTerm) -> Sort {
        term.sort().clone()
    }

    fn make_variable(&self, sort: &Sort, name: &str) -> Result<SmtTerm, FormulaError> {
        Ok(self.intern(SmtOp::Variable(name.to_string()), vec![], sort.clone()))
    }

    fn make_constant(&self, value: &Value, sort: &Sort) -> Result<SmtTerm, FormulaError> {
        if let Some(found) = value.sort() {
            FormulaError::expect_sort(sort, &found)?;
        }
        Ok(self.intern(SmtOp::Constant(value.clone()), vec![], sort.clone()))
    }

    fn make_bound_variable(
        &self,
        sort: &Sort,
        name: &str,
        index: usize,
    ) -> Result<SmtTerm, FormulaError> {
        Ok(self.intern(SmtOp::Bound(name.to_string(), index), vec![], sort.clone()))
    }

    fn declare_function(
        &self,
        name: &str,
        _arg_sorts: &[Sort],
        _result_sort: &Sort,
    ) -> Result<SmtDecl, FormulaError> {
        Ok(SmtDecl(atom_s(name)))
    }

    fn apply_function(
        &self,
        decl: &FunctionDeclaration<SmtDecl>,
        args: &[SmtTerm],
    ) -> Result<SmtTerm, FormulaError> {
        if decl.is_uf() {
            return Ok(self.intern(
                SmtOp::Uf(decl.name.clone()),
                args.to_vec(),
                decl.result_sort.clone(),
            ));
        }
        self.builtin(&decl.kind, args)
    }

    fn rebuild_quantifier(
        &self,
        quantifier: Quantifier,
        bound: &[SmtTerm],
        body: &SmtTerm,
    ) -> Result<SmtTerm, FormulaError> {
        FormulaError::expect_sort(&Sort::Boolean, body.sort())?;
        Ok(self.intern(
            SmtOp::Quantifier(quantifier, bound.to_vec()),
            vec![body.clone()],
            Sort::Boolean,
        ))
    }

    fn decompose(&self, term: &SmtTerm) -> TermShape<SmtTerm, SmtDecl> {
        let node = term.node();
        match &node.op {
            SmtOp::Constant(value) => TermShape::Constant(value.clone()),
            SmtOp::Variable(name) => TermShape::FreeVariable(name.clone()),
            SmtOp::Bound(name, index) => TermShape::BoundVariable {
                name: name.clone(),
                index: *index,
            },
            SmtOp::Builtin(kind) => {
                let arg_sorts = node.args.iter().map(|a| a.sort().clone()).collect_vec();
                TermShape::Application {
                    decl: FunctionDeclaration {
                        name: kind.smt_name(&arg_sorts).unwrap_or_default(),
                        kind: kind.clone(),
                        decl: SmtDecl(lower::head_sexp(kind, &arg_sorts)),
                        arg_sorts,
                        result_sort: node.sort.clone(),
                    },
                    args: node.args.clone(),
                }
            }
            SmtOp::Uf(name) => TermShape::Application {
                decl: FunctionDeclaration {
                    name: name.clone(),
                    kind: FunctionKind::Uf,
                    arg_sorts: node.args.iter().map(|a| a.sort().clone()).collect(),
                    result_sort: node.sort.clone(),
                    decl: SmtDecl(atom_s(name)),
                },
                args: node.args.clone(),
            },
            SmtOp::Quantifier(quantifier, bound) => TermShape::Quantifier {
                quantifier: *quantifier,
                bound: bound.clone(),
                body: node.args[0].clone(),
            },
        }
    }
}

impl SmtLibText for SmtContext {
    fn parse_smtlib(&self, text: &str) -> Result<SmtTerm, FormulaError> {
        let commands = sexp::parse_many(text)
            .map_err(|err| FormulaError::InvalidArgument(format!("malformed SMT-LIB: {err}")))?;
        reader::Reader::new(self).script(&commands)
    }

    fn dump_smtlib(&self, term: &SmtTerm) -> String {
        let mut lines = self
            .free_symbols([term])
            .iter()
            .map(|symbol| symbol.declaration().to_string())
            .collect_vec();
        lines.push(app("assert", [lower::lower(term)]).to_string());
        lines.join("\n")
    }
}

impl SolverContext for SmtContext {
    type Prover = SmtProver;

    fn new_prover(self: &Arc<Self>, options: ProverOptions) -> Result<SmtProver, FormulaError> {
        Ok(SmtProver::new(self.clone(), options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formula::{FormulaConf, FormulaManager};

    fn manager() -> FormulaManager<SmtContext> {
        FormulaManager::new(Arc::new(SmtContext::for_tests()), FormulaConf::default())
    }

    #[test]
    fn test_hash_consing() {
        let fmgr = manager();
        let imgr = fmgr.integer();
        let x = imgr.make_variable("x").unwrap();
        let one = imgr.make_number(1).unwrap();
        let a = imgr.add(&x, &one).unwrap();
        let b = imgr.add(&x, &one).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.term().id(), b.term().id());
        let before = fmgr.creator().num_terms();
        imgr.add(&x, &one).unwrap();
        assert_eq!(fmgr.creator().num_terms(), before);
    }

    #[test]
    fn test_dump_and_parse() {
        let fmgr = manager();
        let imgr = fmgr.integer();
        let x = imgr.make_variable("x").unwrap();
        let f = fmgr
            .uf()
            .declare_and_call_uf("f", &Sort::Integer, &[x.clone()])
            .unwrap();
        let ten = imgr.make_number(10).unwrap();
        let lt = imgr.less_than(&f, &ten).unwrap();
        let neg = imgr.make_number(-3).unwrap();
        let gt = imgr.greater_than(&x, &neg).unwrap();
        let both = fmgr.boolean().and(&lt, &gt).unwrap();

        let text = fmgr.dump_formula(&both);
        insta::assert_snapshot!(text, @r###"
        (declare-fun f (Int) Int)
        (declare-fun x () Int)
        (assert (and (< (f x) 10) (> x (- 3))))
        "###);
        assert_eq!(fmgr.parse(&text).unwrap(), both);
    }

    #[test]
    fn test_parse_script() {
        let fmgr = manager();
        let f = fmgr
            .parse(
                "(set-logic QF_BV)
                 (declare-const a (_ BitVec 8))
                 (define-fun low ((v (_ BitVec 8))) (_ BitVec 4) ((_ extract 3 0) v))
                 (push 1)
                 (assert (= (low a) #x5))
                 (assert (bvult a (_ bv200 8)))
                 (check-sat)",
            )
            .unwrap();
        insta::assert_snapshot!(
            fmgr.dump_formula(&f),
            @r###"
        (declare-fun a () (_ BitVec 8))
        (assert (and (= ((_ extract 3 0) a) #b0101) (bvult a #b11001000)))
        "###
        );
        assert!(fmgr.parse("(assert (+ 1 2))").is_err());
        assert!(fmgr.parse("(assert (p 1))").is_err());
        assert!(fmgr.parse("(declare-sort U 0)").unwrap_err().is_unsupported());
    }
}
