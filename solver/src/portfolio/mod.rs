// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A portfolio of backend contexts that behaves like a single context.
//!
//! Every term of a [`PortfolioContext`] is a tuple holding one term per
//! delegate. Theory operations are applied to every delegate, so the tuple
//! elements are always structurally aligned. Operations that only some
//! delegates support natively (quantifier elimination, tactics and
//! simplification) run on the first delegate that succeeds, and the result is
//! translated into the others.

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;

use formula::{
    tactic::Tactic,
    theories::{
        ArrayTheory, BitvectorTheory, BooleanTheory, FloatingPointTheory, NumeralTheory,
        QuantifierTheory, TacticTheory,
    },
    visitor::translate,
    Formula, FormulaCreator, FormulaError, FunctionDeclaration, FunctionKind, Quantifier,
    SmtLibText, SolverTheories, Sort, SymbolCache, TermShape, Value,
};

use crate::{
    conf::SolverConf,
    prover::{ProverOptions, SolverContext},
    smt::SmtContext,
};

mod prover;

pub use prover::{PortfolioCanceler, PortfolioId, PortfolioProver};

/// One term per delegate, in delegate order.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PortfolioTerm<T>(pub Vec<T>);

/// One function declaration per delegate, in delegate order.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PortfolioDecl<D>(pub Vec<D>);

/// Terms print as the first delegate's term.
impl<T: fmt::Display> fmt::Display for PortfolioTerm<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.first() {
            Some(t) => write!(f, "{t}"),
            None => write!(f, "<empty>"),
        }
    }
}

/// A context whose terms live in several delegate contexts at once.
pub struct PortfolioContext<C: FormulaCreator> {
    delegates: Vec<Arc<C>>,
    symbols: SymbolCache<PortfolioTerm<C::Term>, PortfolioDecl<C::Decl>>,
}

fn column<T: Clone>(terms: &[PortfolioTerm<T>], i: usize) -> Vec<T> {
    terms.iter().map(|t| t.0[i].clone()).collect()
}

impl<C: FormulaCreator> PortfolioContext<C> {
    /// Create a portfolio over the given delegates, which must all be of the
    /// same backend type and have no symbols yet.
    pub fn new(delegates: Vec<Arc<C>>) -> Result<Self, FormulaError> {
        if delegates.is_empty() {
            return Err(FormulaError::InvalidArgument(
                "a portfolio needs at least one delegate".to_string(),
            ));
        }
        Ok(PortfolioContext {
            delegates,
            symbols: SymbolCache::new(),
        })
    }

    /// The delegate contexts, in delegate order.
    pub fn delegates(&self) -> &[Arc<C>] {
        &self.delegates
    }

    /// The projection of a portfolio formula into delegate `i`.
    pub fn project(&self, i: usize, f: &Formula<PortfolioTerm<C::Term>>) -> Formula<C::Term> {
        self.delegates[i].encapsulate(f.sort().clone(), f.term().0[i].clone())
    }

    /// Turn a formula of delegate `i` into a portfolio formula, translating it
    /// into every other delegate.
    pub fn lift(
        &self,
        i: usize,
        f: &Formula<C::Term>,
    ) -> Result<Formula<PortfolioTerm<C::Term>>, FormulaError> {
        let from = self.delegates[i].as_ref();
        let terms = self
            .delegates
            .iter()
            .enumerate()
            .map(|(j, to)| {
                if i == j {
                    Ok(f.term().clone())
                } else {
                    Ok(translate(from, to.as_ref(), f)?.into_term())
                }
            })
            .collect::<Result<Vec<_>, FormulaError>>()?;
        Ok(self.encapsulate(f.sort().clone(), PortfolioTerm(terms)))
    }

    fn lift_term(&self, i: usize, term: C::Term) -> Result<PortfolioTerm<C::Term>, FormulaError> {
        let f = self.delegates[i].encapsulate_with_type_of(term);
        Ok(self.lift(i, &f)?.into_term())
    }

    fn each<F>(&self, mut op: F) -> Result<PortfolioTerm<C::Term>, FormulaError>
    where
        F: FnMut(usize, &C) -> Result<C::Term, FormulaError>,
    {
        self.delegates
            .iter()
            .enumerate()
            .map(|(i, d)| op(i, d))
            .collect::<Result<Vec<_>, _>>()
            .map(PortfolioTerm)
    }

    /// Run `op` on the delegates in order and lift the first success. When
    /// every delegate fails, the first error is returned.
    fn first_success<F>(
        &self,
        what: &str,
        mut op: F,
    ) -> Result<PortfolioTerm<C::Term>, FormulaError>
    where
        F: FnMut(usize, &C) -> Result<C::Term, FormulaError>,
    {
        let mut first_error = None;
        for (i, d) in self.delegates.iter().enumerate() {
            match op(i, d) {
                Ok(term) => return self.lift_term(i, term),
                Err(err) => {
                    log::debug!("delegate {i} could not run {what}: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| FormulaError::Unsupported(what.to_string())))
    }
}

impl PortfolioContext<SmtContext> {
    /// One SMT-LIB context per solver of the configuration.
    pub fn smt(conf: &SolverConf) -> Result<Self, FormulaError> {
        Self::new(
            conf.solvers
                .iter()
                .map(|solver| Arc::new(SmtContext::new(*solver, conf.clone())))
                .collect(),
        )
    }
}

impl<C: FormulaCreator> FormulaCreator for PortfolioContext<C> {
    type Term = PortfolioTerm<C::Term>;
    type Decl = PortfolioDecl<C::Decl>;

    fn symbols(&self) -> &SymbolCache<Self::Term, Self::Decl> {
        &self.symbols
    }

    fn term_sort(&self, term: &Self::Term) -> Sort {
        self.delegates[0].term_sort(&term.0[0])
    }

    fn make_variable(&self, sort: &Sort, name: &str) -> Result<Self::Term, FormulaError> {
        // go through the delegates' caches so their models know the variable;
        // a clash there means a shadowing binder
        self.each(|_, d| match d.variable(sort, name) {
            Ok(var) => Ok(var.into_term()),
            Err(_) => d.make_variable(sort, name),
        })
    }

    fn make_constant(&self, value: &Value, sort: &Sort) -> Result<Self::Term, FormulaError> {
        self.each(|_, d| d.make_constant(value, sort))
    }

    fn make_bound_variable(
        &self,
        sort: &Sort,
        name: &str,
        index: usize,
    ) -> Result<Self::Term, FormulaError> {
        self.each(|_, d| d.make_bound_variable(sort, name, index))
    }

    fn declare_function(
        &self,
        name: &str,
        arg_sorts: &[Sort],
        result_sort: &Sort,
    ) -> Result<Self::Decl, FormulaError> {
        self.delegates
            .iter()
            .map(|d| Ok(d.declare_uf(name, arg_sorts, result_sort)?.decl))
            .collect::<Result<Vec<_>, FormulaError>>()
            .map(PortfolioDecl)
    }

    fn apply_function(
        &self,
        decl: &FunctionDeclaration<Self::Decl>,
        args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError> {
        self.each(|i, d| {
            let decl = FunctionDeclaration {
                name: decl.name.clone(),
                kind: decl.kind.clone(),
                arg_sorts: decl.arg_sorts.clone(),
                result_sort: decl.result_sort.clone(),
                decl: decl.decl.0[i].clone(),
            };
            d.apply_function(&decl, &column(args, i))
        })
    }

    fn rebuild_quantifier(
        &self,
        quantifier: Quantifier,
        bound: &[Self::Term],
        body: &Self::Term,
    ) -> Result<Self::Term, FormulaError> {
        self.each(|i, d| d.rebuild_quantifier(quantifier, &column(bound, i), &body.0[i]))
    }

    fn decompose(&self, term: &Self::Term) -> TermShape<Self::Term, Self::Decl> {
        self.aligned_shape(term).unwrap_or_else(|| {
            log::error!("portfolio delegates disagree on the shape of {term:?}");
            self.first_shape(term)
        })
    }
}

impl<C: FormulaCreator> PortfolioContext<C> {
    /// The common shape of a term in every delegate, if they agree on it.
    fn aligned_shape(
        &self,
        term: &PortfolioTerm<C::Term>,
    ) -> Option<TermShape<PortfolioTerm<C::Term>, PortfolioDecl<C::Decl>>> {
        let mut shapes = self
            .delegates
            .iter()
            .zip(&term.0)
            .map(|(d, t)| d.decompose(t));
        let first = shapes.next()?;
        match first {
            TermShape::Constant(value) => {
                for shape in shapes {
                    if !matches!(shape, TermShape::Constant(ref v) if *v == value) {
                        return None;
                    }
                }
                Some(TermShape::Constant(value))
            }
            TermShape::FreeVariable(name) => {
                for shape in shapes {
                    if !matches!(shape, TermShape::FreeVariable(ref n) if *n == name) {
                        return None;
                    }
                }
                Some(TermShape::FreeVariable(name))
            }
            TermShape::BoundVariable { name, index } => {
                for shape in shapes {
                    match shape {
                        TermShape::BoundVariable { name: n, index: k }
                            if n == name && k == index => {}
                        _ => return None,
                    }
                }
                Some(TermShape::BoundVariable { name, index })
            }
            TermShape::Application { decl, args } => {
                let FunctionDeclaration {
                    name,
                    kind,
                    arg_sorts,
                    result_sort,
                    decl,
                } = decl;
                let mut decls = vec![decl];
                let mut columns = args.into_iter().map(|a| vec![a]).collect_vec();
                for shape in shapes {
                    let TermShape::Application {
                        decl: other,
                        args: other_args,
                    } = shape
                    else {
                        return None;
                    };
                    if other.name != name
                        || other.kind != kind
                        || other_args.len() != columns.len()
                    {
                        return None;
                    }
                    decls.push(other.decl);
                    for (col, arg) in columns.iter_mut().zip(other_args) {
                        col.push(arg);
                    }
                }
                Some(TermShape::Application {
                    decl: FunctionDeclaration {
                        name,
                        kind,
                        arg_sorts,
                        result_sort,
                        decl: PortfolioDecl(decls),
                    },
                    args: columns.into_iter().map(PortfolioTerm).collect(),
                })
            }
            TermShape::Quantifier {
                quantifier,
                bound,
                body,
            } => {
                let mut bodies = vec![body];
                let mut columns = bound.into_iter().map(|b| vec![b]).collect_vec();
                for shape in shapes {
                    let TermShape::Quantifier {
                        quantifier: q,
                        bound: other_bound,
                        body: other_body,
                    } = shape
                    else {
                        return None;
                    };
                    if q != quantifier || other_bound.len() != columns.len() {
                        return None;
                    }
                    bodies.push(other_body);
                    for (col, b) in columns.iter_mut().zip(other_bound) {
                        col.push(b);
                    }
                }
                Some(TermShape::Quantifier {
                    quantifier,
                    bound: columns.into_iter().map(PortfolioTerm).collect(),
                    body: PortfolioTerm(bodies),
                })
            }
        }
    }

    /// The shape of delegate 0's term, with the children translated into the
    /// other delegates. Where another delegate applies a different function
    /// of the same arity, it keeps its own.
    fn first_shape(
        &self,
        term: &PortfolioTerm<C::Term>,
    ) -> TermShape<PortfolioTerm<C::Term>, PortfolioDecl<C::Decl>> {
        let lift = |t: C::Term| {
            self.lift_term(0, t.clone()).unwrap_or_else(|err| {
                log::error!("cannot translate {t:?} out of delegate 0: {err}");
                PortfolioTerm(vec![t; self.delegates.len()])
            })
        };
        match self.delegates[0].decompose(&term.0[0]) {
            TermShape::Constant(value) => TermShape::Constant(value),
            TermShape::FreeVariable(name) => TermShape::FreeVariable(name),
            TermShape::BoundVariable { name, index } => TermShape::BoundVariable { name, index },
            TermShape::Application { decl, args } => {
                let decls = self
                    .delegates
                    .iter()
                    .zip(&term.0)
                    .enumerate()
                    .map(|(j, (d, t))| match d.decompose(t) {
                        TermShape::Application {
                            decl: other,
                            args: other_args,
                        } if j > 0 && other_args.len() == args.len() => other.decl,
                        _ => decl.decl.clone(),
                    })
                    .collect();
                TermShape::Application {
                    decl: FunctionDeclaration {
                        name: decl.name,
                        kind: decl.kind,
                        arg_sorts: decl.arg_sorts,
                        result_sort: decl.result_sort,
                        decl: PortfolioDecl(decls),
                    },
                    args: args.into_iter().map(lift).collect(),
                }
            }
            TermShape::Quantifier {
                quantifier,
                bound,
                body,
            } => TermShape::Quantifier {
                quantifier,
                bound: bound.into_iter().map(lift).collect(),
                body: lift(body),
            },
        }
    }
}

impl<C: BooleanTheory> BooleanTheory for PortfolioContext<C> {
    fn make_boolean_op(
        &self,
        kind: &FunctionKind,
        args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError> {
        self.each(|i, d| d.make_boolean_op(kind, &column(args, i)))
    }
}

impl<C: NumeralTheory> NumeralTheory for PortfolioContext<C> {
    fn make_numeral_op(
        &self,
        kind: &FunctionKind,
        args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError> {
        self.each(|i, d| d.make_numeral_op(kind, &column(args, i)))
    }
}

impl<C: BitvectorTheory> BitvectorTheory for PortfolioContext<C> {
    fn make_bitvector_op(
        &self,
        kind: &FunctionKind,
        args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError> {
        self.each(|i, d| d.make_bitvector_op(kind, &column(args, i)))
    }
}

impl<C: FloatingPointTheory> FloatingPointTheory for PortfolioContext<C> {
    fn make_floating_point_op(
        &self,
        kind: &FunctionKind,
        args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError> {
        self.each(|i, d| d.make_floating_point_op(kind, &column(args, i)))
    }
}

impl<C: ArrayTheory> ArrayTheory for PortfolioContext<C> {
    fn make_array_op(
        &self,
        kind: &FunctionKind,
        args: &[Self::Term],
    ) -> Result<Self::Term, FormulaError> {
        self.each(|i, d| d.make_array_op(kind, &column(args, i)))
    }
}

impl<C: QuantifierTheory> QuantifierTheory for PortfolioContext<C> {
    fn mk_quantifier(
        &self,
        quantifier: Quantifier,
        bound: &[Self::Term],
        body: &Self::Term,
    ) -> Result<Self::Term, FormulaError> {
        self.each(|i, d| d.mk_quantifier(quantifier, &column(bound, i), &body.0[i]))
    }

    fn eliminate_quantifiers(&self, f: &Self::Term) -> Result<Self::Term, FormulaError> {
        self.first_success("quantifier elimination", |i, d| {
            d.eliminate_quantifiers(&f.0[i])
        })
    }
}

impl<C: TacticTheory> TacticTheory for PortfolioContext<C> {
    fn apply_tactic(&self, tactic: Tactic, f: &Self::Term) -> Result<Self::Term, FormulaError> {
        self.first_success(&tactic.to_string(), |i, d| d.apply_tactic(tactic, &f.0[i]))
    }

    fn simplify(&self, f: &Self::Term) -> Result<Self::Term, FormulaError> {
        self.first_success("simplify", |i, d| d.simplify(&f.0[i]))
    }
}

impl<C: SmtLibText> SmtLibText for PortfolioContext<C> {
    fn parse_smtlib(&self, text: &str) -> Result<Self::Term, FormulaError> {
        let term = self.delegates[0].parse_smtlib(text)?;
        self.lift_term(0, term)
    }

    fn dump_smtlib(&self, term: &Self::Term) -> String {
        self.delegates[0].dump_smtlib(&term.0[0])
    }
}

impl<C> SolverContext for PortfolioContext<C>
where
    C: SolverContext + SolverTheories + 'static,
    C::Prover: 'static,
{
    type Prover = PortfolioProver<C, C::Prover>;

    fn new_prover(self: &Arc<Self>, options: ProverOptions) -> Result<Self::Prover, FormulaError> {
        let delegates = self
            .delegates
            .iter()
            .map(|d| d.new_prover(options))
            .collect::<Result<Vec<_>, _>>()?;
        PortfolioProver::new(self.clone(), delegates)
    }
}
