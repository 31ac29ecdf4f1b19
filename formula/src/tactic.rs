// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Formula-level rewriting tactics.

use fxhash::FxHashMap;
use serde::Serialize;
use std::fmt;

use crate::{
    creator::FormulaCreator,
    error::FormulaError,
    formula::Formula,
    theories::{boolean::BooleanShape, BooleanManager, BooleanTheory},
};

/// A rewriting of a formula into an equivalent (or equisatisfiable) one.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize)]
pub enum Tactic {
    /// Negation normal form: negations only in front of atoms, and no
    /// implications, equivalences, exclusive-ors or Boolean `ite`
    Nnf,
    /// An equisatisfiable conjunctive normal form with auxiliary variables
    TseitinCnf,
    /// Cheap elimination of quantified variables that have a definition
    QeLight,
    /// Replace uninterpreted functions by fresh variables with congruence
    /// constraints
    Ackermannization,
}

impl fmt::Display for Tactic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tactic::Nnf => "nnf",
            Tactic::TseitinCnf => "tseitin-cnf",
            Tactic::QeLight => "qe-light",
            Tactic::Ackermannization => "ackermannization",
        };
        write!(f, "{name}")
    }
}

/// What a node of the polarity walk needs before it can be rebuilt: its
/// children in the given polarities.
fn requirements<T: Clone>(shape: &BooleanShape<T>, positive: bool) -> Vec<(Formula<T>, bool)> {
    match shape {
        BooleanShape::Constant(_) | BooleanShape::Bound(_) | BooleanShape::Atom => vec![],
        BooleanShape::Not(a) => vec![(a.clone(), !positive)],
        BooleanShape::And(args) | BooleanShape::Or(args) => {
            args.iter().map(|a| (a.clone(), positive)).collect()
        }
        BooleanShape::Implies(a, b) => vec![(a.clone(), !positive), (b.clone(), positive)],
        BooleanShape::Iff(a, b) | BooleanShape::Xor(a, b) => vec![
            (a.clone(), true),
            (a.clone(), false),
            (b.clone(), true),
            (b.clone(), false),
        ],
        BooleanShape::Ite(c, t, e) => vec![
            (c.clone(), true),
            (c.clone(), false),
            (t.clone(), positive),
            (e.clone(), positive),
        ],
        BooleanShape::Quantifier(_, _, body) => vec![(body.clone(), positive)],
    }
}

/// Negation normal form, computed bottom-up over (subformula, polarity)
/// pairs so each pair is rewritten once.
pub(crate) fn nnf<C: BooleanTheory>(
    bmgr: &BooleanManager<C>,
    creator: &C,
    f: &Formula<C::Term>,
) -> Result<Formula<C::Term>, FormulaError> {
    FormulaError::expect_sort(&crate::Sort::Boolean, f.sort())?;
    let mut cache: FxHashMap<(Formula<C::Term>, bool), Formula<C::Term>> = FxHashMap::default();
    let mut stack = vec![(f.clone(), true)];
    while let Some(top) = stack.last().cloned() {
        if cache.contains_key(&top) {
            stack.pop();
            continue;
        }
        let (g, positive) = &top;
        let shape = bmgr.boolean_shape(g);
        let missing = requirements(&shape, *positive)
            .into_iter()
            .filter(|req| !cache.contains_key(req))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            stack.extend(missing);
            continue;
        }
        let get = |a: &Formula<C::Term>, polarity: bool| cache[&(a.clone(), polarity)].clone();
        let result = match (&shape, *positive) {
            (BooleanShape::Constant(b), _) => bmgr.make_boolean(*b == *positive)?,
            (BooleanShape::Bound(_) | BooleanShape::Atom, true) => g.clone(),
            (BooleanShape::Bound(_) | BooleanShape::Atom, false) => bmgr.not(g)?,
            (BooleanShape::Not(a), polarity) => get(a, !polarity),
            (BooleanShape::And(args), true) | (BooleanShape::Or(args), false) => {
                bmgr.and_all(args.iter().map(|a| get(a, *positive)))?
            }
            (BooleanShape::Or(args), true) | (BooleanShape::And(args), false) => {
                bmgr.or_all(args.iter().map(|a| get(a, *positive)))?
            }
            (BooleanShape::Implies(a, b), true) => bmgr.or(&get(a, false), &get(b, true))?,
            (BooleanShape::Implies(a, b), false) => bmgr.and(&get(a, true), &get(b, false))?,
            (BooleanShape::Iff(a, b), true) | (BooleanShape::Xor(a, b), false) => bmgr.and(
                &bmgr.or(&get(a, false), &get(b, true))?,
                &bmgr.or(&get(a, true), &get(b, false))?,
            )?,
            (BooleanShape::Iff(a, b), false) | (BooleanShape::Xor(a, b), true) => bmgr.or(
                &bmgr.and(&get(a, true), &get(b, false))?,
                &bmgr.and(&get(a, false), &get(b, true))?,
            )?,
            (BooleanShape::Ite(c, t, e), polarity) => bmgr.and(
                &bmgr.or(&get(c, false), &get(t, polarity))?,
                &bmgr.or(&get(c, true), &get(e, polarity))?,
            )?,
            (BooleanShape::Quantifier(q, bound, body), polarity) => {
                let q = if polarity { *q } else { q.dual() };
                let bound = bound.iter().map(|b| b.term().clone()).collect::<Vec<_>>();
                let term = creator.rebuild_quantifier(q, &bound, get(body, polarity).term())?;
                creator.encapsulate(crate::Sort::Boolean, term)
            }
        };
        stack.pop();
        cache.insert(top, result);
    }
    Ok(cache[&(f.clone(), true)].clone())
}
