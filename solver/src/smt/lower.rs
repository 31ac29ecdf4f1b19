// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Printing terms as SMT-LIB s-expressions.
//!
//! Terms are DAGs, so printing them as trees can be exponential. Every shared
//! closed subterm is printed once and bound with `let`. Bindings are grouped
//! by nesting level: a binding only refers to bindings of lower levels, which
//! are introduced by enclosing `let`s.

use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use formula::{FloatValue, FunctionKind, Sort, Value};
use smtlib::sexp::{self, app, atom_i, atom_s, sexp_l, Atom, Sexp};

use super::term::{SmtOp, SmtTerm};

/// The SMT-LIB syntax of a sort.
pub(crate) fn sort_sexp(sort: &Sort) -> Sexp {
    match sort {
        Sort::Boolean => atom_s("Bool"),
        Sort::Integer => atom_s("Int"),
        Sort::Rational => atom_s("Real"),
        Sort::Bitvector(w) => app("_", [atom_s("BitVec"), atom_i(*w)]),
        Sort::FloatingPoint { exponent, mantissa } => app(
            "_",
            [atom_s("FloatingPoint"), atom_i(*exponent), atom_i(mantissa + 1)],
        ),
        Sort::Array(index, element) => app("Array", [sort_sexp(index), sort_sexp(element)]),
        Sort::RoundingMode => atom_s("RoundingMode"),
    }
}

fn bits(value: &num_bigint::BigUint, width: u32) -> Sexp {
    atom_s(format!(
        "#b{:0>width$}",
        value.to_str_radix(2),
        width = width as usize
    ))
}

fn negate(s: Sexp) -> Sexp {
    app("-", [s])
}

fn decimal(i: &BigInt) -> Sexp {
    Sexp::Atom(Atom::D(format!("{}.0", i.abs())))
}

fn float_sexp(v: &FloatValue) -> Sexp {
    let sign = if v.negative { "#b1" } else { "#b0" };
    app(
        "fp",
        [
            atom_s(sign),
            bits(&v.exponent, v.exponent_width),
            bits(&v.significand, v.mantissa_width),
        ],
    )
}

/// The SMT-LIB syntax of a constant.
pub(crate) fn value_sexp(value: &Value) -> Sexp {
    match value {
        Value::Bool(b) => atom_s(if *b { "true" } else { "false" }),
        Value::Int(i) => {
            let magnitude = atom_i(i.magnitude().clone());
            if i.is_negative() {
                negate(magnitude)
            } else {
                magnitude
            }
        }
        Value::Rational(r) => {
            let magnitude = if r.denom().is_one() {
                decimal(r.numer())
            } else {
                app("/", [decimal(r.numer()), decimal(r.denom())])
            };
            if r.is_negative() && !r.is_zero() {
                negate(magnitude)
            } else {
                magnitude
            }
        }
        Value::Bitvector { width, value } => bits(value, *width),
        Value::Float(v) => float_sexp(v),
        Value::RoundingMode(rm) => atom_s(rm.smt_name()),
        Value::Other(s) => sexp::parse(s).unwrap_or_else(|_| atom_s(s)),
    }
}

/// The head of an application of a built-in operator.
pub(crate) fn head_sexp(kind: &FunctionKind, arg_sorts: &[Sort]) -> Sexp {
    let name = kind.smt_name(arg_sorts).unwrap_or_default();
    if name.starts_with('(') {
        sexp::parse(&name).unwrap_or_else(|_| atom_s(&name))
    } else {
        atom_s(name)
    }
}

fn children(term: &SmtTerm) -> &[SmtTerm] {
    &term.node().args
}

fn leaf_sexp(term: &SmtTerm) -> Sexp {
    let node = term.node();
    match &node.op {
        SmtOp::Constant(v) => value_sexp(v),
        SmtOp::Variable(name) | SmtOp::Bound(name, _) | SmtOp::Uf(name) => atom_s(name),
        SmtOp::Builtin(kind) => head_sexp(kind, &[]),
        SmtOp::Quantifier(..) => unreachable!("quantifiers have a body"),
    }
}

fn is_leaf(term: &SmtTerm) -> bool {
    children(term).is_empty()
}

fn apply(term: &SmtTerm, args: Vec<Sexp>) -> Sexp {
    let node = term.node();
    match &node.op {
        SmtOp::Builtin(kind) => {
            let arg_sorts = node.args.iter().map(|a| a.sort().clone()).collect_vec();
            let mut ss = vec![head_sexp(kind, &arg_sorts)];
            ss.extend(args);
            Sexp::List(ss)
        }
        SmtOp::Uf(name) => app(name, args),
        SmtOp::Quantifier(quantifier, bound) => {
            let binders = bound
                .iter()
                .map(|b| sexp_l([leaf_sexp(b), sort_sexp(b.sort())]))
                .collect_vec();
            app(&quantifier.to_string(), [sexp_l(binders)].into_iter().chain(args))
        }
        SmtOp::Constant(_) | SmtOp::Variable(_) | SmtOp::Bound(..) => leaf_sexp(term),
    }
}

/// Print a term, binding shared closed subterms with `let`.
pub(crate) fn lower(root: &SmtTerm) -> Sexp {
    if is_leaf(root) {
        return leaf_sexp(root);
    }

    // reference counts, the symbols in use, and a post-order of the inner nodes
    let mut refs: FxHashMap<usize, usize> = FxHashMap::default();
    let mut used: FxHashSet<String> = FxHashSet::default();
    let mut order: Vec<SmtTerm> = vec![];
    let mut seen: FxHashSet<usize> = FxHashSet::default();
    let mut stack: Vec<(SmtTerm, bool)> = vec![(root.clone(), false)];
    while let Some((term, expanded)) = stack.pop() {
        if expanded {
            order.push(term);
            continue;
        }
        if !seen.insert(term.id()) {
            continue;
        }
        match &term.node().op {
            SmtOp::Variable(name) | SmtOp::Bound(name, _) | SmtOp::Uf(name) => {
                used.insert(name.clone());
            }
            SmtOp::Quantifier(_, bound) => {
                used.extend(bound.iter().filter_map(|b| match &b.node().op {
                    SmtOp::Variable(name) => Some(name.clone()),
                    _ => None,
                }));
            }
            _ => {}
        }
        if is_leaf(&term) {
            continue;
        }
        stack.push((term.clone(), true));
        for child in children(&term).iter().rev() {
            if !is_leaf(child) {
                *refs.entry(child.id()).or_default() += 1;
            }
            stack.push((child.clone(), false));
        }
    }

    let many_refs = |t: &SmtTerm| refs.get(&t.id()).copied().unwrap_or(0) > 1;
    let shared = |t: &SmtTerm| many_refs(t) && !t.node().has_bound;

    let mut names: FxHashMap<usize, String> = FxHashMap::default();
    let mut next_name = 0;
    let mut fresh = || loop {
        let name = format!("?x{next_name}");
        next_name += 1;
        if !used.contains(&name) {
            return name;
        }
    };

    let mut printed: FxHashMap<usize, Sexp> = FxHashMap::default();
    let mut depth: FxHashMap<usize, usize> = FxHashMap::default();
    let mut levels: Vec<Vec<Sexp>> = vec![];
    for term in &order {
        let mut args = Vec::with_capacity(children(term).len());
        let mut d = 0;
        for child in children(term) {
            if is_leaf(child) {
                args.push(leaf_sexp(child));
            } else if let Some(name) = names.get(&child.id()) {
                d = d.max(depth[&child.id()] + 1);
                args.push(atom_s(name));
            } else {
                d = d.max(depth[&child.id()]);
                // subterms with bound variables are repeated rather than bound
                let s = if many_refs(child) {
                    printed.get(&child.id()).cloned()
                } else {
                    printed.remove(&child.id())
                };
                args.push(s.expect("children are printed before their parents"));
            }
        }
        let s = apply(term, args);
        depth.insert(term.id(), d);
        if term != root && shared(term) {
            let name = fresh();
            if levels.len() <= d {
                levels.resize(d + 1, vec![]);
            }
            levels[d].push(sexp_l([atom_s(&name), s]));
            names.insert(term.id(), name);
        } else {
            printed.insert(term.id(), s);
        }
    }

    let mut body = printed
        .remove(&root.id())
        .expect("root is printed last");
    for bindings in levels.into_iter().rev() {
        body = app("let", [Sexp::List(bindings), body]);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::SmtContext;
    use formula::theories::BooleanTheory;
    use formula::{FormulaCreator, FormulaManager, FunctionKind};
    use num_rational::BigRational;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn test_values() {
        let values = [
            Value::Int((-5).into()),
            Value::Rational(BigRational::new((-1).into(), 3.into())),
            Value::Rational(BigRational::from_integer(2.into())),
            Value::Bitvector {
                width: 6,
                value: 5u32.into(),
            },
            Value::Float(FloatValue::from_f64(8, 23, -1.5).unwrap()),
        ];
        let printed = values.iter().map(|v| value_sexp(v).to_string()).join("\n");
        insta::assert_snapshot!(printed, @r###"
        (- 5)
        (- (/ 1.0 3.0))
        2.0
        #b000101
        (fp #b1 #b01111111 #b10000000000000000000000)
        "###);
        insta::assert_snapshot!(
            sort_sexp(&Sort::array(Sort::Bitvector(4), Sort::single_precision())),
            @"(Array (_ BitVec 4) (_ FloatingPoint 8 24))"
        );
    }

    #[test]
    fn test_let_sharing() {
        let ctx = SmtContext::for_tests();
        let x = ctx.variable(&Sort::Boolean, "x").unwrap();
        let y = ctx.variable(&Sort::Boolean, "y").unwrap();
        let and = ctx
            .make_boolean_op(&FunctionKind::And, &[x.term().clone(), y.term().clone()])
            .unwrap();
        let or = ctx
            .make_boolean_op(&FunctionKind::Or, &[and.clone(), and.clone()])
            .unwrap();
        let not = ctx.make_boolean_op(&FunctionKind::Not, &[or.clone()]).unwrap();
        let top = ctx
            .make_boolean_op(&FunctionKind::Xor, &[or, not])
            .unwrap();
        insta::assert_snapshot!(lower(&top), @"(let ((?x0 (and x y))) (let ((?x1 (or ?x0 ?x0))) (xor ?x1 (not ?x1))))");
    }

    #[test]
    fn test_shared_dag_prints_linearly() {
        let ctx = SmtContext::for_tests();
        let p = ctx.variable(&Sort::Boolean, "p").unwrap();
        let q = ctx.variable(&Sort::Boolean, "q").unwrap();
        let mut t = ctx
            .make_boolean_op(&FunctionKind::And, &[p.term().clone(), q.term().clone()])
            .unwrap();
        // as a tree this would have 2^1000 leaves
        for _ in 0..1000 {
            t = ctx
                .make_boolean_op(&FunctionKind::Or, &[t.clone(), t])
                .unwrap();
        }
        let printed = lower(&t).to_string();
        assert!(printed.len() < 100_000, "{} characters", printed.len());
        assert!(printed.contains("(?x999 (or ?x998 ?x998))"));
        assert!(printed.ends_with("(or ?x999 ?x999)))"));
    }

    #[test]
    fn test_substituted_binders_print_apart() {
        let ctx = Arc::new(SmtContext::for_tests());
        let fmgr = FormulaManager::new(ctx.clone(), Default::default());
        let imgr = fmgr.integer();
        let x = imgr.make_variable("x").unwrap();
        let y = imgr.make_variable("y").unwrap();
        let q = fmgr
            .quantifier()
            .forall(&[y.clone()], &imgr.less_than(&x, &y).unwrap())
            .unwrap();
        insta::assert_snapshot!(lower(q.term()), @"(forall ((y Int)) (< x y))");

        let g = fmgr.substitute(&q, &HashMap::from([(x, y)])).unwrap();
        insta::assert_snapshot!(lower(g.term()), @"(forall ((y!1 Int)) (< y y!1))");
    }
}
