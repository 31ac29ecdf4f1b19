// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The theory capabilities of [`SmtContext`].

use formula::{
    theories::{
        ArrayTheory, BitvectorTheory, BooleanTheory, FloatingPointTheory, NumeralTheory,
        QuantifierTheory, TacticTheory,
    },
    visitor::{transform_recursively, FormulaTransformer},
    tactic::Tactic,
    Formula, FormulaCreator, FormulaError, FunctionKind, Quantifier, Sort, Value,
};
use smtlib::sexp::{app, atom_s, Sexp};

use super::{lower::lower, reader::Reader, SmtContext, SmtTerm};
use crate::conf::SolverType;

impl SmtContext {
    fn unsupported(&self, what: impl std::fmt::Display) -> FormulaError {
        FormulaError::Unsupported(format!("{what} with {}", self.solver()))
    }

    /// Read the formulas of a `(goals ...)` response as one formula.
    fn read_goals(&self, resp: &Sexp, reader: &mut Reader<'_>) -> Result<SmtTerm, FormulaError> {
        let malformed = || FormulaError::Solver(format!("unexpected tactic output {resp}"));
        let Some(("goals", goals)) = resp.app() else {
            return Err(malformed());
        };
        let mut disjuncts = vec![];
        for goal in goals {
            let Some(("goal", items)) = goal.app() else {
                return Err(malformed());
            };
            let mut conjuncts = vec![];
            let mut items = items.iter();
            while let Some(item) = items.next() {
                // goal attributes come in :keyword value pairs
                if item.atom_s().is_some_and(|s| s.starts_with(':')) {
                    items.next();
                    continue;
                }
                conjuncts.push(reader.term(item)?);
            }
            disjuncts.push(match conjuncts.len() {
                0 => self.constant(Value::Bool(true))?,
                1 => conjuncts.remove(0),
                _ => self.builtin(&FunctionKind::And, &conjuncts)?,
            });
        }
        match disjuncts.len() {
            0 => self.constant(Value::Bool(false)),
            1 => Ok(disjuncts.remove(0)),
            _ => self.builtin(&FunctionKind::Or, &disjuncts),
        }
    }

    fn apply_z3_tactic(
        &self,
        name: &str,
        f: &SmtTerm,
        mut reader: Reader<'_>,
    ) -> Result<SmtTerm, FormulaError> {
        let resp = self.one_off(f, true, app("apply", [atom_s(name)]))?;
        self.read_goals(&resp, &mut reader)
    }
}

impl BooleanTheory for SmtContext {
    fn make_boolean_op(
        &self,
        kind: &FunctionKind,
        args: &[SmtTerm],
    ) -> Result<SmtTerm, FormulaError> {
        self.builtin(kind, args)
    }
}

impl NumeralTheory for SmtContext {
    fn make_numeral_op(
        &self,
        kind: &FunctionKind,
        args: &[SmtTerm],
    ) -> Result<SmtTerm, FormulaError> {
        if self.solver() == SolverType::SmtInterpol {
            let nonlinear = match (kind, args) {
                (FunctionKind::Mul, _) => args.iter().filter(|a| !a.is_constant()).count() > 1,
                (FunctionKind::Div | FunctionKind::Modulo, [_, divisor]) => !divisor.is_constant(),
                _ => false,
            };
            if nonlinear {
                return Err(self.unsupported(format_args!("non-linear {kind:?}")));
            }
        }
        self.builtin(kind, args)
    }
}

impl BitvectorTheory for SmtContext {
    fn make_bitvector_op(
        &self,
        kind: &FunctionKind,
        args: &[SmtTerm],
    ) -> Result<SmtTerm, FormulaError> {
        self.builtin(kind, args)
    }
}

impl FloatingPointTheory for SmtContext {
    fn make_floating_point_op(
        &self,
        kind: &FunctionKind,
        args: &[SmtTerm],
    ) -> Result<SmtTerm, FormulaError> {
        if self.solver() == SolverType::Yices {
            return Err(self.unsupported(format_args!("floating point {kind:?}")));
        }
        self.builtin(kind, args)
    }
}

impl ArrayTheory for SmtContext {
    fn make_array_op(
        &self,
        kind: &FunctionKind,
        args: &[SmtTerm],
    ) -> Result<SmtTerm, FormulaError> {
        self.builtin(kind, args)
    }
}

/// Replaces the binders of a quantifier by bound-variable leaves.
struct Abstract<'a> {
    bound: &'a [SmtTerm],
}

impl FormulaTransformer<SmtContext> for Abstract<'_> {
    fn free_variable(
        &mut self,
        creator: &SmtContext,
        f: &Formula<SmtTerm>,
        name: &str,
    ) -> Result<Formula<SmtTerm>, FormulaError> {
        match self.bound.iter().position(|b| b == f.term()) {
            Some(index) => {
                let term = creator.make_bound_variable(f.sort(), name, index)?;
                Ok(creator.encapsulate(f.sort().clone(), term))
            }
            None => Ok(f.clone()),
        }
    }
}

impl QuantifierTheory for SmtContext {
    fn mk_quantifier(
        &self,
        quantifier: Quantifier,
        bound: &[SmtTerm],
        body: &SmtTerm,
    ) -> Result<SmtTerm, FormulaError> {
        let body = self.encapsulate_with_type_of(body.clone());
        let body = transform_recursively(self, &body, &mut Abstract { bound }, |_| true)?;
        self.rebuild_quantifier(quantifier, bound, body.term())
    }

    fn eliminate_quantifiers(&self, f: &SmtTerm) -> Result<SmtTerm, FormulaError> {
        match self.solver() {
            SolverType::Z3 => self.apply_z3_tactic("qe", f, Reader::new(self)),
            SolverType::Cvc5 => {
                let resp = self.one_off(f, false, app("get-qe", [lower(f)]))?;
                self.read(&resp)
            }
            _ => Err(self.unsupported("quantifier elimination")),
        }
    }
}

impl TacticTheory for SmtContext {
    fn apply_tactic(&self, tactic: Tactic, f: &SmtTerm) -> Result<SmtTerm, FormulaError> {
        if self.solver() != SolverType::Z3 {
            return Err(self.unsupported(tactic));
        }
        match tactic {
            // the CNF names its definitions with fresh Boolean symbols
            Tactic::TseitinCnf => self.apply_z3_tactic(
                "tseitin-cnf",
                f,
                Reader::new(self).with_undeclared(Sort::Boolean),
            ),
            Tactic::QeLight => self.apply_z3_tactic("qe-light", f, Reader::new(self)),
            Tactic::Ackermannization => {
                self.apply_z3_tactic("ackermannize_bv", f, Reader::new(self))
            }
            Tactic::Nnf => Err(self.unsupported(tactic)),
        }
    }

    fn simplify(&self, f: &SmtTerm) -> Result<SmtTerm, FormulaError> {
        match self.solver() {
            SolverType::Z3 => {
                let resp = self.one_off(f, false, app("simplify", [lower(f)]))?;
                let simplified = self.read(&resp)?;
                FormulaError::expect_sort(f.sort(), simplified.sort())?;
                Ok(simplified)
            }
            _ => Ok(f.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::SolverConf;
    use formula::{
        theories::NonLinearArithmetic, FormulaConf, FormulaManager, RoundingMode,
    };
    use smtlib::sexp::parse;
    use std::sync::Arc;

    #[test]
    fn test_nonlinear_on_smtinterpol() {
        let ctx = Arc::new(SmtContext::new(
            SolverType::SmtInterpol,
            SolverConf::default(),
        ));
        let fmgr = FormulaManager::new(
            ctx.clone(),
            FormulaConf {
                non_linear_arithmetic: NonLinearArithmetic::ApproximateFallback,
                rounding_mode: RoundingMode::NearestTiesToEven,
            },
        );
        let imgr = fmgr.integer();
        let x = imgr.make_variable("x").unwrap();
        let y = imgr.make_variable("y").unwrap();
        let two = imgr.make_number(2).unwrap();
        assert!(ctx
            .make_numeral_op(&FunctionKind::Mul, &[x.term().clone(), y.term().clone()])
            .unwrap_err()
            .is_unsupported());
        assert!(ctx
            .make_numeral_op(&FunctionKind::Mul, &[two.term().clone(), y.term().clone()])
            .is_ok());

        // the manager falls back to an uninterpreted function
        let product = imgr.multiply(&x, &y).unwrap();
        assert!(product.to_string().contains("x"));
        assert!(!product.to_string().starts_with("(*"));
    }

    #[test]
    fn test_yices_floats() {
        let ctx = SmtContext::new(SolverType::Yices, SolverConf::default());
        let a = ctx.variable(&Sort::single_precision(), "a").unwrap();
        assert!(ctx
            .make_floating_point_op(&FunctionKind::FpNeg, &[a.term().clone()])
            .unwrap_err()
            .is_unsupported());
        let ctx = SmtContext::for_tests();
        let a = ctx.variable(&Sort::single_precision(), "a").unwrap();
        let neg = ctx
            .make_floating_point_op(&FunctionKind::FpNeg, &[a.term().clone()])
            .unwrap();
        insta::assert_snapshot!(neg, @"(fp.neg a)");
    }

    #[test]
    fn test_read_goals() {
        let ctx = SmtContext::for_tests();
        let p = ctx.variable(&Sort::Boolean, "p").unwrap();
        ctx.variable(&Sort::Integer, "x").unwrap();
        let resp = parse(
            "(goals (goal p (>= x 0) :precision precise :depth 1) (goal :precision precise))",
        )
        .unwrap();
        let f = ctx.read_goals(&resp, &mut Reader::new(&ctx)).unwrap();
        insta::assert_snapshot!(f, @"(or (and p (>= x 0)) true)");

        let resp = parse("(goals (goal p :depth 1))").unwrap();
        assert_eq!(
            &ctx.read_goals(&resp, &mut Reader::new(&ctx)).unwrap(),
            p.term()
        );
        assert!(ctx
            .read_goals(&parse("(error \"bad\")").unwrap(), &mut Reader::new(&ctx))
            .is_err());
    }

    #[test]
    fn test_unsupported_elsewhere() {
        let ctx = SmtContext::new(SolverType::Cvc4, SolverConf::default());
        let p = ctx.variable(&Sort::Boolean, "p").unwrap();
        assert!(ctx
            .eliminate_quantifiers(p.term())
            .unwrap_err()
            .is_unsupported());
        assert!(ctx
            .apply_tactic(Tactic::TseitinCnf, p.term())
            .unwrap_err()
            .is_unsupported());
        assert_eq!(&ctx.simplify(p.term()).unwrap(), p.term());
    }

    #[test_log::test]
    fn test_z3_quantifier_elimination() {
        let ctx = Arc::new(SmtContext::for_tests());
        if let Err(err) = ctx.start_process() {
            eprintln!("could not start z3 ({err}), skipping test");
            return;
        }
        let fmgr = FormulaManager::new(ctx, FormulaConf::default());
        let imgr = fmgr.integer();
        let x = imgr.make_variable("x").unwrap();
        let y = imgr.make_variable("y").unwrap();
        let body = fmgr
            .boolean()
            .and(
                &imgr.less_than(&x, &y).unwrap(),
                &imgr.less_than(&y, &imgr.make_number(5).unwrap()).unwrap(),
            )
            .unwrap();
        let f = fmgr.quantifier().exists(&[y], &body).unwrap();
        let qf = fmgr.quantifier().eliminate_quantifiers(&f).unwrap();
        let vars = fmgr.extract_variables(&qf);
        assert_eq!(vars.keys().collect::<Vec<_>>(), vec!["x"]);

        let cnf = fmgr.apply_tactic(&body, Tactic::TseitinCnf).unwrap();
        assert!(cnf.is_boolean());
        let simple = fmgr
            .simplify(&fmgr.boolean().and(&body, &body).unwrap())
            .unwrap();
        assert!(simple.is_boolean());
    }
}
