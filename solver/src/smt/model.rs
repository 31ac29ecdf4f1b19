// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Parsing `get-model` responses.

use fxhash::FxHashMap;

use formula::{
    model::{Model, ValueAssignment},
    Formula, FormulaCreator, FormulaError, FunctionDeclaration, Value,
};
use smtlib::sexp::Sexp;

use super::{SmtContext, SmtDecl, SmtTerm};

fn model_error(what: &str, s: &Sexp) -> FormulaError {
    FormulaError::Solver(format!("unexpected {what} in model: {s}"))
}

/// Read a constant of the model, falling back to its printed form for values
/// that have no constant term (such as arrays).
fn read_value(ctx: &SmtContext, s: &Sexp) -> Result<(Formula<SmtTerm>, Value), FormulaError> {
    let term = ctx.read(s)?;
    let value = match term.constant() {
        Some(v) => v.clone(),
        None => Value::Other(s.to_string()),
    };
    Ok((ctx.encapsulate_with_type_of(term), value))
}

/// The argument values of one branch condition: `(= p c)`, or a conjunction
/// of such equalities over all parameters.
fn point(
    ctx: &SmtContext,
    params: &[String],
    cond: &Sexp,
) -> Result<Vec<(Formula<SmtTerm>, Value)>, FormulaError> {
    let equalities = match cond.app() {
        Some(("and", conjuncts)) => conjuncts.to_vec(),
        _ => vec![cond.clone()],
    };
    let mut found: FxHashMap<String, Sexp> = FxHashMap::default();
    for eq in &equalities {
        let Some(("=", [lhs, rhs])) = eq.app() else {
            return Err(model_error("condition", cond));
        };
        let (param, value) = match (lhs.atom_s(), rhs.atom_s()) {
            (Some(p), _) if params.iter().any(|q| q == p) => (p.to_string(), rhs.clone()),
            (_, Some(p)) if params.iter().any(|q| q == p) => (p.to_string(), lhs.clone()),
            _ => return Err(model_error("condition", cond)),
        };
        found.insert(param, value);
    }
    params
        .iter()
        .map(|p| {
            let s = found
                .get(p)
                .ok_or_else(|| model_error("partial condition", cond))?;
            read_value(ctx, s)
        })
        .collect()
}

fn function_points(
    ctx: &SmtContext,
    decl: &FunctionDeclaration<SmtDecl>,
    params: &[String],
    body: &Sexp,
) -> Result<Vec<ValueAssignment<SmtTerm>>, FormulaError> {
    let mut assignments = vec![];
    let mut body = body;
    while let Some(("ite", [cond, then, otherwise])) = body.app() {
        let args = point(ctx, params, cond)?;
        let (value_formula, value) = read_value(ctx, then)?;
        let arg_formulas = args.iter().map(|(f, _)| f.clone()).collect::<Vec<_>>();
        assignments.push(ValueAssignment {
            key: ctx.make_application(decl, &arg_formulas)?,
            value_formula,
            name: decl.name.clone(),
            value,
            arg_values: args.into_iter().map(|(_, v)| v).collect(),
        });
        body = otherwise;
    }
    Ok(assignments)
}

fn definition(
    ctx: &SmtContext,
    entry: &Sexp,
) -> Result<Vec<ValueAssignment<SmtTerm>>, FormulaError> {
    let Some(("define-fun", [name, Sexp::List(params), _sort, body])) = entry.app() else {
        return Err(model_error("entry", entry));
    };
    let name = name.atom_s().ok_or_else(|| model_error("name", entry))?;
    if params.is_empty() {
        let Some(key) = ctx.symbols().variable(name) else {
            // auxiliary symbols of the solver
            return Ok(vec![]);
        };
        let (value_formula, value) = read_value(ctx, body)?;
        return Ok(vec![ValueAssignment {
            key,
            value_formula,
            name: name.to_string(),
            value,
            arg_values: vec![],
        }]);
    }
    let Some(decl) = ctx.symbols().function(name) else {
        return Ok(vec![]);
    };
    let params = params
        .iter()
        .map(|p| match p.list() {
            Some([param, _]) => param.atom_s().map(|s| s.to_string()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| model_error("parameters", entry))?;
    function_points(ctx, &decl, &params, body)
}

/// Convert a `get-model` response. Entries that cannot be read are skipped.
pub(crate) fn parse_model(ctx: &SmtContext, model: &Sexp) -> Model<SmtTerm> {
    let model = model.without_comments();
    let entries = match &model {
        Sexp::List(ss) => match ss.split_first() {
            Some((head, rest)) if head.atom_s() == Some("model") => rest,
            _ => ss.as_slice(),
        },
        _ => &[],
    };
    let mut assignments = vec![];
    for entry in entries {
        match definition(ctx, entry) {
            Ok(found) => assignments.extend(found),
            Err(err) => log::debug!("skipping model entry {entry}: {err}"),
        }
    }
    Model::new(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use formula::Sort;
    use smtlib::sexp::parse;

    #[test]
    fn test_parse_model() {
        let ctx = SmtContext::for_tests();
        let x = ctx.variable(&Sort::Integer, "x").unwrap();
        ctx.variable(&Sort::Rational, "r").unwrap();
        ctx.variable(&Sort::Bitvector(4), "b").unwrap();
        ctx.declare_uf("f", &[Sort::Integer, Sort::Boolean], &Sort::Integer)
            .unwrap();
        let model = parse(
            "(
              (define-fun x () Int (- 3))
              (define-fun r () Real (/ 1.0 2.0))
              (define-fun b () (_ BitVec 4) #x7)
              (define-fun k!0 () Int 5)
              (define-fun f ((x!0 Int) (x!1 Bool)) Int
                (ite (and (= x!0 1) (= x!1 true)) 10
                  (ite (and (= 2 x!0) (= x!1 false)) 20 0)))
            )",
        )
        .unwrap();
        let model = parse_model(&ctx, &model);
        insta::assert_display_snapshot!(model, @r###"
        x := -3
        r := 1/2
        b := #b0111
        f(1, true) := 10
        f(2, false) := 20
        "###);
        assert_eq!(model.value_of(&x), Some(&Value::Int((-3).into())));
        assert!(model.iter().filter(|a| a.is_function()).count() == 2);
    }

    #[test]
    fn test_unreadable_entries_are_skipped() {
        let ctx = SmtContext::for_tests();
        ctx.variable(&Sort::Boolean, "p").unwrap();
        ctx.variable(&Sort::array(Sort::Integer, Sort::Integer), "a")
            .unwrap();
        let model = parse(
            "(model
              (define-fun p () Bool (weird 1))
              (define-fun a () (Array Int Int) ((as const (Array Int Int)) 0)))",
        )
        .unwrap();
        let model = parse_model(&ctx, &model);
        assert_eq!(model.len(), 1);
        assert!(matches!(model.get("a"), Some(Value::Other(_))));
    }
}
