// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Variable extraction and substitution.

use std::collections::{BTreeMap, HashMap};

use crate::{
    creator::{FormulaCreator, TermShape},
    error::FormulaError,
    formula::{Formula, FunctionDeclaration},
    value::Value,
    visitor::{
        transform_recursively, visit_recursively, FormulaTransformer, FormulaVisitor,
        TraversalProcess,
    },
};

struct Collector<T> {
    extract_ufs: bool,
    found: BTreeMap<String, Formula<T>>,
}

impl<T: Clone, D> FormulaVisitor<T, D> for Collector<T> {
    type Output = TraversalProcess;

    fn visit_default(&mut self, _f: &Formula<T>) -> TraversalProcess {
        TraversalProcess::Continue
    }

    fn visit_free_variable(&mut self, f: &Formula<T>, name: &str) -> TraversalProcess {
        self.found.entry(name.to_string()).or_insert_with(|| f.clone());
        TraversalProcess::Continue
    }

    fn visit_function(
        &mut self,
        f: &Formula<T>,
        _args: &[Formula<T>],
        decl: &FunctionDeclaration<D>,
    ) -> TraversalProcess {
        if self.extract_ufs && decl.is_uf() {
            self.found.entry(decl.name.clone()).or_insert_with(|| f.clone());
        }
        TraversalProcess::Continue
    }
}

fn extract<C>(
    creator: &C,
    f: &Formula<C::Term>,
    extract_ufs: bool,
) -> BTreeMap<String, Formula<C::Term>>
where
    C: FormulaCreator + ?Sized,
{
    let mut collector = Collector {
        extract_ufs,
        found: BTreeMap::new(),
    };
    visit_recursively(creator, f, &mut collector, |_| true);
    collector.found
}

/// The free variables of `f`, by name. Bound variables are not included.
pub fn extract_variables<C>(creator: &C, f: &Formula<C::Term>) -> BTreeMap<String, Formula<C::Term>>
where
    C: FormulaCreator + ?Sized,
{
    extract(creator, f, false)
}

/// The free variables of `f` and its applications of uninterpreted
/// functions. Functions are keyed by name and map to one of their
/// applications.
pub fn extract_variables_and_ufs<C>(
    creator: &C,
    f: &Formula<C::Term>,
) -> BTreeMap<String, Formula<C::Term>>
where
    C: FormulaCreator + ?Sized,
{
    extract(creator, f, true)
}

struct Substitution<'a, T> {
    mapping: &'a HashMap<Formula<T>, Formula<T>>,
}

impl<'a, T: Clone + Eq + std::hash::Hash> Substitution<'a, T> {
    fn replace(&self, f: &Formula<T>) -> Formula<T> {
        self.mapping.get(f).cloned().unwrap_or_else(|| f.clone())
    }
}

impl<C: FormulaCreator + ?Sized> FormulaTransformer<C> for Substitution<'_, C::Term> {
    fn free_variable(
        &mut self,
        _creator: &C,
        f: &Formula<C::Term>,
        _name: &str,
    ) -> Result<Formula<C::Term>, FormulaError> {
        Ok(self.replace(f))
    }

    fn bound_variable(
        &mut self,
        _creator: &C,
        f: &Formula<C::Term>,
        _name: &str,
        _index: usize,
    ) -> Result<Formula<C::Term>, FormulaError> {
        Ok(self.replace(f))
    }

    fn constant(
        &mut self,
        _creator: &C,
        f: &Formula<C::Term>,
        _value: &Value,
    ) -> Result<Formula<C::Term>, FormulaError> {
        Ok(self.replace(f))
    }

    fn function(
        &mut self,
        creator: &C,
        f: &Formula<C::Term>,
        decl: &FunctionDeclaration<C::Decl>,
        args: &[Formula<C::Term>],
        new_args: &[Formula<C::Term>],
    ) -> Result<Formula<C::Term>, FormulaError> {
        if let Some(replacement) = self.mapping.get(f) {
            return Ok(replacement.clone());
        }
        if args == new_args {
            return Ok(f.clone());
        }
        creator.make_application(decl, new_args)
    }

    fn quantifier(
        &mut self,
        creator: &C,
        f: &Formula<C::Term>,
        quantifier: crate::Quantifier,
        bound: &[Formula<C::Term>],
        body: &Formula<C::Term>,
        new_body: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        if let Some(replacement) = self.mapping.get(f) {
            return Ok(replacement.clone());
        }
        if body == new_body {
            return Ok(f.clone());
        }
        // a binder named like a free variable of the new body would capture it
        let free = extract_variables(creator, new_body);
        let mut new_body = new_body.clone();
        let mut new_bound = Vec::with_capacity(bound.len());
        for (index, binder) in bound.iter().enumerate() {
            let name = match creator.decompose(binder.term()) {
                TermShape::FreeVariable(name) if free.contains_key(&name) => name,
                _ => {
                    new_bound.push(binder.term().clone());
                    continue;
                }
            };
            let fresh = fresh_name(creator, &name, &free);
            let renamed = creator.variable(binder.sort(), &fresh)?;
            let mut rename = RenameBound {
                from: &name,
                to: &fresh,
                index,
            };
            new_body = transform_recursively(creator, &new_body, &mut rename, |g| {
                !binds(creator, g, &name)
            })?;
            new_bound.push(renamed.term().clone());
        }
        let term = creator.rebuild_quantifier(quantifier, &new_bound, new_body.term())?;
        Ok(creator.encapsulate(f.sort().clone(), term))
    }
}

/// `name!k` for the smallest `k` that is neither a known variable nor free in
/// the body being rebuilt.
fn fresh_name<C, T>(creator: &C, name: &str, free: &BTreeMap<String, Formula<T>>) -> String
where
    C: FormulaCreator + ?Sized,
{
    let mut k = 1;
    loop {
        let candidate = format!("{name}!{k}");
        if !free.contains_key(&candidate) && creator.symbols().variable(&candidate).is_none() {
            return candidate;
        }
        k += 1;
    }
}

/// Whether `f` is a quantifier with a binder called `name`.
fn binds<C>(creator: &C, f: &Formula<C::Term>, name: &str) -> bool
where
    C: FormulaCreator + ?Sized,
{
    match creator.decompose(f.term()) {
        TermShape::Quantifier { bound, .. } => bound.iter().any(|b| {
            matches!(creator.decompose(b), TermShape::FreeVariable(n) if n == name)
        }),
        _ => false,
    }
}

/// Points the bound leaves of one binder at its new name.
struct RenameBound<'a> {
    from: &'a str,
    to: &'a str,
    index: usize,
}

impl<C: FormulaCreator + ?Sized> FormulaTransformer<C> for RenameBound<'_> {
    fn bound_variable(
        &mut self,
        creator: &C,
        f: &Formula<C::Term>,
        name: &str,
        index: usize,
    ) -> Result<Formula<C::Term>, FormulaError> {
        if name != self.from || index != self.index {
            return Ok(f.clone());
        }
        let term = creator.make_bound_variable(f.sort(), self.to, index)?;
        Ok(creator.encapsulate(f.sort().clone(), term))
    }
}

/// Replace every occurrence of each key of `mapping` by its value. Keys and
/// values must have the same sort.
pub fn substitute<C>(
    creator: &C,
    f: &Formula<C::Term>,
    mapping: &HashMap<Formula<C::Term>, Formula<C::Term>>,
) -> Result<Formula<C::Term>, FormulaError>
where
    C: FormulaCreator + ?Sized,
{
    for (from, to) in mapping {
        FormulaError::expect_sort(from.sort(), to.sort())?;
    }
    if mapping.is_empty() {
        return Ok(f.clone());
    }
    transform_recursively(creator, f, &mut Substitution { mapping }, |_| true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;
    use crate::{FormulaManager, Sort};
    use std::sync::Arc;

    #[test]
    fn test_extract_with_ufs() {
        let ctx = Arc::new(TestContext::new());
        let fmgr = FormulaManager::new(ctx.clone(), Default::default());
        let x = fmgr.integer().make_variable("x").unwrap();
        let y = fmgr.integer().make_variable("y").unwrap();
        let ux = fmgr.uf().declare_and_call_uf("uf", &Sort::Integer, &[x]).unwrap();
        let uy = fmgr.uf().declare_and_call_uf("uf", &Sort::Integer, &[y]).unwrap();
        let f = fmgr.integer().equal(&ux, &uy).unwrap();

        let all = extract_variables_and_ufs(ctx.as_ref(), &f);
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["uf", "x", "y"]);
        let vars = extract_variables(ctx.as_ref(), &f);
        assert_eq!(vars.keys().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn test_extract_scenario() {
        let ctx = Arc::new(TestContext::new());
        let fmgr = FormulaManager::new(ctx.clone(), Default::default());
        let imgr = fmgr.integer();
        let [x, y, z, xx, zz] = ["x", "y", "z", "xx", "zz"].map(|n| imgr.make_variable(n).unwrap());
        let ten = imgr.make_number(10).unwrap();
        let lhs = imgr.subtract(&imgr.add(&x, &z).unwrap(), &ten).unwrap();
        let a = imgr.equal(&lhs, &y).unwrap();
        let b = imgr.equal(&xx, &zz).unwrap();
        let f = fmgr.boolean().and(&a, &b).unwrap();

        let vars = extract_variables(ctx.as_ref(), &f);
        assert_eq!(
            vars.keys().collect::<Vec<_>>(),
            vec!["x", "xx", "y", "z", "zz"]
        );
        assert_eq!(vars["x"], x);
        assert_eq!(extract_variables_and_ufs(ctx.as_ref(), &f), vars);
    }

    #[test]
    fn test_substitute() {
        let ctx = Arc::new(TestContext::new());
        let fmgr = FormulaManager::new(ctx.clone(), Default::default());
        let imgr = fmgr.integer();
        let x = imgr.make_variable("x").unwrap();
        let y = imgr.make_variable("y").unwrap();
        let one = imgr.make_number(1).unwrap();
        let x1 = imgr.add(&x, &one).unwrap();
        let f = imgr.less_than(&x1, &imgr.add(&x1, &x).unwrap()).unwrap();

        let mapping = HashMap::from([(x1.clone(), y.clone())]);
        let g = substitute(ctx.as_ref(), &f, &mapping).unwrap();
        let expected = imgr.less_than(&y, &imgr.add(&y, &x).unwrap()).unwrap();
        assert_eq!(g, expected);
        assert_eq!(substitute(ctx.as_ref(), &g, &mapping).unwrap(), g);

        let b = fmgr.boolean().make_variable("b").unwrap();
        let bad = HashMap::from([(x, b)]);
        assert!(matches!(
            substitute(ctx.as_ref(), &f, &bad),
            Err(FormulaError::SortMismatch { .. })
        ));
    }

    #[test]
    fn test_substitute_under_binder_renames_it() {
        let ctx = Arc::new(TestContext::new());
        let fmgr = FormulaManager::new(ctx.clone(), Default::default());
        let imgr = fmgr.integer();
        let qmgr = fmgr.quantifier();
        let x = imgr.make_variable("x").unwrap();
        let y = imgr.make_variable("y").unwrap();
        let z = imgr.make_variable("z").unwrap();
        let q = qmgr.forall(&[y.clone()], &imgr.less_than(&x, &y).unwrap()).unwrap();

        // y is free in the replacement, so the binder must not stay y
        let g = fmgr.substitute(&q, &HashMap::from([(x.clone(), y.clone())])).unwrap();
        let y1 = imgr.make_variable("y!1").unwrap();
        let expected = qmgr.forall(&[y1.clone()], &imgr.less_than(&y, &y1).unwrap()).unwrap();
        assert_eq!(g, expected);
        assert_eq!(
            extract_variables(ctx.as_ref(), &g).keys().collect::<Vec<_>>(),
            vec!["y"]
        );

        // no clash, no renaming
        let h = fmgr.substitute(&q, &HashMap::from([(x, z.clone())])).unwrap();
        let expected = qmgr.forall(&[y.clone()], &imgr.less_than(&z, &y).unwrap()).unwrap();
        assert_eq!(h, expected);
    }
}
