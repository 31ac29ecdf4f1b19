// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Iterative traversal of formula DAGs.
//!
//! Every traversal here uses an explicit work stack and a cache keyed by
//! formula, so deep formulas never exhaust the call stack and shared subterms
//! are processed once no matter how many parents reference them.

use fxhash::{FxHashMap, FxHashSet};

use crate::{
    creator::{FormulaCreator, FormulaShape},
    error::FormulaError,
    formula::{Formula, FunctionDeclaration, Quantifier},
    sorts::Sort,
    value::Value,
};

/// What a recursive visit should do after visiting a node.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TraversalProcess {
    /// Descend into the node's children
    Continue,
    /// Do not descend into this node's children
    Skip,
    /// Stop the whole traversal
    Abort,
}

/// Single-level dispatch on the shape of a formula.
///
/// Every callback defaults to [`visit_default`](Self::visit_default).
pub trait FormulaVisitor<T, D> {
    /// The result of a visit.
    type Output;

    /// Called for every shape without a more specific override.
    fn visit_default(&mut self, f: &Formula<T>) -> Self::Output;

    /// Called on a free variable.
    fn visit_free_variable(&mut self, f: &Formula<T>, _name: &str) -> Self::Output {
        self.visit_default(f)
    }

    /// Called on a bound-variable leaf.
    fn visit_bound_variable(&mut self, f: &Formula<T>, _name: &str, _index: usize) -> Self::Output {
        self.visit_default(f)
    }

    /// Called on a constant.
    fn visit_constant(&mut self, f: &Formula<T>, _value: &Value) -> Self::Output {
        self.visit_default(f)
    }

    /// Called on an application.
    fn visit_function(
        &mut self,
        f: &Formula<T>,
        _args: &[Formula<T>],
        _decl: &FunctionDeclaration<D>,
    ) -> Self::Output {
        self.visit_default(f)
    }

    /// Called on a quantifier.
    fn visit_quantifier(
        &mut self,
        f: &Formula<T>,
        _quantifier: Quantifier,
        _bound: &[Formula<T>],
        _body: &Formula<T>,
    ) -> Self::Output {
        self.visit_default(f)
    }
}

fn dispatch<T, D, V>(f: &Formula<T>, shape: &FormulaShape<T, D>, visitor: &mut V) -> V::Output
where
    V: FormulaVisitor<T, D> + ?Sized,
{
    match shape {
        FormulaShape::Constant(value) => visitor.visit_constant(f, value),
        FormulaShape::FreeVariable(name) => visitor.visit_free_variable(f, name),
        FormulaShape::BoundVariable { name, index } => {
            visitor.visit_bound_variable(f, name, *index)
        }
        FormulaShape::Application { decl, args } => visitor.visit_function(f, args, decl),
        FormulaShape::Quantifier {
            quantifier,
            bound,
            body,
        } => visitor.visit_quantifier(f, *quantifier, bound, body),
    }
}

/// The children a traversal descends into. Binders are not children.
fn children<T: Clone, D>(shape: &FormulaShape<T, D>) -> Vec<Formula<T>> {
    match shape {
        FormulaShape::Application { args, .. } => args.clone(),
        FormulaShape::Quantifier { body, .. } => vec![body.clone()],
        _ => vec![],
    }
}

/// Visit the top-level node of `f`.
pub fn visit<C, V>(creator: &C, f: &Formula<C::Term>, visitor: &mut V) -> V::Output
where
    C: FormulaCreator + ?Sized,
    V: FormulaVisitor<C::Term, C::Decl> + ?Sized,
{
    let shape = creator.shape(f);
    dispatch(f, &shape, visitor)
}

/// Visit every distinct node of `f` accepted by `should_process`, parents
/// before children.
pub fn visit_recursively<C, V, P>(
    creator: &C,
    f: &Formula<C::Term>,
    visitor: &mut V,
    mut should_process: P,
) where
    C: FormulaCreator + ?Sized,
    V: FormulaVisitor<C::Term, C::Decl, Output = TraversalProcess> + ?Sized,
    P: FnMut(&Formula<C::Term>) -> bool,
{
    let mut seen: FxHashSet<Formula<C::Term>> = FxHashSet::default();
    let mut stack = vec![f.clone()];
    seen.insert(f.clone());
    while let Some(next) = stack.pop() {
        if !should_process(&next) {
            continue;
        }
        let shape = creator.shape(&next);
        match dispatch(&next, &shape, visitor) {
            TraversalProcess::Continue => {
                for child in children(&shape) {
                    if seen.insert(child.clone()) {
                        stack.push(child);
                    }
                }
            }
            TraversalProcess::Skip => {}
            TraversalProcess::Abort => return,
        }
    }
}

/// Rebuilds formulas bottom-up. Each callback receives the node being
/// transformed and its already-transformed children.
///
/// The defaults return leaves unchanged and rebuild an application or
/// quantifier only if one of its children changed.
pub trait FormulaTransformer<C: FormulaCreator + ?Sized> {
    /// Transform a free variable.
    fn free_variable(
        &mut self,
        _creator: &C,
        f: &Formula<C::Term>,
        _name: &str,
    ) -> Result<Formula<C::Term>, FormulaError> {
        Ok(f.clone())
    }

    /// Transform a bound-variable leaf.
    fn bound_variable(
        &mut self,
        _creator: &C,
        f: &Formula<C::Term>,
        _name: &str,
        _index: usize,
    ) -> Result<Formula<C::Term>, FormulaError> {
        Ok(f.clone())
    }

    /// Transform a constant.
    fn constant(
        &mut self,
        _creator: &C,
        f: &Formula<C::Term>,
        _value: &Value,
    ) -> Result<Formula<C::Term>, FormulaError> {
        Ok(f.clone())
    }

    /// `args` are the original arguments and `new_args` their transformed
    /// versions.
    fn function(
        &mut self,
        creator: &C,
        f: &Formula<C::Term>,
        decl: &FunctionDeclaration<C::Decl>,
        args: &[Formula<C::Term>],
        new_args: &[Formula<C::Term>],
    ) -> Result<Formula<C::Term>, FormulaError> {
        if args == new_args {
            return Ok(f.clone());
        }
        creator.make_application(decl, new_args)
    }

    /// Rebuild a quantifier around its transformed body.
    fn quantifier(
        &mut self,
        creator: &C,
        f: &Formula<C::Term>,
        quantifier: Quantifier,
        bound: &[Formula<C::Term>],
        body: &Formula<C::Term>,
        new_body: &Formula<C::Term>,
    ) -> Result<Formula<C::Term>, FormulaError> {
        if body == new_body {
            return Ok(f.clone());
        }
        let bound = bound.iter().map(|b| b.term().clone()).collect::<Vec<_>>();
        let term = creator.rebuild_quantifier(quantifier, &bound, new_body.term())?;
        Ok(creator.encapsulate(f.sort().clone(), term))
    }
}

/// Transform `f` bottom-up, each distinct node once. Nodes rejected by
/// `should_process` (and hence their subterms) are kept unchanged.
pub fn transform_recursively<C, X, P>(
    creator: &C,
    f: &Formula<C::Term>,
    transformer: &mut X,
    mut should_process: P,
) -> Result<Formula<C::Term>, FormulaError>
where
    C: FormulaCreator + ?Sized,
    X: FormulaTransformer<C> + ?Sized,
    P: FnMut(&Formula<C::Term>) -> bool,
{
    let mut cache: FxHashMap<Formula<C::Term>, Formula<C::Term>> = FxHashMap::default();
    let mut stack = vec![f.clone()];
    while let Some(top) = stack.last().cloned() {
        if cache.contains_key(&top) {
            stack.pop();
            continue;
        }
        if !should_process(&top) {
            stack.pop();
            cache.insert(top.clone(), top);
            continue;
        }
        let result = match creator.shape(&top) {
            FormulaShape::Constant(value) => transformer.constant(creator, &top, &value)?,
            FormulaShape::FreeVariable(name) => transformer.free_variable(creator, &top, &name)?,
            FormulaShape::BoundVariable { name, index } => {
                transformer.bound_variable(creator, &top, &name, index)?
            }
            FormulaShape::Application { decl, args } => {
                let missing = pending(&cache, &args);
                if !missing.is_empty() {
                    stack.extend(missing);
                    continue;
                }
                let new_args = args.iter().map(|a| cache[a].clone()).collect::<Vec<_>>();
                transformer.function(creator, &top, &decl, &args, &new_args)?
            }
            FormulaShape::Quantifier {
                quantifier,
                bound,
                body,
            } => {
                if !cache.contains_key(&body) {
                    stack.push(body);
                    continue;
                }
                let new_body = cache[&body].clone();
                transformer.quantifier(creator, &top, quantifier, &bound, &body, &new_body)?
            }
        };
        stack.pop();
        cache.insert(top, result);
    }
    Ok(cache[f].clone())
}

fn pending<T: Clone + Eq + std::hash::Hash>(
    cache: &FxHashMap<Formula<T>, Formula<T>>,
    args: &[Formula<T>],
) -> Vec<Formula<T>> {
    args.iter()
        .filter(|a| !cache.contains_key(*a))
        .cloned()
        .collect()
}

/// Copy a formula from one context into another context of the same backend
/// type. Uninterpreted functions are redeclared and variables recreated
/// through the target's symbol cache.
pub fn translate<C>(
    from: &C,
    to: &C,
    f: &Formula<C::Term>,
) -> Result<Formula<C::Term>, FormulaError>
where
    C: FormulaCreator + ?Sized,
{
    let mut cache: FxHashMap<Formula<C::Term>, Formula<C::Term>> = FxHashMap::default();
    let mut stack = vec![f.clone()];
    while let Some(top) = stack.last().cloned() {
        if cache.contains_key(&top) {
            stack.pop();
            continue;
        }
        let sort = top.sort();
        let result = match from.shape(&top) {
            FormulaShape::Constant(value) => {
                to.encapsulate(sort.clone(), to.make_constant(&value, sort)?)
            }
            FormulaShape::FreeVariable(name) => to.variable(sort, &name)?,
            FormulaShape::BoundVariable { name, index } => {
                to.encapsulate(sort.clone(), to.make_bound_variable(sort, &name, index)?)
            }
            FormulaShape::Application { decl, args } => {
                let missing = pending(&cache, &args);
                if !missing.is_empty() {
                    stack.extend(missing);
                    continue;
                }
                let new_args = args.iter().map(|a| cache[a].clone()).collect::<Vec<_>>();
                let decl = if decl.is_uf() {
                    to.declare_uf(&decl.name, &decl.arg_sorts, &decl.result_sort)?
                } else {
                    decl
                };
                to.make_application(&decl, &new_args)?
            }
            FormulaShape::Quantifier {
                quantifier,
                bound,
                body,
            } => {
                if !cache.contains_key(&body) {
                    stack.push(body);
                    continue;
                }
                let new_body = &cache[&body];
                let mut new_bound = vec![];
                for b in &bound {
                    let name = match from.shape(b) {
                        FormulaShape::FreeVariable(name) => name,
                        _ => {
                            return Err(FormulaError::InvalidArgument(format!(
                                "quantifier binds a non-variable {b:?}"
                            )))
                        }
                    };
                    new_bound.push(to.make_variable(b.sort(), &name)?);
                }
                let term = to.rebuild_quantifier(quantifier, &new_bound, new_body.term())?;
                to.encapsulate(Sort::Boolean, term)
            }
        };
        stack.pop();
        cache.insert(top, result);
    }
    Ok(cache[f].clone())
}
