// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Hash-consed terms of the SMT-LIB backend.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use formula::{FunctionKind, Quantifier, Sort, Value};
use smtlib::sexp::Sexp;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum SmtOp {
    Constant(Value),
    Variable(String),
    Bound(String, usize),
    Builtin(FunctionKind),
    Uf(String),
    /// The binders as free-variable terms; the body is the only argument.
    Quantifier(Quantifier, Vec<SmtTerm>),
}

#[derive(Debug)]
pub(crate) struct SmtNode {
    pub(crate) id: usize,
    pub(crate) sort: Sort,
    pub(crate) op: SmtOp,
    pub(crate) args: Vec<SmtTerm>,
    /// Whether a bound-variable leaf occurs below this node.
    pub(crate) has_bound: bool,
}

// long chains of terms are dropped without recursing
impl Drop for SmtNode {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.args);
        while let Some(term) = stack.pop() {
            if let Ok(mut node) = Arc::try_unwrap(term.0) {
                stack.append(&mut node.args);
            }
        }
    }
}

/// A term owned by an [`SmtContext`](super::SmtContext).
///
/// Terms are interned by their context, so two structurally equal terms of
/// the same context are the same node. Equality and hashing use the node's
/// id.
#[derive(Clone)]
pub struct SmtTerm(pub(crate) Arc<SmtNode>);

impl SmtTerm {
    pub(crate) fn node(&self) -> &SmtNode {
        &self.0
    }

    /// The id of the node within its context.
    pub fn id(&self) -> usize {
        self.0.id
    }

    /// The sort of the term.
    pub fn sort(&self) -> &Sort {
        &self.0.sort
    }

    pub(crate) fn is_constant(&self) -> bool {
        matches!(self.0.op, SmtOp::Constant(_))
    }

    pub(crate) fn constant(&self) -> Option<&Value> {
        match &self.0.op {
            SmtOp::Constant(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for SmtTerm {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for SmtTerm {}

impl Hash for SmtTerm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state)
    }
}

impl fmt::Debug for SmtTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}: {}", self.0.id, super::lower::lower(self))
    }
}

/// Terms print as SMT-LIB s-expressions.
impl fmt::Display for SmtTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", super::lower::lower(self))
    }
}

/// The declaration of a function application: the head of the application
/// as an s-expression (`bvadd`, `(_ extract 7 0)`, or the UF's symbol).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SmtDecl(pub Sexp);

impl fmt::Display for SmtDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
