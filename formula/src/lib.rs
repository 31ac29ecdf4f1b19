// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A solver-agnostic formula API.
//!
//! Formulas are typed handles ([`Formula`]) around an opaque term owned by some
//! backend. A backend implements [`FormulaCreator`] once (allocation, sort
//! introspection, and decomposition into a [`TermShape`]) plus whichever
//! theory traits in [`theories`] it supports. Everything else in this crate
//! (the theory managers, the iterative visitors and transforms, substitution,
//! variable extraction, and NNF) is written once on top of that contract.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
#![deny(clippy::uninlined_format_args)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod creator;
pub mod error;
pub mod extract;
pub mod formula;
pub mod manager;
pub mod model;
pub mod names;
pub mod sorts;
pub mod tactic;
pub mod theories;
pub mod value;
pub mod visitor;

#[cfg(test)]
mod testing;

pub use creator::{FormulaCreator, FormulaShape, SymbolCache, TermShape};
pub use error::FormulaError;
pub use formula::{Formula, FunctionDeclaration, FunctionKind, Quantifier};
pub use manager::{FormulaConf, FormulaManager, SmtLibText, SolverTheories};
pub use sorts::Sort;
pub use value::{FloatValue, RoundingMode, Value};
