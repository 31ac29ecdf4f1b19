// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Proof engines behind the [`formula`] API.
//!
//! [`smt::SmtContext`] drives an external SMT-LIB solver process, and
//! [`portfolio::PortfolioContext`] races several backend sessions on the same
//! query. Both create incremental provers through [`prover::SolverContext`].

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod basics;
pub mod conf;
pub mod portfolio;
pub mod prover;
pub mod smt;

pub use smtlib::path::solver_path;
pub use smtlib::proc::{SatResp, SmtPid};
