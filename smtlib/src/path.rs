// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Locating solver binaries.

use std::{env, path::Path};

/// The environment variable overriding the location of `bin`, for example
/// `YICES_SMT2_BIN` for `yices-smt2`.
fn override_var(bin: &str) -> String {
    format!("{}_BIN", bin.to_uppercase().replace('-', "_"))
}

/// The path to launch the solver binary `bin` with.
///
/// An override from the environment wins, then a binary in the `solvers/`
/// directory at the root of the workspace. Otherwise `bin` is returned as is
/// and looked up in `$PATH`.
pub fn solver_path(bin: &str) -> String {
    if let Some(path) = env::var_os(override_var(bin)) {
        return path.to_string_lossy().into_owned();
    }
    let exe = format!("{bin}{}", env::consts::EXE_SUFFIX);
    let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).parent();
    match workspace.map(|root| root.join("solvers").join(&exe)) {
        Some(local) if local.exists() => local.to_string_lossy().into_owned(),
        _ => exe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(override_var("z3"), "Z3_BIN");
        assert_eq!(override_var("yices-smt2"), "YICES_SMT2_BIN");
        let missing = format!("no-such-solver{}", env::consts::EXE_SUFFIX);
        assert_eq!(solver_path("no-such-solver"), missing);
    }
}
