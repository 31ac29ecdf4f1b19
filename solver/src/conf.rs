// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Holds the configuration needed to launch solvers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use smtlib::{
    conf::{Dialect, SolverCmd},
    path::solver_path,
};

/// The type of solver being used
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SolverType {
    Z3,
    Cvc4,
    Cvc5,
    SmtInterpol,
    Yices,
}

impl SolverType {
    /// Every supported solver.
    pub const ALL: [SolverType; 5] = [
        SolverType::Z3,
        SolverType::Cvc4,
        SolverType::Cvc5,
        SolverType::SmtInterpol,
        SolverType::Yices,
    ];

    /// The name of the solver's binary, resolved with [`solver_path`].
    pub fn binary(&self) -> &'static str {
        match self {
            SolverType::Z3 => "z3",
            SolverType::Cvc4 => "cvc4",
            SolverType::Cvc5 => "cvc5",
            SolverType::SmtInterpol => "smtinterpol",
            SolverType::Yices => "yices-smt2",
        }
    }

    fn dialect(&self) -> Dialect {
        match self {
            SolverType::Z3 => Dialect::Z3,
            SolverType::Cvc4 => Dialect::Cvc4,
            SolverType::Cvc5 => Dialect::Cvc5,
            SolverType::SmtInterpol => Dialect::SmtInterpol,
            SolverType::Yices => Dialect::Yices,
        }
    }
}

impl fmt::Display for SolverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverType::Z3 => "z3",
            SolverType::Cvc4 => "cvc4",
            SolverType::Cvc5 => "cvc5",
            SolverType::SmtInterpol => "smtinterpol",
            SolverType::Yices => "yices",
        };
        write!(f, "{name}")
    }
}

impl FromStr for SolverType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SolverType::ALL
            .into_iter()
            .find(|t| t.to_string() == s || t.binary() == s)
            .ok_or_else(|| format!("unknown solver {s}"))
    }
}

/// Wrapper around the configuration needed to launch solvers.
#[derive(Debug, Clone)]
pub struct SolverConf {
    /// The solvers of the active backends, one per portfolio delegate.
    pub solvers: Vec<SolverType>,
    /// Per-query timeout. None disables the timeout.
    pub timeout_ms: Option<usize>,
    /// The solvers' random seed (0 keeps each solver's default)
    pub seed: u64,
    /// The optional directory to tee SMT output to.
    pub tee: Option<PathBuf>,
}

impl Default for SolverConf {
    fn default() -> Self {
        SolverConf {
            solvers: vec![SolverType::Z3],
            timeout_ms: None,
            seed: 0,
            tee: None,
        }
    }
}

impl SolverConf {
    /// A configuration for the given solvers with default options.
    pub fn new(solvers: Vec<SolverType>) -> Self {
        SolverConf {
            solvers,
            ..Default::default()
        }
    }

    /// Set the solver timeout. None disables the timeout.
    pub fn timeout_ms(&mut self, timeout_ms: Option<usize>) -> &mut Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the solvers' random seed.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    /// The command launching a solver of the given type.
    pub fn cmd(&self, solver_type: SolverType) -> SolverCmd {
        let mut cmd = SolverCmd::new(solver_type.dialect(), &solver_path(solver_type.binary()));
        cmd.timeout_ms(self.timeout_ms);
        if self.seed != 0 {
            cmd.random_seed(self.seed);
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_names() {
        for solver in SolverType::ALL {
            assert_eq!(solver.to_string().parse::<SolverType>(), Ok(solver));
        }
        assert_eq!("yices-smt2".parse::<SolverType>(), Ok(SolverType::Yices));
        assert!("vampire".parse::<SolverType>().is_err());
    }

    #[test]
    fn test_cmd_options() {
        let mut conf = SolverConf::new(vec![SolverType::Cvc5]);
        conf.timeout_ms(Some(500)).seed(3);
        let cmd = conf.cmd(SolverType::Cvc5);
        assert!(cmd
            .options
            .contains(&("tlimit-per".to_string(), "500".to_string())));
        assert!(cmd.options.contains(&("seed".to_string(), "3".to_string())));

        let cmd = SolverConf::default().cmd(SolverType::Z3);
        assert!(!cmd.options.iter().any(|(name, _)| name.contains("seed")));
        assert_eq!(cmd.logic, "ALL");
    }
}
