// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Command lines and startup options of the supported solvers.

use std::fmt;

/// A family of solvers that share a command line and option vocabulary.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Dialect {
    Z3,
    Cvc4,
    Cvc5,
    SmtInterpol,
    Yices,
}

/// The full invocation of a solver binary.
#[derive(Debug, Clone)]
pub struct SolverCmd {
    /// The SMT-LIB dialect the solver speaks
    pub dialect: Dialect,
    /// Binary to launch
    pub cmd: String,
    /// Arguments to pass
    pub args: Vec<String>,
    /// SMT options to send on startup, in order. Each name appears once.
    pub options: Vec<(String, String)>,
    /// Logic to declare with `set-logic` on startup
    pub logic: String,
}

impl SolverCmd {
    /// The default invocation of a solver of the given dialect. `cmd` is the
    /// path to the binary (for SMTInterpol, a launcher script running the
    /// jar).
    pub fn new(dialect: Dialect, cmd: &str) -> Self {
        let args: &[&str] = match dialect {
            Dialect::Z3 => &["-in", "-smt2"],
            // --lang is required when reading from stdin
            Dialect::Cvc4 | Dialect::Cvc5 => &["-q", "--lang", "smt2"],
            Dialect::SmtInterpol => &["-q"],
            Dialect::Yices => &["--incremental"],
        };
        let mut solver = SolverCmd {
            dialect,
            cmd: cmd.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            options: vec![],
            logic: "ALL".to_string(),
        };
        match dialect {
            Dialect::Z3 => {
                solver
                    .option("model.completion", "true")
                    .option("model.compact", "true");
            }
            Dialect::Cvc4 | Dialect::Cvc5 => {
                solver
                    .option("interactive", "false")
                    .option("incremental", "true");
            }
            Dialect::SmtInterpol | Dialect::Yices => {}
        }
        solver
    }

    /// Set an option, replacing an earlier value of the same option.
    pub fn option<S: AsRef<str>>(&mut self, name: &str, val: S) -> &mut Self {
        let val = val.as_ref().to_string();
        match self.options.iter_mut().find(|(n, _)| n == name) {
            Some((_, old)) => *old = val,
            None => self.options.push((name.to_string(), val)),
        }
        self
    }

    /// Set the logic declared on startup.
    pub fn logic(&mut self, logic: &str) -> &mut Self {
        self.logic = logic.to_string();
        self
    }

    /// Limit the time of every check. None removes the limit.
    pub fn timeout_ms(&mut self, ms: Option<usize>) -> &mut Self {
        match (self.dialect, ms) {
            // the largest timeout Z3 accepts means no timeout
            (Dialect::Z3, ms) => {
                self.option("timeout", ms.unwrap_or(u32::MAX as usize).to_string())
            }
            (Dialect::Cvc4 | Dialect::Cvc5, ms) => {
                self.option("tlimit-per", ms.unwrap_or(0).to_string())
            }
            (Dialect::SmtInterpol, Some(ms)) => self.option("timeout", ms.to_string()),
            // yices only takes whole seconds, on the command line
            (Dialect::Yices, Some(ms)) => {
                self.args.retain(|a| !a.starts_with("--timeout="));
                self.args.push(format!("--timeout={}", (ms + 999) / 1000));
                self
            }
            (Dialect::SmtInterpol | Dialect::Yices, None) => self,
        }
    }

    /// Seed the solver's random number generators.
    pub fn random_seed(&mut self, seed: u64) -> &mut Self {
        match self.dialect {
            Dialect::Z3 => self
                .option("smt.random_seed", seed.to_string())
                .option("sat.random_seed", seed.to_string()),
            Dialect::Cvc4 | Dialect::Cvc5 => self.option("seed", seed.to_string()),
            Dialect::SmtInterpol | Dialect::Yices => self.option("random-seed", seed.to_string()),
        }
    }

    /// Build the command line string, for printing purposes.
    pub fn cmdline(&self) -> String {
        let mut words = vec![self.cmd.clone()];
        words.extend(self.args.iter().map(|a| {
            if a.contains(' ') {
                format!("\"{a}\"")
            } else {
                a.clone()
            }
        }));
        words.join(" ")
    }
}

impl fmt::Display for SolverCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cmdline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmdlines() {
        let mut z3 = SolverCmd::new(Dialect::Z3, "z3");
        z3.timeout_ms(Some(1000)).random_seed(7);
        insta::assert_snapshot!(z3.cmdline(), @"z3 -in -smt2");
        insta::assert_debug_snapshot!(z3.options, @r###"
        [
            (
                "model.completion",
                "true",
            ),
            (
                "model.compact",
                "true",
            ),
            (
                "timeout",
                "1000",
            ),
            (
                "smt.random_seed",
                "7",
            ),
            (
                "sat.random_seed",
                "7",
            ),
        ]
        "###);
        z3.timeout_ms(None);
        assert!(z3
            .options
            .contains(&("timeout".to_string(), "4294967295".to_string())));
        assert_eq!(z3.logic, "ALL");

        let mut yices = SolverCmd::new(Dialect::Yices, "yices-smt2");
        yices.timeout_ms(Some(1500)).timeout_ms(Some(3000));
        insta::assert_snapshot!(yices, @"yices-smt2 --incremental --timeout=3");

        let mut interpol = SolverCmd::new(Dialect::SmtInterpol, "/opt/smt interpol");
        interpol.logic("QF_UFLIA").timeout_ms(None);
        assert_eq!(interpol.logic, "QF_UFLIA");
        assert!(interpol.options.is_empty());
        insta::assert_snapshot!(interpol.cmdline(), @"/opt/smt interpol -q");

        let mut cvc5 = SolverCmd::new(Dialect::Cvc5, "cvc5");
        cvc5.random_seed(3);
        assert_eq!(cvc5.options.last(), Some(&("seed".to_string(), "3".to_string())));
    }
}
