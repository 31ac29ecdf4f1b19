// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The portfolio binary's command-line interface.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use eyre::WrapErr;
use itertools::Itertools;
use serde::Serialize;

use formula::{
    tactic::Tactic, theories::NonLinearArithmetic, FormulaConf, FormulaManager, Sort, Value,
};
use solver::{
    conf::{self, SolverConf},
    portfolio::PortfolioContext,
    prover::{ProverEnvironment, ProverOptions, SolverContext},
    smt::SmtContext,
};

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum SolverType {
    Z3,
    Cvc4,
    Cvc5,
    Smtinterpol,
    Yices,
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum NonLinear {
    Use,
    ApproximateAlways,
    ApproximateFallback,
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum RoundingMode {
    NearestTiesToEven,
    NearestTiesAway,
    TowardPositive,
    TowardNegative,
    TowardZero,
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
struct SolverArgs {
    #[arg(value_enum, long, default_values_t = [SolverType::Z3])]
    /// Solvers to race against each other (repeat to add more)
    solver: Vec<SolverType>,

    #[arg(long)]
    /// Output the smt2 queries alongside the input file
    smt: bool,

    #[arg(long, default_value_t = 600)]
    /// SMT solver timeout in seconds
    timeout: usize,

    #[arg(long, default_value_t = 0)]
    /// SMT solver random seed
    solver_seed: u64,
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
struct FormulaArgs {
    #[arg(value_enum, long, default_value_t = NonLinear::Use)]
    /// How to handle non-linear arithmetic
    nonlinear: NonLinear,

    #[arg(value_enum, long, default_value_t = RoundingMode::NearestTiesToEven)]
    /// Rounding mode of floating point operations
    rounding_mode: RoundingMode,

    /// File name for an SMT-LIB script
    file: String,
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
enum Command {
    /// Check the satisfiability of the assertions with a portfolio of solvers.
    Check {
        #[command(flatten)]
        solver: SolverArgs,
        #[command(flatten)]
        formula: FormulaArgs,
    },
    /// Print the variables and uninterpreted functions of the assertions.
    Vars(FormulaArgs),
    /// Print the negation normal form of the assertions.
    Nnf(FormulaArgs),
}

/// Check SMT-LIB scripts with a portfolio of solvers.
#[derive(Parser, Debug)]
#[command(about, long_about = None)]
pub struct App {
    #[arg(long, global = true)]
    /// Print results as JSON
    json: bool,

    #[command(subcommand)]
    /// Command to run
    command: Command,
}

#[derive(Serialize)]
struct CheckOutput {
    result: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    model: Vec<Assignment>,
}

#[derive(Serialize)]
struct Assignment {
    name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<Value>,
    value: Value,
}

#[derive(Serialize)]
struct Symbol {
    name: String,
    sort: Sort,
}

impl SolverArgs {
    fn get_solver_conf(&self, fname: &str) -> SolverConf {
        let solvers = self
            .solver
            .iter()
            .map(|solver| match solver {
                SolverType::Z3 => conf::SolverType::Z3,
                SolverType::Cvc4 => conf::SolverType::Cvc4,
                SolverType::Cvc5 => conf::SolverType::Cvc5,
                SolverType::Smtinterpol => conf::SolverType::SmtInterpol,
                SolverType::Yices => conf::SolverType::Yices,
            })
            .collect();
        let mut conf = SolverConf::new(solvers);
        conf.timeout_ms(Some(self.timeout * 1000))
            .seed(self.solver_seed);
        if self.smt {
            let dir = Path::new(fname).parent().unwrap_or(Path::new("."));
            conf.tee = Some(dir.to_path_buf());
        }
        conf
    }
}

impl FormulaArgs {
    fn get_formula_conf(&self) -> FormulaConf {
        FormulaConf {
            non_linear_arithmetic: match self.nonlinear {
                NonLinear::Use => NonLinearArithmetic::Use,
                NonLinear::ApproximateAlways => NonLinearArithmetic::ApproximateAlways,
                NonLinear::ApproximateFallback => NonLinearArithmetic::ApproximateFallback,
            },
            rounding_mode: match self.rounding_mode {
                RoundingMode::NearestTiesToEven => formula::RoundingMode::NearestTiesToEven,
                RoundingMode::NearestTiesAway => formula::RoundingMode::NearestTiesAway,
                RoundingMode::TowardPositive => formula::RoundingMode::TowardPositive,
                RoundingMode::TowardNegative => formula::RoundingMode::TowardNegative,
                RoundingMode::TowardZero => formula::RoundingMode::TowardZero,
            },
        }
    }

    fn read(&self) -> eyre::Result<String> {
        fs::read_to_string(&self.file).wrap_err_with(|| format!("could not read {}", self.file))
    }

    /// A manager over a context that never starts a solver.
    fn offline_manager(&self) -> FormulaManager<SmtContext> {
        let ctx = SmtContext::new(conf::SolverType::Z3, SolverConf::default());
        FormulaManager::new(Arc::new(ctx), self.get_formula_conf())
    }
}

fn check(solver: &SolverArgs, formula: &FormulaArgs, json: bool) -> eyre::Result<String> {
    let text = formula.read()?;
    let ctx = Arc::new(PortfolioContext::smt(&solver.get_solver_conf(&formula.file))?);
    let fmgr = FormulaManager::new(ctx.clone(), formula.get_formula_conf());
    let f = fmgr.parse(&text)?;
    let mut prover = ctx.new_prover(ProverOptions {
        generate_models: true,
        ..Default::default()
    })?;
    prover.add_constraint(&f)?;
    if prover.is_unsat()? {
        let output = CheckOutput {
            result: "unsat",
            model: vec![],
        };
        return if json {
            Ok(serde_json::to_string_pretty(&output)?)
        } else {
            Ok("unsat".to_string())
        };
    }
    let model = prover.model()?;
    if json {
        let output = CheckOutput {
            result: "sat",
            model: model
                .iter()
                .map(|a| Assignment {
                    name: a.name.clone(),
                    args: a.arg_values.clone(),
                    value: a.value.clone(),
                })
                .collect(),
        };
        return Ok(serde_json::to_string_pretty(&output)?);
    }
    Ok(format!("sat\n{}", model.to_string().trim_end()))
}

fn vars(formula: &FormulaArgs, json: bool) -> eyre::Result<String> {
    let fmgr = formula.offline_manager();
    let f = fmgr.parse(&formula.read()?)?;
    let symbols = fmgr
        .extract_variables_and_ufs(&f)
        .into_iter()
        .map(|(name, f)| Symbol {
            name,
            sort: f.sort().clone(),
        })
        .collect_vec();
    if json {
        return Ok(serde_json::to_string_pretty(&symbols)?);
    }
    Ok(symbols
        .iter()
        .map(|s| format!("{}: {}", s.name, s.sort))
        .join("\n"))
}

fn nnf(formula: &FormulaArgs, json: bool) -> eyre::Result<String> {
    let fmgr = formula.offline_manager();
    let f = fmgr.parse(&formula.read()?)?;
    let nnf = fmgr.apply_tactic(&f, Tactic::Nnf)?;
    if json {
        return Ok(serde_json::to_string_pretty(&nnf.to_string())?);
    }
    Ok(fmgr.dump_formula(&nnf))
}

impl App {
    fn run(&self) -> eyre::Result<String> {
        match &self.command {
            Command::Check { solver, formula } => check(solver, formula, self.json),
            Command::Vars(formula) => vars(formula, self.json),
            Command::Nnf(formula) => nnf(formula, self.json),
        }
    }

    /// Run the application.
    pub fn exec(self) -> eyre::Result<()> {
        let output = self.run()?;
        println!("{output}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn script(name: &str, text: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("portfolio-cli-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    fn run(args: &[&str]) -> eyre::Result<String> {
        App::try_parse_from(["portfolio"].iter().chain(args))?.run()
    }

    #[test]
    fn test_solver_args() {
        let app = App::try_parse_from([
            "portfolio", "check", "--solver", "z3", "--solver", "smtinterpol", "--timeout",
            "5", "--smt", "dir/query.smt2",
        ])
        .unwrap();
        let Command::Check { solver, formula } = app.command else {
            panic!("expected check")
        };
        let conf = solver.get_solver_conf(&formula.file);
        assert_eq!(
            conf.solvers,
            vec![conf::SolverType::Z3, conf::SolverType::SmtInterpol]
        );
        assert_eq!(conf.timeout_ms, Some(5000));
        assert_eq!(conf.tee, Some(PathBuf::from("dir")));
        assert_eq!(formula.get_formula_conf(), FormulaConf::default());

        let app = App::try_parse_from([
            "portfolio",
            "vars",
            "--nonlinear",
            "approximate-fallback",
            "--rounding-mode",
            "toward-zero",
            "q.smt2",
        ])
        .unwrap();
        let Command::Vars(formula) = app.command else {
            panic!("expected vars")
        };
        assert_eq!(
            formula.get_formula_conf().non_linear_arithmetic,
            NonLinearArithmetic::ApproximateFallback
        );
        assert!(App::try_parse_from(["portfolio", "check", "--solver", "vampire", "q"]).is_err());
    }

    #[test]
    fn test_vars() {
        let path = script(
            "vars.smt2",
            "(declare-fun f (Int) Int)
             (declare-const x Int)
             (declare-const y Int)
             (assert (= (f x) (f y)))",
        );
        let path = path.to_string_lossy();
        insta::assert_snapshot!(run(&["vars", &path]).unwrap(), @r###"
        f: Int
        x: Int
        y: Int
        "###);
        let json = run(&["vars", "--json", &path]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[1]["name"], "x");
        assert_eq!(parsed[1]["sort"], "Integer");
    }

    #[test]
    fn test_nnf() {
        let path = script(
            "nnf.smt2",
            "(declare-const p Bool)
             (declare-const q Bool)
             (assert (not (=> p q)))",
        );
        insta::assert_snapshot!(run(&["nnf", &path.to_string_lossy()]).unwrap(), @r###"
        (declare-fun p () Bool)
        (declare-fun q () Bool)
        (assert (and p (not q)))
        "###);
    }

    #[test]
    fn test_missing_file() {
        let err = run(&["vars", "/nonexistent/query.smt2"]).unwrap_err();
        insta::assert_display_snapshot!(err, @"could not read /nonexistent/query.smt2");
    }

    #[test]
    fn test_check() {
        let path = script(
            "check.smt2",
            "(declare-const x Int)
             (assert (and (> x 2) (< x 4)))",
        );
        let output = match run(&["check", &path.to_string_lossy()]) {
            Ok(output) => output,
            Err(err) => {
                eprintln!("could not run z3 ({err}), skipping test");
                return;
            }
        };
        assert_eq!(output, "sat\nx := 3");
    }
}
