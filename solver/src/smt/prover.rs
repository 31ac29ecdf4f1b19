// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Incremental solving over one SMT-LIB solver process.
//!
//! The prover keeps its own record of the assertion stack (declarations and
//! named assertions per level), so that a process that was killed by a
//! cancellation can be replaced by a fresh one in the same state.

use fxhash::FxHashSet;
use itertools::Itertools;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use formula::{
    creator::{FormulaCreator, TermShape},
    model::Model,
    Formula, FormulaError, FunctionKind, Sort, Value,
};
use smtlib::{
    proc::{SatResp, SmtPid, SmtProc},
    sexp::{app, atom_s, Sexp},
};

use super::{lower::lower, model::parse_model, SmtContext, SmtTerm};
use crate::{
    basics::{solver_error, QueryCanceler, QueryGate},
    conf::SolverType,
    prover::{InterpolatingProver, ProverEnvironment, ProverOptions},
};

/// Names an assertion of an [`SmtProver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SmtId(usize);

impl fmt::Display for SmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Cancels a query of an [`SmtProver`] by killing its solver. The prover stays
/// usable: it restarts its solver on the next call.
pub type SmtCanceler = QueryCanceler<SmtPid>;

#[derive(Default)]
struct Level {
    declarations: Vec<(String, Sexp)>,
    assertions: Vec<(SmtId, Formula<SmtTerm>)>,
}

/// A prover session of an [`SmtContext`].
pub struct SmtProver {
    context: Arc<SmtContext>,
    options: ProverOptions,
    proc: Option<SmtProc>,
    gate: QueryGate<SmtPid>,
    levels: Vec<Level>,
    declared: FxHashSet<String>,
    next_id: usize,
}

fn named(id: SmtId, f: &Formula<SmtTerm>) -> Sexp {
    app(
        "assert",
        [app(
            "!",
            [lower(f.term()), atom_s(":named"), atom_s(id.to_string())],
        )],
    )
}

impl SmtProver {
    pub(crate) fn new(context: Arc<SmtContext>, options: ProverOptions) -> Self {
        SmtProver {
            context,
            options,
            proc: None,
            gate: QueryGate::new(),
            levels: vec![Level::default()],
            declared: FxHashSet::default(),
            next_id: 0,
        }
    }

    /// The context this prover was created from.
    pub fn context(&self) -> &Arc<SmtContext> {
        &self.context
    }

    fn start(&self) -> Result<SmtProc, FormulaError> {
        let solver = self.context.solver();
        let mut cmd = self.context.conf().cmd(solver);
        if self.options.generate_unsat_cores {
            cmd.option("produce-unsat-cores", "true");
        }
        if self.options.generate_interpolants {
            cmd.option("produce-interpolants", "true");
        }
        // a cancelled query does not get a replacement process
        if self.gate.interrupted() {
            return Err(FormulaError::Interrupted);
        }
        let mut proc =
            SmtProc::new(cmd, self.context.conf().tee.as_deref()).map_err(solver_error)?;
        self.gate.attach(proc.pid())?;
        for (i, level) in self.levels.iter().enumerate() {
            if i > 0 {
                proc.send(&app("push", [atom_s("1")]));
            }
            for (_, declaration) in &level.declarations {
                proc.send(declaration);
            }
            for (id, f) in &level.assertions {
                proc.send(&named(*id, f));
            }
        }
        Ok(proc)
    }

    /// The running process, started (and brought up to date) if there is
    /// none or the last one was cancelled.
    fn proc(&mut self) -> Result<&mut SmtProc, FormulaError> {
        let proc = match self.proc.take() {
            Some(proc) if !proc.is_terminated() => proc,
            stale => {
                if stale.is_some() {
                    log::debug!(
                        "restarting {} with {} assertions",
                        self.context.solver(),
                        self.num_assertions()
                    );
                }
                self.start()?
            }
        };
        Ok(self.proc.insert(proc))
    }

    fn num_assertions(&self) -> usize {
        self.levels.iter().map(|l| l.assertions.len()).sum()
    }

    fn assertions(&self) -> impl Iterator<Item = &(SmtId, Formula<SmtTerm>)> {
        self.levels.iter().flat_map(|l| l.assertions.iter())
    }

    fn find(&self, id: SmtId) -> Result<&Formula<SmtTerm>, FormulaError> {
        self.assertions()
            .find(|(other, _)| *other == id)
            .map(|(_, f)| f)
            .ok_or_else(|| FormulaError::InvalidArgument(format!("{id} is not asserted")))
    }

    /// Declare the symbols of some terms that the solver does not know yet.
    fn declare<'a, I>(&mut self, terms: I) -> Result<(), FormulaError>
    where
        I: IntoIterator<Item = &'a SmtTerm>,
    {
        let new = self
            .context
            .free_symbols(terms)
            .into_iter()
            .filter(|symbol| !self.declared.contains(&symbol.name))
            .collect_vec();
        if new.is_empty() {
            return Ok(());
        }
        let proc = self.proc()?;
        let declarations = new
            .into_iter()
            .map(|symbol| {
                let declaration = symbol.declaration();
                proc.send(&declaration);
                (symbol.name, declaration)
            })
            .collect_vec();
        for (name, _) in &declarations {
            self.declared.insert(name.clone());
        }
        self.top().declarations.extend(declarations);
        Ok(())
    }

    fn top(&mut self) -> &mut Level {
        self.levels
            .last_mut()
            .expect("the base level is never popped")
    }

    fn require(&self, enabled: bool, what: &str) -> Result<(), FormulaError> {
        if !enabled {
            return Err(FormulaError::InvalidArgument(format!(
                "{what} is not enabled for this prover"
            )));
        }
        Ok(())
    }

    /// Check an assumption is a Boolean variable or its negation.
    fn literal(&self, f: &Formula<SmtTerm>) -> Result<(), FormulaError> {
        let is_variable = |t: &SmtTerm| {
            t.sort() == &Sort::Boolean
                && matches!(self.context.decompose(t), TermShape::FreeVariable(_))
        };
        let ok = match self.context.decompose(f.term()) {
            TermShape::FreeVariable(_) => f.is_boolean(),
            TermShape::Application { decl, args } => {
                decl.kind == FunctionKind::Not && args.len() == 1 && is_variable(&args[0])
            }
            _ => false,
        };
        if !ok {
            return Err(FormulaError::InvalidArgument(format!(
                "assumptions must be Boolean literals, not {f}"
            )));
        }
        Ok(())
    }

    fn check(&mut self, assumptions: &[Formula<SmtTerm>]) -> Result<bool, FormulaError> {
        self.gate.begin()?;
        let res = self.run_check(assumptions);
        self.gate.end();
        res
    }

    fn run_check(&mut self, assumptions: &[Formula<SmtTerm>]) -> Result<bool, FormulaError> {
        for a in assumptions {
            self.literal(a)?;
        }
        self.declare(assumptions.iter().map(|a| a.term()))?;
        let solver = self.context.solver();
        let timeout = self.context.conf().timeout_ms;
        let n_assertions = self.num_assertions();
        let save_tee = self.context.conf().tee.is_some();
        let start_time = Instant::now();
        let log_result = |res: String| {
            log::debug!(
                "            {solver}(timeout={}) returned {res} after {}ms \
                 ({n_assertions} assertions, {} assumptions)",
                timeout.unwrap_or(0) / 1000,
                start_time.elapsed().as_millis(),
                assumptions.len(),
            );
        };
        let lits = assumptions.iter().map(|a| lower(a.term())).collect_vec();
        let proc = self.proc()?;
        let resp = match proc.check_sat_assuming(&lits) {
            Ok(SatResp::Sat) => {
                log_result("SAT".to_string());
                Ok(false)
            }
            Ok(SatResp::Unsat) => {
                log_result("UNSAT".to_string());
                Ok(true)
            }
            Ok(SatResp::Unknown(reason)) => {
                log_result(format!("unknown: {reason}"));
                Err(FormulaError::Solver(format!("unknown: {reason}")))
            }
            Err(err) => {
                log_result(format!("error: {err}"));
                Err(solver_error(err))
            }
        };
        if save_tee {
            proc.save_tee();
        }
        resp
    }

    fn interpolation_group(&self, ids: &[SmtId]) -> Result<Sexp, FormulaError> {
        for id in ids {
            self.find(*id)?;
        }
        Ok(match ids {
            [] => atom_s("true"),
            [id] => atom_s(id.to_string()),
            _ => app("and", ids.iter().map(|id| atom_s(id.to_string()))),
        })
    }

    fn get_interpolants(
        &mut self,
        groups: Vec<Sexp>,
    ) -> Result<Vec<Formula<SmtTerm>>, FormulaError> {
        let expected = groups.len() - 1;
        self.gate.begin()?;
        let resp = self
            .proc()
            .and_then(|proc| {
                proc.expensive_call(&app("get-interpolants", groups))
                    .map_err(solver_error)
            });
        self.gate.end();
        let resp = resp?;
        let interpolants = resp
            .list()
            .ok_or_else(|| FormulaError::Solver(format!("malformed interpolants: {resp}")))?;
        if interpolants.len() != expected {
            return Err(FormulaError::Solver(format!(
                "expected {expected} interpolants but got {}",
                interpolants.len()
            )));
        }
        interpolants
            .iter()
            .map(|s| {
                let t = self.context.read(s)?;
                FormulaError::expect_sort(&Sort::Boolean, t.sort())?;
                Ok(self.context.encapsulate(Sort::Boolean, t))
            })
            .collect()
    }

    fn check_interpolation(&self) -> Result<(), FormulaError> {
        self.require(self.options.generate_interpolants, "interpolation")?;
        if self.context.solver() != SolverType::SmtInterpol {
            return Err(FormulaError::Unsupported(format!(
                "interpolation with {}",
                self.context.solver()
            )));
        }
        Ok(())
    }

    fn boolean(&self, b: bool) -> Result<Formula<SmtTerm>, FormulaError> {
        let t = self.context.constant(Value::Bool(b))?;
        Ok(self.context.encapsulate(Sort::Boolean, t))
    }
}

impl ProverEnvironment for SmtProver {
    type Term = SmtTerm;
    type Id = SmtId;
    type Canceler = SmtCanceler;

    fn push(&mut self) -> Result<(), FormulaError> {
        self.proc()?.send(&app("push", [atom_s("1")]));
        self.levels.push(Level::default());
        Ok(())
    }

    fn pop(&mut self) -> Result<(), FormulaError> {
        if self.levels.len() == 1 {
            return Err(FormulaError::InvalidArgument(
                "pop without a matching push".to_string(),
            ));
        }
        self.proc()?.send(&app("pop", [atom_s("1")]));
        if let Some(level) = self.levels.pop() {
            for (name, _) in level.declarations {
                self.declared.remove(&name);
            }
        }
        Ok(())
    }

    fn stack_depth(&self) -> usize {
        self.levels.len() - 1
    }

    fn add_constraint(&mut self, f: &Formula<SmtTerm>) -> Result<SmtId, FormulaError> {
        FormulaError::expect_sort(&Sort::Boolean, f.sort())?;
        self.declare([f.term()])?;
        let id = SmtId(self.next_id);
        self.next_id += 1;
        self.proc()?.send(&named(id, f));
        self.top().assertions.push((id, f.clone()));
        Ok(id)
    }

    fn is_unsat(&mut self) -> Result<bool, FormulaError> {
        self.check(&[])
    }

    fn is_unsat_with_assumptions(
        &mut self,
        assumptions: &[Formula<SmtTerm>],
    ) -> Result<bool, FormulaError> {
        self.check(assumptions)
    }

    fn model(&mut self) -> Result<Model<SmtTerm>, FormulaError> {
        self.require(self.options.generate_models, "model generation")?;
        let model = self.proc()?.get_model().map_err(solver_error)?;
        Ok(parse_model(&self.context, &model))
    }

    fn evaluate(&mut self, f: &Formula<SmtTerm>) -> Result<Option<Value>, FormulaError> {
        self.require(self.options.generate_models, "model generation")?;
        if self
            .context
            .free_symbols([f.term()])
            .iter()
            .any(|symbol| !self.declared.contains(&symbol.name))
        {
            // symbols the solver has never seen have no value in its model
            return Ok(None);
        }
        let values = self
            .proc()?
            .get_value(&[lower(f.term())])
            .map_err(solver_error)?;
        let Some((_, value)) = values.first() else {
            return Ok(None);
        };
        let value = self.context.read(value)?;
        Ok(value.constant().cloned())
    }

    fn unsat_core(&mut self) -> Result<Vec<Formula<SmtTerm>>, FormulaError> {
        self.require(self.options.generate_unsat_cores, "unsat core generation")?;
        let names = self.proc()?.get_unsat_core().map_err(solver_error)?;
        let names = names
            .iter()
            .filter_map(|s| s.atom_s().map(|s| s.to_string()))
            .collect::<FxHashSet<_>>();
        Ok(self
            .assertions()
            .filter(|(id, _)| names.contains(&id.to_string()))
            .map(|(_, f)| f.clone())
            .collect())
    }

    fn canceler(&self) -> SmtCanceler {
        self.gate.canceler()
    }
}

impl InterpolatingProver for SmtProver {
    fn interpolant(&mut self, partition_a: &[SmtId]) -> Result<Formula<SmtTerm>, FormulaError> {
        self.check_interpolation()?;
        let a = partition_a.iter().copied().collect::<FxHashSet<_>>();
        let b = self
            .assertions()
            .map(|(id, _)| *id)
            .filter(|id| !a.contains(id))
            .collect_vec();
        if partition_a.is_empty() {
            return self.boolean(true);
        }
        if b.is_empty() {
            return self.boolean(false);
        }
        let groups = vec![
            self.interpolation_group(partition_a)?,
            self.interpolation_group(&b)?,
        ];
        let mut interpolants = self.get_interpolants(groups)?;
        Ok(interpolants.remove(0))
    }

    fn sequence_interpolants(
        &mut self,
        partitions: &[Vec<SmtId>],
    ) -> Result<Vec<Formula<SmtTerm>>, FormulaError> {
        self.check_interpolation()?;
        if partitions.len() < 2 {
            return Err(FormulaError::InvalidArgument(format!(
                "sequence interpolation needs at least 2 partitions, got {}",
                partitions.len()
            )));
        }
        let groups = partitions
            .iter()
            .map(|p| self.interpolation_group(p))
            .collect::<Result<Vec<_>, _>>()?;
        self.get_interpolants(groups)
    }
}
