// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Racing the delegate provers of a portfolio.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use itertools::Itertools;

use formula::{model::Model, Formula, FormulaError, SolverTheories, Value};

use super::{PortfolioContext, PortfolioTerm};
use crate::{
    basics::{BasicCanceler, MultiCanceler},
    prover::{InterpolatingProver, ProverEnvironment},
};

/// The ids of one constraint in every delegate, in delegate order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortfolioId<I>(pub Vec<I>);

struct Shutdown<K: BasicCanceler> {
    requested: bool,
    /// The cancelers of the queries of the current race.
    race: MultiCanceler<K>,
}

/// Shuts a [`PortfolioProver`] down: cancels the delegate queries in flight
/// and makes every later race fail with [`FormulaError::Interrupted`].
pub struct PortfolioCanceler<K: BasicCanceler>(Arc<Mutex<Shutdown<K>>>);

impl<K: BasicCanceler> Clone for PortfolioCanceler<K> {
    fn clone(&self) -> Self {
        PortfolioCanceler(Arc::clone(&self.0))
    }
}

impl<K: BasicCanceler> BasicCanceler for PortfolioCanceler<K> {
    fn cancel(&self) {
        let race = {
            let mut shutdown = self.0.lock().unwrap();
            shutdown.requested = true;
            shutdown.race.clone()
        };
        race.cancel();
    }

    fn is_canceled(&self) -> bool {
        self.0.lock().unwrap().requested
    }
}

/// A prover that runs every query on all delegate provers.
///
/// Satisfiability checks race the delegates on a thread pool with one thread
/// per delegate; the first answer wins and the others are canceled. Push and
/// pop are applied to every delegate, with no recovery if only some of them
/// fail.
pub struct PortfolioProver<C, P>
where
    C: SolverTheories,
    P: InterpolatingProver<Term = C::Term>,
{
    context: Arc<PortfolioContext<C>>,
    delegates: Vec<Arc<Mutex<P>>>,
    shutdown: PortfolioCanceler<P::Canceler>,
    pool: rayon::ThreadPool,
    disagreements: Arc<AtomicUsize>,
}

/// Split the results of running one operation on every delegate into the
/// lowest-index success, or the first error if there is none.
fn first_success<T>(
    what: &str,
    results: Vec<Result<T, FormulaError>>,
) -> Result<(usize, T), FormulaError> {
    let mut first_error = None;
    for (i, res) in results.into_iter().enumerate() {
        match res {
            Ok(t) => return Ok((i, t)),
            Err(err) => {
                log::debug!("delegate {i} failed {what}: {err}");
                first_error.get_or_insert(err);
            }
        }
    }
    Err(first_error.unwrap_or(FormulaError::Interrupted))
}

/// Run one delegate's query, reporting a panic as a solver failure.
fn contained<T, F>(i: usize, query: F) -> Result<T, FormulaError>
where
    F: FnOnce() -> Result<T, FormulaError>,
{
    panic::catch_unwind(AssertUnwindSafe(query)).unwrap_or_else(|_| {
        log::error!("delegate {i} panicked");
        Err(FormulaError::Solver(format!("delegate {i} panicked")))
    })
}

impl<C, P> PortfolioProver<C, P>
where
    C: SolverTheories + 'static,
    P: InterpolatingProver<Term = C::Term> + 'static,
{
    /// Combine one prover per delegate of `context`, in delegate order.
    pub fn new(
        context: Arc<PortfolioContext<C>>,
        delegates: Vec<P>,
    ) -> Result<Self, FormulaError> {
        if delegates.len() != context.delegates().len() {
            return Err(FormulaError::InvalidArgument(format!(
                "expected {} delegate provers but got {}",
                context.delegates().len(),
                delegates.len()
            )));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(delegates.len())
            .thread_name(|i| format!("portfolio-{i}"))
            .build()
            .map_err(|err| FormulaError::ResourceExhausted(err.to_string()))?;
        Ok(PortfolioProver {
            context,
            delegates: delegates
                .into_iter()
                .map(|p| Arc::new(Mutex::new(p)))
                .collect(),
            shutdown: PortfolioCanceler(Arc::new(Mutex::new(Shutdown {
                requested: false,
                race: MultiCanceler::new(),
            }))),
            pool,
            disagreements: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The context whose formulas this prover accepts.
    pub fn context(&self) -> &Arc<PortfolioContext<C>> {
        &self.context
    }

    /// How many times a delegate answered a check differently from the
    /// winner of the race.
    pub fn disagreements(&self) -> usize {
        self.disagreements.load(Ordering::SeqCst)
    }

    fn interrupted(&self) -> Result<(), FormulaError> {
        if self.shutdown.is_canceled() {
            Err(FormulaError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// A fresh group for the cancelers of the next round of delegate
    /// queries, reachable from the shutdown canceler.
    fn new_race(&self) -> Result<MultiCanceler<P::Canceler>, FormulaError> {
        let mut shutdown = self.shutdown.0.lock().unwrap();
        if shutdown.requested {
            return Err(FormulaError::Interrupted);
        }
        shutdown.race = MultiCanceler::new();
        Ok(shutdown.race.clone())
    }

    /// Run `query` on every delegate concurrently and return the first
    /// successful answer.
    ///
    /// Each task takes a canceler for the query it is about to run and adds
    /// it to the race. The winner cancels the race, so a delegate that has
    /// not started yet is cancelled as soon as it joins and does no work.
    fn race<F>(&self, what: &'static str, query: F) -> Result<bool, FormulaError>
    where
        F: Fn(&mut P, usize) -> Result<bool, FormulaError> + Send + Sync + 'static,
    {
        let race = self.new_race()?;
        let query = Arc::new(query);
        let winner: Arc<Mutex<Option<(usize, bool)>>> = Arc::new(Mutex::new(None));
        let (send, recv) = mpsc::channel();
        for (i, delegate) in self.delegates.iter().enumerate() {
            let delegate = delegate.clone();
            let query = query.clone();
            let race = race.clone();
            let winner = winner.clone();
            let disagreements = self.disagreements.clone();
            let send = send.clone();
            self.pool.spawn(move || {
                let mut prover = delegate.lock().unwrap();
                race.add_canceler(prover.canceler());
                let res = contained(i, || query(&mut *prover, i));
                if let Ok(answer) = res {
                    let mut winner = winner.lock().unwrap();
                    match *winner {
                        None => {
                            *winner = Some((i, answer));
                            drop(winner);
                            race.cancel();
                        }
                        Some((w, expected)) if expected != answer => {
                            log::warn!(
                                "portfolio disagreement on {what}: delegate {w} answered \
                                 unsat={expected} but delegate {i} answered unsat={answer}"
                            );
                            disagreements.fetch_add(1, Ordering::SeqCst);
                        }
                        Some(_) => (),
                    }
                }
                // the receiver is gone once the race has been decided
                let _ = send.send((i, res));
            });
        }
        drop(send);

        let mut errors = vec![];
        for (i, res) in recv.iter() {
            match res {
                Ok(answer) => {
                    let (w, answer) = winner.lock().unwrap().unwrap_or((i, answer));
                    log::info!("delegate {w} won {what} with unsat={answer}");
                    self.interrupted()?;
                    return Ok(answer);
                }
                Err(err) => {
                    log::debug!("delegate {i} failed {what}: {err}");
                    errors.push((i, err));
                }
            }
        }
        self.interrupted()?;
        errors.sort_by_key(|(i, _)| *i);
        Err(errors
            .into_iter()
            .next()
            .map(|(_, err)| err)
            .unwrap_or(FormulaError::Interrupted))
    }

    /// Run `op` on the delegates in index order until one succeeds.
    fn in_order<T, F>(&self, what: &str, mut op: F) -> Result<(usize, T), FormulaError>
    where
        F: FnMut(&mut P, usize) -> Result<T, FormulaError>,
    {
        let mut results = vec![];
        for (i, delegate) in self.delegates.iter().enumerate() {
            let res = op(&mut *delegate.lock().unwrap(), i);
            let ok = res.is_ok();
            results.push(res);
            if ok {
                break;
            }
        }
        first_success(what, results)
    }

    /// Run `op` on every delegate on its own thread and return the
    /// lowest-index success.
    fn concurrently<T, F>(&self, what: &str, op: F) -> Result<(usize, T), FormulaError>
    where
        T: Send,
        F: Fn(&mut P, usize) -> Result<T, FormulaError> + Sync,
    {
        let race = self.new_race()?;
        let results = thread::scope(|s| {
            let handles = self
                .delegates
                .iter()
                .enumerate()
                .map(|(i, delegate)| {
                    let op = &op;
                    let race = &race;
                    s.spawn(move || {
                        let mut prover = delegate.lock().unwrap();
                        race.add_canceler(prover.canceler());
                        contained(i, || op(&mut *prover, i))
                    })
                })
                .collect_vec();
            handles
                .into_iter()
                .enumerate()
                .map(|(i, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(FormulaError::Solver(format!("delegate {i} panicked")))
                    })
                })
                .collect_vec()
        });
        self.interrupted()?;
        first_success(what, results)
    }

    fn for_each<F>(&self, mut op: F) -> Result<(), FormulaError>
    where
        F: FnMut(&mut P) -> Result<(), FormulaError>,
    {
        for delegate in &self.delegates {
            op(&mut *delegate.lock().unwrap())?;
        }
        Ok(())
    }
}

impl<C, P> ProverEnvironment for PortfolioProver<C, P>
where
    C: SolverTheories + 'static,
    P: InterpolatingProver<Term = C::Term> + 'static,
{
    type Term = PortfolioTerm<C::Term>;
    type Id = PortfolioId<P::Id>;
    type Canceler = PortfolioCanceler<P::Canceler>;

    fn push(&mut self) -> Result<(), FormulaError> {
        self.for_each(|p| p.push())
    }

    fn pop(&mut self) -> Result<(), FormulaError> {
        self.for_each(|p| p.pop())
    }

    fn stack_depth(&self) -> usize {
        self.delegates[0].lock().unwrap().stack_depth()
    }

    fn add_constraint(&mut self, f: &Formula<Self::Term>) -> Result<Self::Id, FormulaError> {
        let mut ids = vec![];
        for (i, delegate) in self.delegates.iter().enumerate() {
            let f = self.context.project(i, f);
            ids.push(delegate.lock().unwrap().add_constraint(&f)?);
        }
        Ok(PortfolioId(ids))
    }

    fn is_unsat(&mut self) -> Result<bool, FormulaError> {
        self.race("is_unsat", |p, _| p.is_unsat())
    }

    fn is_unsat_with_assumptions(
        &mut self,
        assumptions: &[Formula<Self::Term>],
    ) -> Result<bool, FormulaError> {
        let projected = (0..self.delegates.len())
            .map(|i| {
                assumptions
                    .iter()
                    .map(|a| self.context.project(i, a))
                    .collect_vec()
            })
            .collect_vec();
        self.race("is_unsat_with_assumptions", move |p, i| {
            p.is_unsat_with_assumptions(&projected[i])
        })
    }

    fn model(&mut self) -> Result<Model<Self::Term>, FormulaError> {
        let (i, model) = self.in_order("model", |p, _| p.model())?;
        model.try_map(|f| self.context.lift(i, f))
    }

    fn evaluate(&mut self, f: &Formula<Self::Term>) -> Result<Option<Value>, FormulaError> {
        let (_, value) = self.in_order("evaluate", |p, i| p.evaluate(&self.context.project(i, f)))?;
        Ok(value)
    }

    fn unsat_core(&mut self) -> Result<Vec<Formula<Self::Term>>, FormulaError> {
        let (i, core) = self.in_order("unsat_core", |p, _| p.unsat_core())?;
        core.iter().map(|f| self.context.lift(i, f)).collect()
    }

    fn canceler(&self) -> Self::Canceler {
        self.shutdown.clone()
    }
}

impl<C, P> InterpolatingProver for PortfolioProver<C, P>
where
    C: SolverTheories + 'static,
    P: InterpolatingProver<Term = C::Term> + 'static,
{
    fn interpolant(
        &mut self,
        partition_a: &[Self::Id],
    ) -> Result<Formula<Self::Term>, FormulaError> {
        let (i, itp) = self.concurrently("interpolant", |p, i| {
            let ids = partition_a.iter().map(|id| id.0[i].clone()).collect_vec();
            p.interpolant(&ids)
        })?;
        self.context.lift(i, &itp)
    }

    fn sequence_interpolants(
        &mut self,
        partitions: &[Vec<Self::Id>],
    ) -> Result<Vec<Formula<Self::Term>>, FormulaError> {
        let (i, itps) = self.concurrently("sequence_interpolants", |p, i| {
            let partitions = partitions
                .iter()
                .map(|part| part.iter().map(|id| id.0[i].clone()).collect_vec())
                .collect_vec();
            p.sequence_interpolants(&partitions)
        })?;
        itps.iter().map(|f| self.context.lift(i, f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::{QueryCanceler, QueryGate};
    use crate::smt::{SmtContext, SmtTerm};
    use formula::{FormulaConf, FormulaCreator, FormulaManager, Sort};
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, Instant};

    #[derive(Clone, Default)]
    struct Flag(Arc<AtomicBool>);

    impl BasicCanceler for Flag {
        fn cancel(&self) {
            self.0.store(true, Ordering::SeqCst)
        }

        fn is_canceled(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// An in-process prover with a fixed answer and delay.
    struct Scripted {
        ctx: Arc<SmtContext>,
        delay: Duration,
        answer: Result<bool, FormulaError>,
        gate: QueryGate<Flag>,
        /// Checks that were asked for.
        attempts: usize,
        /// Checks that got past the gate.
        calls: usize,
        /// Keep working when cancelled.
        deaf: bool,
        panics: bool,
        assertions: Vec<Formula<SmtTerm>>,
        levels: Vec<usize>,
    }

    impl Scripted {
        fn new(ctx: &Arc<SmtContext>, delay_ms: u64, answer: Result<bool, FormulaError>) -> Self {
            Scripted {
                ctx: ctx.clone(),
                delay: Duration::from_millis(delay_ms),
                answer,
                gate: QueryGate::new(),
                attempts: 0,
                calls: 0,
                deaf: false,
                panics: false,
                assertions: vec![],
                levels: vec![],
            }
        }

        fn check(&mut self) -> Result<bool, FormulaError> {
            self.attempts += 1;
            if self.panics {
                panic!("scripted delegate failure");
            }
            self.gate.begin()?;
            self.calls += 1;
            let start = Instant::now();
            while start.elapsed() < self.delay {
                if !self.deaf && self.gate.interrupted() {
                    self.gate.end();
                    return Err(FormulaError::Interrupted);
                }
                thread::sleep(Duration::from_millis(5));
            }
            self.gate.end();
            self.answer.clone()
        }
    }

    impl ProverEnvironment for Scripted {
        type Term = SmtTerm;
        type Id = usize;
        type Canceler = QueryCanceler<Flag>;

        fn push(&mut self) -> Result<(), FormulaError> {
            self.levels.push(self.assertions.len());
            Ok(())
        }

        fn pop(&mut self) -> Result<(), FormulaError> {
            let len = self
                .levels
                .pop()
                .ok_or_else(|| FormulaError::InvalidArgument("pop without push".to_string()))?;
            self.assertions.truncate(len);
            Ok(())
        }

        fn stack_depth(&self) -> usize {
            self.levels.len()
        }

        fn add_constraint(&mut self, f: &Formula<SmtTerm>) -> Result<usize, FormulaError> {
            self.assertions.push(f.clone());
            Ok(self.assertions.len() - 1)
        }

        fn is_unsat(&mut self) -> Result<bool, FormulaError> {
            self.check()
        }

        fn is_unsat_with_assumptions(
            &mut self,
            assumptions: &[Formula<SmtTerm>],
        ) -> Result<bool, FormulaError> {
            assert!(assumptions.iter().all(|a| a.is_boolean()));
            self.check()
        }

        fn model(&mut self) -> Result<Model<SmtTerm>, FormulaError> {
            Err(FormulaError::Solver("no model".to_string()))
        }

        fn evaluate(&mut self, _f: &Formula<SmtTerm>) -> Result<Option<Value>, FormulaError> {
            Ok(Some(Value::Bool(true)))
        }

        fn unsat_core(&mut self) -> Result<Vec<Formula<SmtTerm>>, FormulaError> {
            Ok(self.assertions.clone())
        }

        fn canceler(&self) -> QueryCanceler<Flag> {
            self.gate.canceler()
        }
    }

    impl InterpolatingProver for Scripted {
        fn interpolant(&mut self, partition_a: &[usize]) -> Result<Formula<SmtTerm>, FormulaError> {
            if self.panics {
                panic!("scripted delegate failure");
            }
            match partition_a.first() {
                Some(i) if self.answer.is_ok() => Ok(self.assertions[*i].clone()),
                _ => Err(FormulaError::Unsupported("interpolation".to_string())),
            }
        }

        fn sequence_interpolants(
            &mut self,
            partitions: &[Vec<usize>],
        ) -> Result<Vec<Formula<SmtTerm>>, FormulaError> {
            partitions[..partitions.len() - 1]
                .iter()
                .map(|part| self.interpolant(part))
                .collect()
        }
    }

    fn portfolio(
        script: Vec<(u64, Result<bool, FormulaError>)>,
    ) -> PortfolioProver<SmtContext, Scripted> {
        let contexts = script
            .iter()
            .map(|_| Arc::new(SmtContext::for_tests()))
            .collect_vec();
        let delegates = contexts
            .iter()
            .zip(script)
            .map(|(ctx, (delay, answer))| Scripted::new(ctx, delay, answer))
            .collect_vec();
        let context = Arc::new(PortfolioContext::new(contexts).unwrap());
        PortfolioProver::new(context, delegates).unwrap()
    }

    #[test_log::test]
    fn test_fastest_answer_wins() {
        let mut prover = portfolio(vec![(2000, Ok(true)), (10, Ok(true))]);
        let start = Instant::now();
        assert!(prover.is_unsat().unwrap());
        // push waits for the slow delegate, which stops early
        prover.push().unwrap();
        assert!(start.elapsed() < Duration::from_millis(1500));
        assert_eq!(prover.stack_depth(), 1);
        assert_eq!(prover.disagreements(), 0);
        // and is usable again
        prover.delegates[0].lock().unwrap().delay = Duration::ZERO;
        prover.delegates[1].lock().unwrap().delay = Duration::from_secs(5);
        let start = Instant::now();
        assert!(prover.is_unsat().unwrap());
        assert!(start.elapsed() < Duration::from_millis(2500));
    }

    #[test_log::test]
    fn test_delegate_cancelled_before_it_starts() {
        let mut prover = portfolio(vec![(0, Ok(true)), (0, Ok(true))]);
        let straggler = prover.delegates[1].clone();
        let held = straggler.lock().unwrap();
        thread::scope(|s| {
            let race = s.spawn(|| prover.is_unsat());
            // decided without waiting for the delegate we are holding
            assert_eq!(race.join().unwrap(), Ok(true));
        });
        drop(held);
        let start = Instant::now();
        while straggler.lock().unwrap().attempts == 0 {
            assert!(start.elapsed() < Duration::from_secs(10));
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(prover.delegates[0].lock().unwrap().calls, 1);
        let mut straggler = straggler.lock().unwrap();
        assert_eq!(straggler.calls, 0);
        // the cancel only covered the skipped check
        assert_eq!(straggler.is_unsat(), Ok(true));
        assert_eq!(straggler.calls, 1);
    }

    #[test_log::test]
    fn test_panicking_delegate_is_a_failure() {
        let mut prover = portfolio(vec![(0, Ok(true)), (20, Ok(false))]);
        prover.delegates[0].lock().unwrap().panics = true;
        assert_eq!(prover.is_unsat(), Ok(false));
        let x = prover.context().variable(&Sort::Boolean, "x").unwrap();
        let id = prover.add_constraint(&x).unwrap();
        assert_eq!(prover.interpolant(&[id]).unwrap(), x);

        prover.delegates[1].lock().unwrap().panics = true;
        insta::assert_display_snapshot!(
            prover.is_unsat().unwrap_err(),
            @"solver failed: delegate 0 panicked"
        );
    }

    #[test_log::test]
    fn test_failures_are_ignored_unless_all_fail() {
        let mut prover = portfolio(vec![
            (0, Err(FormulaError::Solver("crashed".to_string()))),
            (20, Ok(false)),
        ]);
        assert!(!prover.is_unsat().unwrap());

        let mut prover = portfolio(vec![
            (30, Err(FormulaError::Solver("first".to_string()))),
            (0, Err(FormulaError::Solver("second".to_string()))),
        ]);
        insta::assert_display_snapshot!(prover.is_unsat().unwrap_err(), @"solver failed: first");
    }

    #[test_log::test]
    fn test_disagreement_is_counted() {
        let mut prover = portfolio(vec![(0, Ok(true)), (100, Ok(false))]);
        // the straggler answers despite being cancelled
        prover.delegates[1].lock().unwrap().deaf = true;
        assert!(prover.is_unsat().unwrap());
        // waits for the straggler
        prover.push().unwrap();
        assert_eq!(prover.disagreements(), 1);
    }

    #[test_log::test]
    fn test_assumptions_and_results() {
        let mut prover = portfolio(vec![(0, Ok(false)), (0, Ok(false))]);
        let ctx = prover.context().clone();
        let p = ctx.variable(&Sort::Boolean, "p").unwrap();
        let q = ctx.variable(&Sort::Boolean, "q").unwrap();
        let id = prover.add_constraint(&p).unwrap();
        assert_eq!(id, PortfolioId(vec![0, 0]));
        assert!(!prover.is_unsat_with_assumptions(&[q.clone()]).unwrap());

        assert_eq!(prover.evaluate(&q).unwrap(), Some(Value::Bool(true)));
        assert!(matches!(prover.model(), Err(FormulaError::Solver(_))));
        assert_eq!(prover.unsat_core().unwrap(), vec![p.clone()]);

        prover.add_constraint(&q).unwrap();
        let itp = prover.interpolant(&[id.clone()]).unwrap();
        assert_eq!(itp, p);
        let seq = prover
            .sequence_interpolants(&[vec![id], vec![PortfolioId(vec![1, 1])]])
            .unwrap();
        assert_eq!(seq, vec![p]);
    }

    #[test_log::test]
    fn test_interpolants_use_the_lowest_success() {
        let mut prover = portfolio(vec![
            (0, Err(FormulaError::Solver("no interpolation".to_string()))),
            (0, Ok(true)),
        ]);
        let ctx = prover.context().clone();
        let fmgr = FormulaManager::new(ctx.clone(), FormulaConf::default());
        let imgr = fmgr.integer();
        let x = imgr.make_variable("x").unwrap();
        let f = imgr
            .greater_than(&x, &imgr.make_number(0).unwrap())
            .unwrap();
        let id = prover.add_constraint(&f).unwrap();
        let itp = prover.interpolant(&[id]).unwrap();
        // delegate 1 answered, and the result exists in delegate 0 as well
        assert_eq!(itp, f);
        assert_eq!(ctx.project(0, &itp).to_string(), "(> x 0)");
    }

    #[test_log::test]
    fn test_shutdown() {
        let mut prover = portfolio(vec![(5000, Ok(true)), (5000, Ok(true))]);
        let shutdown = prover.canceler();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            shutdown.cancel();
        });
        assert_eq!(prover.is_unsat(), Err(FormulaError::Interrupted));
        handle.join().unwrap();
        assert_eq!(prover.is_unsat(), Err(FormulaError::Interrupted));
    }
}
