// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Cancellation of in-flight queries, and the mapping from low-level solver
//! errors into [`FormulaError`].
//!
//! A prover counts its queries with a [`QueryGate`]. A [`QueryCanceler`]
//! obtained from the gate cancels the query in flight, or, if the prover is
//! idle, the next query it starts. That query then fails with
//! [`FormulaError::Interrupted`] before doing any work. A cancel that arrives
//! after its query has finished has no effect on later queries.

use std::sync::{Arc, Mutex};

use formula::FormulaError;
use smtlib::proc::{SmtPid, SolverError};

/// Something that can stop a running query from another thread.
pub trait BasicCanceler: Sync + Send {
    /// Cancel the query associated with this canceler.
    fn cancel(&self);

    /// Whether [`BasicCanceler::cancel`] has been called.
    fn is_canceled(&self) -> bool;
}

struct Members<C> {
    canceled: bool,
    members: Vec<C>,
}

/// A group of cancelers that are cancelled together, exactly once.
///
/// A group is itself a [`BasicCanceler`], so groups nest. Clones share the
/// same group.
pub struct MultiCanceler<C: BasicCanceler>(Arc<Mutex<Members<C>>>);

impl<C: BasicCanceler> Clone for MultiCanceler<C> {
    fn clone(&self) -> Self {
        MultiCanceler(Arc::clone(&self.0))
    }
}

impl<C: BasicCanceler> Default for MultiCanceler<C> {
    fn default() -> Self {
        MultiCanceler(Arc::new(Mutex::new(Members {
            canceled: false,
            members: vec![],
        })))
    }
}

impl<C: BasicCanceler> MultiCanceler<C> {
    /// An empty group that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member to the group. A member added after the group was
    /// cancelled is cancelled immediately, and `false` is returned.
    pub fn add_canceler(&self, canceler: C) -> bool {
        let mut group = self.0.lock().unwrap();
        if group.canceled {
            drop(group);
            canceler.cancel();
            return false;
        }
        group.members.push(canceler);
        true
    }
}

impl<C: BasicCanceler> BasicCanceler for MultiCanceler<C> {
    fn cancel(&self) {
        let members = {
            let mut group = self.0.lock().unwrap();
            group.canceled = true;
            std::mem::take(&mut group.members)
        };
        // outside the lock, since members may be groups sharing state with us
        for member in members {
            member.cancel();
        }
    }

    fn is_canceled(&self) -> bool {
        self.0.lock().unwrap().canceled
    }
}

#[derive(Debug)]
struct Queries<K> {
    /// Number of queries started so far; the running one is the last.
    begun: u64,
    running: bool,
    /// Every query numbered up to this one is cancelled.
    canceled: u64,
    /// Stops the running query.
    stop: Option<K>,
}

/// The query counter of one prover, shared with its [`QueryCanceler`]s.
///
/// `K` stops a query that is already running, e.g. by killing the solver
/// process it waits on.
#[derive(Debug)]
pub struct QueryGate<K>(Arc<Mutex<Queries<K>>>);

impl<K: BasicCanceler> Default for QueryGate<K> {
    fn default() -> Self {
        QueryGate(Arc::new(Mutex::new(Queries {
            begun: 0,
            running: false,
            canceled: 0,
            stop: None,
        })))
    }
}

impl<K: BasicCanceler> QueryGate<K> {
    /// A gate that has not started any query.
    pub fn new() -> Self {
        Self::default()
    }

    /// A canceler for the running query, or the next one if there is none.
    pub fn canceler(&self) -> QueryCanceler<K> {
        let queries = self.0.lock().unwrap();
        let target = if queries.running {
            queries.begun
        } else {
            queries.begun + 1
        };
        QueryCanceler {
            queries: Arc::clone(&self.0),
            target,
        }
    }

    /// Start a query. Fails with [`FormulaError::Interrupted`] if it was
    /// cancelled before it started; it is then already finished.
    pub fn begin(&self) -> Result<(), FormulaError> {
        let mut queries = self.0.lock().unwrap();
        queries.begun += 1;
        if queries.canceled >= queries.begun {
            return Err(FormulaError::Interrupted);
        }
        queries.running = true;
        Ok(())
    }

    /// Finish the running query.
    pub fn end(&self) {
        self.0.lock().unwrap().running = false;
    }

    /// Whether the running query has been cancelled.
    pub fn interrupted(&self) -> bool {
        let queries = self.0.lock().unwrap();
        queries.running && queries.canceled >= queries.begun
    }

    /// Make `stop` the way to stop queries from now on. If the running query
    /// is already cancelled, `stop` is cancelled too and
    /// [`FormulaError::Interrupted`] is returned.
    pub fn attach(&self, stop: K) -> Result<(), FormulaError> {
        let mut queries = self.0.lock().unwrap();
        if queries.running && queries.canceled >= queries.begun {
            drop(queries);
            stop.cancel();
            return Err(FormulaError::Interrupted);
        }
        queries.stop = Some(stop);
        Ok(())
    }
}

/// Cancels one query of a prover; see [`QueryGate::canceler`].
///
/// A canceler that outlives its query cancels whatever query is running when
/// it is used, and nothing if the prover is idle.
#[derive(Debug)]
pub struct QueryCanceler<K> {
    queries: Arc<Mutex<Queries<K>>>,
    target: u64,
}

impl<K> Clone for QueryCanceler<K> {
    fn clone(&self) -> Self {
        QueryCanceler {
            queries: Arc::clone(&self.queries),
            target: self.target,
        }
    }
}

impl<K: BasicCanceler> BasicCanceler for QueryCanceler<K> {
    fn cancel(&self) {
        let mut queries = self.queries.lock().unwrap();
        if queries.running {
            queries.canceled = queries.canceled.max(queries.begun);
            if let Some(stop) = &queries.stop {
                stop.cancel();
            }
        } else {
            queries.canceled = queries.canceled.max(self.target);
        }
    }

    fn is_canceled(&self) -> bool {
        self.queries.lock().unwrap().canceled >= self.target
    }
}

impl BasicCanceler for SmtPid {
    fn cancel(&self) {
        self.kill()
    }

    fn is_canceled(&self) -> bool {
        self.is_killed()
    }
}

/// Classify an error of the solver process as a [`FormulaError`].
pub fn solver_error(err: SolverError) -> FormulaError {
    match err {
        SolverError::Killed => FormulaError::Interrupted,
        SolverError::UnexpectedClose(msg) => FormulaError::from_solver_message(&msg),
        SolverError::Io(_) | SolverError::Parse(_) => {
            FormulaError::from_solver_message(&err.to_string())
        }
    }
}
