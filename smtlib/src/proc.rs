// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A running SMT-LIB solver process, driven over its standard input and output.
//!
//! Each command that expects an answer is followed by an `echo` of a marker
//! string, and the answer is everything the solver prints before the marker.
//! Cancellation through an [`SmtPid`] only signals the process while it is
//! inside a long-running command; an idle process is flagged instead and torn
//! down the next time it is used.

use std::{
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    sync::{Arc, Mutex},
};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use thiserror::Error;

use crate::{
    conf::SolverCmd,
    sexp::{self, app, atom_s, sexp_l, Sexp},
    tee::Tee,
};

/// Where a solver process is in its life.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    /// Waiting for commands.
    Idle,
    /// Inside an expensive command, where a kill sends SIGKILL.
    Busy,
    /// A kill was requested while idle. The next command tears the process down.
    Cancelled,
    /// Signalled but not yet reaped.
    Killed,
    /// Reaped.
    Exited,
}

impl Phase {
    fn is_live(self) -> bool {
        matches!(self, Phase::Idle | Phase::Busy)
    }
}

/// An instance of a solver process.
#[derive(Debug)]
pub struct SmtProc {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    tee: Option<Tee>,
    // shared with every SmtPid, which must not signal the pid after it has
    // been reaped and possibly reused
    phase: Arc<Mutex<Phase>>,
}

/// A handle for cancelling the commands of an [`SmtProc`] from another thread.
#[derive(Debug, Clone)]
pub struct SmtPid {
    pid: Pid,
    phase: Arc<Mutex<Phase>>,
}

/// A solver's answer to `check-sat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResp {
    #[allow(missing_docs)]
    Sat,
    #[allow(missing_docs)]
    Unsat,
    /// The solver gave up, with the reason from `(get-info :reason-unknown)`
    /// (a timeout, or incomplete quantifier instantiation, for example).
    Unknown(String),
}

/// An error from talking to a solver process.
#[derive(Error, Debug)]
pub enum SolverError {
    /// The pipes to the process failed, or it could not be started
    #[error("some I/O went wrong: {0}")]
    Io(#[from] io::Error),
    /// The solver reported an `(error ...)` or exited
    #[error("solver returned an error:\n{0}")]
    UnexpectedClose(String),
    /// The process was killed through an [`SmtPid`]
    #[error("solver was killed")]
    Killed,
    /// The solver answered with something other than what the command expects
    #[error("could not parse solver response: {0}")]
    Parse(String),
}

type Result<T> = std::result::Result<T, SolverError>;

const DONE: &str = "<<DONE>>";

impl SmtPid {
    /// Cancel the solver's current or next expensive command.
    pub fn kill(&self) {
        let mut phase = self.phase.lock().unwrap();
        *phase = match *phase {
            Phase::Busy => {
                match signal::kill(self.pid, Signal::SIGKILL) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(errno) => {
                        log::warn!("killing SMT process {} failed with {errno}", self.pid)
                    }
                }
                Phase::Killed
            }
            Phase::Idle => Phase::Cancelled,
            other => other,
        };
    }

    /// Whether the process was killed or asked to stop.
    pub fn is_killed(&self) -> bool {
        !self.phase.lock().unwrap().is_live()
    }
}

impl SmtProc {
    /// Start a solver and send it the startup options and logic of `cmd`.
    ///
    /// With `tee` set, everything sent to the solver is recorded and can be
    /// written to a `query-<hash>.smt2` file in that directory with
    /// [`SmtProc::save_tee`].
    pub fn new(mut cmd: SolverCmd, tee: Option<&Path>) -> Result<Self> {
        cmd.option("produce-models", "true");
        let mut child = Command::new(&cmd.cmd)
            .args(&cmd.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            _ = child.kill();
            _ = child.wait();
            return Err(SolverError::UnexpectedClose(
                "solver pipes are not available".to_string(),
            ));
        };
        let mut proc = SmtProc {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            tee: tee.map(Tee::new),
            phase: Arc::new(Mutex::new(Phase::Idle)),
        };
        if let Some(tee) = &mut proc.tee {
            tee.record(Sexp::Comment(cmd.cmdline()));
        }
        for (name, val) in &cmd.options {
            proc.send(&app("set-option", [atom_s(format!(":{name}")), atom_s(val)]));
        }
        proc.send(&app("set-logic", [atom_s(&cmd.logic)]));
        // a rejected option or logic shows up here instead of at the first query
        proc.get_info(":name")?;
        Ok(proc)
    }

    /// A handle for cancelling this process.
    pub fn pid(&self) -> SmtPid {
        SmtPid {
            // Child::id always fits in a pid_t
            pid: Pid::from_raw(self.child.id() as i32),
            phase: self.phase.clone(),
        }
    }

    /// Whether the process was killed (or asked to stop) and cannot answer
    /// any more commands.
    pub fn is_terminated(&self) -> bool {
        !self.phase.lock().unwrap().is_live()
    }

    /// If the process has been cancelled, make sure it is dead and reaped and
    /// return [`SolverError::Killed`]. Otherwise move it to `next`, if given.
    fn settle(&mut self, next: Option<Phase>) -> Result<()> {
        let mut phase = self.phase.lock().unwrap();
        match *phase {
            Phase::Idle | Phase::Busy => {
                if let Some(next) = next {
                    *phase = next;
                }
                return Ok(());
            }
            Phase::Cancelled => {
                _ = self.child.kill();
                _ = self.child.wait();
            }
            Phase::Killed => {
                _ = self.child.wait();
            }
            Phase::Exited => {}
        }
        *phase = Phase::Exited;
        Err(SolverError::Killed)
    }

    /// Send a command without waiting for an answer. Commands sent to a
    /// cancelled process are dropped.
    pub fn send(&mut self, cmd: &Sexp) {
        if self.settle(None).is_err() {
            return;
        }
        if let Err(err) = writeln!(self.stdin, "{cmd}") {
            // reported by the next read
            log::debug!("failed to send to solver: {err}");
        }
        if let Some(tee) = &mut self.tee {
            tee.record(cmd.clone());
        }
    }

    /// Read everything the solver prints up to the marker, without the
    /// `success`/`unsupported` acknowledgements of earlier commands.
    fn read_reply(&mut self) -> Result<String> {
        let marker = writeln!(self.stdin, "(echo \"{DONE}\")").and_then(|()| self.stdin.flush());
        if let Err(err) = marker {
            self.settle(None)?;
            return Err(err.into());
        }
        let mut lines = vec![];
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line)? == 0 {
                // closed pipe: killed, crashed, or exited after an error
                self.settle(None)?;
                let output = lines.join("\n");
                return Err(SolverError::UnexpectedClose(
                    error_message(&output).unwrap_or(output),
                ));
            }
            let line = line.trim_end();
            // z3 echoes without quotes
            let unquoted = line.strip_prefix('"').and_then(|l| l.strip_suffix('"'));
            if line == DONE || unquoted == Some(DONE) {
                return Ok(lines.join("\n").trim().to_string());
            }
            if !matches!(line.trim(), "success" | "unsupported") {
                lines.push(line.to_string());
            }
        }
    }

    /// Send a command and parse its answer as one s-expression.
    fn call(&mut self, cmd: &Sexp) -> Result<Sexp> {
        self.send(cmd);
        let reply = self.read_reply()?;
        if let Some(msg) = error_message(&reply) {
            self.settle(None)?;
            return Err(SolverError::UnexpectedClose(msg));
        }
        let mut sexps = sexp::parse_many(&reply)
            .map_err(|err| SolverError::Parse(format!("{err} in {reply}")))?;
        sexps.retain(|s| !matches!(s, Sexp::Comment(_)));
        if sexps.len() != 1 {
            return Err(SolverError::Parse(format!(
                "expected a single s-expression, got {reply}"
            )));
        }
        Ok(sexps.remove(0))
    }

    /// Like a regular command with an answer, but cancellable through an
    /// [`SmtPid`] while it runs.
    pub fn expensive_call(&mut self, cmd: &Sexp) -> Result<Sexp> {
        self.settle(Some(Phase::Busy))?;
        let reply = self.call(cmd);
        self.settle(Some(Phase::Idle))?;
        reply
    }

    /// Check satisfiability of the assertions.
    pub fn check_sat(&mut self) -> Result<SatResp> {
        self.check_sat_assuming(&[])
    }

    /// Check satisfiability under some assumed literals (symbols or their
    /// negations), which do not persist past this check.
    pub fn check_sat_assuming(&mut self, assumptions: &[Sexp]) -> Result<SatResp> {
        let cmd = match assumptions {
            [] => app("check-sat", []),
            _ => app("check-sat-assuming", [sexp_l(assumptions.to_vec())]),
        };
        self.settle(Some(Phase::Busy))?;
        self.send(&cmd);
        let reply = self.read_reply();
        self.settle(Some(Phase::Idle))?;
        let resp = match reply?.as_str() {
            "sat" => SatResp::Sat,
            "unsat" => SatResp::Unsat,
            "unknown" => {
                let reason = match self.get_info(":reason-unknown") {
                    Ok(reason) => reason.to_string(),
                    Err(SolverError::Killed) => return Err(SolverError::Killed),
                    Err(_) => "unknown".to_string(),
                };
                if let Some(file) = self.save_tee() {
                    log::info!("unknown response to {}", file.display());
                }
                SatResp::Unknown(reason)
            }
            other => {
                let other = other.to_string();
                return Err(SolverError::UnexpectedClose(
                    error_message(&other).unwrap_or(other),
                ));
            }
        };
        Ok(resp)
    }

    /// The value of an attribute from `get-info`.
    pub fn get_info(&mut self, attribute: &str) -> Result<Sexp> {
        let reply = self.call(&app("get-info", [atom_s(attribute)]))?;
        match reply.list() {
            Some([key, value]) if key.atom_s() == Some(attribute) => Ok(value.clone()),
            _ => Err(SolverError::Parse(format!(
                "unexpected response to get-info {attribute}: {reply}"
            ))),
        }
    }

    /// The model after a sat answer.
    pub fn get_model(&mut self) -> Result<Sexp> {
        self.expensive_call(&app("get-model", []))
    }

    /// Evaluate terms in the model after a sat answer, as `(term value)`
    /// pairs.
    pub fn get_value(&mut self, terms: &[Sexp]) -> Result<Vec<(Sexp, Sexp)>> {
        let reply = self.call(&app("get-value", [sexp_l(terms.to_vec())]))?;
        let malformed = || SolverError::Parse(format!("malformed get-value response: {reply}"));
        reply
            .list()
            .ok_or_else(malformed)?
            .iter()
            .map(|pair| match pair.list() {
                Some([term, value]) => Ok((term.clone(), value.clone())),
                _ => Err(malformed()),
            })
            .collect()
    }

    /// The names of the assertions in an unsatisfiable core, after an unsat
    /// answer.
    pub fn get_unsat_core(&mut self) -> Result<Vec<Sexp>> {
        match self.call(&app("get-unsat-core", []))? {
            Sexp::List(names) => Ok(names),
            reply => Err(SolverError::Parse(format!(
                "malformed get-unsat-core response: {reply}"
            ))),
        }
    }

    /// Write out everything sent so far, if recording. Returns the file name.
    pub fn save_tee(&self) -> Option<PathBuf> {
        let tee = self.tee.as_ref()?;
        tee.save()
            .map_err(|err| log::warn!("failed to save tee: {err}"))
            .ok()
    }
}

impl Drop for SmtProc {
    fn drop(&mut self) {
        _ = writeln!(self.stdin, "(exit)");
        _ = self.stdin.flush();
        _ = self.child.kill();
        _ = self.child.wait();
        *self.phase.lock().unwrap() = Phase::Exited;
    }
}

/// The message of an `(error "...")` in a reply. Z3 reports some errors
/// ahead of a regular answer, so the whole reply is searched.
fn error_message(reply: &str) -> Option<String> {
    sexp::parse_many(reply)
        .ok()?
        .iter()
        .find_map(|s| match s.app() {
            Some(("error", [msg])) => msg.atom_s().map(str::to_string),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{conf::Dialect, path::solver_path, sexp::parse};
    use std::{sync::mpsc, thread, time::Duration};

    fn start(dialect: Dialect, bin: &str) -> Option<SmtProc> {
        match SmtProc::new(SolverCmd::new(dialect, &solver_path(bin)), None) {
            Ok(proc) => Some(proc),
            Err(err) => {
                eprintln!("could not start {bin} ({err}), skipping test");
                None
            }
        }
    }

    fn script(proc: &mut SmtProc, text: &str) {
        for cmd in sexp::parse_many(text).unwrap() {
            proc.send(&cmd);
        }
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            error_message("(error \"line 1: unknown constant p\")\nsat"),
            Some("line 1: unknown constant p".to_string())
        );
        assert_eq!(error_message("sat"), None);
        assert_eq!(error_message("(("), None);
    }

    #[test]
    fn test_model_and_values() {
        let Some(mut z3) = start(Dialect::Z3, "z3") else { return };
        script(&mut z3, "(declare-const a Int) (assert (> a 41)) (assert (< a 43))");
        assert_eq!(z3.check_sat().unwrap(), SatResp::Sat);
        let values = z3.get_value(&[parse("(* a 2)").unwrap()]).unwrap();
        insta::assert_snapshot!(values[0].1, @"84");
        let model = z3.get_model().unwrap();
        insta::assert_snapshot!(model.without_comments(), @"((define-fun a () Int 42))");
    }

    #[test]
    fn test_assumptions_and_cores() {
        let Some(mut z3) = start(Dialect::Z3, "z3") else { return };
        script(
            &mut z3,
            "(set-option :produce-unsat-cores true)
             (declare-const p Bool) (declare-const q Bool)
             (assert (! (=> p q) :named c1))
             (assert (! (not q) :named c2))",
        );
        assert_eq!(z3.check_sat().unwrap(), SatResp::Sat);
        assert_eq!(z3.check_sat_assuming(&[atom_s("p")]).unwrap(), SatResp::Unsat);
        // assumptions do not persist
        assert_eq!(z3.check_sat().unwrap(), SatResp::Sat);
        script(&mut z3, "(assert (! p :named c3))");
        assert_eq!(z3.check_sat().unwrap(), SatResp::Unsat);
        let mut core = z3
            .get_unsat_core()
            .unwrap()
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        core.sort();
        assert_eq!(core, ["c1", "c2", "c3"]);
    }

    #[test]
    fn test_solver_errors() {
        let Some(mut z3) = start(Dialect::Z3, "z3") else { return };
        script(&mut z3, "(assert undeclared)");
        let err = z3.check_sat().unwrap_err();
        assert!(matches!(err, SolverError::UnexpectedClose(_)), "{err:?}");

        let missing = SolverCmd::new(Dialect::Z3, "/nonexistent/solver/binary");
        assert!(matches!(SmtProc::new(missing, None), Err(SolverError::Io(_))));
    }

    #[test]
    fn test_cvc5_answers() {
        let Some(mut cvc5) = start(Dialect::Cvc5, "cvc5") else { return };
        // cvc5 quotes echoed strings
        script(&mut cvc5, "(declare-const x Int) (assert (or (< x 0)))");
        assert_eq!(cvc5.check_sat().unwrap(), SatResp::Sat);
    }

    #[test]
    fn test_cancel_idle() {
        let Some(mut z3) = start(Dialect::Z3, "z3") else { return };
        let pid = z3.pid();
        pid.kill();
        assert!(pid.is_killed() && z3.is_terminated());
        // commands without an answer are silently dropped
        script(&mut z3, "(declare-const x Int)");
        assert!(matches!(z3.check_sat(), Err(SolverError::Killed)));
        assert!(matches!(z3.get_model(), Err(SolverError::Killed)));
    }

    const HARD: &str = "
        (declare-const a Float32) (declare-const b Float32)
        (assert (not (= (fp.mul RNE (fp.abs a) (fp.abs b)) (fp.abs (fp.mul RNE a b)))))
        (assert (not (fp.isNaN (fp.mul RNE a b))))";

    #[test]
    fn test_cancel_busy() {
        let Some(mut z3) = start(Dialect::Z3, "z3") else { return };
        let pid = z3.pid();
        script(&mut z3, HARD);
        let (send, recv) = mpsc::channel();
        thread::spawn(move || {
            send.send(z3.check_sat()).unwrap();
        });
        thread::sleep(Duration::from_millis(100));
        pid.kill();
        match recv.recv_timeout(Duration::from_secs(5)) {
            Ok(Err(SolverError::Killed)) => {}
            // the check finished before the kill
            Ok(Ok(resp)) => eprintln!("z3 answered {resp:?} before being killed"),
            Ok(Err(err)) => panic!("unexpected error {err}"),
            Err(_) => panic!("killed solver did not return"),
        }
    }
}
