// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A transcript of the commands sent to a solver, saved as a replayable
//! `.smt2` file for debugging.

use std::{
    collections::hash_map::DefaultHasher,
    fs,
    hash::{Hash, Hasher},
    io,
    path::{Path, PathBuf},
};

use crate::sexp::Sexp;

#[derive(Debug)]
pub struct Tee {
    dir: PathBuf,
    commands: Vec<Sexp>,
}

impl Tee {
    /// An empty transcript, saved into `dir`.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Tee {
            dir: dir.as_ref().to_owned(),
            commands: vec![],
        }
    }

    pub fn record(&mut self, command: Sexp) {
        self.commands.push(command);
    }

    fn render(&self) -> String {
        let lines: Vec<String> = self
            .commands
            .iter()
            .map(|command| match command {
                Sexp::Comment(c) => format!(";; {c}"),
                _ => command.to_string(),
            })
            .collect();
        lines.join("\n")
    }

    /// Write the transcript to `query-<hash>.smt2`, named after its contents
    /// so identical queries share a file. Returns the file name.
    pub fn save(&self) -> io::Result<PathBuf> {
        let text = self.render();
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let name = PathBuf::from(format!("query-{:08x}.smt2", hasher.finish() >> 32));
        fs::write(self.dir.join(&name), text)?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::Tee;
    use crate::sexp::{app, atom_s, Sexp};
    use std::fs;

    #[test]
    fn test_transcript() {
        let dir = std::env::temp_dir().join(format!("smtlib-tee-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let mut tee = Tee::new(&dir);
        tee.record(Sexp::Comment("z3 -in -smt2".to_string()));
        tee.record(app("declare-const", [atom_s("x"), atom_s("Int")]));
        let name = tee.save().unwrap();
        assert_eq!(tee.save().unwrap(), name);
        assert_eq!(name.to_string_lossy().len(), "query-01234567.smt2".len());
        insta::assert_snapshot!(fs::read_to_string(dir.join(&name)).unwrap(), @r###"
        ;; z3 -in -smt2
        (declare-const x Int)
        "###);

        tee.record(app("check-sat", []));
        assert_ne!(tee.save().unwrap(), name);
        fs::remove_dir_all(&dir).unwrap();
    }
}
