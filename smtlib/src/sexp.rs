// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! S-expressions as exchanged with SMT-LIB solvers.
//!
//! Comments are part of the data type: some solvers (CVC5 in particular)
//! interleave them with the definitions of a model.

use num_bigint::BigUint;
use peg::str::LineCol;
use serde::Serialize;
use std::fmt;

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
pub enum Atom {
    /// A numeral
    I(BigUint),
    /// A decimal, kept as written so `1.50` prints back unchanged
    D(String),
    /// A symbol, keyword, string literal, or `#b`/`#x` literal
    S(String),
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
pub enum Sexp {
    Atom(Atom),
    Comment(String),
    List(Vec<Sexp>),
}

/// The error returned for text that is not a sequence of s-expressions.
pub type ParseError = peg::error::ParseError<LineCol>;

/// A symbol (or string) atom.
pub fn atom_s<S: AsRef<str>>(s: S) -> Sexp {
    Sexp::Atom(Atom::S(s.as_ref().to_owned()))
}

/// A numeral atom.
pub fn atom_i<I: Into<BigUint>>(i: I) -> Sexp {
    Sexp::Atom(Atom::I(i.into()))
}

/// A list of the given elements.
pub fn sexp_l<I: IntoIterator<Item = Sexp>>(items: I) -> Sexp {
    Sexp::List(items.into_iter().collect())
}

/// The list `(head args..)`.
pub fn app<I: IntoIterator<Item = Sexp>>(head: &str, args: I) -> Sexp {
    sexp_l(std::iter::once(atom_s(head)).chain(args))
}

const SYMBOL_PUNCTUATION: &str = "_'<>:=$@+-*/#~&^?!%.";

fn needs_pipes(s: &str) -> bool {
    match s.chars().next() {
        None => true,
        Some(c) if c.is_ascii_digit() => true,
        Some(_) => s.chars().any(|c| {
            let plain =
                c.is_ascii_alphanumeric() || SYMBOL_PUNCTUATION.contains(c) || !c.is_ascii();
            c == '\'' || !plain
        }),
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::I(n) => write!(f, "{n}"),
            Atom::D(d) => f.write_str(d),
            // a pipe cannot appear inside |...|, fall back to a string literal
            Atom::S(s) if s.contains('|') => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Atom::S(s) if needs_pipes(s) => write!(f, "|{s}|"),
            Atom::S(s) => f.write_str(s),
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(a) => write!(f, "{a}"),
            Sexp::Comment(c) => write!(f, ";{c}"),
            Sexp::List(items) => {
                f.write_str("(")?;
                let mut after_comment = true;
                for item in items {
                    // comments run to the end of the line, so they get lines of
                    // their own and no separating spaces
                    if let Sexp::Comment(_) = item {
                        write!(f, "\n{item}\n")?;
                        after_comment = true;
                        continue;
                    }
                    if !after_comment {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                    after_comment = false;
                }
                f.write_str(")")
            }
        }
    }
}

impl Sexp {
    /// The elements of a list.
    pub fn list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(items) => Some(items),
            _ => None,
        }
    }

    /// The text of a symbol or string atom.
    pub fn atom_s(&self) -> Option<&str> {
        match self {
            Sexp::Atom(Atom::S(s)) => Some(s),
            _ => None,
        }
    }

    /// The value of a numeral.
    pub fn atom_i(&self) -> Option<&BigUint> {
        match self {
            Sexp::Atom(Atom::I(n)) => Some(n),
            _ => None,
        }
    }

    /// Split `(head args..)` into its head symbol and arguments.
    pub fn app(&self) -> Option<(&str, &[Sexp])> {
        let (head, args) = self.list()?.split_first()?;
        Some((head.atom_s()?, args))
    }

    /// A copy with comments removed at every depth.
    pub fn without_comments(&self) -> Sexp {
        match self {
            Sexp::List(items) => sexp_l(
                items
                    .iter()
                    .filter(|item| !matches!(item, Sexp::Comment(_)))
                    .map(Sexp::without_comments),
            ),
            _ => self.clone(),
        }
    }
}

peg::parser! {
grammar smt2() for str {
  rule ws() = quiet!{ [' ' | '\t' | '\r' | '\n']* }

  rule symbol_start() = [c if c.is_ascii_alphabetic() || SYMBOL_PUNCTUATION.contains(c)]
  rule symbol_char() = symbol_start() / ['0'..='9']
  rule digits() = ['0'..='9']+

  rule symbol() -> Atom
    = s:$(quiet!{ symbol_start() symbol_char()* } / expected!("symbol")) { Atom::S(s.to_owned()) }

  rule quoted_symbol() -> Atom
    = "|" s:$([^'|']*) "|" { Atom::S(s.to_owned()) }

  // "" is an escaped quote inside a string literal
  rule string() -> Atom
    = "\"" s:$(([^'"'] / "\"\"")*) "\"" { Atom::S(s.replace("\"\"", "\"")) }

  rule decimal() -> Atom
    = d:$(digits() "." digits()) { Atom::D(d.to_owned()) }

  rule numeral() -> Atom
    = n:$(digits()) {? n.parse().or(Err("numeral")).map(Atom::I) }

  rule atom() -> Atom
    = string() / quoted_symbol() / decimal() / numeral() / symbol()

  rule comment() -> Sexp
    = ";" c:$([^'\n']*) ("\n" / ![_]) { Sexp::Comment(c.to_owned()) }

  rule sexp() -> Sexp
    = a:atom() { Sexp::Atom(a) }
    / comment()
    / "(" ws() items:(sexp() ** ws()) ws() ")" { Sexp::List(items) }

  pub rule one() -> Sexp
    = ws() s:sexp() ws() { s }

  pub rule many() -> Vec<Sexp>
    = ws() ss:(sexp() ** ws()) ws() { ss }
}
}

/// Parse a single s-expression, with optional surrounding whitespace.
pub fn parse(s: &str) -> Result<Sexp, ParseError> {
    smt2::one(s)
}

/// Parse a whitespace-separated sequence of s-expressions, such as a script.
pub fn parse_many(s: &str) -> Result<Vec<Sexp>, ParseError> {
    smt2::many(s)
}
