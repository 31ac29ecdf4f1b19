// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Which names may be used for variables and uninterpreted functions.

use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    /// SMT-LIB reserved words and command names. Declaring a symbol with one of
    /// these names would make the query unparsable for text-based solvers.
    static ref RESERVED: HashSet<&'static str> = [
        // reserved words
        "!", "_", "as", "BINARY", "DECIMAL", "exists", "forall", "HEXADECIMAL",
        "let", "match", "NUMERAL", "par", "STRING", "Bool", "continued-execution",
        "error", "immediate-exit", "incomplete", "logic", "memout", "sat",
        "success", "theory", "unknown", "unsupported", "unsat",
        // commands
        "assert", "check-sat", "check-sat-assuming", "declare-const",
        "declare-datatype", "declare-datatypes", "declare-fun", "declare-sort",
        "define-fun", "define-fun-rec", "define-funs-rec", "define-sort", "echo",
        "exit", "get-assertions", "get-assignment", "get-info", "get-model",
        "get-option", "get-proof", "get-unsat-assumptions", "get-unsat-core",
        "get-value", "pop", "push", "reset", "reset-assertions", "set-info",
        "set-logic", "set-option",
    ]
    .into_iter()
    .collect();
}

/// Check whether a name can be used for a variable or uninterpreted function.
///
/// Names must be non-empty, must not contain `|` or `\`, and must not be an
/// SMT-LIB reserved word or command.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['|', '\\']) && !RESERVED.contains(name)
}

/// Turn an arbitrary string into a valid name. [`unescape_name`] inverts it.
///
/// `%`, `|` and `\` are percent-encoded, and empty or reserved names get a
/// `%` prefix.
pub fn escape_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '|' => escaped.push_str("%7c"),
            '\\' => escaped.push_str("%5c"),
            c => escaped.push(c),
        }
    }
    if escaped.is_empty() || RESERVED.contains(escaped.as_str()) {
        escaped.insert(0, '%');
    }
    escaped
}

/// Invert [`escape_name`].
pub fn unescape_name(name: &str) -> String {
    let name = match name.strip_prefix('%') {
        Some(rest) if rest.is_empty() || RESERVED.contains(rest) => rest,
        _ => name,
    };
    let mut unescaped = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(i) = rest.find('%') {
        unescaped.push_str(&rest[..i]);
        let code = rest.get(i + 1..i + 3);
        let decoded = match code {
            Some("25") => Some('%'),
            Some("7c") => Some('|'),
            Some("5c") => Some('\\'),
            _ => None,
        };
        match decoded {
            Some(c) => {
                unescaped.push(c);
                rest = &rest[i + 3..];
            }
            None => {
                unescaped.push('%');
                rest = &rest[i + 1..];
            }
        }
    }
    unescaped.push_str(rest);
    unescaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["x", "x'", "a b", "_x", "Int", "foo@bar", "123", "true"] {
            assert!(is_valid_name(name), "{name} should be valid");
        }
        for name in ["", "a|b", "a\\b", "let", "forall", "assert", "check-sat", "Bool", "_"] {
            assert!(!is_valid_name(name), "{name} should be invalid");
        }
    }

    #[test]
    fn test_escape_roundtrip() {
        for name in ["", "x", "let", "a|b", "a\\b", "\\", "\\let", "%7c", "%", "%let", "push"] {
            let escaped = escape_name(name);
            assert!(is_valid_name(&escaped), "{escaped} is not valid");
            assert_eq!(unescape_name(&escaped), name);
        }
    }
}
