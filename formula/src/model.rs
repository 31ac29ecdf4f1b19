// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Satisfying assignments returned by a prover.

use itertools::Itertools;
use std::fmt;

use crate::{error::FormulaError, formula::Formula, value::Value};

/// The value of one variable, or of one uninterpreted function at one point.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ValueAssignment<T> {
    /// The assigned term: a variable, or a UF applied to `arg_values`
    pub key: Formula<T>,
    /// `value` as a formula over the same backend
    pub value_formula: Formula<T>,
    /// The name of the variable or function
    pub name: String,
    /// The value assigned
    pub value: Value,
    /// Argument values for UF points; empty for variables
    pub arg_values: Vec<Value>,
}

impl<T> ValueAssignment<T> {
    /// Whether this entry belongs to an uninterpreted function.
    pub fn is_function(&self) -> bool {
        !self.arg_values.is_empty()
    }
}

impl<T> fmt::Display for ValueAssignment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.arg_values.is_empty() {
            write!(f, "{} := {}", self.name, self.value)
        } else {
            write!(
                f,
                "{}({}) := {}",
                self.name,
                self.arg_values.iter().join(", "),
                self.value
            )
        }
    }
}

/// A model is a list of assignments, in the order the prover reported them.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Model<T> {
    assignments: Vec<ValueAssignment<T>>,
}

impl<T> Default for Model<T> {
    fn default() -> Self {
        Model {
            assignments: vec![],
        }
    }
}

impl<T> Model<T> {
    /// A model with these assignments.
    pub fn new(assignments: Vec<ValueAssignment<T>>) -> Self {
        Model { assignments }
    }

    /// The assignments, in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ValueAssignment<T>> {
        self.assignments.iter()
    }

    /// The number of assignments.
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Whether the model assigns nothing.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// The value of the variable `name`, if the model assigns it.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.assignments
            .iter()
            .find(|a| a.name == name && a.arg_values.is_empty())
            .map(|a| &a.value)
    }

    /// Change the backend of every formula in the model.
    pub fn try_map<U, F>(&self, mut f: F) -> Result<Model<U>, FormulaError>
    where
        F: FnMut(&Formula<T>) -> Result<Formula<U>, FormulaError>,
    {
        let assignments = self
            .assignments
            .iter()
            .map(|a| {
                Ok(ValueAssignment {
                    key: f(&a.key)?,
                    value_formula: f(&a.value_formula)?,
                    name: a.name.clone(),
                    value: a.value.clone(),
                    arg_values: a.arg_values.clone(),
                })
            })
            .collect::<Result<Vec<_>, FormulaError>>()?;
        Ok(Model { assignments })
    }
}

impl<T: PartialEq> Model<T> {
    /// The value assigned to exactly this term, if any.
    pub fn value_of(&self, key: &Formula<T>) -> Option<&Value> {
        self.assignments
            .iter()
            .find(|a| &a.key == key)
            .map(|a| &a.value)
    }
}

impl<T> fmt::Display for Model<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for a in &self.assignments {
            writeln!(f, "{a}")?;
        }
        Ok(())
    }
}

impl<T> IntoIterator for Model<T> {
    type Item = ValueAssignment<T>;
    type IntoIter = std::vec::IntoIter<ValueAssignment<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.assignments.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Model<T> {
    type Item = &'a ValueAssignment<T>;
    type IntoIter = std::slice::Iter<'a, ValueAssignment<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.assignments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;
    use crate::{FormulaManager, Sort};
    use std::sync::Arc;

    #[test]
    fn test_model_display_and_lookup() {
        let ctx = Arc::new(TestContext::new());
        let fmgr = FormulaManager::new(ctx, Default::default());
        let imgr = fmgr.integer();
        let x = imgr.make_variable("x").unwrap();
        let three = imgr.make_number(3).unwrap();
        let f = fmgr
            .uf()
            .declare_and_call_uf("f", &Sort::Integer, &[three.clone()])
            .unwrap();
        let seven = imgr.make_number(7).unwrap();
        let model = Model::new(vec![
            ValueAssignment {
                key: x.clone(),
                value_formula: three.clone(),
                name: "x".to_string(),
                value: Value::Int(3.into()),
                arg_values: vec![],
            },
            ValueAssignment {
                key: f.clone(),
                value_formula: seven,
                name: "f".to_string(),
                value: Value::Int(7.into()),
                arg_values: vec![Value::Int(3.into())],
            },
        ]);
        assert_eq!(model.len(), 2);
        assert_eq!(model.get("x"), Some(&Value::Int(3.into())));
        assert_eq!(model.get("f"), None);
        assert_eq!(model.value_of(&f), Some(&Value::Int(7.into())));
        assert!(model.iter().any(|a| a.is_function()));
        insta::assert_display_snapshot!(model, @r###"
        x := 3
        f(3) := 7
        "###);

        let same = model.try_map(|f| Ok(f.clone())).unwrap();
        assert_eq!(same, model);
    }
}
