// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Reading SMT-LIB s-expressions back into terms of an [`SmtContext`].
//!
//! Symbols resolve against local bindings (`let`, quantifier binders and
//! `define-fun` parameters) first and then against the context's symbol
//! cache, so a term printed by a solver refers to the same variables as the
//! term that was sent.

use fxhash::FxHashMap;
use itertools::Itertools;
use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::{Num, Zero};

use formula::{
    theories::QuantifierTheory, value::parse_rational, FloatValue, FormulaCreator, FormulaError,
    FunctionKind, Quantifier, RoundingMode, Sort, Value,
};
use smtlib::sexp::{Atom, Sexp};

use super::{term::SmtTerm, SmtContext};

fn malformed(what: &str, s: &Sexp) -> FormulaError {
    FormulaError::InvalidArgument(format!("malformed {what}: {s}"))
}

fn numeral(s: &Sexp) -> Result<u32, FormulaError> {
    s.atom_i()
        .and_then(|i| u32::try_from(i).ok())
        .ok_or_else(|| malformed("index", s))
}

/// Parse an SMT-LIB sort.
pub(crate) fn read_sort(s: &Sexp) -> Result<Sort, FormulaError> {
    if let Some(name) = s.atom_s() {
        return match name {
            "Bool" => Ok(Sort::Boolean),
            "Int" => Ok(Sort::Integer),
            "Real" => Ok(Sort::Rational),
            "RoundingMode" => Ok(Sort::RoundingMode),
            "Float16" => Sort::floating_point(5, 10),
            "Float32" => Ok(Sort::single_precision()),
            "Float64" => Ok(Sort::double_precision()),
            "Float128" => Sort::floating_point(15, 112),
            _ => Err(FormulaError::Unsupported(format!("sort {name}"))),
        };
    }
    match s.app() {
        Some(("_", [kind, width])) if kind.atom_s() == Some("BitVec") => {
            Sort::bitvector(numeral(width)?)
        }
        Some(("_", [kind, exponent, significand])) if kind.atom_s() == Some("FloatingPoint") => {
            let significand = numeral(significand)?;
            if significand < 2 {
                return Err(malformed("sort", s));
            }
            Sort::floating_point(numeral(exponent)?, significand - 1)
        }
        Some(("Array", [index, element])) => {
            Ok(Sort::array(read_sort(index)?, read_sort(element)?))
        }
        _ => Err(malformed("sort", s)),
    }
}

/// The value of a `#b` or `#x` literal.
fn bitvector_literal(s: &str) -> Option<Value> {
    let (radix, digits, bits_per_digit) = if let Some(digits) = s.strip_prefix("#b") {
        (2, digits, 1)
    } else if let Some(digits) = s.strip_prefix("#x") {
        (16, digits, 4)
    } else {
        return None;
    };
    if digits.is_empty() {
        return None;
    }
    let value = BigUint::from_str_radix(digits, radix).ok()?;
    Some(Value::Bitvector {
        width: (digits.len() * bits_per_digit) as u32,
        value,
    })
}

fn simple_kind(name: &str) -> Option<FunctionKind> {
    use FunctionKind::*;
    let kind = match name {
        "and" => And,
        "or" => Or,
        "not" => Not,
        "xor" => Xor,
        "=>" => Implies,
        "ite" => Ite,
        "=" => Eq,
        "distinct" => Distinct,
        "+" => Add,
        "-" => Sub,
        "*" => Mul,
        "div" => Div,
        "mod" => Modulo,
        "<" => Lt,
        "<=" => Lte,
        ">" => Gt,
        ">=" => Gte,
        "to_real" => ToReal,
        "to_int" => Floor,
        "select" => Select,
        "store" => Store,
        "bvneg" => BvNeg,
        "bvadd" => BvAdd,
        "bvsub" => BvSub,
        "bvmul" => BvMul,
        "bvudiv" => BvUdiv,
        "bvsdiv" => BvSdiv,
        "bvurem" => BvUrem,
        "bvsrem" => BvSrem,
        "bvnot" => BvNot,
        "bvand" => BvAnd,
        "bvor" => BvOr,
        "bvxor" => BvXor,
        "bvshl" => BvShl,
        "bvlshr" => BvLshr,
        "bvashr" => BvAshr,
        "concat" => BvConcat,
        "bvult" => BvUlt,
        "bvule" => BvUle,
        "bvugt" => BvUgt,
        "bvuge" => BvUge,
        "bvslt" => BvSlt,
        "bvsle" => BvSle,
        "bvsgt" => BvSgt,
        "bvsge" => BvSge,
        "bv2nat" => BvToNat,
        "fp.neg" => FpNeg,
        "fp.abs" => FpAbs,
        "fp.max" => FpMax,
        "fp.min" => FpMin,
        "fp.sqrt" => FpSqrt,
        "fp.add" => FpAdd,
        "fp.sub" => FpSub,
        "fp.mul" => FpMul,
        "fp.div" => FpDiv,
        "fp.roundToIntegral" => FpRoundToIntegral,
        "fp.eq" => FpEq,
        "fp.lt" => FpLt,
        "fp.leq" => FpLe,
        "fp.gt" => FpGt,
        "fp.geq" => FpGe,
        "fp.isNaN" => FpIsNan,
        "fp.isInfinite" => FpIsInfinite,
        "fp.isZero" => FpIsZero,
        "fp.isSubnormal" => FpIsSubnormal,
        "fp.isNormal" => FpIsNormal,
        "fp.isNegative" => FpIsNegative,
        "fp.to_real" => FpToReal,
        "fp.to_ieee_bv" => FpToIeeeBv,
        _ => return None,
    };
    Some(kind)
}

/// Operators that SMT-LIB allows with more arguments than the formula API
/// does, and how to reduce them.
enum Chain {
    LeftAssoc,
    RightAssoc,
    Pairwise,
}

fn chain(kind: &FunctionKind) -> Option<Chain> {
    use FunctionKind::*;
    match kind {
        Xor | Div | BvAdd | BvMul | BvAnd | BvOr | BvXor | BvConcat => Some(Chain::LeftAssoc),
        Implies => Some(Chain::RightAssoc),
        Lt | Lte | Gt | Gte => Some(Chain::Pairwise),
        _ => None,
    }
}

struct Definition {
    params: Vec<String>,
    body: Sexp,
}

/// Reads terms and scripts into one context.
pub(crate) struct Reader<'a> {
    ctx: &'a SmtContext,
    scopes: Vec<(String, SmtTerm)>,
    definitions: FxHashMap<String, Definition>,
    undeclared: Option<Sort>,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(ctx: &'a SmtContext) -> Self {
        Reader {
            ctx,
            scopes: vec![],
            definitions: FxHashMap::default(),
            undeclared: None,
        }
    }

    /// Treat unknown symbols as fresh variables of the given sort, for
    /// solver output that introduces auxiliary symbols.
    pub(crate) fn with_undeclared(mut self, sort: Sort) -> Self {
        self.undeclared = Some(sort);
        self
    }

    fn lookup(&self, name: &str) -> Option<SmtTerm> {
        self.scopes
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, t)| t.clone())
    }

    fn constant(&self, value: Value) -> Result<SmtTerm, FormulaError> {
        self.ctx.constant(value)
    }

    fn symbol(&mut self, name: &str) -> Result<SmtTerm, FormulaError> {
        if let Some(t) = self.lookup(name) {
            return Ok(t);
        }
        match name {
            "true" => return self.constant(Value::Bool(true)),
            "false" => return self.constant(Value::Bool(false)),
            _ => {}
        }
        if self.definitions.contains_key(name) {
            return self.apply_named(name, vec![]);
        }
        if let Some(var) = self.ctx.symbols().variable(name) {
            return Ok(var.into_term());
        }
        if let Some(decl) = self.ctx.symbols().function(name) {
            if decl.arg_sorts.is_empty() {
                return self.ctx.apply_function(&decl, &[]);
            }
        }
        if let Some(rm) = RoundingMode::from_smt_name(name) {
            return self.constant(Value::RoundingMode(rm));
        }
        if let Some(bv) = bitvector_literal(name) {
            return self.constant(bv);
        }
        if let Some(sort) = &self.undeclared {
            let sort = sort.clone();
            return Ok(self.ctx.variable(&sort, name)?.into_term());
        }
        Err(FormulaError::InvalidArgument(format!("unknown symbol {name}")))
    }

    /// Read one term.
    pub(crate) fn term(&mut self, s: &Sexp) -> Result<SmtTerm, FormulaError> {
        let ss = match s {
            Sexp::Atom(Atom::I(i)) => return self.constant(Value::Int(BigInt::from(i.clone()))),
            Sexp::Atom(Atom::D(d)) => {
                let r = parse_rational(d).ok_or_else(|| malformed("decimal", s))?;
                return self.constant(Value::Rational(r));
            }
            Sexp::Atom(Atom::S(name)) => return self.symbol(name),
            Sexp::Comment(_) => return Err(malformed("term", s)),
            Sexp::List(ss) => ss,
        };
        let Some((head, args)) = ss.split_first() else {
            return Err(malformed("term", s));
        };
        match head {
            Sexp::Atom(Atom::S(head)) => match head.as_str() {
                "let" => self.let_binding(s, args),
                "forall" | "exists" => {
                    let quantifier = if head == "forall" {
                        Quantifier::Forall
                    } else {
                        Quantifier::Exists
                    };
                    self.quantifier(s, quantifier, args)
                }
                "!" => match args.first() {
                    Some(t) => self.term(t),
                    None => Err(malformed("annotation", s)),
                },
                "_" => self.indexed_constant(s, args),
                "as" => match args {
                    [t, _] if t.atom_s() != Some("const") => self.term(t),
                    _ => Err(malformed("term", s)),
                },
                "fp" => self.float_literal(s, args),
                _ => {
                    let args = args.iter().map(|a| self.term(a)).collect::<Result<Vec<_>, _>>()?;
                    self.apply_named(head, args)
                }
            },
            Sexp::List(_) => {
                let kind = self.indexed_kind(head, args.len())?;
                let args = args.iter().map(|a| self.term(a)).collect::<Result<Vec<_>, _>>()?;
                self.ctx.builtin(&kind, &args)
            }
            _ => Err(malformed("term", s)),
        }
    }

    fn let_binding(&mut self, s: &Sexp, args: &[Sexp]) -> Result<SmtTerm, FormulaError> {
        let [bindings, body] = args else {
            return Err(malformed("let", s));
        };
        let bindings = bindings.list().ok_or_else(|| malformed("let", s))?;
        // let binds in parallel, so read every value before binding any name
        let mut bound = vec![];
        for binding in bindings {
            match binding.list() {
                Some([name, value]) => {
                    let name = name.atom_s().ok_or_else(|| malformed("let", s))?;
                    bound.push((name.to_string(), self.term(value)?));
                }
                _ => return Err(malformed("let", s)),
            }
        }
        let n = bound.len();
        self.scopes.extend(bound);
        let body = self.term(body);
        self.scopes.truncate(self.scopes.len() - n);
        body
    }

    fn quantifier(
        &mut self,
        s: &Sexp,
        quantifier: Quantifier,
        args: &[Sexp],
    ) -> Result<SmtTerm, FormulaError> {
        let [binders, body] = args else {
            return Err(malformed("quantifier", s));
        };
        let binders = binders.list().ok_or_else(|| malformed("quantifier", s))?;
        let mut vars = vec![];
        for binder in binders {
            match binder.list() {
                Some([name, sort]) => {
                    let name = name.atom_s().ok_or_else(|| malformed("binder", binder))?;
                    let var = self.ctx.make_variable(&read_sort(sort)?, name)?;
                    vars.push((name.to_string(), var));
                }
                _ => return Err(malformed("binder", binder)),
            }
        }
        let bound = vars.iter().map(|(_, v)| v.clone()).collect_vec();
        let n = vars.len();
        self.scopes.extend(vars);
        let body = self.term(body);
        self.scopes.truncate(self.scopes.len() - n);
        self.ctx.mk_quantifier(quantifier, &bound, &body?)
    }

    fn indexed_constant(&mut self, s: &Sexp, args: &[Sexp]) -> Result<SmtTerm, FormulaError> {
        let Some((name, indices)) = args.split_first() else {
            return Err(malformed("indexed constant", s));
        };
        let name = name.atom_s().ok_or_else(|| malformed("indexed constant", s))?;
        if let (Some(digits), [width]) = (name.strip_prefix("bv"), indices) {
            let value = digits
                .parse::<BigUint>()
                .map_err(|_| malformed("bitvector constant", s))?;
            let width = numeral(width)?;
            Sort::bitvector(width)?;
            return self.constant(Value::Bitvector { width, value });
        }
        let [exponent, significand] = indices else {
            return Err(malformed("indexed constant", s));
        };
        let (e, m) = (numeral(exponent)?, numeral(significand)?.saturating_sub(1));
        Sort::floating_point(e, m)?;
        let value = match name {
            "+oo" => FloatValue::infinity(e, m, false),
            "-oo" => FloatValue::infinity(e, m, true),
            "+zero" => FloatValue::zero(e, m, false),
            "-zero" => FloatValue::zero(e, m, true),
            "NaN" => FloatValue::nan(e, m),
            _ => return Err(malformed("indexed constant", s)),
        };
        self.constant(Value::Float(value))
    }

    fn float_literal(&mut self, s: &Sexp, args: &[Sexp]) -> Result<SmtTerm, FormulaError> {
        let [sign, exponent, significand] = args else {
            return Err(malformed("floating point literal", s));
        };
        let parts = [sign, exponent, significand]
            .into_iter()
            .map(|a| self.term(a))
            .collect::<Result<Vec<_>, _>>()?;
        let widths = parts
            .iter()
            .map(|p| p.sort().bitvector_width())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| malformed("floating point literal", s))?;
        let (e, m) = (widths[1], widths[2]);
        let bits = |i: usize| match parts[i].constant() {
            Some(Value::Bitvector { value, .. }) => Some(value.clone()),
            _ => None,
        };
        if let (Some(sign), Some(exponent), Some(significand)) = (bits(0), bits(1), bits(2)) {
            return self.constant(Value::Float(FloatValue {
                exponent_width: e,
                mantissa_width: m,
                negative: !sign.is_zero(),
                exponent,
                significand,
            }));
        }
        // a non-literal (fp s e m) is the IEEE reinterpretation of the bits
        let em = self.ctx.builtin(&FunctionKind::BvConcat, &parts[1..])?;
        let bits = self
            .ctx
            .builtin(&FunctionKind::BvConcat, &[parts[0].clone(), em])?;
        self.ctx.builtin(
            &FunctionKind::FpFromIeeeBv {
                exponent: e,
                mantissa: m,
            },
            &[bits],
        )
    }

    fn indexed_kind(&self, head: &Sexp, arity: usize) -> Result<FunctionKind, FormulaError> {
        let err = || malformed("indexed operator", head);
        if let Some(("as", [konst, sort])) = head.app() {
            if konst.atom_s() == Some("const") {
                let sort = read_sort(sort)?;
                let (index, _) = sort.array_sorts().ok_or_else(err)?;
                return Ok(FunctionKind::ConstArray(index.clone()));
            }
        }
        let Some(("_", [name, indices @ ..])) = head.app() else {
            return Err(err());
        };
        let indices = indices.iter().map(numeral).collect::<Result<Vec<_>, _>>()?;
        let name = name.atom_s().ok_or_else(err)?;
        let kind = match (name, indices.as_slice()) {
            ("extract", [msb, lsb]) => FunctionKind::BvExtract {
                msb: *msb,
                lsb: *lsb,
            },
            ("zero_extend", [n]) => FunctionKind::BvZeroExtend(*n),
            ("sign_extend", [n]) => FunctionKind::BvSignExtend(*n),
            ("int2bv", [w]) | ("nat2bv", [w]) => FunctionKind::NatToBv(*w),
            ("fp.to_ubv", [w]) => FunctionKind::FpToUbv(*w),
            ("fp.to_sbv", [w]) => FunctionKind::FpToSbv(*w),
            ("to_fp", [e, s]) if *s >= 2 => {
                let (exponent, mantissa) = (*e, s - 1);
                if arity == 1 {
                    FunctionKind::FpFromIeeeBv { exponent, mantissa }
                } else {
                    FunctionKind::FpToFp { exponent, mantissa }
                }
            }
            ("to_fp_unsigned", [e, s]) if *s >= 2 => FunctionKind::FpToFpUnsigned {
                exponent: *e,
                mantissa: s - 1,
            },
            _ => return Err(err()),
        };
        Ok(kind)
    }

    /// Convert integer operands of a mixed arithmetic operation to reals.
    fn lift_to_real(&self, args: Vec<SmtTerm>) -> Result<Vec<SmtTerm>, FormulaError> {
        args.into_iter()
            .map(|a| match a.constant() {
                Some(Value::Int(i)) => {
                    self.constant(Value::Rational(BigRational::from_integer(i.clone())))
                }
                _ if a.sort() == &Sort::Integer => self.ctx.builtin(&FunctionKind::ToReal, &[a]),
                _ => Ok(a),
            })
            .collect()
    }

    fn apply_named(&mut self, name: &str, args: Vec<SmtTerm>) -> Result<SmtTerm, FormulaError> {
        if let Some(def) = self.definitions.get(name) {
            if def.params.len() != args.len() {
                return Err(FormulaError::InvalidArgument(format!(
                    "{name} expects {} arguments but got {}",
                    def.params.len(),
                    args.len()
                )));
            }
            let body = def.body.clone();
            // a definition's body only sees its own parameters
            let outer = std::mem::take(&mut self.scopes);
            self.scopes = def.params.iter().cloned().zip(args).collect();
            let result = self.term(&body);
            self.scopes = outer;
            return result;
        }

        if name == "/" {
            // real division, whatever the sorts of the operands
            let args = self.lift_to_real(args)?;
            return self.apply_builtin(FunctionKind::Div, args);
        }
        if let Some(kind) = simple_kind(name) {
            return self.apply_builtin(kind, args);
        }

        if let Some(decl) = self.ctx.symbols().function(name) {
            let args = args
                .into_iter()
                .map(|a| self.ctx.encapsulate_with_type_of(a))
                .collect_vec();
            return Ok(self.ctx.make_application(&decl, &args)?.into_term());
        }
        Err(FormulaError::InvalidArgument(format!(
            "unknown function {name}"
        )))
    }

    fn apply_builtin(
        &mut self,
        kind: FunctionKind,
        args: Vec<SmtTerm>,
    ) -> Result<SmtTerm, FormulaError> {
        use FunctionKind::*;
        let kind = match kind {
            Sub if args.len() == 1 => Uminus,
            kind => kind,
        };
        let mixed = args.iter().any(|a| a.sort() == &Sort::Rational)
            && args.iter().any(|a| a.sort() == &Sort::Integer);
        let args = match kind {
            Add | Sub | Mul | Lt | Lte | Gt | Gte | Eq | Distinct if mixed => {
                self.lift_to_real(args)?
            }
            Div if mixed => self.lift_to_real(args)?,
            _ => args,
        };

        // fold the negative and fractional constants solvers print as values
        match (&kind, args.as_slice()) {
            (Uminus, [a]) => match a.constant() {
                Some(Value::Int(i)) => return self.constant(Value::Int(-i.clone())),
                Some(Value::Rational(r)) => return self.constant(Value::Rational(-r.clone())),
                _ => {}
            },
            (Div, [a, b]) if a.sort() == &Sort::Rational => {
                if let (Some(Value::Rational(n)), Some(Value::Rational(d))) =
                    (a.constant(), b.constant())
                {
                    if !d.is_zero() {
                        return self.constant(Value::Rational(n / d));
                    }
                }
            }
            _ => {}
        }

        if args.len() > 2 {
            match chain(&kind) {
                Some(Chain::LeftAssoc) => {
                    let mut args = args.into_iter();
                    let first = args.next().ok_or_else(|| {
                        FormulaError::InvalidArgument(format!("{kind:?} without arguments"))
                    })?;
                    return args.try_fold(first, |acc, a| self.ctx.builtin(&kind, &[acc, a]));
                }
                Some(Chain::RightAssoc) => {
                    let mut args = args.into_iter().rev();
                    let last = args.next().ok_or_else(|| {
                        FormulaError::InvalidArgument(format!("{kind:?} without arguments"))
                    })?;
                    return args.try_fold(last, |acc, a| self.ctx.builtin(&kind, &[a, acc]));
                }
                Some(Chain::Pairwise) => {
                    let pairs = args
                        .iter()
                        .tuple_windows()
                        .map(|(a, b)| self.ctx.builtin(&kind, &[a.clone(), b.clone()]))
                        .collect::<Result<Vec<_>, _>>()?;
                    return self.ctx.builtin(&FunctionKind::And, &pairs);
                }
                None => {}
            }
        }
        self.ctx.builtin(&kind, &args)
    }

    /// Read a script and return the conjunction of its assertions.
    pub(crate) fn script(&mut self, commands: &[Sexp]) -> Result<SmtTerm, FormulaError> {
        let mut assertions = vec![];
        for command in commands {
            if matches!(command, Sexp::Comment(_)) {
                continue;
            }
            let command = command.without_comments();
            let Some((head, args)) = command.app() else {
                return Err(malformed("command", &command));
            };
            match (head, args) {
                ("declare-const", [name, sort]) => {
                    let name = name.atom_s().ok_or_else(|| malformed("declaration", &command))?;
                    self.ctx.variable(&read_sort(sort)?, name)?;
                }
                ("declare-fun", [name, Sexp::List(params), sort]) if params.is_empty() => {
                    let name = name.atom_s().ok_or_else(|| malformed("declaration", &command))?;
                    self.ctx.variable(&read_sort(sort)?, name)?;
                }
                ("declare-fun", [name, Sexp::List(params), sort]) => {
                    let name = name.atom_s().ok_or_else(|| malformed("declaration", &command))?;
                    let params = params.iter().map(read_sort).collect::<Result<Vec<_>, _>>()?;
                    self.ctx.declare_uf(name, &params, &read_sort(sort)?)?;
                }
                ("define-fun", [name, Sexp::List(params), _sort, body]) => {
                    let name = name.atom_s().ok_or_else(|| malformed("definition", &command))?;
                    let params = params
                        .iter()
                        .map(|p| match p.list() {
                            Some([param, _]) => param.atom_s().map(|s| s.to_string()),
                            _ => None,
                        })
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| malformed("definition", &command))?;
                    self.definitions.insert(
                        name.to_string(),
                        Definition {
                            params,
                            body: body.clone(),
                        },
                    );
                }
                ("assert", [t]) => {
                    let t = self.term(t)?;
                    FormulaError::expect_sort(&Sort::Boolean, t.sort())?;
                    assertions.push(t);
                }
                ("declare-sort" | "define-sort" | "declare-datatype" | "declare-datatypes"
                | "define-fun-rec" | "define-funs-rec", _) => {
                    return Err(FormulaError::Unsupported(format!("SMT-LIB command {head}")))
                }
                (
                    "push" | "pop" | "check-sat" | "check-sat-assuming" | "exit" | "echo"
                    | "reset-assertions",
                    _,
                ) => {}
                _ if head.starts_with("set-") || head.starts_with("get-") => {}
                _ => return Err(malformed("command", &command)),
            }
        }
        match assertions.len() {
            0 => self.constant(Value::Bool(true)),
            1 => Ok(assertions.remove(0)),
            _ => self.ctx.builtin(&FunctionKind::And, &assertions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smtlib::sexp::parse;

    fn read(ctx: &SmtContext, s: &str) -> Result<SmtTerm, FormulaError> {
        ctx.read(&parse(s).unwrap())
    }

    #[test]
    fn test_sorts() {
        let sorts = [
            "Bool",
            "(_ BitVec 12)",
            "(_ FloatingPoint 11 53)",
            "Float32",
            "(Array Int (Array (_ BitVec 2) Real))",
        ]
        .map(|s| read_sort(&parse(s).unwrap()).unwrap().to_string());
        insta::assert_snapshot!(sorts.join("\n"), @r###"
        Bool
        (_ BitVec 12)
        (_ FloatingPoint 11 53)
        (_ FloatingPoint 8 24)
        (Array Int (Array (_ BitVec 2) Real))
        "###);
        assert!(read_sort(&parse("U").unwrap()).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_values() {
        let ctx = SmtContext::for_tests();
        let value = |s: &str| read(&ctx, s).unwrap().constant().cloned().unwrap();
        assert_eq!(value("(- 7)"), Value::Int((-7).into()));
        assert_eq!(
            value("(/ 1.0 4.0)"),
            Value::Rational(BigRational::new(1.into(), 4.into()))
        );
        assert_eq!(
            value("(- (/ 3 2))"),
            Value::Rational(BigRational::new((-3).into(), 2.into()))
        );
        assert_eq!(
            value("#x0f"),
            Value::Bitvector {
                width: 8,
                value: 15u32.into()
            }
        );
        assert_eq!(value("(_ bv3 4)"), value("#b0011"));
        assert_eq!(
            value("(fp #b1 #b01111111 #b10000000000000000000000)"),
            Value::Float(FloatValue::from_f64(8, 23, -1.5).unwrap())
        );
        assert_eq!(
            value("(_ -oo 8 24)"),
            Value::Float(FloatValue::infinity(8, 23, true))
        );
        assert_eq!(
            value("roundTowardZero"),
            Value::RoundingMode(RoundingMode::TowardZero)
        );
    }

    #[test]
    fn test_let_and_quantifiers() {
        let ctx = SmtContext::for_tests();
        let x = ctx.variable(&Sort::Integer, "x").unwrap();
        let t = read(
            &ctx,
            "(let ((a (+ x 1)) (x 5)) (forall ((y Int)) (! (=> (< a y) (> y x)) :named q)))",
        )
        .unwrap();
        // the let-bound x shadows the variable, the inner a does not see it
        insta::assert_snapshot!(t, @"(forall ((y Int)) (=> (< (+ x 1) y) (> y 5)))");
        assert!(!ctx.free_symbols([&t]).iter().any(|s| s.name == "y"));
        assert_eq!(ctx.free_symbols([&t])[0].name, "x");
        assert_eq!(x.sort(), &Sort::Integer);

        let chained = read(&ctx, "(< 1 x 3)").unwrap();
        insta::assert_snapshot!(chained, @"(and (< 1 x) (< x 3))");
        let mixed = read(&ctx, "(+ x 0.5)").unwrap();
        insta::assert_snapshot!(mixed, @"(+ (to_real x) (/ 1.0 2.0))");
    }

    #[test]
    fn test_unknown_symbols() {
        let ctx = SmtContext::for_tests();
        assert!(read(&ctx, "(and k!0 true)").is_err());
        let t = Reader::new(&ctx)
            .with_undeclared(Sort::Boolean)
            .term(&parse("(or k!0 (not k!1))").unwrap())
            .unwrap();
        assert_eq!(t.sort(), &Sort::Boolean);
        assert!(ctx.symbols().variable("k!1").is_some());
    }
}
