// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Values of constants and model entries.

use num_bigint::{BigInt, BigUint, Sign};
use num_rational::BigRational;
use num_traits::{One, ToPrimitive, Zero};
use serde::Serialize;
use std::fmt;

use crate::sorts::Sort;

/// The IEEE 754 rounding modes.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord, Serialize)]
pub enum RoundingMode {
    /// Round to nearest, ties to even
    NearestTiesToEven,
    /// Round to nearest, ties away from zero
    NearestTiesAway,
    /// Round toward positive infinity
    TowardPositive,
    /// Round toward negative infinity
    TowardNegative,
    /// Round toward zero
    TowardZero,
}

impl RoundingMode {
    /// All rounding modes.
    pub const ALL: [RoundingMode; 5] = [
        RoundingMode::NearestTiesToEven,
        RoundingMode::NearestTiesAway,
        RoundingMode::TowardPositive,
        RoundingMode::TowardNegative,
        RoundingMode::TowardZero,
    ];

    /// The short SMT-LIB name of the rounding mode.
    pub fn smt_name(&self) -> &'static str {
        match self {
            RoundingMode::NearestTiesToEven => "RNE",
            RoundingMode::NearestTiesAway => "RNA",
            RoundingMode::TowardPositive => "RTP",
            RoundingMode::TowardNegative => "RTN",
            RoundingMode::TowardZero => "RTZ",
        }
    }

    /// Parse either the short or the long SMT-LIB name.
    pub fn from_smt_name(name: &str) -> Option<Self> {
        let mode = match name {
            "RNE" | "roundNearestTiesToEven" => RoundingMode::NearestTiesToEven,
            "RNA" | "roundNearestTiesToAway" => RoundingMode::NearestTiesAway,
            "RTP" | "roundTowardPositive" => RoundingMode::TowardPositive,
            "RTN" | "roundTowardNegative" => RoundingMode::TowardNegative,
            "RTZ" | "roundTowardZero" => RoundingMode::TowardZero,
            _ => return None,
        };
        Some(mode)
    }
}

/// A floating point value in a given format, stored as its IEEE components.
///
/// `exponent` is the biased exponent field and `significand` the trailing
/// significand field (without the hidden bit), so every bit pattern of the
/// format, including NaNs, has exactly one representation.
#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord, Serialize)]
pub struct FloatValue {
    /// Width of the exponent field
    pub exponent_width: u32,
    /// Width of the significand field
    pub mantissa_width: u32,
    /// The sign bit (true for negative)
    pub negative: bool,
    /// The biased exponent field
    pub exponent: BigUint,
    /// The trailing significand field
    pub significand: BigUint,
}

fn ones(n: u32) -> BigUint {
    (BigUint::one() << n) - BigUint::one()
}

impl FloatValue {
    fn special(
        exponent_width: u32,
        mantissa_width: u32,
        negative: bool,
        significand: BigUint,
    ) -> Self {
        FloatValue {
            exponent_width,
            mantissa_width,
            negative,
            exponent: ones(exponent_width),
            significand,
        }
    }

    /// The canonical quiet NaN of the format.
    pub fn nan(exponent_width: u32, mantissa_width: u32) -> Self {
        Self::special(
            exponent_width,
            mantissa_width,
            false,
            BigUint::one() << (mantissa_width - 1),
        )
    }

    /// Positive or negative infinity.
    pub fn infinity(exponent_width: u32, mantissa_width: u32, negative: bool) -> Self {
        Self::special(exponent_width, mantissa_width, negative, BigUint::zero())
    }

    /// Positive or negative zero.
    pub fn zero(exponent_width: u32, mantissa_width: u32, negative: bool) -> Self {
        FloatValue {
            exponent_width,
            mantissa_width,
            negative,
            exponent: BigUint::zero(),
            significand: BigUint::zero(),
        }
    }

    /// The sort of this value.
    pub fn sort(&self) -> Sort {
        Sort::FloatingPoint {
            exponent: self.exponent_width,
            mantissa: self.mantissa_width,
        }
    }

    fn bias(&self) -> i64 {
        (1i64 << (self.exponent_width - 1)) - 1
    }

    /// Whether this is a NaN.
    pub fn is_nan(&self) -> bool {
        self.exponent == ones(self.exponent_width) && !self.significand.is_zero()
    }

    /// Whether this is an infinity of either sign.
    pub fn is_infinite(&self) -> bool {
        self.exponent == ones(self.exponent_width) && self.significand.is_zero()
    }

    /// Whether this is a zero of either sign.
    pub fn is_zero(&self) -> bool {
        self.exponent.is_zero() && self.significand.is_zero()
    }

    /// Whether this is subnormal.
    pub fn is_subnormal(&self) -> bool {
        self.exponent.is_zero() && !self.significand.is_zero()
    }

    /// Whether this is normal.
    pub fn is_normal(&self) -> bool {
        !self.exponent.is_zero() && self.exponent != ones(self.exponent_width)
    }

    /// The bit pattern of the IEEE encoding (sign, exponent, significand).
    pub fn to_bits(&self) -> BigUint {
        let sign = if self.negative {
            BigUint::one()
        } else {
            BigUint::zero()
        };
        (((sign << self.exponent_width) | &self.exponent) << self.mantissa_width)
            | &self.significand
    }

    /// Decode an IEEE bit pattern of the given format.
    pub fn from_bits(exponent_width: u32, mantissa_width: u32, bits: &BigUint) -> Self {
        let significand = bits & ones(mantissa_width);
        let exponent = (bits >> mantissa_width) & ones(exponent_width);
        let negative = !((bits >> (mantissa_width + exponent_width)) & BigUint::one()).is_zero();
        FloatValue {
            exponent_width,
            mantissa_width,
            negative,
            exponent,
            significand,
        }
    }

    /// Encode `num * 2^shift` exactly, or return `None` if the format cannot
    /// represent it without rounding.
    fn encode_exact(
        exponent_width: u32,
        mantissa_width: u32,
        negative: bool,
        mut num: BigUint,
        mut shift: i64,
    ) -> Option<Self> {
        if num.is_zero() {
            return Some(Self::zero(exponent_width, mantissa_width, negative));
        }
        while (&num & BigUint::one()).is_zero() {
            num >>= 1;
            shift += 1;
        }
        let bias = (1i64 << (exponent_width - 1)) - 1;
        let (emin, emax) = (1 - bias, bias);
        let bitlen = num.bits() as i64;
        let unbiased = shift + bitlen - 1;
        if unbiased > emax {
            return None;
        }
        let m = mantissa_width as i64;
        if unbiased >= emin {
            if bitlen - 1 > m {
                return None;
            }
            let hidden = BigUint::one() << (bitlen - 1) as u64;
            let significand = (num - hidden) << (m - (bitlen - 1)) as u64;
            return Some(FloatValue {
                exponent_width,
                mantissa_width,
                negative,
                exponent: BigUint::from((unbiased + bias) as u64),
                significand,
            });
        }
        // subnormal: value = significand * 2^(emin - m)
        let lowest = emin - m;
        if shift < lowest {
            return None;
        }
        Some(FloatValue {
            exponent_width,
            mantissa_width,
            negative,
            exponent: BigUint::zero(),
            significand: num << (shift - lowest) as u64,
        })
    }

    /// Convert a double into the given format, if it is exactly representable.
    pub fn from_f64(exponent_width: u32, mantissa_width: u32, v: f64) -> Option<Self> {
        if v.is_nan() {
            return Some(Self::nan(exponent_width, mantissa_width));
        }
        if v.is_infinite() {
            return Some(Self::infinity(exponent_width, mantissa_width, v < 0.0));
        }
        let bits = v.to_bits();
        let negative = bits >> 63 == 1;
        let exp = ((bits >> 52) & 0x7ff) as i64;
        let frac = bits & ((1u64 << 52) - 1);
        let (num, shift) = if exp == 0 {
            (frac, -1074)
        } else {
            (frac | (1u64 << 52), exp - 1075)
        };
        Self::encode_exact(
            exponent_width,
            mantissa_width,
            negative,
            BigUint::from(num),
            shift,
        )
    }

    /// Convert a rational into the given format, if it is exactly
    /// representable.
    pub fn from_rational(
        exponent_width: u32,
        mantissa_width: u32,
        r: &BigRational,
    ) -> Option<Self> {
        let negative = r.numer().sign() == Sign::Minus;
        let numer = r.numer().magnitude().clone();
        let denom = r.denom().magnitude().clone();
        if denom.count_ones() != 1 {
            return None;
        }
        let shift = -(denom.trailing_zeros().unwrap_or(0) as i64);
        Self::encode_exact(exponent_width, mantissa_width, negative, numer, shift)
    }

    /// The exact value of a finite float.
    pub fn to_rational(&self) -> Option<BigRational> {
        if !self.is_normal() && !self.is_subnormal() && !self.is_zero() {
            return None;
        }
        let m = self.mantissa_width as i64;
        let (num, shift) = if self.exponent.is_zero() {
            (self.significand.clone(), 1 - self.bias() - m)
        } else {
            let exponent = self.exponent.to_i64()?;
            (
                (BigUint::one() << self.mantissa_width) + &self.significand,
                exponent - self.bias() - m,
            )
        };
        let sign = if self.negative { Sign::Minus } else { Sign::Plus };
        let num = BigInt::from_biguint(sign, num);
        let r = if shift >= 0 {
            BigRational::from_integer(num << shift as u64)
        } else {
            BigRational::new(num, BigInt::one() << (-shift) as u64)
        };
        Some(r)
    }

    /// Approximate the value as a double.
    pub fn to_f64(&self) -> f64 {
        if self.exponent_width == 11 && self.mantissa_width == 52 {
            if let Some(bits) = self.to_bits().to_u64() {
                return f64::from_bits(bits);
            }
        }
        if self.is_nan() {
            return f64::NAN;
        }
        if self.is_infinite() {
            return if self.negative {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            };
        }
        if self.is_zero() {
            return if self.negative { -0.0 } else { 0.0 };
        }
        self.to_rational()
            .and_then(|r| r.to_f64())
            .unwrap_or(f64::NAN)
    }
}

/// A constant value of some sort.
#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord, Serialize)]
pub enum Value {
    #[allow(missing_docs)]
    Bool(bool),
    #[allow(missing_docs)]
    Int(BigInt),
    #[allow(missing_docs)]
    Rational(BigRational),
    /// A bitvector, stored as its unsigned interpretation
    #[allow(missing_docs)]
    Bitvector { width: u32, value: BigUint },
    #[allow(missing_docs)]
    Float(FloatValue),
    #[allow(missing_docs)]
    RoundingMode(RoundingMode),
    /// A backend value without a structured representation, in the backend's
    /// own syntax (array values, for example).
    Other(String),
}

impl Value {
    /// The sort of the value, if it has a structured representation.
    pub fn sort(&self) -> Option<Sort> {
        let sort = match self {
            Value::Bool(_) => Sort::Boolean,
            Value::Int(_) => Sort::Integer,
            Value::Rational(_) => Sort::Rational,
            Value::Bitvector { width, .. } => Sort::Bitvector(*width),
            Value::Float(f) => f.sort(),
            Value::RoundingMode(_) => Sort::RoundingMode,
            Value::Other(_) => return None,
        };
        Some(sort)
    }

    /// The Boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    /// The value as a rational number, for integers and rationals.
    pub fn as_rational(&self) -> Option<BigRational> {
        match self {
            Value::Int(i) => Some(BigRational::from_integer(i.clone())),
            Value::Rational(r) => Some(r.clone()),
            _ => None,
        }
    }

    /// The signed (two's complement) interpretation of a bitvector.
    pub fn as_signed_bitvector(&self) -> Option<BigInt> {
        match self {
            Value::Bitvector { width, value } => {
                let v = BigInt::from(value.clone());
                if value.bit((*width - 1) as u64) {
                    Some(v - (BigInt::one() << *width))
                } else {
                    Some(v)
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Rational(r) => write!(f, "{r}"),
            Value::Bitvector { width, value } => {
                write!(f, "#b{:0>width$}", value.to_str_radix(2), width = *width as usize)
            }
            Value::Float(v) => write!(f, "{}", v.to_f64()),
            Value::RoundingMode(rm) => write!(f, "{}", rm.smt_name()),
            Value::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Parse an integer (`-12`), a fraction (`1/3`) or a decimal (`-0.125`).
pub fn parse_rational(text: &str) -> Option<BigRational> {
    let text = text.trim();
    if let Some((n, d)) = text.split_once('/') {
        let n = n.trim().parse::<BigInt>().ok()?;
        let d = d.trim().parse::<BigInt>().ok()?;
        if d.is_zero() {
            return None;
        }
        return Some(BigRational::new(n, d));
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if (whole.is_empty() && fraction.is_empty())
        || !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let numerator = format!("{whole}{fraction}").parse::<BigInt>().ok()?;
    let denominator = BigInt::from(10u32).pow(fraction.len() as u32);
    let r = BigRational::new(numerator, denominator);
    Some(if negative { -r } else { r })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rational() {
        let r = |n: i64, d: i64| Some(BigRational::new(BigInt::from(n), BigInt::from(d)));
        assert_eq!(parse_rational("42"), r(42, 1));
        assert_eq!(parse_rational("-0.125"), r(-1, 8));
        assert_eq!(parse_rational("2/6"), r(1, 3));
        assert_eq!(parse_rational(".5"), r(1, 2));
        assert_eq!(parse_rational("1/0"), None);
        assert_eq!(parse_rational("1e5"), None);
        assert_eq!(parse_rational("-"), None);
    }

    #[test]
    fn test_double_roundtrip() {
        for v in [0.0, -0.0, 1.5, -2.25, 1e-310, f64::MAX, f64::MIN_POSITIVE] {
            let fv = FloatValue::from_f64(11, 52, v).unwrap();
            assert_eq!(fv.to_f64().to_bits(), v.to_bits(), "{v}");
        }
        assert!(FloatValue::from_f64(11, 52, f64::NAN).unwrap().is_nan());
    }

    #[test]
    fn test_single_precision() {
        let fv = FloatValue::from_f64(8, 23, 1.5).unwrap();
        assert_eq!(fv.to_bits(), BigUint::from(1.5f32.to_bits()));
        assert_eq!(fv.to_f64(), 1.5);
        // 0.1 is not representable in any binary format
        assert_eq!(FloatValue::from_f64(8, 23, 0.1), None);
        // too large for single precision
        assert_eq!(FloatValue::from_f64(8, 23, 1e300), None);
        let tiny = FloatValue::from_f64(8, 23, f32::from_bits(1) as f64).unwrap();
        assert!(tiny.is_subnormal());
        assert_eq!(tiny.to_bits(), BigUint::one());
    }

    #[test]
    fn test_rational() {
        let half = BigRational::new(BigInt::from(-1), BigInt::from(2));
        let fv = FloatValue::from_rational(8, 23, &half).unwrap();
        assert_eq!(fv.to_f64(), -0.5);
        assert_eq!(fv.to_rational(), Some(half));
        let third = BigRational::new(BigInt::from(1), BigInt::from(3));
        assert_eq!(FloatValue::from_rational(8, 23, &third), None);
    }

    #[test]
    fn test_bits_roundtrip() {
        let v = FloatValue::from_f64(5, 10, -3.0).unwrap();
        assert_eq!(FloatValue::from_bits(5, 10, &v.to_bits()), v);
    }

    #[test]
    fn test_signed_bitvector() {
        let v = Value::Bitvector {
            width: 4,
            value: BigUint::from(0b1110u32),
        };
        assert_eq!(v.as_signed_bitvector(), Some(BigInt::from(-2)));
        assert_eq!(v.to_string(), "#b1110");
    }

    #[test]
    fn test_rounding_mode_names() {
        for rm in RoundingMode::ALL {
            assert_eq!(RoundingMode::from_smt_name(rm.smt_name()), Some(rm));
        }
        assert_eq!(
            RoundingMode::from_smt_name("roundTowardZero"),
            Some(RoundingMode::TowardZero)
        );
    }
}
