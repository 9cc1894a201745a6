//! Condition values, comparators and return-value tests

use std::fmt;

use num_bigint::BigUint;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConditionError;

/// Prefix marking a value that is substituted from the caller's context
pub const CONTEXT_VARIABLE_PREFIX: char = ':';

/// The caller's own address
pub const USER_ADDRESS: &str = ":userAddress";

/// A condition parameter or an oracle result.
///
/// Integers are unsigned and unbounded (token balances are uint256). On the
/// wire an integer that fits in a u64 is a JSON number; a larger one is a
/// decimal string, and any decimal string too large for a u64 reads back as
/// an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    Int(BigUint),
    Bool(bool),
    Text(String),
}

impl Param {
    /// Whether this is a `:name` placeholder
    pub fn is_context_variable(&self) -> bool {
        matches!(self, Param::Text(s) if s.starts_with(CONTEXT_VARIABLE_PREFIX))
    }

    /// Numeric value of an integer or of a decimal string
    pub fn as_integer(&self) -> Option<BigUint> {
        match self {
            Param::Int(value) => Some(value.clone()),
            Param::Text(text) => parse_decimal(text),
            Param::Bool(_) => None,
        }
    }
}

fn parse_decimal(text: &str) -> Option<BigUint> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::parse_bytes(text.as_bytes(), 10)
}

impl From<u64> for Param {
    fn from(value: u64) -> Self {
        Param::Int(BigUint::from(value))
    }
}

impl From<u128> for Param {
    fn from(value: u128) -> Self {
        Param::Int(BigUint::from(value))
    }
}

impl From<BigUint> for Param {
    fn from(value: BigUint) -> Self {
        Param::Int(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::from(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        let canonical = !value.starts_with('0') || value == "0";
        match parse_decimal(&value) {
            Some(big) if canonical && u64::try_from(&big).is_err() => Param::Int(big),
            _ => Param::Text(value),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Int(v) => write!(f, "{}", v),
            Param::Bool(v) => write!(f, "{}", v),
            Param::Text(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for Param {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Param::Int(value) => match u64::try_from(value) {
                Ok(small) => serializer.serialize_u64(small),
                Err(_) => serializer.serialize_str(&value.to_str_radix(10)),
            },
            Param::Bool(value) => serializer.serialize_bool(*value),
            Param::Text(value) => serializer.serialize_str(value),
        }
    }
}

struct ParamVisitor;

impl<'de> Visitor<'de> for ParamVisitor {
    type Value = Param;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an unsigned integer, a boolean or a string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Param, E> {
        Ok(Param::from(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Param, E> {
        u64::try_from(value)
            .map(Param::from)
            .map_err(|_| E::custom(format!("negative integer {}", value)))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Param, E> {
        Err(E::custom(format!(
            "{} is not an exact integer; write large integers as decimal strings",
            value
        )))
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Param, E> {
        Ok(Param::Bool(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Param, E> {
        Ok(Param::from(value))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Param, E> {
        Ok(Param::from(value))
    }
}

impl<'de> Deserialize<'de> for Param {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ParamVisitor)
    }
}

/// Comparison applied between the oracle result and the expected value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl Comparator {
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Comparator::Gt | Comparator::Ge | Comparator::Lt | Comparator::Le
        )
    }

    /// Compare `actual` (oracle result) against `expected`.
    ///
    /// Integers and decimal strings compare by numeric value. Other text
    /// compares case-insensitively so checksummed and lower-case addresses
    /// match. Ordering is defined for numbers only.
    pub fn compare(&self, actual: &Param, expected: &Param) -> Result<bool, ConditionError> {
        if let (Some(a), Some(b)) = (actual.as_integer(), expected.as_integer()) {
            return Ok(match self {
                Comparator::Eq => a == b,
                Comparator::Ne => a != b,
                Comparator::Gt => a > b,
                Comparator::Ge => a >= b,
                Comparator::Lt => a < b,
                Comparator::Le => a <= b,
            });
        }
        match (actual, expected) {
            (Param::Text(a), Param::Text(b)) if !self.is_ordering() => {
                let equal = a.eq_ignore_ascii_case(b);
                Ok(if *self == Comparator::Eq { equal } else { !equal })
            }
            (Param::Bool(a), Param::Bool(b)) if !self.is_ordering() => {
                Ok(if *self == Comparator::Eq { a == b } else { a != b })
            }
            _ => Err(ConditionError::Evaluation(format!(
                "cannot compare {} {:?} {}",
                actual, self, expected
            ))),
        }
    }
}

/// Expected outcome of a contract call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReturnValueTest {
    pub comparator: Comparator,
    pub value: Param,
}

impl ReturnValueTest {
    pub fn new(comparator: Comparator, value: impl Into<Param>) -> Self {
        Self {
            comparator,
            value: value.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConditionError> {
        let numeric = self.value.as_integer().is_some() || self.value.is_context_variable();
        if self.comparator.is_ordering() && !numeric {
            return Err(ConditionError::Invalid(format!(
                "comparator {:?} needs an integer, got {}",
                self.comparator, self.value
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_json_shapes() {
        let params: Vec<Param> = serde_json::from_str(r#"[5954, ":userAddress", true]"#).unwrap();
        assert_eq!(
            params,
            vec![
                Param::from(5954u64),
                Param::Text(USER_ADDRESS.into()),
                Param::Bool(true)
            ]
        );
        assert_eq!(
            serde_json::to_string(&params).unwrap(),
            r#"[5954,":userAddress",true]"#
        );
    }

    #[test]
    fn test_comparator_symbols() {
        let json = serde_json::to_string(&Comparator::Ge).unwrap();
        assert_eq!(json, r#"">=""#);
        let parsed: Comparator = serde_json::from_str(r#""!=""#).unwrap();
        assert_eq!(parsed, Comparator::Ne);
    }

    #[test]
    fn test_integer_comparisons() {
        let three = Param::from(3u64);
        let five = Param::from(5u64);
        assert!(Comparator::Ge.compare(&five, &three).unwrap());
        assert!(!Comparator::Lt.compare(&five, &three).unwrap());
        assert!(Comparator::Ne.compare(&five, &three).unwrap());
        assert!(Comparator::Le.compare(&three, &three).unwrap());
    }

    #[test]
    fn test_address_comparison_ignores_case() {
        let checksummed = Param::from("0x5cF1703A1c99A4b42Eb056535840e93118177232");
        let lower = Param::from("0x5cf1703a1c99a4b42eb056535840e93118177232");
        assert!(Comparator::Eq.compare(&checksummed, &lower).unwrap());
    }

    #[test]
    fn test_ordering_on_text_is_an_error() {
        let result = Comparator::Gt.compare(&Param::from("a"), &Param::from("b"));
        assert!(matches!(result, Err(ConditionError::Evaluation(_))));
    }

    #[test]
    fn test_return_value_test_validation() {
        assert!(ReturnValueTest::new(Comparator::Ge, 3u64).validate().is_ok());
        assert!(ReturnValueTest::new(Comparator::Eq, USER_ADDRESS).validate().is_ok());
        assert!(ReturnValueTest::new(Comparator::Gt, "lots").validate().is_err());
    }

    #[test]
    fn test_wei_scale_integers() {
        let hundred_tokens = Param::from(100_000_000_000_000_000_000u128);
        let json = serde_json::to_string(&hundred_tokens).unwrap();
        assert_eq!(json, r#""100000000000000000000""#);
        assert_eq!(serde_json::from_str::<Param>(&json).unwrap(), hundred_tokens);

        let balance = Param::from(150_000_000_000_000_000_000u128);
        assert!(Comparator::Ge.compare(&balance, &hundred_tokens).unwrap());
        assert!(!Comparator::Lt.compare(&balance, &hundred_tokens).unwrap());
        assert!(
            ReturnValueTest::new(Comparator::Ge, hundred_tokens)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_small_decimal_strings_stay_text() {
        let param: Param = serde_json::from_str(r#""5954""#).unwrap();
        assert_eq!(param, Param::Text("5954".into()));
        assert_eq!(serde_json::to_string(&param).unwrap(), r#""5954""#);
        // Still compares numerically
        assert!(Comparator::Eq.compare(&param, &Param::from(5954u64)).unwrap());
    }

    #[test]
    fn test_inexact_numbers_rejected() {
        assert!(serde_json::from_str::<Param>("1e20").is_err());
        assert!(serde_json::from_str::<Param>("-3").is_err());
    }
}
