//! Typed parse results shared by the source adapters.

use serde::Deserialize;
use serde_json::Value;

use crate::error::PriceError;

/// What an adapter made of a source response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Well formed and carrying a numeric candidate (not yet validated).
    Priced(f64),
    /// Well formed, but the source has no price for the identifier.
    Unpriced,
    /// Not the shape the adapter expects.
    Malformed(String),
}

impl ParseOutcome {
    /// `Unpriced` when `value` is absent, `Malformed` when it is not numeric.
    pub fn from_field(field: &str, value: Option<&JsonNumber>) -> Self {
        match value {
            None => Self::Unpriced,
            Some(number) => number.as_f64().map_or_else(
                || Self::Malformed(format!("{} is not numeric: {:?}", field, number)),
                Self::Priced,
            ),
        }
    }

    /// Malformed responses become parse errors so they count as a failed attempt.
    pub fn into_candidate(self, provider: &str) -> Result<Option<f64>, PriceError> {
        match self {
            Self::Priced(price) => Ok(Some(price)),
            Self::Unpriced => Ok(None),
            Self::Malformed(message) => Err(PriceError::parse(provider, message)),
        }
    }
}

/// A number that some APIs send as a JSON number and others as a string.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum JsonNumber {
    Number(f64),
    Text(String),
}

impl JsonNumber {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Deserializes `value` into `T`, describing a shape mismatch.
pub fn typed<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_number_accepts_numbers_and_strings() {
        let n: JsonNumber = serde_json::from_value(json!(1.5)).unwrap();
        assert_eq!(n.as_f64(), Some(1.5));
        let s: JsonNumber = serde_json::from_value(json!(" 0.000123 ")).unwrap();
        assert_eq!(s.as_f64(), Some(0.000123));
        let bad: JsonNumber = serde_json::from_value(json!("n/a")).unwrap();
        assert_eq!(bad.as_f64(), None);
    }

    #[test]
    fn test_from_field() {
        let text = JsonNumber::Text("0.5".to_owned());
        assert_eq!(ParseOutcome::from_field("price", Some(&text)), ParseOutcome::Priced(0.5));
        assert_eq!(ParseOutcome::from_field("price", None), ParseOutcome::Unpriced);
        let junk = JsonNumber::Text("n/a".to_owned());
        match ParseOutcome::from_field("price", Some(&junk)) {
            ParseOutcome::Malformed(message) => assert!(message.starts_with("price")),
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_into_candidate() {
        assert_eq!(ParseOutcome::Priced(2.0).into_candidate("x").unwrap(), Some(2.0));
        assert_eq!(ParseOutcome::Unpriced.into_candidate("x").unwrap(), None);
        assert!(matches!(
            ParseOutcome::Malformed("oops".into()).into_candidate("x"),
            Err(PriceError::Parse { .. })
        ));
    }

    #[test]
    fn test_typed_reports_malformed() {
        #[derive(Deserialize, Debug)]
        struct Shape {
            #[allow(dead_code)]
            price: f64,
        }
        assert!(typed::<Shape>(json!({"price": "abc"})).is_err());
        assert!(typed::<Shape>(json!({"price": 3.0})).is_ok());
    }
}
