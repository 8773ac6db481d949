#![forbid(unsafe_code)]

//! Typed host properties.
//!
//! Hosts receive attribute maps, not arbitrary dynamic values: the closed
//! [`PropValue`] sum is what a renderer-agnostic core can diff and a host
//! adapter can apply without reflection.

use ahash::AHashMap;

/// Attribute map attached to a host element.
pub type PropMap = AHashMap<String, PropValue>;

/// A single host attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl PropValue {
    /// String form used by hosts that serialize attributes.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_round_trip() {
        assert_eq!(PropValue::from("x"), PropValue::Str("x".into()));
        assert_eq!(PropValue::from(3i64), PropValue::Int(3));
        assert_eq!(PropValue::from(true), PropValue::Bool(true));
    }

    #[test]
    fn map_equality_is_structural() {
        let mut a = PropMap::default();
        a.insert("id".into(), "row".into());
        a.insert("count".into(), 2i64.into());

        let mut b = PropMap::default();
        b.insert("count".into(), 2i64.into());
        b.insert("id".into(), "row".into());

        assert_eq!(a, b);

        b.insert("count".into(), 3i64.into());
        assert_ne!(a, b);
    }

    #[test]
    fn display_strings() {
        assert_eq!(PropValue::Int(7).to_display_string(), "7");
        assert_eq!(PropValue::Bool(false).to_display_string(), "false");
    }
}
