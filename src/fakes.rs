//! Fake-value provider, bridging to the `fake` crate.
//!
//! The evaluator treats this as an opaque value source: a (genre, kind)
//! pair goes in, a [`Value`] comes out. Uniqueness guarantees, locales, and
//! anything fancier belong to the provider, not to this crate.

use fake::faker::address::en::{CityName, StreetName};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{FreeEmail, SafeEmail, Username};
use fake::faker::lorem::en::{Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::Fake;

use crate::value::Value;

/// Generate a value for a supported (genre, kind) pair, or `None` when the
/// pair is unknown.
pub fn fake(genre: &str, kind: &str) -> Option<Value> {
    let text: String = match (genre, kind) {
        ("internet", "email") => SafeEmail().fake(),
        ("internet", "free_email") => FreeEmail().fake(),
        ("internet", "username") => Username().fake(),
        ("name", "first_name") => FirstName().fake(),
        ("name", "last_name") => LastName().fake(),
        ("name", "name") => Name().fake(),
        ("lorem", "word") => Word().fake(),
        ("lorem", "sentence") => Sentence(3..8).fake(),
        ("address", "city") => CityName().fake(),
        ("address", "street") => StreetName().fake(),
        ("company", "name") => CompanyName().fake(),
        _ => return None,
    };
    Some(Value::Text(text))
}

/// Whether [`fake`] knows the pair. Used for definition-time validation.
pub fn supports(genre: &str, kind: &str) -> bool {
    fake(genre, kind).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_pairs_produce_text() {
        let value = fake("internet", "email").unwrap();
        assert!(value.as_str().is_some_and(|s| s.contains('@')));
    }

    #[test]
    fn unknown_pairs_are_rejected() {
        assert!(fake("weather", "forecast").is_none());
        assert!(!supports("weather", "forecast"));
    }
}
