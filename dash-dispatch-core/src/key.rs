//! Typed state keys and subscription topics
//!
//! Every action owns three pieces of derived state: its last result, its last
//! error and whether it is in flight. Instead of building those keys by string
//! concatenation at each call site, they are modelled as a [`StateKey`] with a
//! [`KeyKind`], and subscriptions target a [`Topic`] (the value of a key or its
//! loading flag).
//!
//! The conventional string forms are still accepted and produced, so code that
//! thinks in terms of `"flip-resource_result"` or `"flip-resource_loading"`
//! keeps working:
//!
//! ```
//! use dash_dispatch_core::{KeyKind, StateKey, Topic};
//!
//! let key = StateKey::new("flip-resource_result");
//! assert_eq!(key.kind(), KeyKind::Result);
//! assert_eq!(key.base(), "flip-resource");
//! assert_eq!(key.to_string(), "flip-resource_result");
//!
//! let topic: Topic = "flip-resource_loading".into();
//! assert_eq!(topic, Topic::Loading(StateKey::new("flip-resource")));
//! ```

use std::fmt;

use crate::action::ActionName;

const RESULT_SUFFIX: &str = "_result";
const ERROR_SUFFIX: &str = "_error";
const LOADING_SUFFIX: &str = "_loading";

/// Suffixes that turn an action name into one of its derived keys
pub(crate) const DERIVED_SUFFIXES: [&str; 3] = [RESULT_SUFFIX, ERROR_SUFFIX, LOADING_SUFFIX];

/// What a [`StateKey`] refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyKind {
    /// An ordinary key, or the bare name of an action
    Plain,
    /// Last successful result of an action
    Result,
    /// Last failure message of an action
    Error,
}

/// A key in the [`Store`](crate::Store)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    base: String,
    kind: KeyKind,
}

impl StateKey {
    /// Parse a key from its string form.
    ///
    /// A trailing `_result` or `_error` selects the derived kind; anything
    /// else is a plain key.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        for (suffix, kind) in [(RESULT_SUFFIX, KeyKind::Result), (ERROR_SUFFIX, KeyKind::Error)] {
            if let Some(base) = key.strip_suffix(suffix) {
                if !base.is_empty() {
                    return Self {
                        base: base.to_string(),
                        kind,
                    };
                }
            }
        }
        Self {
            base: key,
            kind: KeyKind::Plain,
        }
    }

    /// The plain key for an action (its loading flag lives here)
    pub fn action(name: &ActionName) -> Self {
        Self {
            base: name.as_str().to_string(),
            kind: KeyKind::Plain,
        }
    }

    /// The result key for an action
    pub fn result(name: &ActionName) -> Self {
        Self {
            base: name.as_str().to_string(),
            kind: KeyKind::Result,
        }
    }

    /// The error key for an action
    pub fn error(name: &ActionName) -> Self {
        Self {
            base: name.as_str().to_string(),
            kind: KeyKind::Error,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Whether this key holds an action outcome (`Result` or `Error`)
    pub fn is_derived(&self) -> bool {
        self.kind != KeyKind::Plain
    }

    /// The plain key sharing this key's base name
    pub fn base_key(&self) -> StateKey {
        Self {
            base: self.base.clone(),
            kind: KeyKind::Plain,
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            KeyKind::Plain => f.write_str(&self.base),
            KeyKind::Result => write!(f, "{}{}", self.base, RESULT_SUFFIX),
            KeyKind::Error => write!(f, "{}{}", self.base, ERROR_SUFFIX),
        }
    }
}

impl From<&str> for StateKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StateKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&StateKey> for StateKey {
    fn from(key: &StateKey) -> Self {
        key.clone()
    }
}

impl From<&ActionName> for StateKey {
    fn from(name: &ActionName) -> Self {
        Self::action(name)
    }
}

/// A notification channel of the store
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    /// Fires with the key's new value on `set`/`update`/`delete`
    Value(StateKey),
    /// Fires with the key's loading flag on `set_loading`, `set` and `delete`
    Loading(StateKey),
}

impl Topic {
    /// The key this topic observes
    pub fn key(&self) -> &StateKey {
        match self {
            Topic::Value(key) | Topic::Loading(key) => key,
        }
    }

    /// Parse a topic from its string form; `<key>_loading` is a loading topic
    pub fn parse(s: &str) -> Self {
        match s.strip_suffix(LOADING_SUFFIX) {
            Some(base) if !base.is_empty() => Topic::Loading(StateKey::new(base)),
            _ => Topic::Value(StateKey::new(s)),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Value(key) => write!(f, "{}", key),
            Topic::Loading(key) => write!(f, "{}{}", key, LOADING_SUFFIX),
        }
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<StateKey> for Topic {
    fn from(key: StateKey) -> Self {
        Topic::Value(key)
    }
}

impl From<&StateKey> for Topic {
    fn from(key: &StateKey) -> Self {
        Topic::Value(key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let key = StateKey::new("theme");
        assert_eq!(key.kind(), KeyKind::Plain);
        assert_eq!(key.base(), "theme");
        assert!(!key.is_derived());
    }

    #[test]
    fn test_parse_derived() {
        let result = StateKey::new("x_result");
        assert_eq!(result.kind(), KeyKind::Result);
        assert_eq!(result.base(), "x");

        let error = StateKey::new("x_error");
        assert_eq!(error.kind(), KeyKind::Error);
        assert_eq!(error.base_key(), StateKey::new("x"));
    }

    #[test]
    fn test_bare_suffix_is_plain() {
        assert_eq!(StateKey::new("_result").kind(), KeyKind::Plain);
        assert_eq!(Topic::parse("_loading"), Topic::Value(StateKey::new("_loading")));
    }

    #[test]
    fn test_typed_constructors_match_string_form() {
        let name = ActionName::new("flip-resource").unwrap();
        assert_eq!(StateKey::result(&name), StateKey::new("flip-resource_result"));
        assert_eq!(StateKey::error(&name), StateKey::new("flip-resource_error"));
        assert_eq!(StateKey::action(&name), StateKey::new("flip-resource"));
    }

    #[test]
    fn test_display_roundtrips() {
        for s in ["a", "a_result", "a_error"] {
            assert_eq!(StateKey::new(s).to_string(), s);
        }
        for s in ["a", "a_result", "a_loading"] {
            assert_eq!(Topic::parse(s).to_string(), s);
        }
    }

    #[test]
    fn test_loading_topic() {
        let topic = Topic::parse("x_loading");
        assert_eq!(topic, Topic::Loading(StateKey::new("x")));
        assert_eq!(topic.key().base(), "x");
    }
}
