//! Display-option schema.
//!
//! Options are a closed set: every name has a kind and a default. The core
//! stores and distributes them; renderers interpret them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// A display-option value as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Text(String),
}

/// Accepted values for a named option.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Choice(&'static [&'static str]),
}

impl OptionKind {
    fn accepts(&self, value: &OptionValue) -> bool {
        match (self, value) {
            (Self::Bool, OptionValue::Bool(_)) => true,
            (Self::Choice(choices), OptionValue::Text(s)) => choices.contains(&s.as_str()),
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Bool => "a boolean".into(),
            Self::Choice(choices) => format!("one of {}", choices.join(", ")),
        }
    }
}

/// One schema entry.
#[derive(Clone, Copy, Debug)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
    default: DefaultValue,
}

#[derive(Clone, Copy, Debug)]
enum DefaultValue {
    Bool(bool),
    Text(&'static str),
}

impl OptionSpec {
    pub fn default_value(&self) -> OptionValue {
        match self.default {
            DefaultValue::Bool(b) => OptionValue::Bool(b),
            DefaultValue::Text(s) => OptionValue::Text(s.to_string()),
        }
    }
}

pub const SPACING_CHOICES: &[&str] = &["space-around", "space-between", "space-evenly", "center"];

const fn flag(name: &'static str, default: bool) -> OptionSpec {
    OptionSpec {
        name,
        kind: OptionKind::Bool,
        default: DefaultValue::Bool(default),
    }
}

/// Every display option the session knows about.
pub const SCHEMA: &[OptionSpec] = &[
    OptionSpec {
        name: "spacing",
        kind: OptionKind::Choice(SPACING_CHOICES),
        default: DefaultValue::Text("space-around"),
    },
    flag("larivaarGurbani", false),
    flag("larivaarAssist", false),
    flag("vishraamColors", true),
    flag("vishraamTransliterationColors", true),
    flag("vishraamCharacters", false),
    flag("vishraamLight", true),
    flag("vishraamMedium", true),
    flag("vishraamHeavy", true),
    flag("splitOnVishraam", true),
    flag("englishTranslation", true),
    flag("punjabiTranslation", true),
    flag("transliteration", true),
    flag("simpleGraphics", false),
];

/// Look up a schema entry by name.
pub fn spec(name: &str) -> Option<&'static OptionSpec> {
    SCHEMA.iter().find(|s| s.name == name)
}

/// Check that `value` is legal for option `name`.
pub fn validate(name: &str, value: &OptionValue) -> Result<(), ValidationError> {
    let spec = spec(name).ok_or_else(|| ValidationError::UnknownOption(name.to_string()))?;
    if spec.kind.accepts(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidOptionValue {
            name: name.to_string(),
            expected: spec.kind.describe(),
        })
    }
}

/// Current value of every display option, keyed by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayOptions(BTreeMap<String, OptionValue>);

impl Default for DisplayOptions {
    fn default() -> Self {
        Self(
            SCHEMA
                .iter()
                .map(|s| (s.name.to_string(), s.default_value()))
                .collect(),
        )
    }
}

impl DisplayOptions {
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    /// Validate every entry first, then write them all. Nothing is written
    /// if any entry is rejected.
    pub fn with_all(
        &self,
        updates: &BTreeMap<String, OptionValue>,
    ) -> Result<Self, ValidationError> {
        for (name, value) in updates {
            validate(name, value)?;
        }
        let mut next = self.clone();
        for (name, value) in updates {
            next.0.insert(name.clone(), value.clone());
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_whole_schema() {
        let opts = DisplayOptions::default();
        assert_eq!(opts.len(), SCHEMA.len());
        assert_eq!(opts.get("spacing"), Some(&OptionValue::Text("space-around".into())));
        assert_eq!(opts.get("larivaarGurbani"), Some(&OptionValue::Bool(false)));
        assert_eq!(opts.get("vishraamHeavy"), Some(&OptionValue::Bool(true)));
    }

    #[test]
    fn schema_names_are_unique() {
        let mut names: Vec<&str> = SCHEMA.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SCHEMA.len());
    }

    #[test]
    fn validate_accepts_matching_kinds() {
        assert!(validate("larivaarAssist", &OptionValue::Bool(true)).is_ok());
        assert!(validate("spacing", &OptionValue::Text("center".into())).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_name() {
        let err = validate("fontSize", &OptionValue::Bool(true)).unwrap_err();
        assert_eq!(err, ValidationError::UnknownOption("fontSize".into()));
    }

    #[test]
    fn validate_rejects_wrong_kind() {
        let err = validate("larivaarAssist", &OptionValue::Text("yes".into())).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidOptionValue { ref name, .. } if name == "larivaarAssist"));
        let err = validate("spacing", &OptionValue::Text("left".into())).unwrap_err();
        assert!(err.to_string().contains("space-between"));
    }

    #[test]
    fn with_all_is_all_or_nothing() {
        let opts = DisplayOptions::default();
        let mut updates = BTreeMap::new();
        updates.insert("larivaarGurbani".to_string(), OptionValue::Bool(true));
        updates.insert("bogus".to_string(), OptionValue::Bool(true));
        assert!(opts.with_all(&updates).is_err());

        updates.remove("bogus");
        let next = opts.with_all(&updates).unwrap();
        assert_eq!(next.get("larivaarGurbani"), Some(&OptionValue::Bool(true)));
        assert_eq!(opts.get("larivaarGurbani"), Some(&OptionValue::Bool(false)));
    }

    #[test]
    fn serializes_as_flat_object() {
        let json = serde_json::to_value(DisplayOptions::default()).unwrap();
        assert_eq!(json["spacing"], "space-around");
        assert_eq!(json["simpleGraphics"], false);
    }
}
