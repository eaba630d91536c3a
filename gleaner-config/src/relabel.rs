use std::fmt;

use serde::{Deserialize, Serialize};

/// Action performed by a relabel rule.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelabelAction {
    /// Writes the expanded replacement to the target label if the regex matches.
    #[default]
    Replace,
    /// Drops the series unless the regex matches.
    Keep,
    /// Drops the series if the regex matches.
    Drop,
    /// Drops the series unless the source value equals the target label's value.
    KeepEqual,
    /// Drops the series if the source value equals the target label's value.
    DropEqual,
    /// Writes the hash of the source value modulo `modulus` to the target label.
    HashMod,
    /// Copies every label whose name matches the regex to the expanded replacement name.
    LabelMap,
    /// Removes every label whose name matches the regex.
    LabelDrop,
    /// Removes every label whose name does not match the regex.
    LabelKeep,
    /// Writes the lower-cased source value to the target label.
    Lowercase,
    /// Writes the upper-cased source value to the target label.
    Uppercase,
}

impl RelabelAction {
    /// Returns the action name as spelled in the configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Keep => "keep",
            Self::Drop => "drop",
            Self::KeepEqual => "keepequal",
            Self::DropEqual => "dropequal",
            Self::HashMod => "hashmod",
            Self::LabelMap => "labelmap",
            Self::LabelDrop => "labeldrop",
            Self::LabelKeep => "labelkeep",
            Self::Lowercase => "lowercase",
            Self::Uppercase => "uppercase",
        }
    }
}

impl fmt::Display for RelabelAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single relabel rule as written in the configuration.
///
/// Rules are compiled and checked by the relabel processor before use.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelabelConfig {
    /// Labels whose values are joined with `separator` to form the source value.
    pub source_labels: Vec<String>,
    /// Separator placed between concatenated source label values.
    ///
    /// Defaults to `;`.
    pub separator: String,
    /// Regular expression matched against the source value. Anchored on both ends.
    ///
    /// Defaults to `(.*)`.
    pub regex: String,
    /// Modulus for the `hashmod` action.
    pub modulus: u64,
    /// Label written by actions that produce a value.
    pub target_label: String,
    /// Replacement with `$1`-style capture group references.
    ///
    /// Defaults to `$1`.
    pub replacement: String,
    /// The action to perform.
    ///
    /// Defaults to `replace`.
    pub action: RelabelAction,
}

impl Default for RelabelConfig {
    fn default() -> Self {
        Self {
            source_labels: Vec::new(),
            separator: ";".to_owned(),
            regex: "(.*)".to_owned(),
            modulus: 0,
            target_label: String::new(),
            replacement: "$1".to_owned(),
            action: RelabelAction::Replace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let rule: RelabelConfig = serde_json::from_value(serde_json::json!({
            "source_labels": ["__name__"],
            "target_label": "metric",
        }))
        .unwrap();

        assert_eq!(rule.separator, ";");
        assert_eq!(rule.regex, "(.*)");
        assert_eq!(rule.replacement, "$1");
        assert_eq!(rule.action, RelabelAction::Replace);
    }

    #[test]
    fn test_action_names() {
        let actions: Vec<RelabelAction> = serde_json::from_value(serde_json::json!([
            "keepequal", "dropequal", "hashmod", "labelmap", "labeldrop", "labelkeep"
        ]))
        .unwrap();

        insta::assert_debug_snapshot!(actions, @r###"
        [
            KeepEqual,
            DropEqual,
            HashMod,
            LabelMap,
            LabelDrop,
            LabelKeep,
        ]
        "###);
    }

    #[test]
    fn test_action_display_matches_config() {
        let actions = [
            RelabelAction::Replace,
            RelabelAction::Keep,
            RelabelAction::Drop,
            RelabelAction::KeepEqual,
            RelabelAction::DropEqual,
            RelabelAction::HashMod,
            RelabelAction::LabelMap,
            RelabelAction::LabelDrop,
            RelabelAction::LabelKeep,
            RelabelAction::Lowercase,
            RelabelAction::Uppercase,
        ];

        for action in actions {
            let serialized = serde_json::to_value(action).unwrap();
            assert_eq!(serialized, action.to_string());
        }
    }
}
