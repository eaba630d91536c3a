use std::fmt;

use gleaner_config::{RelabelAction, RelabelConfig};
use gleaner_event::SizedTags;
use itertools::Itertools;
use regex::Regex;
use smallvec::SmallVec;

/// An error returned when a relabel rule cannot be compiled.
#[derive(Debug, thiserror::Error)]
pub enum RelabelError {
    /// The regular expression does not compile.
    #[error("invalid relabel regex `{regex}`")]
    InvalidRegex {
        /// The regex as configured.
        regex: String,
        /// The underlying compile error.
        #[source]
        source: regex::Error,
    },
    /// The action writes a label but no target is configured.
    #[error("relabel action `{0}` requires a target label")]
    MissingTargetLabel(RelabelAction),
    /// The target label is static and not a valid label name.
    #[error("invalid relabel target label `{0}`")]
    InvalidTargetLabel(String),
    /// A `hashmod` rule was configured without a modulus.
    #[error("relabel action `hashmod` requires a positive modulus")]
    ZeroModulus,
    /// The action reads source labels but none are configured.
    #[error("relabel action `{0}` requires source labels")]
    MissingSourceLabels(RelabelAction),
}

/// Returns `true` if `name` is a valid label name.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A single compiled relabel rule.
#[derive(Clone)]
pub struct RelabelRule {
    source_labels: SmallVec<[String; 2]>,
    separator: String,
    regex: Regex,
    modulus: u64,
    target_label: String,
    replacement: String,
    action: RelabelAction,
}

impl RelabelRule {
    /// Compiles and checks a configured rule.
    pub fn new(config: &RelabelConfig) -> Result<Self, RelabelError> {
        let anchored = format!("^(?:{})$", config.regex);
        let regex = Regex::new(&anchored).map_err(|source| RelabelError::InvalidRegex {
            regex: config.regex.clone(),
            source,
        })?;

        let action = config.action;
        let writes_target = matches!(
            action,
            RelabelAction::Replace
                | RelabelAction::HashMod
                | RelabelAction::Lowercase
                | RelabelAction::Uppercase
                | RelabelAction::KeepEqual
                | RelabelAction::DropEqual
        );

        if writes_target && config.target_label.is_empty() {
            return Err(RelabelError::MissingTargetLabel(action));
        }
        if action != RelabelAction::Replace
            && writes_target
            && !is_valid_label_name(&config.target_label)
        {
            return Err(RelabelError::InvalidTargetLabel(config.target_label.clone()));
        }
        if action == RelabelAction::HashMod && config.modulus == 0 {
            return Err(RelabelError::ZeroModulus);
        }
        if matches!(
            action,
            RelabelAction::KeepEqual
                | RelabelAction::DropEqual
                | RelabelAction::HashMod
                | RelabelAction::Lowercase
                | RelabelAction::Uppercase
        ) && config.source_labels.is_empty()
        {
            return Err(RelabelError::MissingSourceLabels(action));
        }

        Ok(Self {
            source_labels: config.source_labels.iter().cloned().collect(),
            separator: config.separator.clone(),
            regex,
            modulus: config.modulus,
            target_label: config.target_label.clone(),
            replacement: config.replacement.clone(),
            action,
        })
    }

    fn source_value(&self, tags: &SizedTags) -> String {
        self.source_labels
            .iter()
            .map(|label| tags.get(label))
            .join(&self.separator)
    }

    /// Applies the rule to `tags` and returns `false` if the series must be dropped.
    pub fn apply(&self, tags: &mut SizedTags) -> bool {
        match self.action {
            RelabelAction::Keep => self.regex.is_match(&self.source_value(tags)),
            RelabelAction::Drop => !self.regex.is_match(&self.source_value(tags)),
            RelabelAction::KeepEqual => self.source_value(tags) == tags.get(&self.target_label),
            RelabelAction::DropEqual => self.source_value(tags) != tags.get(&self.target_label),
            RelabelAction::Replace => {
                self.replace(tags);
                true
            }
            RelabelAction::HashMod => {
                let digest = md5::compute(self.source_value(tags));
                let [_, _, _, _, _, _, _, _, tail @ ..] = digest.0;
                let hash = u64::from_be_bytes(tail) % self.modulus;
                tags.insert(&self.target_label, hash.to_string());
                true
            }
            RelabelAction::Lowercase => {
                let value = self.source_value(tags).to_lowercase();
                tags.insert(&self.target_label, value);
                true
            }
            RelabelAction::Uppercase => {
                let value = self.source_value(tags).to_uppercase();
                tags.insert(&self.target_label, value);
                true
            }
            RelabelAction::LabelMap => {
                let mapped: Vec<(String, String)> = tags
                    .iter()
                    .filter(|(name, _)| self.regex.is_match(name))
                    .map(|(name, value)| {
                        let target = self.regex.replace(name, self.replacement.as_str());
                        (target.into_owned(), value.to_owned())
                    })
                    .collect();

                for (name, value) in mapped {
                    tags.insert(&name, value);
                }
                true
            }
            RelabelAction::LabelDrop => {
                tags.compact(|name, _| !self.regex.is_match(name));
                true
            }
            RelabelAction::LabelKeep => {
                tags.compact(|name, _| self.regex.is_match(name));
                true
            }
        }
    }

    fn replace(&self, tags: &mut SizedTags) {
        let value = self.source_value(tags);
        let Some(captures) = self.regex.captures(&value) else {
            return;
        };

        let mut target = String::new();
        captures.expand(&self.target_label, &mut target);
        if !is_valid_label_name(&target) {
            return;
        }

        let mut replaced = String::new();
        captures.expand(&self.replacement, &mut replaced);
        if replaced.is_empty() {
            tags.erase(&target);
        } else {
            tags.insert(&target, replaced);
        }
    }
}

impl fmt::Debug for RelabelRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelabelRule")
            .field("action", &self.action)
            .field("source_labels", &self.source_labels)
            .field("regex", &self.regex.as_str())
            .field("target_label", &self.target_label)
            .finish_non_exhaustive()
    }
}

/// An ordered chain of compiled relabel rules.
#[derive(Clone, Debug, Default)]
pub struct RelabelRules(Vec<RelabelRule>);

impl RelabelRules {
    /// Compiles all configured rules in order.
    pub fn from_configs(configs: &[RelabelConfig]) -> Result<Self, RelabelError> {
        configs.iter().map(RelabelRule::new).collect::<Result<_, _>>().map(Self)
    }

    /// Returns `true` if the chain has no rules.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Runs the chain and returns `false` as soon as a rule drops the series.
    pub fn process(&self, tags: &mut SizedTags) -> bool {
        self.0.iter().all(|rule| rule.apply(tags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(value: serde_json::Value) -> RelabelRules {
        let configs: Vec<RelabelConfig> = serde_json::from_value(value).unwrap();
        RelabelRules::from_configs(&configs).unwrap()
    }

    fn tags(pairs: &[(&str, &str)]) -> SizedTags {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_replace_with_captures() {
        let rules = rules(serde_json::json!([{
            "source_labels": ["__address__"],
            "regex": "(.+):(\\d+)",
            "target_label": "host",
        }]));

        let mut t = tags(&[("__address__", "node-1:9100")]);
        assert!(rules.process(&mut t));
        assert_eq!(t.get("host"), "node-1");
    }

    #[test]
    fn test_replace_joins_with_separator() {
        let rules = rules(serde_json::json!([{
            "source_labels": ["a", "b", "missing"],
            "separator": "/",
            "target_label": "joined",
            "replacement": "$1",
        }]));

        let mut t = tags(&[("a", "x"), ("b", "y")]);
        rules.process(&mut t);
        assert_eq!(t.get("joined"), "x/y/");
    }

    #[test]
    fn test_replace_empty_result_removes_target() {
        let rules = rules(serde_json::json!([{
            "source_labels": ["unset"],
            "target_label": "env",
        }]));

        let mut t = tags(&[("env", "prod")]);
        rules.process(&mut t);
        assert!(!t.contains("env"));
        assert_eq!(t.tracked_size(), 0);
    }

    #[test]
    fn test_regex_is_anchored() {
        let rules = rules(serde_json::json!([{
            "source_labels": ["__name__"],
            "regex": "go_.*",
            "action": "drop",
        }]));

        assert!(!rules.process(&mut tags(&[("__name__", "go_goroutines")])));
        assert!(rules.process(&mut tags(&[("__name__", "x_go_goroutines")])));
    }

    #[test]
    fn test_keep() {
        let rules = rules(serde_json::json!([{
            "source_labels": ["job"],
            "regex": "node|kubelet",
            "action": "keep",
        }]));

        assert!(rules.process(&mut tags(&[("job", "node")])));
        assert!(!rules.process(&mut tags(&[("job", "other")])));
    }

    #[test]
    fn test_keepequal_dropequal() {
        let keep = rules(serde_json::json!([{
            "source_labels": ["a"],
            "target_label": "b",
            "action": "keepequal",
        }]));
        let drop = rules(serde_json::json!([{
            "source_labels": ["a"],
            "target_label": "b",
            "action": "dropequal",
        }]));

        assert!(keep.process(&mut tags(&[("a", "1"), ("b", "1")])));
        assert!(!keep.process(&mut tags(&[("a", "1"), ("b", "2")])));
        assert!(!drop.process(&mut tags(&[("a", "1"), ("b", "1")])));
        assert!(drop.process(&mut tags(&[("a", "1"), ("b", "2")])));
    }

    #[test]
    fn test_hashmod_is_stable() {
        let rules = rules(serde_json::json!([{
            "source_labels": ["instance"],
            "modulus": 8,
            "target_label": "shard",
            "action": "hashmod",
        }]));

        let mut first = tags(&[("instance", "node-1:9100")]);
        let mut second = tags(&[("instance", "node-1:9100")]);
        rules.process(&mut first);
        rules.process(&mut second);

        let shard: u64 = first.get("shard").parse().unwrap();
        assert!(shard < 8);
        assert_eq!(first.get("shard"), second.get("shard"));
    }

    #[test]
    fn test_labelmap() {
        let rules = rules(serde_json::json!([{
            "regex": "__meta_kubernetes_pod_label_(.+)",
            "replacement": "$1",
            "action": "labelmap",
        }]));

        let mut t = tags(&[("__meta_kubernetes_pod_label_app", "web"), ("job", "k8s")]);
        rules.process(&mut t);

        insta::assert_debug_snapshot!(t, @r###"
        {
            "__meta_kubernetes_pod_label_app": "web",
            "job": "k8s",
            "app": "web",
        }
        "###);
    }

    #[test]
    fn test_labeldrop_labelkeep() {
        let drop = rules(serde_json::json!([{"regex": "tmp_.*", "action": "labeldrop"}]));
        let keep = rules(serde_json::json!([{"regex": "__name__|job", "action": "labelkeep"}]));

        let mut t = tags(&[("__name__", "up"), ("tmp_a", "1"), ("job", "node"), ("zone", "a")]);
        drop.process(&mut t);
        assert!(!t.contains("tmp_a"));

        keep.process(&mut t);
        let names: Vec<_> = t.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["__name__", "job"]);
    }

    #[test]
    fn test_case_actions() {
        let rules = rules(serde_json::json!([
            {"source_labels": ["env"], "target_label": "env_lower", "action": "lowercase"},
            {"source_labels": ["env"], "target_label": "env_upper", "action": "uppercase"},
        ]));

        let mut t = tags(&[("env", "Prod")]);
        rules.process(&mut t);
        assert_eq!(t.get("env_lower"), "prod");
        assert_eq!(t.get("env_upper"), "PROD");
    }

    #[test]
    fn test_chain_stops_on_drop() {
        let rules = rules(serde_json::json!([
            {"source_labels": ["job"], "regex": "node", "action": "drop"},
            {"source_labels": ["job"], "target_label": "seen"},
        ]));

        let mut t = tags(&[("job", "node")]);
        assert!(!rules.process(&mut t));
        assert!(!t.contains("seen"));
    }

    #[test]
    fn test_invalid_rules() {
        let err = |value: serde_json::Value| {
            let config: RelabelConfig = serde_json::from_value(value).unwrap();
            RelabelRule::new(&config).unwrap_err().to_string()
        };

        insta::assert_snapshot!(err(serde_json::json!({"regex": "(", "target_label": "a"})), @"invalid relabel regex `(`");
        insta::assert_snapshot!(err(serde_json::json!({"source_labels": ["a"]})), @"relabel action `replace` requires a target label");
        insta::assert_snapshot!(err(serde_json::json!({"target_label": "b", "action": "keepequal"})), @"relabel action `keepequal` requires source labels");
        insta::assert_snapshot!(err(serde_json::json!({"source_labels": ["a"], "target_label": "b", "action": "hashmod"})), @"relabel action `hashmod` requires a positive modulus");
        insta::assert_snapshot!(err(serde_json::json!({"source_labels": ["a"], "target_label": "0b", "action": "lowercase"})), @"invalid relabel target label `0b`");
    }
}
