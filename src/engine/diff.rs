//! Pure comparisons between declared and live topic state.

use std::collections::{BTreeMap, BTreeSet};

use crate::gateway::{ConfigEntry, TopicDescription};
use crate::spec::{ProvisionSpec, TopicSpec};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct PartitionChange {
    pub from: u32,
    pub to: u32,
}

/// A topic holding more partitions than declared. Partitions never shrink, so
/// this is reported and left as is.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PartitionDrift {
    pub topic: String,
    pub desired: u32,
    pub actual: u32,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub enum ConfigChangeKind {
    /// The broker had no entry for the key.
    Added { value: String },
    Changed { from: String, to: String },
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ConfigChange {
    pub topic: String,
    pub key: String,
    pub kind: ConfigChangeKind,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PartitionPlan {
    pub increases: BTreeMap<String, PartitionChange>,
    pub drift: Vec<PartitionDrift>,
}

impl PartitionPlan {
    pub fn targets(&self) -> BTreeMap<String, u32> {
        self.increases
            .iter()
            .map(|(name, change)| (name.clone(), change.to))
            .collect()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConfigPlan {
    pub proposals: BTreeMap<String, BTreeSet<ConfigEntry>>,
    pub changes: Vec<ConfigChange>,
}

/// Declared topics missing from the cluster, in declaration order.
pub fn missing_topics(spec: &ProvisionSpec, existing: &BTreeSet<String>) -> Vec<TopicSpec> {
    spec.topics
        .iter()
        .filter(|topic| !existing.contains(&topic.name))
        .cloned()
        .collect()
}

/// Declared topics that were already on the cluster when the pass started.
pub fn existing_declared(spec: &ProvisionSpec, existing: &BTreeSet<String>) -> BTreeSet<String> {
    spec.topics
        .iter()
        .map(|topic| topic.name.clone())
        .filter(|name| existing.contains(name))
        .collect()
}

pub fn plan_partitions(
    spec: &ProvisionSpec,
    described: &BTreeMap<String, TopicDescription>,
) -> PartitionPlan {
    let mut plan = PartitionPlan::default();
    for (name, description) in described {
        let desired = match spec.topic(name) {
            Some(topic) => topic.num_partitions,
            None => continue,
        };
        let actual = description.partition_count;
        if actual < desired {
            plan.increases.insert(
                name.clone(),
                PartitionChange {
                    from: actual,
                    to: desired,
                },
            );
        } else if actual > desired {
            plan.drift.push(PartitionDrift {
                topic: name.clone(),
                desired,
                actual,
            });
        }
    }
    plan
}

/// Proposes the declared config entries of every described topic that differs
/// from the broker in at least one declared key. Broker keys that were never
/// declared stay out of every proposal.
pub fn plan_configs(
    spec: &ProvisionSpec,
    current: &BTreeMap<String, BTreeMap<String, String>>,
) -> ConfigPlan {
    let mut plan = ConfigPlan::default();
    for (name, broker_configs) in current {
        let topic = match spec.topic(name) {
            Some(topic) if !topic.configs.is_empty() => topic,
            _ => continue,
        };

        let mut entries = BTreeSet::new();
        let mut changed = false;
        for (key, value) in &topic.configs {
            entries.insert(ConfigEntry::new(key.clone(), value.clone()));
            let kind = match broker_configs.get(key) {
                Some(current) if current == value => continue,
                Some(current) => ConfigChangeKind::Changed {
                    from: current.clone(),
                    to: value.clone(),
                },
                None => ConfigChangeKind::Added {
                    value: value.clone(),
                },
            };
            changed = true;
            plan.changes.push(ConfigChange {
                topic: name.clone(),
                key: key.clone(),
                kind,
            });
        }
        if changed {
            plan.proposals.insert(name.clone(), entries);
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::{
        existing_declared, missing_topics, plan_configs, plan_partitions, ConfigChangeKind,
        PartitionChange,
    };
    use crate::gateway::{ConfigEntry, TopicDescription};
    use crate::spec::{ProvisionSpec, TopicSpec};

    fn names(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn spec() -> ProvisionSpec {
        ProvisionSpec::with_topics(vec![
            TopicSpec::new("orders", 8, 3).with_config("cleanup.policy", "compact"),
            TopicSpec::new("payments", 4, 3),
            TopicSpec::new("audit", 1, 1).with_config("retention.ms", "-1"),
        ])
    }

    #[test]
    fn missing_keeps_declaration_order() {
        let missing = missing_topics(&spec(), &names(&["payments", "unrelated"]));
        let missing: Vec<&str> = missing.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(vec!["orders", "audit"], missing);
    }

    #[test]
    fn existing_ignores_undeclared_topics() {
        let existing = existing_declared(&spec(), &names(&["payments", "unrelated"]));
        assert_eq!(names(&["payments"]), existing);
    }

    #[test]
    fn partitions_only_grow() {
        let described = BTreeMap::from([
            ("orders".to_string(), TopicDescription { partition_count: 5 }),
            ("payments".to_string(), TopicDescription { partition_count: 6 }),
            ("audit".to_string(), TopicDescription { partition_count: 1 }),
        ]);
        let plan = plan_partitions(&spec(), &described);

        assert_eq!(1, plan.increases.len());
        assert_eq!(PartitionChange { from: 5, to: 8 }, plan.increases["orders"]);
        assert_eq!(BTreeMap::from([("orders".to_string(), 8)]), plan.targets());
        assert_eq!(1, plan.drift.len());
        assert_eq!("payments", plan.drift[0].topic);
        assert_eq!(4, plan.drift[0].desired);
        assert_eq!(6, plan.drift[0].actual);
    }

    #[test]
    fn configs_never_propose_broker_only_keys() {
        let current = BTreeMap::from([
            (
                "orders".to_string(),
                BTreeMap::from([
                    ("cleanup.policy".to_string(), "delete".to_string()),
                    ("segment.bytes".to_string(), "1024".to_string()),
                ]),
            ),
            ("payments".to_string(), BTreeMap::new()),
            ("audit".to_string(), BTreeMap::new()),
        ]);
        let plan = plan_configs(&spec(), &current);

        assert_eq!(
            BTreeSet::from([ConfigEntry::new("cleanup.policy", "compact")]),
            plan.proposals["orders"]
        );
        assert!(!plan.proposals.contains_key("payments"));
        assert_eq!(2, plan.changes.len());
        assert_eq!("audit", plan.changes[0].topic);
        assert_eq!(
            ConfigChangeKind::Added {
                value: "-1".to_string()
            },
            plan.changes[0].kind
        );
        assert_eq!("orders", plan.changes[1].topic);
        assert_eq!(
            ConfigChangeKind::Changed {
                from: "delete".to_string(),
                to: "compact".to_string()
            },
            plan.changes[1].kind
        );
    }

    #[test]
    fn converged_configs_propose_nothing() {
        let current = BTreeMap::from([(
            "orders".to_string(),
            BTreeMap::from([
                ("cleanup.policy".to_string(), "compact".to_string()),
                ("segment.bytes".to_string(), "1024".to_string()),
            ]),
        )]);
        let plan = plan_configs(&spec(), &current);
        assert!(plan.changes.is_empty());
        assert!(plan.proposals.is_empty());
    }

    #[test]
    fn one_changed_key_proposes_all_declared_keys() {
        let spec = ProvisionSpec::with_topics(vec![TopicSpec::new("orders", 1, 1)
            .with_config("cleanup.policy", "compact")
            .with_config("retention.ms", "1000")]);
        let current = BTreeMap::from([(
            "orders".to_string(),
            BTreeMap::from([
                ("cleanup.policy".to_string(), "compact".to_string()),
                ("retention.ms".to_string(), "500".to_string()),
            ]),
        )]);
        let plan = plan_configs(&spec, &current);
        assert_eq!(1, plan.changes.len());
        assert_eq!(
            BTreeSet::from([
                ConfigEntry::new("cleanup.policy", "compact"),
                ConfigEntry::new("retention.ms", "1000"),
            ]),
            plan.proposals["orders"]
        );
    }
}
