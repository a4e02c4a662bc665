use std::collections::{BTreeMap, BTreeSet};

use tracing_test::traced_test;

use topic_provisioner::engine::ConfigChangeKind;
use topic_provisioner::error::Operation;
use topic_provisioner::gateway::memory::{Call, MemoryCluster};
use topic_provisioner::gateway::ConfigEntry;
use topic_provisioner::{
    provision, ClusterTopicState, ProvisionConfig, ProvisionError, RetryPolicy, Shutdown,
    TopicSpec,
};

fn config(topics: Vec<TopicSpec>) -> ProvisionConfig {
    ProvisionConfig {
        brokers: "localhost:9092".to_string(),
        topics,
        ..Default::default()
    }
}

#[tokio::test]
async fn creates_missing_topic() -> anyhow::Result<()> {
    let mut cluster = MemoryCluster::new();
    let config = config(vec![TopicSpec::new("t1", 8, 1)]);

    let report = provision(&config, &mut cluster, Shutdown::new()).await?;

    assert_eq!(
        vec![&Call::CreateTopics(vec![TopicSpec::new("t1", 8, 1)])],
        cluster.mutating_calls()
    );
    assert_eq!(vec!["t1".to_string()], report.created);
    assert_eq!(8, cluster.topic("t1").unwrap().partition_count);
    Ok(())
}

#[tokio::test]
async fn grows_existing_topic() -> anyhow::Result<()> {
    let mut cluster = MemoryCluster::new().with_topic(ClusterTopicState::new("t1", 5));
    let config = config(vec![TopicSpec::new("t1", 8, 1)]);

    provision(&config, &mut cluster, Shutdown::new()).await?;

    assert_eq!(
        vec![&Call::IncreasePartitions(BTreeMap::from([(
            "t1".to_string(),
            8
        )]))],
        cluster.mutating_calls()
    );
    assert_eq!(8, cluster.topic("t1").unwrap().partition_count);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn updates_changed_config() -> anyhow::Result<()> {
    let mut cluster = MemoryCluster::new()
        .with_topic(ClusterTopicState::new("t1", 1).with_config("cleanup.policy", "delete"));
    let config = config(vec![
        TopicSpec::new("t1", 1, 1).with_config("cleanup.policy", "compact")
    ]);

    let report = provision(&config, &mut cluster, Shutdown::new()).await?;

    assert_eq!(
        vec![&Call::AlterConfigs(BTreeMap::from([(
            "t1".to_string(),
            BTreeSet::from([ConfigEntry::new("cleanup.policy", "compact")])
        )]))],
        cluster.mutating_calls()
    );
    assert_eq!(1, report.config_changes.len());
    assert_eq!(
        ConfigChangeKind::Changed {
            from: "delete".to_string(),
            to: "compact".to_string()
        },
        report.config_changes[0].kind
    );
    assert!(logs_contain("config value changed"));
    Ok(())
}

#[tokio::test]
async fn second_run_changes_nothing() -> anyhow::Result<()> {
    let mut cluster = MemoryCluster::new()
        .with_topic(ClusterTopicState::new("orders", 2).with_config("retention.ms", "1"));
    let config = config(vec![
        TopicSpec::new("orders", 6, 3).with_config("retention.ms", "86400000"),
        TopicSpec::new("payments", 3, 3).with_config("cleanup.policy", "compact"),
    ]);

    let first = provision(&config, &mut cluster, Shutdown::new()).await?;
    assert!(!first.is_noop());

    cluster.clear_calls();
    let second = provision(&config, &mut cluster, Shutdown::new()).await?;

    assert!(second.is_noop());
    assert!(cluster.mutating_calls().is_empty());
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn never_shrinks_partitions() -> anyhow::Result<()> {
    let mut cluster = MemoryCluster::new().with_topic(ClusterTopicState::new("t1", 12));
    let config = config(vec![TopicSpec::new("t1", 4, 1)]);

    let report = provision(&config, &mut cluster, Shutdown::new()).await?;

    assert!(cluster.mutating_calls().is_empty());
    assert_eq!(12, cluster.topic("t1").unwrap().partition_count);
    assert_eq!(1, report.partition_drift.len());
    assert!(logs_contain("configured partition number is less than actual"));
    Ok(())
}

#[tokio::test]
async fn drifted_topic_still_gets_config_updates() -> anyhow::Result<()> {
    let mut cluster = MemoryCluster::new()
        .with_topic(ClusterTopicState::new("t1", 12).with_config("cleanup.policy", "delete"));
    let config = config(vec![
        TopicSpec::new("t1", 4, 1).with_config("cleanup.policy", "compact")
    ]);

    let report = provision(&config, &mut cluster, Shutdown::new()).await?;

    assert_eq!(1, report.partition_drift.len());
    assert!(report.partition_increases.is_empty());
    assert_eq!(1, cluster.calls_to(Operation::AlterConfigs).len());
    assert_eq!(1, cluster.mutating_calls().len());
    let t1 = cluster.topic("t1").unwrap();
    assert_eq!(12, t1.partition_count);
    assert_eq!("compact", t1.configs["cleanup.policy"]);
    Ok(())
}

#[tokio::test]
async fn leaves_undeclared_topics_and_keys_alone() -> anyhow::Result<()> {
    let mut cluster = MemoryCluster::new()
        .with_topic(
            ClusterTopicState::new("t1", 1)
                .with_config("cleanup.policy", "delete")
                .with_config("segment.bytes", "1024"),
        )
        .with_topic(ClusterTopicState::new("legacy", 1).with_config("retention.ms", "5"));
    let config = config(vec![
        TopicSpec::new("t1", 1, 1).with_config("cleanup.policy", "compact")
    ]);

    provision(&config, &mut cluster, Shutdown::new()).await?;

    let t1 = cluster.topic("t1").unwrap();
    assert_eq!("compact", t1.configs["cleanup.policy"]);
    assert_eq!("1024", t1.configs["segment.bytes"]);
    let legacy = cluster.topic("legacy").unwrap();
    assert_eq!("5", legacy.configs["retention.ms"]);
    assert_eq!(2, cluster.topics().len());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let mut cluster = MemoryCluster::new();
    cluster.fail_always();
    let config = ProvisionConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        },
        ..config(vec![TopicSpec::new("t1", 1, 1)])
    };

    let err = provision(&config, &mut cluster, Shutdown::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Failed { attempts: 3, .. }));
    assert_eq!(3, cluster.calls_to(Operation::ListTopics).len());
    assert_eq!(3, cluster.calls().len());
}

#[tokio::test(start_paused = true)]
async fn recovers_from_transient_failure() -> anyhow::Result<()> {
    let mut cluster = MemoryCluster::new();
    cluster.fail_operation(Operation::CreateTopics, 1);
    let config = config(vec![TopicSpec::new("t1", 3, 1)]);

    let report = provision(&config, &mut cluster, Shutdown::new()).await?;

    assert_eq!(2, report.attempts);
    assert_eq!(vec!["t1".to_string()], report.created);
    assert_eq!(3, cluster.topic("t1").unwrap().partition_count);
    Ok(())
}

#[tokio::test]
async fn disabled_makes_no_calls() -> anyhow::Result<()> {
    let mut cluster = MemoryCluster::new();
    let config = ProvisionConfig {
        enabled: false,
        ..config(vec![TopicSpec::new("t1", 1, 1)])
    };

    let report = provision(&config, &mut cluster, Shutdown::new()).await?;

    assert!(report.is_noop());
    assert!(cluster.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn invalid_config_is_not_retried() {
    let mut cluster = MemoryCluster::new();
    let config = config(vec![TopicSpec::new("t1", 0, 1)]);

    let err = provision(&config, &mut cluster, Shutdown::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Validation(_)));
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn interrupted_before_start() {
    let mut cluster = MemoryCluster::new();
    let shutdown = Shutdown::new();
    shutdown.shutdown();

    let err = provision(
        &config(vec![TopicSpec::new("t1", 1, 1)]),
        &mut cluster,
        shutdown.clone(),
    )
    .await
    .unwrap_err();

    assert!(err.is_interrupted());
    assert!(matches!(err, ProvisionError::Failed { attempts: 1, .. }));
    assert!(shutdown.is_shutdown());
    assert!(cluster.calls().is_empty());
}
