use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_journal_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("JOURNAL__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = JournalNodeConfig::default();

    assert_eq!(config.cluster.node_id, 1);
    assert_eq!(config.raft.election.election_timeout_min, 500);
    assert_eq!(config.journal.segment_max_bytes, 1024 * 1024 * 1024);
    assert_eq!(config.network.max_journal_frame_size, MAX_JOURNAL_FRAME_SIZE);
    assert!(!config.monitoring.prometheus_enabled);
}

#[test]
#[serial]
fn default_config_should_pass_validation() {
    assert!(JournalNodeConfig::default().validate().is_ok());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_journal_env_vars();
    with_vars(vec![("JOURNAL__JOURNAL__SEGMENT_MAX_RECORDS", Some("1025"))], || {
        let config = JournalNodeConfig::new().unwrap();

        assert_eq!(config.journal.segment_max_records, 1025);
    });
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_journal_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("dynamic_config.toml");

    std::fs::write(
        &config_path,
        r#"
        [cluster]
        db_root_dir = "/tmp/xx/db"

        [raft.election]
        election_timeout_min = 1000
        election_timeout_max = 3000
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = JournalNodeConfig::new().expect("success");
        let result = base_config.with_override_config(config_path.to_str().unwrap());

        assert!(result.is_ok());
        let config = result.unwrap();

        assert_eq!(config.cluster.db_root_dir.as_os_str().to_str(), Some("/tmp/xx/db"));
        assert_eq!(config.raft.election.election_timeout_min, 1000);
        assert_eq!(config.raft.election.election_timeout_max, 3000);
        // untouched sections keep their defaults
        assert_eq!(config.journal.default_read_max_records, 100);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_journal_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("test_config.toml");
    std::fs::write(
        &config_path,
        r#"
        [cluster]
        node_id = 100
        initial_cluster = [
            { id = 100, address = "127.0.0.1:9081" },
            { id = 200, address = "127.0.0.1:9082" },
            { id = 300, address = "127.0.0.1:9083" },
        ]
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("JOURNAL__CLUSTER__NODE_ID", Some("200")),
        ],
        || {
            let config = JournalNodeConfig::new().unwrap();
            assert_eq!(config.cluster.node_id, 200);
            assert_eq!(config.cluster.initial_cluster.len(), 3);
            assert_eq!(config.cluster.peer_address(300), Some("127.0.0.1:9083"));
        },
    );
}

#[test]
fn validation_should_fail_with_invalid_cluster_config() {
    let mut config = JournalNodeConfig::default();
    config.cluster.node_id = 0;
    assert!(config.validate().is_err());

    let mut config = JournalNodeConfig::default();
    config.cluster.node_id = 7;
    assert!(config.validate().is_err(), "node missing from initial_cluster");

    let mut config = JournalNodeConfig::default();
    config.cluster.raft_listen_address = config.cluster.journal_listen_address;
    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_inconsistent_raft_timing() {
    let mut config = JournalNodeConfig::default();
    config.raft.election.election_timeout_min = 2000;
    config.raft.election.election_timeout_max = 1000;
    assert!(config.validate().is_err());

    let mut config = JournalNodeConfig::default();
    config.raft.replication.rpc_append_entries_clock_in_ms = 600;
    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_zero_limits() {
    let mut config = JournalNodeConfig::default();
    config.journal.segment_max_records = 0;
    assert!(config.validate().is_err());

    let mut config = JournalNodeConfig::default();
    config.network.max_journal_frame_size = MAX_JOURNAL_FRAME_SIZE + 1;
    assert!(config.validate().is_err());

    let mut config = JournalNodeConfig::default();
    config.retry.journal_io.max_retries = 0;
    assert!(config.validate().is_err());
}

#[test]
fn monitoring_validation_rejects_privileged_port() {
    let config = MonitoringConfig {
        prometheus_enabled: true,
        prometheus_port: 80,
    };
    assert!(config.validate().is_err());
}
