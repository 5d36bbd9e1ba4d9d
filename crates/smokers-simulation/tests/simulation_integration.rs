// Purpose: End-to-end runs of the simulation through its public API.

use std::sync::Arc;
use std::time::Duration;

use smokers_core::{DelayModel, InMemoryStateLogger, SmokerStatus, SnapshotFormat, SnapshotRecord};
use smokers_simulation::{AccessKey, LogConfig, Simulation, SimulationConfig};
use tokio::sync::watch;

fn quick_config(cigarettes: u64, seed: u64) -> SimulationConfig {
    SimulationConfig {
        cigarettes,
        seed: Some(seed),
        delay: DelayModel::instant(),
        ..SimulationConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_run_is_clean_and_closes_everyone() {
    let recorder = Arc::new(InMemoryStateLogger::new());
    let simulation = Simulation::with_logger(quick_config(30, 5), recorder.clone()).unwrap();
    let (_stop, stop_rx) = watch::channel(false);

    let report = tokio::time::timeout(Duration::from_secs(30), simulation.run(stop_rx))
        .await
        .expect("simulation finishes")
        .unwrap();

    assert!(report.is_clean(), "{report}");
    assert!(!report.agent.interrupted);
    assert_eq!(report.seed, 5);
    assert_eq!(report.final_state.total_cigarettes(), 30);
    assert_eq!(report.final_state.ingredient_count, [0, 0, 0]);
    assert!(report.final_state.all_closed());
    assert_eq!(recorder.last(), Some(report.final_state.clone()));
}

#[tokio::test]
async fn test_json_state_log_records_every_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("smokers.jsonl");
    let config = SimulationConfig {
        key: AccessKey::new(0x77),
        log: LogConfig {
            path: path.clone(),
            format: SnapshotFormat::Json,
        },
        ..quick_config(5, 21)
    };

    let simulation = Simulation::from_config(config).unwrap();
    let (_stop, stop_rx) = watch::channel(false);
    let report = simulation.run(stop_rx).await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let records: Vec<SnapshotRecord> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(records.len() as u64, report.snapshots);
    for (expected, record) in records.iter().enumerate() {
        assert_eq!(record.seq, expected as u64);
    }
    let last = &records.last().unwrap().state;
    assert_eq!(last, &report.final_state);
    assert!(last.smoker_status.iter().all(|s| *s == SmokerStatus::Closing));
}

#[tokio::test]
async fn test_table_state_log_starts_with_key_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("smokers.log");
    let config = SimulationConfig {
        key: AccessKey::new(0x534d),
        log: LogConfig {
            path: path.clone(),
            format: SnapshotFormat::Table,
        },
        ..quick_config(3, 2)
    };

    Simulation::from_config(config)
        .unwrap()
        .run(watch::channel(false).1)
        .await
        .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.lines().next().unwrap().contains("0x534d"));
    assert!(content.lines().any(|line| line.contains("CLOS")));
}

#[tokio::test]
async fn test_stop_request_closes_the_factory_early() {
    let config = SimulationConfig {
        cigarettes: u64::MAX,
        seed: Some(8),
        delay: DelayModel::default(),
        ..SimulationConfig::default()
    };
    let simulation = Simulation::with_logger(config, Arc::new(InMemoryStateLogger::new())).unwrap();
    let (stop, stop_rx) = watch::channel(false);

    let run = tokio::spawn(simulation.run(stop_rx));
    tokio::time::sleep(Duration::from_millis(20)).await;
    stop.send(true).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("stop is honoured")
        .unwrap()
        .unwrap();

    assert!(report.agent.interrupted);
    assert!(report.is_clean(), "{report}");
    assert!(report.final_state.all_closed());
    // A supply in flight when the stop lands may be abandoned by its smoker.
    let supplied: u64 = report.agent.supplied.iter().sum();
    let smoked = report.final_state.total_cigarettes();
    assert!(report.agent.rounds <= smoked && smoked <= supplied);
}

#[test]
fn test_missing_state_log_directory_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let config = SimulationConfig {
        log: LogConfig {
            path: dir.path().join("missing").join("smokers.log"),
            format: SnapshotFormat::Table,
        },
        ..quick_config(1, 1)
    };
    let err = Simulation::from_config(config).unwrap_err();
    assert!(err.to_string().contains("state log"));
}
