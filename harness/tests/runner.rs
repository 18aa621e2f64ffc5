mod common;

use std::{sync::Arc, time::Duration};

use common::{MockModel, POISON, batch, inventory, source};
use harness::{
    BenchErr, BenchmarkRunner, Clock, ManualClock, ModelErr, RunnerConfig, Stage, VecSource,
};
use ndarray::{ArrayD, IxDyn};

const STEP: Duration = Duration::from_millis(100);

fn config() -> RunnerConfig {
    RunnerConfig {
        sample_frequency: 1,
        warmup_iterations: Some(3),
        ..RunnerConfig::default()
    }
}

fn runner(config: RunnerConfig, devices: usize, clock: &Arc<ManualClock>) -> BenchmarkRunner {
    let clock: Arc<dyn Clock> = clock.clone();
    BenchmarkRunner::with_inventory(config, inventory(devices))
        .unwrap()
        .with_clock(clock)
}

fn assert_close(got: Option<f64>, expected: f64) {
    let got = got.expect("value should be available");
    assert!((got - expected).abs() < 1e-9, "got {got}, expected {expected}");
}

#[test]
fn ten_batches_of_thirty_two_report_the_expected_rates() {
    let clock = Arc::new(ManualClock::new());
    let runner = runner(config(), 1, &clock);

    let mut model = MockModel::timed(Arc::clone(&clock), STEP);
    model.forward_time = Duration::from_millis(5);
    model.backward_time = Duration::from_millis(15);
    let mut source = source(10, 32);

    let report = runner
        .run("Mock", &mut model, &mut source, "MNIST 32x1x2x2")
        .unwrap();

    assert_eq!(report.iterations, 10);
    assert_eq!(report.training_time, 10 * STEP);
    assert_close(report.avg_iteration_ms, 100.0);
    assert_close(report.avg_samples_per_sec, 320.0);
    assert_close(report.avg_batches_per_sec, 10.0);
    assert_close(report.avg_feedforward_ms, 5.0);
    assert_close(report.avg_backprop_ms, 15.0);

    assert_eq!(report.name, "Mock");
    assert_eq!(report.description, "MNIST 32x1x2x2");
    assert_eq!(report.total_params, 4);
    assert_eq!(report.total_layers, 2);
    assert_eq!(report.devices, vec!["host:0".to_string()]);
}

#[test]
fn a_run_shorter_than_the_warmup_reports_no_rates() {
    let clock = Arc::new(ManualClock::new());
    let runner = runner(config(), 1, &clock);

    let mut model = MockModel::timed(Arc::clone(&clock), STEP);
    let mut source = source(3, 32);

    let report = runner.run("Mock", &mut model, &mut source, "tiny").unwrap();

    assert_eq!(report.avg_iteration_ms, None);
    assert_eq!(report.avg_samples_per_sec, None);
    assert!(report.render().contains("n/a"));
}

#[test]
fn max_iterations_caps_both_passes() {
    let clock = Arc::new(ManualClock::new());
    let config = RunnerConfig {
        max_iterations: Some(6),
        ..config()
    };
    let runner = runner(config, 1, &clock);

    let mut model = MockModel::timed(Arc::clone(&clock), STEP);
    model.forward_time = Duration::from_millis(5);
    model.backward_time = Duration::from_millis(15);
    let mut source = source(10, 32);

    let started = clock.now();
    let report = runner.run("Mock", &mut model, &mut source, "capped").unwrap();

    assert_eq!(report.iterations, 6);
    assert_eq!(model.steps, 6);
    assert_eq!(report.training_time, 6 * STEP);
    // Only six forward/backward pairs ran in the timed pass as well.
    assert_eq!(
        clock.now().duration_since(started),
        6 * STEP + 6 * Duration::from_millis(20)
    );
}

#[test]
fn the_first_reported_input_sets_the_batch_size() {
    let clock = Arc::new(ManualClock::new());
    let runner = runner(config(), 1, &clock);

    let aux = ArrayD::zeros(IxDyn(&[7, 3]));
    let mut model = MockModel::timed(Arc::clone(&clock), STEP).with_aux_input(aux);
    let mut source = source(10, 32);

    let report = runner.run("Graph", &mut model, &mut source, "graph").unwrap();

    assert_close(report.avg_samples_per_sec, 320.0);
}

#[test]
fn a_failing_training_step_yields_no_report() {
    let clock = Arc::new(ManualClock::new());
    let runner = runner(config(), 1, &clock);

    let mut batches: Vec<_> = (1..=5).map(|i| batch(32, i as f32)).collect();
    batches.push(batch(32, POISON));
    let mut source = VecSource::new(batches);
    let mut model = MockModel::timed(Arc::clone(&clock), STEP);

    let err = runner
        .run("Mock", &mut model, &mut source, "poisoned")
        .unwrap_err();

    assert!(matches!(
        err,
        BenchErr::Stage {
            stage: Stage::Training,
            source: ModelErr::Failure(_),
        }
    ));
    assert_eq!(model.steps, 5);
}

#[test]
fn device_requests_are_resolved_against_the_inventory() {
    let clock = Arc::new(ManualClock::new());

    let oversized = RunnerConfig {
        devices: 8,
        ..config()
    };
    assert_eq!(runner(oversized, 2, &clock).workers(), 2);

    let all = RunnerConfig {
        devices: -1,
        ..config()
    };
    assert_eq!(runner(all, 3, &clock).workers(), 3);

    let single = RunnerConfig {
        devices: 0,
        ..config()
    };
    assert_eq!(runner(single, 3, &clock).workers(), 1);
}

#[test]
fn invalid_configurations_are_rejected_up_front() {
    let config = RunnerConfig {
        devices: -3,
        ..config()
    };
    let err = BenchmarkRunner::with_inventory(config, inventory(1)).err().unwrap();
    assert!(err.is_config());

    let config = RunnerConfig {
        sample_frequency: 0,
        ..RunnerConfig::default()
    };
    assert!(BenchmarkRunner::with_inventory(config, inventory(1)).is_err());
}

#[test]
fn multiple_devices_train_replicas_and_average_them_back() {
    let config = RunnerConfig {
        devices: 2,
        warmup_iterations: Some(0),
        ..RunnerConfig::default()
    };
    let runner = BenchmarkRunner::with_inventory(config, inventory(2)).unwrap();

    let mut model = MockModel::new(4);
    let mut source = source(10, 32);

    let report = common::within(Duration::from_secs(30), move || {
        let report = runner.run("Mock", &mut model, &mut source, "shared");
        (report, model)
    });
    let (report, model) = report;
    let report = report.unwrap();

    assert_eq!(report.iterations, 10);
    assert_eq!(model.params, vec![5.; 4]);
    assert!(report.avg_feedforward_ms.is_some());
}
