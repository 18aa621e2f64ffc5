use std::time::Duration;

use harness::{
    BenchmarkRunner, BenchmarkSuite, DataShape, DatasetKind, DeviceInventory, HostInfo, Model,
    ModelRegistry, ModelSelection, ModelType, RunnerConfig,
};
use machine_learning::{
    CpuBackend, SyntheticLoader, SyntheticSource,
    arch::{Network, Sequential, activations::ActFn, layers::Dense, loss::SoftmaxCrossEntropy},
    init::{ParamGen, init_params},
    optimization::GradientDescentWithMomentum,
};

fn host() -> HostInfo {
    HostInfo {
        processor: "Test CPU".into(),
        cores: 4,
        os: "TestOS".into(),
    }
}

fn shape() -> DataShape {
    DataShape {
        batch_size: 16,
        example: vec![1, 4, 4],
        labels: 3,
    }
}

fn small_mlp(seed: u64) -> Box<dyn Model> {
    let model = Sequential::new([
        Dense::new((16, 8), Some(ActFn::relu())),
        Dense::new((8, 3), None),
    ]);
    let params = init_params(&model, ParamGen::XavierUniform, seed).unwrap();
    let optimizer = GradientDescentWithMomentum::new(0.05, 0.9, 0.);

    Box::new(Network::new("SmallMLP", model, params, optimizer, SoftmaxCrossEntropy).unwrap())
}

fn runner(config: RunnerConfig, devices: usize) -> BenchmarkRunner {
    let inventory = DeviceInventory::probe_with_host(&CpuBackend::new(devices), &host());
    BenchmarkRunner::with_inventory(config, inventory).unwrap()
}

#[test]
fn a_real_network_produces_a_complete_report() {
    let config = RunnerConfig {
        warmup_iterations: Some(2),
        ..RunnerConfig::default()
    };
    let runner = runner(config, 1);

    let mut model = small_mlp(1);
    let mut source = SyntheticSource::new(shape(), 12, 3).unwrap();

    let report = runner
        .run("SmallMLP", model.as_mut(), &mut source, "MNIST 16x1x4x4")
        .unwrap();

    assert_eq!(report.iterations, 12);
    assert_eq!(report.total_layers, 2);
    assert_eq!(report.total_params, 17 * 8 + 9 * 3);
    assert_eq!(report.backend, "CPU");
    assert_eq!(report.os, "TestOS");
    assert!(report.avg_feedforward_ms.is_some());
    assert!(report.avg_backprop_ms.is_some());

    let rendered = report.render();
    assert_eq!(rendered.lines().count(), report.rows().len());
    assert!(rendered.lines().all(|line| line.len() == 28 + 1 + 45));
}

#[test]
fn replicas_on_host_devices_are_averaged_back() {
    let config = RunnerConfig {
        devices: -1,
        averaging_frequency: 2,
        ..RunnerConfig::default()
    };
    let runner = runner(config, 2);
    assert_eq!(runner.workers(), 2);

    let mut model = small_mlp(2);
    let before = model.params();
    let mut source = SyntheticSource::new(shape(), 8, 5).unwrap();

    let report = runner
        .run("SmallMLP", model.as_mut(), &mut source, "shared")
        .unwrap();

    assert_eq!(report.iterations, 8);
    assert_ne!(model.params(), before);
    assert!(model.params().iter().all(|p| p.is_finite()));
    assert!(report.training_time > Duration::ZERO);
}

#[test]
fn the_suite_runs_simple_mlp_from_the_default_registry() {
    let mut registry = ModelRegistry::new();
    registry.register(ModelType::SimpleMlp, |_| Ok(small_mlp(7)));

    let config = RunnerConfig {
        max_iterations: Some(4),
        ..RunnerConfig::default()
    };
    let suite = BenchmarkSuite::new(registry, runner(config, 1), 7);

    let mut loader = SyntheticLoader::new(DatasetKind::Mnist, shape(), 6, 0);
    let reports = suite
        .run(ModelSelection::Single(ModelType::SimpleMlp), &mut loader)
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].name, "SimpleMLP");
    assert_eq!(reports[0].iterations, 4);
    assert_eq!(reports[0].description, "MNIST 16x1x4x4");

    let mut text = SyntheticLoader::new(DatasetKind::ImdbSentiment, shape(), 6, 0);
    let err = suite
        .run(ModelSelection::Single(ModelType::SimpleMlp), &mut text)
        .unwrap_err();
    assert!(err.is_config());
}
