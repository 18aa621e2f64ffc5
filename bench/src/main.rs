use std::{env, path::PathBuf};

use anyhow::Result;
use bench::BenchConfig;
use harness::{BenchmarkRunner, BenchmarkSuite};
use log::info;
use machine_learning::CpuBackend;

const CONFIG_VAR: &str = "BENCH_CONFIG";

fn main() -> Result<()> {
    env_logger::init();

    let path = env::args_os()
        .nth(1)
        .or_else(|| env::var_os(CONFIG_VAR))
        .map(PathBuf::from);

    let config = BenchConfig::load(path.as_deref())?;
    info!("benchmarking {} with {} host device(s)", config.model, config.host_devices);

    let backend = CpuBackend::new(config.host_devices);
    let runner = BenchmarkRunner::new(config.runner.clone(), &backend)?;
    let suite = BenchmarkSuite::new(machine_learning::registry(), runner, config.seed);

    let mut loader = config.dataset.loader()?;
    let reports = suite.run(config.model, loader.as_mut())?;

    for report in reports {
        println!("{report}");
    }

    Ok(())
}
