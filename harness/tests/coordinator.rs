mod common;

use std::{
    num::NonZeroU64,
    sync::Arc,
    time::Duration,
};

use common::{MockModel, POISON, batch, source, within};
use harness::{
    BatchSource, BenchErr, InequalityHandling, ManualClock, MetricAccumulator, ModelErr,
    SamplingPolicy, Stage, VecSource,
    parallel::{Coordinator, CoordinatorSettings, Feed, RunSummary},
};

const DEADLINE: Duration = Duration::from_secs(30);
const STEP: Duration = Duration::from_millis(100);

fn settings(workers: usize, policy: InequalityHandling, prefetch: usize) -> CoordinatorSettings {
    CoordinatorSettings {
        workers,
        averaging_frequency: NonZeroU64::new(10).unwrap(),
        prefetch_buffer: prefetch,
        inequality_handling: policy,
        sampling: SamplingPolicy::new(NonZeroU64::MIN, Some(0)),
        score_frequency: NonZeroU64::new(10).unwrap(),
        max_batches: None,
    }
}

/// Trains a fresh mock over one source per worker, `sizes[i]` batches for worker `i`.
fn partitioned(
    settings: CoordinatorSettings,
    sizes: &'static [usize],
) -> (harness::Result<RunSummary>, MockModel) {
    within(DEADLINE, move || {
        let mut sources: Vec<_> = sizes.iter().map(|&n| source(n, 8)).collect();
        let feed = Feed::Partitioned(
            sources
                .iter_mut()
                .map(|s| s as &mut dyn BatchSource)
                .collect(),
        );

        let mut model = MockModel::new(3);
        let coordinator = Coordinator::new(settings, Arc::new(MetricAccumulator::new()));
        let summary = coordinator.train(&mut model, feed);
        (summary, model)
    })
}

#[test]
fn stop_everyone_halts_at_the_first_drained_queue() {
    let settings = settings(3, InequalityHandling::StopEveryone, 5);
    let (summary, model) = partitioned(settings, &[5, 5, 3]);

    let summary = summary.unwrap();
    assert_eq!(summary.processed, 9);
    assert_eq!(summary.discarded, 4);
    assert_eq!(summary.rounds, 3);
    assert_eq!(model.params, vec![3.; 3]);
}

#[test]
fn discards_are_counted_even_with_shallow_queues() {
    let settings = settings(3, InequalityHandling::StopEveryone, 1);
    let (summary, _) = partitioned(settings, &[5, 5, 3]);

    let summary = summary.unwrap();
    assert_eq!(summary.processed, 9);
    assert_eq!(summary.discarded, 4);
}

#[test]
fn pass_keeps_going_until_every_queue_is_drained() {
    let settings = settings(3, InequalityHandling::Pass, 2);
    let (summary, model) = partitioned(settings, &[5, 5, 3]);

    let summary = summary.unwrap();
    assert_eq!(summary.processed, 13);
    assert_eq!(summary.discarded, 0);
    assert_eq!(summary.rounds, 5);
    // Replicas ended at 5, 5 and 3.
    assert!(model.params.iter().all(|&p| (p - 13. / 3.).abs() < 1e-5));
}

#[test]
fn mid_run_averaging_keeps_the_final_mean() {
    let mut settings = settings(2, InequalityHandling::Pass, 2);
    settings.averaging_frequency = NonZeroU64::new(2).unwrap();
    let (summary, model) = partitioned(settings, &[5, 3]);

    assert_eq!(summary.unwrap().processed, 8);
    assert_eq!(model.params, vec![4.; 3]);
}

#[test]
fn a_shared_source_is_dealt_round_robin() {
    let settings = settings(3, InequalityHandling::StopEveryone, 2);

    let (summary, model) = within(DEADLINE, move || {
        let mut source = source(10, 8);
        let mut model = MockModel::new(2);
        let coordinator = Coordinator::new(settings, Arc::new(MetricAccumulator::new()));
        let summary = coordinator.train(&mut model, Feed::Shared(&mut source));
        (summary, model)
    });

    // Queues of 4, 3 and 3 stop after three rounds.
    let summary = summary.unwrap();
    assert_eq!(summary.processed, 9);
    assert_eq!(summary.discarded, 1);
    assert_eq!(model.params, vec![3.; 2]);
}

#[test]
fn max_batches_caps_each_feeding_source() {
    let mut settings = settings(2, InequalityHandling::Pass, 2);
    settings.max_batches = Some(2);
    let (summary, _) = partitioned(settings, &[5, 5]);

    assert_eq!(summary.unwrap().processed, 4);
}

fn timed_run(
    workers: usize,
    sizes: [usize; 2],
    warmup: u64,
) -> (harness::Result<RunSummary>, Arc<MetricAccumulator>) {
    let settings = CoordinatorSettings {
        sampling: SamplingPolicy::new(NonZeroU64::MIN, Some(warmup)),
        ..settings(workers, InequalityHandling::Pass, 2)
    };
    let metrics = Arc::new(MetricAccumulator::new());
    let shared = Arc::clone(&metrics);

    let summary = within(DEADLINE, move || {
        let clock = Arc::new(ManualClock::new());
        let mut sources: Vec<_> = sizes[..workers].iter().map(|&n| source(n, 8)).collect();
        let feed = Feed::Partitioned(
            sources
                .iter_mut()
                .map(|s| s as &mut dyn BatchSource)
                .collect(),
        );

        let mut model = MockModel::timed(Arc::clone(&clock), STEP);
        Coordinator::new(settings, shared)
            .with_clock(clock)
            .train(&mut model, feed)
    });

    (summary, metrics)
}

#[test]
fn a_worker_samples_its_very_first_step() {
    let (summary, metrics) = timed_run(1, [5, 0], 0);

    assert_eq!(summary.unwrap().processed, 5);
    assert_eq!(metrics.iteration_count(), 5);
    assert!((metrics.avg_iteration_ms().unwrap() - 100.0).abs() < 1e-9);
    assert!((metrics.avg_samples_per_sec().unwrap() - 80.0).abs() < 1e-9);
    assert!((metrics.avg_batches_per_sec().unwrap() - 10.0).abs() < 1e-9);
}

#[test]
fn every_timer_writes_into_the_shared_accumulator() {
    let (summary, metrics) = timed_run(2, [6, 4], 1);

    assert_eq!(summary.unwrap().processed, 10);
    // Each worker skips its own warm-up step and samples the rest.
    assert_eq!(metrics.iteration_count(), 5 + 3);

    // Both replicas advance the same clock, so one step spans 100 to 300 ms.
    let avg_ms = metrics.avg_iteration_ms().unwrap();
    assert!((100.0..=300.0).contains(&avg_ms), "{avg_ms}");
    let batches_per_sec = metrics.avg_batches_per_sec().unwrap();
    assert!((1000.0 / 300.0..=10.0).contains(&batches_per_sec), "{batches_per_sec}");
}

#[test]
fn a_failing_worker_aborts_the_run_with_one_error() {
    let settings = settings(3, InequalityHandling::StopEveryone, 2);

    let (summary, model) = within(DEADLINE, move || {
        let mut healthy = [source(5, 8), source(5, 8)];
        let mut failing = VecSource::new(vec![
            batch(8, 1.),
            batch(8, POISON),
            batch(8, 2.),
            batch(8, 3.),
        ]);

        let [a, b] = &mut healthy;
        let feed = Feed::Partitioned(vec![
            a as &mut dyn BatchSource,
            &mut failing,
            b,
        ]);

        let mut model = MockModel::new(2);
        let coordinator = Coordinator::new(settings, Arc::new(MetricAccumulator::new()));
        let summary = coordinator.train(&mut model, feed);
        (summary, model)
    });

    match summary.unwrap_err() {
        BenchErr::WorkerFailed {
            worker_id,
            failures,
            source,
        } => {
            assert_eq!(worker_id, 1);
            assert_eq!(failures, 1);
            assert!(matches!(
                *source,
                BenchErr::Stage {
                    stage: Stage::Training,
                    source: ModelErr::Failure(_),
                }
            ));
        }
        err => panic!("unexpected error: {err}"),
    }

    // A failed run leaves the original model untouched.
    assert_eq!(model.params, vec![0.; 2]);
}

#[test]
fn mismatched_partitions_are_rejected() {
    let settings = settings(3, InequalityHandling::Pass, 2);

    let result = within(DEADLINE, move || {
        let mut only = source(2, 8);
        let mut model = MockModel::new(1);
        Coordinator::new(settings, Arc::new(MetricAccumulator::new()))
            .train(&mut model, Feed::Partitioned(vec![&mut only]))
    });

    assert!(matches!(result, Err(BenchErr::InvalidConfig(_))));
}
