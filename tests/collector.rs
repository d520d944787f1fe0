use dessim::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

fn level_model(seed: u64) -> (DataCollector, SimTime) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sim = Simulator::new();
    let dc = DataCollector::parse([
        ("arrivals", "timemarks"),
        ("in_systems", "timeseries(all)"),
        ("in_queues", "timeseries(all)"),
        ("system_times", "runstats(all)"),
    ])
    .unwrap();
    let server = sim.resource(2, Some(&dc)).unwrap();

    for _ in 0..40 {
        let delay = rng.gen_range(0.0..50.0);
        let service = rng.gen_range(0.5..6.0);
        let s = server.clone();
        sim.process_in(delay, move |ctx| async move {
            s.acquire().await?;
            ctx.sleep(service).await?;
            s.release()
        })
        .unwrap();
    }

    sim.run(60.0).unwrap();
    (dc, sim.now())
}

#[test]
fn time_weighted_mean_matches_step_integral() {
    let (dc, now) = level_model(7);

    for metric in [Metric::InSystems, Metric::InQueues] {
        let series = dc.timeseries(metric).unwrap();
        let points = series.breakpoints();
        assert!(points.len() > 2);

        let mut area = 0.0;
        for pair in points.windows(2) {
            area += pair[0].1 * (pair[1].0 - pair[0].0);
        }
        let (last_time, last_value) = points[points.len() - 1];
        area += last_value * (now - last_time);
        let elapsed = now - points[0].0;

        let report = dc.report(now);
        let summary = report.timeseries(metric).unwrap();
        assert!((summary.elapsed - elapsed).abs() < 1e-9);
        assert!(
            (summary.mean - area / elapsed).abs() < 1e-9,
            "{metric}: {} vs {}",
            summary.mean,
            area / elapsed
        );
    }
}

#[test]
fn report_is_idempotent() {
    let (dc, now) = level_model(11);

    let first = dc.report(now);
    let second = dc.report(now);
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());

    // A later report closes a longer interval, but leaves the data alone.
    let later = dc.report(now + 10.0);
    assert_ne!(first, later);
    assert_eq!(dc.report(now), first);
}

#[test]
fn runstats_report_matches_samples() {
    let (dc, now) = level_model(3);
    let stats = dc.runstats(Metric::SystemTimes).unwrap();
    let samples = stats.samples();
    assert_eq!(samples.len(), stats.len());

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);

    let report = dc.report(now);
    let summary = report.runstats(Metric::SystemTimes).unwrap();
    assert!((summary.mean - mean).abs() < 1e-9);
    assert!((summary.variance - var).abs() < 1e-9);
    assert_eq!(
        summary.min,
        samples.iter().copied().reduce(f64::min)
    );
}

#[test]
fn report_rendering() {
    let mut sim = Simulator::new();
    let dc = DataCollector::parse([
        ("arrivals", "timemarks(all)"),
        ("service_times", "runstats"),
        ("in_queues", "timeseries()"),
    ])
    .unwrap();
    let server = sim.resource(1, Some(&dc)).unwrap();

    let s = server.clone();
    sim.process(move |ctx| async move {
        s.acquire().await?;
        ctx.sleep(2.0).await?;
        s.release()
    })
    .unwrap();
    sim.run(4.0).unwrap();

    let report = dc.report(sim.now());
    assert_eq!(
        report.to_string(),
        "report at 4 (elapsed 4.000000)\n\
         \x20 arrivals        timemarks(all)   count: 1 first: 0.000000 last: 0.000000 rate: 0.250000\n\
         \x20 service_times   runstats()       count: 1 mean: 2.000000 var: 0.000000 stddev: 0.000000 min: 2.000000 max: 2.000000\n\
         \x20 in_queues       timeseries()     breakpoints: 1 mean: 0.000000 var: 0.000000 stddev: 0.000000 min: 0.000000 max: 0.000000 last: 0.000000 elapsed: 4.000000\n"
    );
}

#[test]
fn config_errors_surface_at_construction() {
    let sim = Simulator::new();
    assert_eq!(
        sim.data_collector([(Metric::Arrivals, CollectorSpec::RunStats { all: true })])
            .unwrap_err(),
        SimError::Config(ConfigError::KindMismatch {
            metric: Metric::Arrivals,
            spec: CollectorSpec::RunStats { all: true }
        })
    );
    assert_eq!(
        DataCollector::parse([("arrivals", "timemarks(everything)")]).unwrap_err(),
        ConfigError::UnknownSpec("timemarks(everything)".to_string())
    );
    assert_eq!(
        DataCollector::parse([("queue_lengths", "timeseries()")]).unwrap_err(),
        ConfigError::UnknownMetric("queue_lengths".to_string())
    );
}

#[test]
fn collector_outlived_by_resource() {
    let mut sim = Simulator::new();
    let dc = DataCollector::parse([("arrivals", "timemarks")]).unwrap();
    let server = sim.resource(1, Some(&dc)).unwrap();
    drop(dc);

    let s = server.clone();
    sim.process(move |_| async move {
        s.acquire().await?;
        s.release()
    })
    .unwrap();
    assert!(sim.run(1.0).is_ok());
}

#[cfg(feature = "yaml")]
#[test]
fn yaml_configuration() {
    let dc = DataCollector::from_yaml(
        "arrivals: timemarks(all)\n\
         inter_arrivals: runstats()\n\
         service_times: runstats\n\
         in_systems: timeseries(all)\n",
    )
    .unwrap();
    assert_eq!(
        dc.metrics(),
        vec![
            Metric::Arrivals,
            Metric::InterArrivals,
            Metric::ServiceTimes,
            Metric::InSystems
        ]
    );
    assert_eq!(
        dc.spec(Metric::InSystems),
        Some(CollectorSpec::TimeSeries { all: true })
    );
    assert!(!dc.contains(Metric::Departs));

    assert!(matches!(
        DataCollector::from_yaml("- arrivals\n- departs\n"),
        Err(ConfigError::Yaml(_))
    ));
    assert_eq!(
        DataCollector::from_yaml("in_queues: timemarks\n").unwrap_err(),
        ConfigError::KindMismatch {
            metric: Metric::InQueues,
            spec: CollectorSpec::TimeMarks { all: false }
        }
    );
}

#[cfg(feature = "yaml")]
#[test]
fn reports_serialize() {
    let (dc, now) = level_model(5);
    let report = dc.report(now);

    let yaml = serde_yml::to_string(&report).unwrap();
    assert!(yaml.contains("metric: in_systems"));
    assert_eq!(yaml, serde_yml::to_string(&dc.report(now)).unwrap());
}
