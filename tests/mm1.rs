use dessim::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{cell::RefCell, rc::Rc};

const ARRIVAL_RATE: f64 = 0.8;
const SERVICE_RATE: f64 = 1.0;
const MAX_CUSTOMERS: usize = 100_000;

fn exponential(rng: &mut StdRng, rate: f64) -> f64 {
    let u: f64 = rng.gen_range(f64::EPSILON..1.0);
    -u.ln() / rate
}

struct Outcome {
    report: Report,
    server: Resource,
    completed: usize,
}

fn mm1(seed: u64, horizon: f64) -> Outcome {
    let mut sim = Simulator::new();
    let dc = sim
        .data_collector(Metric::ALL.into_iter().map(|metric| {
            let spec = match metric.kind() {
                dessim::stats::MetricKind::TimeMarks => CollectorSpec::TimeMarks { all: false },
                dessim::stats::MetricKind::RunStats => CollectorSpec::RunStats { all: false },
                dessim::stats::MetricKind::TimeSeries => CollectorSpec::TimeSeries { all: false },
            };
            (metric, spec)
        }))
        .unwrap();
    let server = sim.resource(1, Some(&dc)).unwrap();
    let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(seed)));
    let completed = Rc::new(RefCell::new(0usize));

    let (s, r, done) = (server.clone(), rng.clone(), completed.clone());
    sim.process_named("source", move |ctx| async move {
        for _ in 0..MAX_CUSTOMERS {
            let gap = exponential(&mut r.borrow_mut(), ARRIVAL_RATE);
            ctx.sleep(gap).await?;

            let service = exponential(&mut r.borrow_mut(), SERVICE_RATE);
            let (s, done) = (s.clone(), done.clone());
            ctx.process(move |ctx| async move {
                s.acquire().await?;
                ctx.sleep(service).await?;
                s.release()?;
                *done.borrow_mut() += 1;
                Ok::<_, SimError>(())
            })?;
        }
        Ok::<_, SimError>(())
    })
    .unwrap();

    sim.run(horizon).unwrap();
    let report = dc.report(sim.now());
    let completed = *completed.borrow();
    Outcome {
        report,
        server,
        completed,
    }
}

#[test]
fn seeded_runs_are_reproducible() {
    let first = mm1(2024, 1000.0);
    let second = mm1(2024, 1000.0);
    assert_eq!(first.report, second.report);
    assert_eq!(first.report.to_string(), second.report.to_string());

    let other = mm1(2025, 1000.0);
    assert_ne!(first.report.to_string(), other.report.to_string());
}

#[test]
fn customers_are_conserved() {
    let outcome = mm1(99, 1000.0);
    let report = &outcome.report;

    let arrivals = report.timemarks(Metric::Arrivals).unwrap().count;
    let departs = report.timemarks(Metric::Departs).unwrap().count;
    let reneges = report.timemarks(Metric::Reneges).unwrap().count;
    let services = report.timemarks(Metric::Services).unwrap().count;

    assert!(arrivals > 500);
    assert_eq!(reneges, 0);
    assert_eq!(departs, outcome.completed);
    assert_eq!(
        arrivals,
        departs + reneges + outcome.server.in_use() + outcome.server.num_waiting()
    );
    assert_eq!(services, departs + outcome.server.in_use());

    let in_systems = report.timeseries(Metric::InSystems).unwrap();
    assert_eq!(
        in_systems.last,
        Some((outcome.server.in_use() + outcome.server.num_waiting()) as f64)
    );
}

#[test]
fn steady_state_is_plausible() {
    let outcome = mm1(7, 1000.0);
    let report = &outcome.report;

    // Utilisation approaches rho = 0.8 for a long enough run.
    let busy = report.timeseries(Metric::InServices).unwrap();
    assert!(busy.mean > 0.6 && busy.mean < 0.95, "utilisation {}", busy.mean);
    assert_eq!((busy.min, busy.max), (Some(0.0), Some(1.0)));

    let service = report.runstats(Metric::ServiceTimes).unwrap();
    assert!((service.mean - 1.0 / SERVICE_RATE).abs() < 0.2);

    let queue = report.runstats(Metric::QueueTimes).unwrap();
    let system = report.runstats(Metric::SystemTimes).unwrap();
    assert!(system.mean >= queue.mean);
    assert_eq!(queue.min, Some(0.0));
}
