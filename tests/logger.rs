use dessim::{logger, prelude::*};
use tracing::{level_filters::LevelFilter, subscriber::with_default};
use tracing_subscriber::layer::SubscriberExt;

#[path = "common/mock.rs"]
mod mock;

fn subscriber(writer: &mock::MakeMockWriter) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(LevelFilter::TRACE)
        .event_format(logger::format())
        .with_writer(writer.clone())
        .finish()
        .with(logger::SimClockLayer)
}

#[test]
#[serial_test::serial]
fn lines_outside_a_simulation() {
    let writer = mock::MakeMockWriter::new();
    with_default(subscriber(&writer), || {
        tracing::info!(GENERAL = "Kenobi", "Hello there");
    });
    assert_eq!(
        writer.content(),
        "[ - ] INFO logger: Hello there GENERAL=\"Kenobi\"\n"
    );
}

#[test]
#[serial_test::serial]
fn lines_carry_the_simulation_time() {
    let writer = mock::MakeMockWriter::new();
    with_default(subscriber(&writer), || {
        let mut sim = Simulator::new();
        sim.process(|ctx| async move {
            tracing::info!("started");
            ctx.sleep(5.0).await?;
            tracing::error!(late = true, "woke up");
            Ok::<_, SimError>(())
        })
        .unwrap();
        sim.schedule(2.5, |_| tracing::warn!("callback")).unwrap();
        sim.run(10.0).unwrap();
    });

    assert_eq!(
        writer.lines_of("logger"),
        vec![
            "[ 0 ] INFO event{time=0.0}:process{pid=0}: logger: started",
            "[ 2.5 ] WARN event{time=2.5}: logger: callback",
            "[ 5 ] ERROR event{time=5.0}:process{pid=0}: logger: woke up late=true",
        ]
    );

    // Internal diagnostics are emitted under the crate's own targets.
    let content = writer.content();
    assert!(content.contains("dessim::runtime"));
    assert!(content.contains("spawned process"));
}

#[test]
#[serial_test::serial]
fn spans_below_the_filter_drop_the_prefix() {
    let writer = mock::MakeMockWriter::new();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(LevelFilter::WARN)
        .event_format(logger::format())
        .with_writer(writer.clone())
        .finish()
        .with(logger::SimClockLayer);

    with_default(subscriber, || {
        let mut sim = Simulator::new();
        sim.schedule(1.0, |_| tracing::warn!("quiet span")).unwrap();
        sim.run(2.0).unwrap();
    });
    assert_eq!(writer.lines_of("logger"), vec!["[ - ] WARN logger: quiet span"]);
}

#[test]
#[serial_test::serial]
fn global_init_only_once() {
    assert!(logger::try_init().is_ok());
    assert!(logger::try_init().is_err());
    tracing::info!("goes to stdout");
}
