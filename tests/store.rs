use dessim::prelude::*;
use futures::future::{select, Either};
use std::{cell::RefCell, rc::Rc};

type Trace = Rc<RefCell<Vec<(f64, String)>>>;

fn push(trace: &Trace, ctx: &SimContext, what: impl Into<String>) {
    trace.borrow_mut().push((ctx.now().as_f64(), what.into()));
}

#[test]
fn consumer_waits_for_producer() {
    let mut sim = Simulator::new();
    let tank = sim.store(10.0, 0.0).unwrap();
    let trace = Trace::default();

    let (s, t) = (tank.clone(), trace.clone());
    sim.process(move |ctx| async move {
        s.get(4.0).await?;
        push(&t, &ctx, "got 4");
        Ok::<_, SimError>(())
    })
    .unwrap();

    let (s, t) = (tank.clone(), trace.clone());
    sim.process_in(3.0, move |ctx| async move {
        s.put(6.0).await?;
        push(&t, &ctx, "put 6");
        Ok::<_, SimError>(())
    })
    .unwrap();

    sim.run(1.0).unwrap();
    assert_eq!(tank.getters_in_queue(), 1);

    sim.run(10.0).unwrap();
    assert_eq!(
        *trace.borrow(),
        vec![(3.0, "put 6".to_string()), (3.0, "got 4".to_string())]
    );
    assert_eq!(tank.level(), 2.0);
    assert_eq!(tank.getters_in_queue(), 0);
}

#[test]
fn producer_waits_for_space() {
    let mut sim = Simulator::new();
    let tank = sim.store(5.0, 4.0).unwrap();
    let trace = Trace::default();

    let (s, t) = (tank.clone(), trace.clone());
    sim.process(move |ctx| async move {
        s.put(3.0).await?;
        push(&t, &ctx, "put 3");
        Ok::<_, SimError>(())
    })
    .unwrap();

    let (s, t) = (tank.clone(), trace.clone());
    sim.process_in(2.0, move |ctx| async move {
        s.get(2.0).await?;
        push(&t, &ctx, "got 2");
        Ok::<_, SimError>(())
    })
    .unwrap();

    sim.run(10.0).unwrap();
    assert_eq!(
        *trace.borrow(),
        vec![(2.0, "got 2".to_string()), (2.0, "put 3".to_string())]
    );
    assert_eq!(tank.level(), 5.0);
}

#[test]
fn head_of_line_blocking() {
    let mut sim = Simulator::new();
    let tank = sim.store(10.0, 0.0).unwrap();
    let trace = Trace::default();

    // The large request arrives first and blocks the small one.
    for (delay, amount) in [(0.0, 8.0), (1.0, 1.0)] {
        let (s, t) = (tank.clone(), trace.clone());
        sim.process_in(delay, move |ctx| async move {
            s.get(amount).await?;
            push(&t, &ctx, format!("got {amount}"));
            Ok::<_, SimError>(())
        })
        .unwrap();
    }

    for (delay, amount) in [(2.0, 5.0), (4.0, 5.0)] {
        let s = tank.clone();
        sim.process_in(delay, move |_| async move { s.put(amount).await })
            .unwrap();
    }

    sim.run(3.0).unwrap();
    assert_eq!(tank.level(), 5.0);
    assert_eq!(tank.getters_in_queue(), 2);

    sim.run(10.0).unwrap();
    assert_eq!(
        *trace.borrow(),
        vec![(4.0, "got 8".to_string()), (4.0, "got 1".to_string())]
    );
    assert_eq!(tank.level(), 1.0);
}

#[test]
fn killed_waiter_unblocks_the_line() {
    let mut sim = Simulator::new();
    let tank = sim.store(10.0, 3.0).unwrap();
    let trace = Trace::default();

    let s = tank.clone();
    let greedy = sim
        .process(move |_| async move { s.get(9.0).await })
        .unwrap();

    let (s, t) = (tank.clone(), trace.clone());
    sim.process_in(1.0, move |ctx| async move {
        s.get(2.0).await?;
        push(&t, &ctx, "got 2");
        Ok::<_, SimError>(())
    })
    .unwrap();

    sim.run(5.0).unwrap();
    assert!(trace.borrow().is_empty());
    assert_eq!(tank.getters_in_queue(), 2);

    assert_eq!(greedy.kill(), Ok(true));
    sim.run(6.0).unwrap();
    assert_eq!(*trace.borrow(), vec![(5.0, "got 2".to_string())]);
    assert_eq!(tank.level(), 1.0);
}

#[test]
fn invalid_store_arguments() {
    let mut sim = Simulator::new();
    assert_eq!(
        sim.store(0.0, 0.0).unwrap_err(),
        SimError::InvalidCapacity(0.0)
    );
    assert_eq!(
        sim.store(5.0, 6.0).unwrap_err(),
        SimError::InvalidAmount(6.0)
    );

    let tank = sim.store(5.0, 0.0).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let (s, out) = (tank.clone(), seen.clone());
    sim.process(move |_| async move {
        out.borrow_mut().push(s.put(0.0).await);
        out.borrow_mut().push(s.get(6.0).await);
        // NaN never compares equal, map it to something that does.
        let nan = s.put(f64::NAN).await;
        out.borrow_mut()
            .push(nan.map_err(|_| SimError::InvalidAmount(-1.0)));
    })
    .unwrap();

    sim.run(1.0).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![
            Err(SimError::InvalidAmount(0.0)),
            Err(SimError::InvalidAmount(6.0)),
            Err(SimError::InvalidAmount(-1.0)),
        ]
    );
    assert_eq!(tank.level(), 0.0);
}

#[test]
fn abandoned_get_leaves_the_line() {
    let mut sim = Simulator::new();
    let tank = sim.store(10.0, 0.0).unwrap();
    let trace = Trace::default();

    let (s, t) = (tank.clone(), trace.clone());
    sim.process(move |ctx| async move {
        if let Either::Right((slept, _)) = select(s.get(5.0), ctx.sleep(2.0)).await {
            slept?;
            push(&t, &ctx, "gave up");
        }
        Ok::<_, SimError>(())
    })
    .unwrap();

    let (s, t) = (tank.clone(), trace.clone());
    sim.process_in(3.0, move |ctx| async move {
        s.get(1.0).await?;
        push(&t, &ctx, "got 1");
        Ok::<_, SimError>(())
    })
    .unwrap();

    let s = tank.clone();
    sim.process_in(4.0, move |_| async move { s.put(1.0).await })
        .unwrap();

    sim.run(10.0).unwrap();
    assert_eq!(
        *trace.borrow(),
        vec![(2.0, "gave up".to_string()), (4.0, "got 1".to_string())]
    );
    assert_eq!(tank.getters_in_queue(), 0);
    assert_eq!(tank.level(), 0.0);
}

#[test]
fn abandoned_put_is_not_applied() {
    let mut sim = Simulator::new();
    let tank = sim.store(2.0, 2.0).unwrap();

    let s = tank.clone();
    sim.process(move |ctx| async move {
        match select(s.put(1.0), ctx.sleep(1.0)).await {
            Either::Left((put, _)) => put,
            Either::Right((slept, _)) => slept,
        }
    })
    .unwrap();

    let s = tank.clone();
    sim.process_in(2.0, move |_| async move { s.get(2.0).await })
        .unwrap();

    sim.run(10.0).unwrap();
    assert_eq!(tank.putters_in_queue(), 0);
    assert_eq!(tank.level(), 0.0);
}
