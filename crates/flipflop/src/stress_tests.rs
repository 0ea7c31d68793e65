//! Randomised churn over operation identifiers and the event buffer.

use crate::{
    Effect, Engine, NoSubject, OperationContext, Proxy, Runtime, SendError, Terminal,
    Transducer, Transition,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const IDS: [&str; 3] = ["alpha", "beta", "gamma"];

#[derive(Debug, Default)]
struct Churn {
    ticks: u64,
    done: bool,
}

impl Terminal for Churn {
    fn is_terminal(&self) -> bool {
        self.done
    }
}

#[derive(Debug)]
enum ChurnEvent {
    Start(&'static str),
    Stop(&'static str),
    Tick,
    Finish,
}

/// Live operation count per identifier, with the highest ever seen.
#[derive(Debug, Clone, Default)]
struct Liveness {
    inner: Arc<Mutex<LivenessInner>>,
}

#[derive(Debug, Default)]
struct LivenessInner {
    live: HashMap<&'static str, usize>,
    peak: usize,
    started: usize,
}

impl Liveness {
    fn enter(&self, id: &'static str) -> LiveGuard {
        let mut inner = self.inner.lock().unwrap();
        let live = {
            let live = inner.live.entry(id).or_default();
            *live += 1;
            *live
        };
        inner.peak = inner.peak.max(live);
        inner.started += 1;
        LiveGuard {
            liveness: self.clone(),
            id,
        }
    }

    fn peak(&self) -> usize {
        self.inner.lock().unwrap().peak
    }

    fn started(&self) -> usize {
        self.inner.lock().unwrap().started
    }

    fn total_live(&self) -> usize {
        self.inner.lock().unwrap().live.values().sum()
    }
}

struct LiveGuard {
    liveness: Liveness,
    id: &'static str,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut inner = self.liveness.inner.lock().unwrap();
        if let Some(live) = inner.live.get_mut(self.id) {
            *live -= 1;
        }
    }
}

struct ChurnMachine;

impl Transducer for ChurnMachine {
    type State = Churn;
    type Event = ChurnEvent;
    type Output = u64;
    type Env = Liveness;

    fn update(
        &self,
        state: &mut Churn,
        event: ChurnEvent,
    ) -> Transition<ChurnEvent, u64, Liveness> {
        match event {
            ChurnEvent::Start(id) => Transition::effect(Effect::operation_with_id(
                id,
                move |ctx: OperationContext<ChurnEvent, Liveness>| async move {
                    let _guard = ctx.env().enter(id);
                    loop {
                        tokio::select! {
                            biased;
                            _ = ctx.cancelled() => return Ok(()),
                            _ = tokio::time::sleep(Duration::from_millis(1)) => {
                                // A full buffer just skips this tick.
                                let _ = ctx.send(ChurnEvent::Tick);
                            }
                        }
                    }
                },
            )),
            ChurnEvent::Stop(id) => Transition::effect(Effect::cancel(id)),
            ChurnEvent::Tick => {
                state.ticks += 1;
                Transition::output(state.ticks)
            }
            ChurnEvent::Finish => {
                state.done = true;
                Transition::none()
            }
        }
    }
}

async fn settle(liveness: &Liveness) {
    for _ in 0..200 {
        if liveness.total_live() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("operations still live after teardown");
}

#[tokio::test]
async fn at_most_one_operation_runs_per_identifier() {
    for seed in [7_u64, 42, 1_337, 90_210] {
        let mut rng = fastrand::Rng::with_seed(seed);
        let liveness = Liveness::default();
        let handle =
            Engine::new(ChurnMachine, liveness.clone()).start(Churn::default(), NoSubject);

        for _ in 0..150 {
            let id = IDS[rng.usize(..IDS.len())];
            let event = if rng.u8(..4) == 0 {
                ChurnEvent::Stop(id)
            } else {
                ChurnEvent::Start(id)
            };
            handle.send_await(event).await.unwrap();
            if rng.bool() {
                tokio::time::sleep(Duration::from_millis(rng.u64(..3))).await;
            }
        }

        handle.send_await(ChurnEvent::Finish).await.unwrap();
        handle.join().await.unwrap();
        settle(&liveness).await;

        assert!(liveness.peak() <= 1, "seed {seed}: peak {}", liveness.peak());
        assert!(liveness.started() > 0, "seed {seed}: nothing ran");
    }
}

#[tokio::test]
async fn every_accepted_event_is_processed() {
    struct Counter;

    #[derive(Debug, Default)]
    struct Count {
        value: u64,
        done: bool,
    }

    impl Terminal for Count {
        fn is_terminal(&self) -> bool {
            self.done
        }
    }

    enum CountEvent {
        Bump,
        Done,
    }

    impl Transducer for Counter {
        type State = Count;
        type Event = CountEvent;
        type Output = u64;
        type Env = ();

        fn update(
            &self,
            state: &mut Count,
            event: CountEvent,
        ) -> Transition<CountEvent, u64, ()> {
            match event {
                CountEvent::Bump => {
                    state.value += 1;
                    Transition::output(state.value)
                }
                CountEvent::Done => {
                    state.done = true;
                    Transition::none()
                }
            }
        }
    }

    let mut rng = fastrand::Rng::with_seed(2024);
    let proxy = Proxy::with_capacity(4);
    let input = proxy.input();
    let run = tokio::spawn(async move {
        Runtime::new(Counter)
            .run(Count::default(), &proxy, (), &mut NoSubject)
            .await
    });

    let mut accepted = 0_u64;
    let mut overflowed = 0_u64;
    for _ in 0..40 {
        for _ in 0..rng.usize(1..10) {
            match input.send(CountEvent::Bump) {
                Ok(()) => accepted += 1,
                Err(SendError::BufferOverflow) => overflowed += 1,
                Err(SendError::Terminated) => panic!("run ended early"),
            }
        }
        tokio::task::yield_now().await;
    }
    input.send_await(CountEvent::Done).await.unwrap();

    let last = run.await.unwrap().unwrap();
    assert_eq!(last.unwrap_or(0), accepted);
    assert!(accepted + overflowed > 0);
}
