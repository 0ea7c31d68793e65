//! # Counter Example
//!
//! A counter with a background ticker. Shows outputs, an operation
//! registered under an id, and `Cancel` stopping it from a transition.

use anyhow::Result;
use flipflop::{
    Effect, Engine, FnSubject, OperationContext, Terminal, Transducer, Transition,
};
use std::time::Duration;

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Default)]
struct Counter {
    count: i64,
    ticking: bool,
    quit: bool,
}

impl Terminal for Counter {
    fn is_terminal(&self) -> bool {
        self.quit
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug)]
enum CounterEvent {
    Increment,
    Decrement,
    /// Start incrementing on a timer
    StartTicking,
    StopTicking,
    Quit,
}

// ============================================================================
// Transducer (Decision Logic)
// ============================================================================

struct CounterMachine;

impl Transducer for CounterMachine {
    type State = Counter;
    type Event = CounterEvent;
    type Output = i64;
    type Env = Duration;

    fn update(
        &self,
        state: &mut Counter,
        event: CounterEvent,
    ) -> Transition<CounterEvent, i64, Duration> {
        match event {
            CounterEvent::Increment => {
                state.count += 1;
                Transition::output(state.count)
            }
            CounterEvent::Decrement => {
                state.count -= 1;
                Transition::output(state.count)
            }
            CounterEvent::StartTicking if !state.ticking => {
                state.ticking = true;
                Transition::effect(Effect::operation_with_id(
                    "ticker",
                    |ctx: OperationContext<CounterEvent, Duration>| async move {
                        let period = *ctx.env();
                        loop {
                            tokio::select! {
                                _ = ctx.cancelled() => return Ok(()),
                                _ = tokio::time::sleep(period) => {
                                    ctx.send_await(CounterEvent::Increment).await?;
                                }
                            }
                        }
                    },
                ))
            }
            CounterEvent::StartTicking => Transition::none(),
            CounterEvent::StopTicking => {
                state.ticking = false;
                Transition::effect(Effect::cancel("ticker"))
            }
            CounterEvent::Quit => {
                state.quit = true;
                Transition::none()
            }
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let display = FnSubject::new(|count: i64| {
        println!("count = {}", count);
        Ok(())
    });

    let engine = Engine::new(CounterMachine, Duration::from_millis(100));
    let handle = engine.start(Counter::default(), display);

    handle.send_await(CounterEvent::Increment).await?;
    handle.send_await(CounterEvent::Increment).await?;
    handle.send_await(CounterEvent::Decrement).await?;

    println!("Ticking for half a second...");
    handle.send_await(CounterEvent::StartTicking).await?;
    tokio::time::sleep(Duration::from_millis(550)).await;
    handle.send_await(CounterEvent::StopTicking).await?;

    handle.send_await(CounterEvent::Quit).await?;
    let last = handle.join().await?;
    println!("Final count: {:?}", last);

    Ok(())
}
