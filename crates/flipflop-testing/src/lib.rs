//! Testing utilities for flipflop transducers.
//!
//! - [`RecordingSubject`] captures every output with the time it arrived.
//! - [`FailingSubject`] accepts a fixed number of outputs, then fails.
//! - [`replay`] feeds events straight into [`Transducer::update`] with no
//!   loop and no effects executed, for checking transition logic alone.
//!
//! # Example
//!
//! ```rust,ignore
//! use flipflop::{Proxy, Runtime};
//! use flipflop_testing::RecordingSubject;
//!
//! let proxy = Proxy::new();
//! proxy.send(CounterEvent::Increment)?;
//! proxy.send(CounterEvent::Stop)?;
//!
//! let recorder = RecordingSubject::new();
//! let mut subject = recorder.clone();
//! Runtime::new(Counter).run(Count::default(), &proxy, (), &mut subject).await?;
//!
//! assert_eq!(recorder.outputs(), vec![1]);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flipflop::{Effect, Subject, Terminal, Transducer};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// Recording subject
// ============================================================================

/// One output captured by a [`RecordingSubject`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recorded<O> {
    pub output: O,
    pub at: DateTime<Utc>,
}

/// A subject that keeps every output it receives.
///
/// Clones share the same recording, so keep one clone for assertions and
/// hand the other to the runtime.
pub struct RecordingSubject<O> {
    recorded: Arc<Mutex<Vec<Recorded<O>>>>,
}

impl<O> Clone for RecordingSubject<O> {
    fn clone(&self) -> Self {
        Self {
            recorded: self.recorded.clone(),
        }
    }
}

impl<O> Default for RecordingSubject<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> fmt::Debug for RecordingSubject<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSubject")
            .field("len", &self.len())
            .finish()
    }
}

impl<O> RecordingSubject<O> {
    pub fn new() -> Self {
        Self {
            recorded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Recorded<O>>> {
        match self.recorded.lock() {
            Ok(recorded) => recorded,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<O: Clone> RecordingSubject<O> {
    /// Outputs in arrival order.
    pub fn outputs(&self) -> Vec<O> {
        self.lock().iter().map(|entry| entry.output.clone()).collect()
    }

    /// Outputs with their arrival times.
    pub fn recorded(&self) -> Vec<Recorded<O>> {
        self.lock().clone()
    }

    pub fn last(&self) -> Option<O> {
        self.lock().last().map(|entry| entry.output.clone())
    }
}

impl<O: Serialize> RecordingSubject<O> {
    /// The outputs as a JSON array, without timestamps, for stable
    /// snapshot comparisons.
    pub fn snapshot_json(&self) -> serde_json::Result<serde_json::Value> {
        let recorded = self.lock();
        let outputs: Vec<&O> = recorded.iter().map(|entry| &entry.output).collect();
        serde_json::to_value(outputs)
    }

    /// Outputs and timestamps as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.lock())
    }
}

#[async_trait]
impl<O: Send + 'static> Subject<O> for RecordingSubject<O> {
    async fn send(&mut self, output: O) -> anyhow::Result<()> {
        self.lock().push(Recorded {
            output,
            at: Utc::now(),
        });
        Ok(())
    }
}

// ============================================================================
// Failing subject
// ============================================================================

/// A subject that accepts `limit` outputs and rejects everything after.
#[derive(Debug, Clone)]
pub struct FailingSubject {
    limit: usize,
    accepted: usize,
}

impl FailingSubject {
    pub fn after(limit: usize) -> Self {
        Self { limit, accepted: 0 }
    }

    /// Rejects the very first output.
    pub fn immediately() -> Self {
        Self::after(0)
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }
}

#[async_trait]
impl<O: Send + 'static> Subject<O> for FailingSubject {
    async fn send(&mut self, _output: O) -> anyhow::Result<()> {
        if self.accepted >= self.limit {
            anyhow::bail!("subject closed after {} outputs", self.limit);
        }
        self.accepted += 1;
        Ok(())
    }
}

// ============================================================================
// Replay
// ============================================================================

/// What [`replay`] observed.
pub struct Replay<T: Transducer> {
    /// Outputs in the order transitions produced them.
    pub outputs: Vec<T::Output>,
    /// Requested effects, in order. None of them were executed.
    pub effects: Vec<Effect<T::Event, T::Env>>,
    /// Events fed to `update`.
    pub steps: usize,
    /// Index of the event that reached a terminal state, if any.
    pub terminal_at: Option<usize>,
}

impl<T: Transducer> Replay<T> {
    pub fn is_terminal(&self) -> bool {
        self.terminal_at.is_some()
    }

    /// Debug renderings of the requested effects.
    pub fn effect_shapes(&self) -> Vec<String> {
        self.effects.iter().map(|effect| format!("{effect:?}")).collect()
    }
}

impl<T: Transducer> fmt::Debug for Replay<T>
where
    T::Output: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replay")
            .field("outputs", &self.outputs)
            .field("effects", &self.effects)
            .field("steps", &self.steps)
            .field("terminal_at", &self.terminal_at)
            .finish()
    }
}

/// Feed `events` to `update` one by one, stopping at the first terminal
/// state the way the runtime does. Remaining events are not consumed.
pub fn replay<T, I>(transducer: &T, state: &mut T::State, events: I) -> Replay<T>
where
    T: Transducer,
    I: IntoIterator<Item = T::Event>,
{
    let mut replay = Replay {
        outputs: Vec::new(),
        effects: Vec::new(),
        steps: 0,
        terminal_at: None,
    };

    for event in events {
        let (effect, output) = transducer.update(state, event).into_parts();
        replay.steps += 1;
        replay.outputs.extend(output);
        if state.is_terminal() {
            replay.terminal_at = Some(replay.steps - 1);
            break;
        }
        replay.effects.extend(effect);
    }

    replay
}

#[cfg(test)]
mod tests {
    use super::*;
    use flipflop::{Proxy, RunError, Runtime, Transition};
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Count {
        value: u32,
        done: bool,
    }

    impl Terminal for Count {
        fn is_terminal(&self) -> bool {
            self.done
        }
    }

    enum CountEvent {
        Add(u32),
        Reset,
        Stop,
    }

    struct Counter;

    impl Transducer for Counter {
        type State = Count;
        type Event = CountEvent;
        type Output = u32;
        type Env = ();

        fn update(&self, state: &mut Count, event: CountEvent) -> Transition<CountEvent, u32, ()> {
            match event {
                CountEvent::Add(n) => {
                    state.value += n;
                    Transition::output(state.value)
                }
                CountEvent::Reset => {
                    state.value = 0;
                    Transition::effect(Effect::cancel("ticker"))
                }
                CountEvent::Stop => {
                    state.done = true;
                    Transition::none()
                }
            }
        }
    }

    #[tokio::test]
    async fn recording_subject_keeps_outputs_in_order() {
        let proxy = Proxy::new();
        for event in [CountEvent::Add(1), CountEvent::Add(2), CountEvent::Stop] {
            proxy.send(event).unwrap();
        }
        let recorder = RecordingSubject::new();
        let mut subject = recorder.clone();

        let last = Runtime::new(Counter)
            .run(Count::default(), &proxy, (), &mut subject)
            .await
            .unwrap();

        assert_eq!(last, Some(3));
        assert_eq!(recorder.outputs(), vec![1, 3]);
        assert_eq!(recorder.snapshot_json().unwrap(), json!([1, 3]));

        let recorded = recorder.recorded();
        assert!(recorded[0].at <= recorded[1].at);
    }

    #[tokio::test]
    async fn failing_subject_ends_the_run() {
        let proxy = Proxy::new();
        for event in [CountEvent::Add(1), CountEvent::Add(1), CountEvent::Stop] {
            proxy.send(event).unwrap();
        }
        let mut subject = FailingSubject::after(1);

        let result = Runtime::new(Counter)
            .run(Count::default(), &proxy, (), &mut subject)
            .await;

        assert!(matches!(result, Err(RunError::Sink(_))));
        assert_eq!(subject.accepted(), 1);
    }

    #[test]
    fn replay_stops_at_the_terminal_state() {
        let mut state = Count::default();
        let replay = replay(
            &Counter,
            &mut state,
            [
                CountEvent::Add(2),
                CountEvent::Reset,
                CountEvent::Stop,
                CountEvent::Add(5),
            ],
        );

        assert_eq!(replay.outputs, vec![2]);
        assert_eq!(replay.effect_shapes(), vec!["Cancel(ticker)"]);
        assert_eq!(replay.terminal_at, Some(2));
        assert_eq!(replay.steps, 3);
        assert_eq!(state, Count { value: 0, done: true });
    }

    #[test]
    fn json_export_includes_timestamps() {
        let recorder = RecordingSubject::<u32>::new();
        recorder.lock().push(Recorded {
            output: 7,
            at: Utc::now(),
        });
        let json = recorder.to_json_pretty().unwrap();
        assert!(json.contains("\"output\": 7"));
        assert!(json.contains("\"at\""));
    }
}
