//! The execution loop.
//!
//! One run owns the state and processes one event at a time:
//!
//! ```text
//! AwaitingEvent ──► Transitioning ──► AwaitingEvent
//!                        │
//!                        └──► Terminating ──► Terminated
//! ```
//!
//! Each external event starts a cycle with a fresh work list. Actions push
//! their follow-up events onto that list and the cycle drains it depth-first
//! before the next external event is read, so action cascades are never
//! interleaved with channel traffic. Operations are spawned and the cycle
//! moves on without waiting for them.

use crate::config::Config;
use crate::core::{Events, Terminal};
use crate::dispatch::Dispatcher;
use crate::effect::Effect;
use crate::error::RunError;
use crate::metrics::RunMetrics;
use crate::proxy::{acknowledge, Envelope, Proxy, StopReason};
use crate::registry::TaskRegistry;
use crate::storage::{LocalState, StateStorage};
use crate::subject::Subject;
use crate::transducer::Transducer;
use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, trace, Instrument};
use uuid::Uuid;

/// Pending work inside one cycle.
enum Work<E, Env> {
    Event(E),
    Effect(Effect<E, Env>),
}

enum Cycle {
    Continue,
    Terminal,
}

enum Exit {
    Terminal,
    Stopped(StopReason),
    Closed,
    Failed(RunError),
}

/// The inbox of a running loop. Dropping it tears the run down, so an
/// aborted host task still cancels its operations and closes the channel,
/// even if the loop never got to poll.
pub(crate) struct Session<E> {
    inbox: mpsc::Receiver<Envelope<E>>,
    registry: TaskRegistry,
    open: bool,
}

impl<E> Session<E> {
    fn new(inbox: mpsc::Receiver<Envelope<E>>, registry: TaskRegistry) -> Self {
        Self {
            inbox,
            registry,
            open: true,
        }
    }

    async fn next(&mut self) -> Option<Envelope<E>> {
        self.inbox.recv().await
    }

    /// Cancel every task, close the channel and discard what is left in it.
    fn teardown(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        let cancelled = self.registry.cancel_all();
        self.inbox.close();
        let mut discarded = 0usize;
        while self.inbox.try_recv().is_ok() {
            discarded += 1;
        }
        debug!(cancelled, discarded, "transducer torn down");
    }
}

impl<E> Drop for Session<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Drives a [`Transducer`] against a [`Proxy`].
pub struct Runtime<T: Transducer> {
    transducer: T,
    config: Config,
    registry: TaskRegistry,
    metrics: RunMetrics,
}

impl<T: Transducer> std::fmt::Debug for Runtime<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl<T: Transducer> Runtime<T> {
    pub fn new(transducer: T) -> Self {
        Self::with_config(transducer, Config::default())
    }

    pub fn with_config(transducer: T, config: Config) -> Self {
        Self {
            transducer,
            config,
            registry: TaskRegistry::new(),
            metrics: RunMetrics::default(),
        }
    }

    pub fn transducer(&self) -> &T {
        &self.transducer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The registry of operations spawned by this runtime. Clone it before
    /// a run to watch tasks come and go.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Counters from the current or most recent run.
    pub fn metrics(&self) -> RunMetrics {
        self.metrics
    }

    /// Run until a terminal state, a subject failure, or a stop request.
    ///
    /// Returns the last output produced, or `None` if no transition
    /// produced one.
    pub async fn run<S>(
        &mut self,
        initial: T::State,
        proxy: &Proxy<T::Event>,
        env: T::Env,
        subject: &mut S,
    ) -> Result<Option<T::Output>, RunError>
    where
        S: Subject<T::Output> + ?Sized,
    {
        let mut storage = LocalState::new(initial);
        self.run_with_storage(&mut storage, proxy, env, subject)
            .await
    }

    /// Like [`run`](Self::run), with the state kept in caller-owned
    /// storage. The storage holds the final state afterwards.
    pub async fn run_with_storage<St, S>(
        &mut self,
        storage: &mut St,
        proxy: &Proxy<T::Event>,
        env: T::Env,
        subject: &mut S,
    ) -> Result<Option<T::Output>, RunError>
    where
        St: StateStorage<T::State> + Send,
        S: Subject<T::Output> + ?Sized,
    {
        let session = self.open_session(proxy)?;
        self.run_session(session, storage, proxy, env, subject)
            .await
    }

    /// Claim the proxy's inbox for a run.
    pub(crate) fn open_session(
        &self,
        proxy: &Proxy<T::Event>,
    ) -> Result<Session<T::Event>, RunError> {
        let inbox = proxy.take_inbox().ok_or(RunError::ProxyConsumed)?;
        Ok(Session::new(inbox, self.registry.clone()))
    }

    pub(crate) async fn run_session<St, S>(
        &mut self,
        session: Session<T::Event>,
        storage: &mut St,
        proxy: &Proxy<T::Event>,
        env: T::Env,
        subject: &mut S,
    ) -> Result<Option<T::Output>, RunError>
    where
        St: StateStorage<T::State> + Send,
        S: Subject<T::Output> + ?Sized,
    {
        let span = info_span!("transducer", label = %self.config.label, run_id = %Uuid::new_v4());
        self.execute(session, storage, proxy, env, subject)
            .instrument(span)
            .await
    }

    async fn execute<St, S>(
        &mut self,
        mut session: Session<T::Event>,
        storage: &mut St,
        proxy: &Proxy<T::Event>,
        env: T::Env,
        subject: &mut S,
    ) -> Result<Option<T::Output>, RunError>
    where
        St: StateStorage<T::State> + Send,
        S: Subject<T::Output> + ?Sized,
    {
        if storage.with(Terminal::is_terminal) {
            return Err(RunError::PrematureTerminalState);
        }

        self.metrics = RunMetrics::default();
        let control = proxy.control();
        let dispatcher = Dispatcher::new(
            env,
            proxy.input(),
            self.registry.clone(),
            self.config.cancellation_grace(),
        );
        let mut last_output = None;
        info!("transducer started");

        let exit = loop {
            let envelope = tokio::select! {
                biased;
                reason = control.stopped() => break Exit::Stopped(reason),
                next = session.next() => match next {
                    Some(envelope) => envelope,
                    None => break Exit::Closed,
                },
            };
            self.metrics.events_received += 1;
            debug!(received = self.metrics.events_received, "processing event");

            let Envelope { event, ack } = envelope;
            let cycle = tokio::select! {
                biased;
                reason = control.stopped() => break Exit::Stopped(reason),
                cycle = self.cycle(event, storage, &dispatcher, subject, &mut last_output) => cycle,
            };
            match cycle {
                Ok(Cycle::Continue) => acknowledge(ack),
                Ok(Cycle::Terminal) => {
                    acknowledge(ack);
                    break Exit::Terminal;
                }
                Err(err) => break Exit::Failed(err),
            }
        };

        session.teardown();
        match exit {
            Exit::Terminal => {
                info!(transitions = self.metrics.transitions, "terminal state reached");
                Ok(last_output)
            }
            Exit::Stopped(StopReason::Terminated) => {
                info!("transducer terminated");
                Ok(last_output)
            }
            Exit::Closed => {
                info!("event channel closed");
                Ok(last_output)
            }
            Exit::Stopped(StopReason::Cancelled) => {
                info!("transducer cancelled");
                Err(RunError::Cancelled)
            }
            Exit::Failed(err) => {
                info!(error = %err, "transducer failed");
                Err(err)
            }
        }
    }

    /// Process one external event and everything its actions cascade into.
    async fn cycle<St, S>(
        &mut self,
        event: T::Event,
        storage: &mut St,
        dispatcher: &Dispatcher<T::Event, T::Env>,
        subject: &mut S,
        last_output: &mut Option<T::Output>,
    ) -> Result<Cycle, RunError>
    where
        St: StateStorage<T::State> + Send,
        S: Subject<T::Output> + ?Sized,
    {
        let mut work = vec![Work::Event(event)];

        while let Some(item) = work.pop() {
            self.metrics.observe_depth(work.len() + 1);
            match item {
                Work::Event(event) => {
                    let transducer = &self.transducer;
                    let transition = storage.modify(|state| transducer.update(state, event));
                    self.metrics.transitions += 1;
                    let (effect, output) = transition.into_parts();

                    if let Some(output) = output {
                        subject
                            .send(output.clone())
                            .await
                            .map_err(RunError::Sink)?;
                        self.metrics.outputs += 1;
                        *last_output = Some(output);
                    }

                    if storage.with(Terminal::is_terminal) {
                        let discarded = work.len() + usize::from(effect.is_some());
                        if discarded > 0 {
                            debug!(discarded, "terminal state reached; dropping pending work");
                        }
                        return Ok(Cycle::Terminal);
                    }

                    if let Some(effect) = effect {
                        work.push(Work::Effect(effect));
                    }
                }
                Work::Effect(effect) => self.dispatch(effect, dispatcher, &mut work).await,
            }
        }

        Ok(Cycle::Continue)
    }

    async fn dispatch(
        &mut self,
        effect: Effect<T::Event, T::Env>,
        dispatcher: &Dispatcher<T::Event, T::Env>,
        work: &mut Vec<Work<T::Event, T::Env>>,
    ) {
        match effect {
            Effect::Action(action) => {
                let events = dispatcher.run_action(action).await;
                self.push_events(work, events);
            }
            Effect::Operation(operation) => {
                self.metrics.operations_spawned += 1;
                dispatcher.spawn_operation(operation);
            }
            Effect::Cancel(id) => {
                self.metrics.cancellations += 1;
                dispatcher.cancel(&id);
            }
            Effect::Sequence(members) => {
                work.extend(members.into_iter().rev().map(Work::Effect));
            }
            Effect::Combine(members) => {
                let mut actions = Vec::new();
                let mut nested = Vec::new();
                for member in members {
                    match member {
                        Effect::Action(action) => actions.push(dispatcher.run_action(action)),
                        Effect::Operation(operation) => {
                            self.metrics.operations_spawned += 1;
                            dispatcher.spawn_operation(operation);
                        }
                        Effect::Cancel(id) => {
                            self.metrics.cancellations += 1;
                            dispatcher.cancel(&id);
                        }
                        composite => nested.push(composite),
                    }
                }
                work.extend(nested.into_iter().rev().map(Work::Effect));
                let events: Events<T::Event> =
                    join_all(actions).await.into_iter().flatten().collect();
                self.push_events(work, events);
            }
        }
    }

    /// Queue an action's events so the first one is processed next.
    fn push_events(&mut self, work: &mut Vec<Work<T::Event, T::Env>>, events: Events<T::Event>) {
        if events.is_empty() {
            return;
        }
        trace!(count = events.len(), "action produced events");
        self.metrics.internal_events += events.len() as u64;
        work.extend(events.into_iter().rev().map(Work::Event));
    }
}
