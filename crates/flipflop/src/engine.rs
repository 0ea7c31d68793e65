//! Engine: hosts a runtime on its own tokio task.
//!
//! `start` is the "on appear" hook: it spawns the loop and hands back an
//! [`EngineHandle`]. The handle's `cancel`, `terminate` and `abort` are the
//! "on disappear" hooks.

use crate::config::Config;
use crate::error::{ConfigError, RunError, SendError};
use crate::metrics::RunMetrics;
use crate::proxy::{Input, Proxy};
use crate::runtime::Runtime;
use crate::storage::{LocalState, StateStorage};
use crate::subject::Subject;
use crate::transducer::Transducer;
use tokio::task::JoinHandle;

/// Builder for an [`Engine`].
pub struct EngineBuilder<T: Transducer> {
    transducer: T,
    env: T::Env,
    config: Config,
}

impl<T: Transducer> EngineBuilder<T> {
    pub fn new(transducer: T, env: T::Env) -> Self {
        Self {
            transducer,
            env,
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Engine<T>, ConfigError> {
        let proxy = Proxy::with_config(&self.config)?;
        Ok(Engine {
            runtime: Runtime::with_config(self.transducer, self.config),
            proxy,
            env: self.env,
        })
    }
}

/// A transducer with its proxy and environment, ready to start.
pub struct Engine<T: Transducer> {
    runtime: Runtime<T>,
    proxy: Proxy<T::Event>,
    env: T::Env,
}

impl<T: Transducer> Engine<T> {
    /// Build an engine with the default configuration.
    pub fn new(transducer: T, env: T::Env) -> Self {
        Self {
            runtime: Runtime::new(transducer),
            proxy: Proxy::new(),
            env,
        }
    }

    pub fn builder(transducer: T, env: T::Env) -> EngineBuilder<T> {
        EngineBuilder::new(transducer, env)
    }

    pub fn proxy(&self) -> &Proxy<T::Event> {
        &self.proxy
    }

    /// Events sent before `start` are buffered.
    pub fn input(&self) -> Input<T::Event> {
        self.proxy.input()
    }

    /// Spawn the loop with an owned initial state.
    pub fn start<S>(self, initial: T::State, subject: S) -> EngineHandle<T>
    where
        S: Subject<T::Output> + 'static,
    {
        let Self {
            mut runtime,
            proxy,
            env,
        } = self;
        // Claimed before spawning so an abort ahead of the first poll
        // still closes the channel.
        let session = runtime.open_session(&proxy);
        let run_proxy = proxy.clone();
        let task = tokio::spawn(async move {
            let mut storage = LocalState::new(initial);
            let mut subject = subject;
            let result = match session {
                Ok(session) => {
                    runtime
                        .run_session(session, &mut storage, &run_proxy, env, &mut subject)
                        .await
                }
                Err(err) => Err(err),
            };
            (result, runtime.metrics())
        });
        EngineHandle { proxy, task }
    }

    /// Spawn the loop over caller-provided storage, typically a
    /// [`SharedState`](crate::SharedState) the host subscribed to.
    pub fn start_with_storage<St, S>(self, storage: St, subject: S) -> EngineHandle<T>
    where
        St: StateStorage<T::State> + Send + 'static,
        S: Subject<T::Output> + 'static,
    {
        let Self {
            mut runtime,
            proxy,
            env,
        } = self;
        let session = runtime.open_session(&proxy);
        let run_proxy = proxy.clone();
        let task = tokio::spawn(async move {
            let mut storage = storage;
            let mut subject = subject;
            let result = match session {
                Ok(session) => {
                    runtime
                        .run_session(session, &mut storage, &run_proxy, env, &mut subject)
                        .await
                }
                Err(err) => Err(err),
            };
            (result, runtime.metrics())
        });
        EngineHandle { proxy, task }
    }
}

/// What a hosted run ends with: its result and its counters.
pub type RunOutcome<T> = (
    Result<Option<<T as Transducer>::Output>, RunError>,
    RunMetrics,
);

/// Control over a started engine.
pub struct EngineHandle<T: Transducer> {
    proxy: Proxy<T::Event>,
    task: JoinHandle<RunOutcome<T>>,
}

impl<T: Transducer> EngineHandle<T> {
    pub fn input(&self) -> Input<T::Event> {
        self.proxy.input()
    }

    pub fn send(&self, event: T::Event) -> Result<(), SendError> {
        self.proxy.send(event)
    }

    /// Send an event and wait until the loop has fully processed it.
    pub async fn send_await(&self, event: T::Event) -> Result<(), SendError> {
        self.proxy.send_await(event).await
    }

    /// Stop the run; [`join`](Self::join) reports [`RunError::Cancelled`].
    pub fn cancel(&self) {
        self.proxy.cancel();
    }

    /// Stop the run; [`join`](Self::join) reports the last output.
    pub fn terminate(&self) {
        self.proxy.terminate();
    }

    /// Abort the host task. Teardown still runs as the loop is dropped,
    /// whether or not it had started.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end.
    pub async fn join(self) -> Result<Option<T::Output>, RunError> {
        self.join_with_metrics().await.0
    }

    /// Wait for the run to end and collect its counters. An aborted task
    /// reports default counters.
    pub async fn join_with_metrics(self) -> RunOutcome<T> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => (Err(RunError::Cancelled), RunMetrics::default()),
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        }
    }
}
