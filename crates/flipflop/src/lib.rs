//! # Flipflop
//!
//! A finite-state-transducer runtime: pure transitions decide, effects
//! execute, and at most one operation runs per identifier.
//!
//! ## Core Concepts
//!
//! Flipflop separates **decisions** from **work**:
//! - [`Transducer::update`] = Decisions (mutate state, emit an output, ask for an effect)
//! - [`Effect`] = Work (inline [`Effect::action`]s, background [`Effect::operation`]s)
//!
//! The key principle: **the loop is the only writer**. State changes happen
//! one event at a time on a single logical thread; operations talk back only
//! by sending events.
//!
//! ## Architecture
//!
//! ```text
//! Host / Operations
//!     │
//!     ▼ send() / send_await()
//! Proxy (bounded channel) ◄──────────────────────────┐
//!     │                                              │
//!     ▼ recv()                                       │
//! Runtime loop                                       │
//!     │                                              │
//!     ├─► Transducer.update(&mut state, event)       │
//!     │        │                                     │
//!     │        ├─► output ─► Subject.send()          │
//!     │        │                                     │
//!     │        └─► effect ─► Dispatcher              │
//!     │                          │                   │
//!     │          Action ─────────┤                   │
//!     │            │             │                   │
//!     │            ▼             │                   │
//!     │   events pushed on the   │                   │
//!     │   work list, processed   │                   │
//!     │   before the next recv() │                   │
//!     │                          ▼                   │
//!     │              Operation ─► TaskRegistry       │
//!     │                          │                   │
//!     │                          ▼ tokio::spawn      │
//!     │                     ctx.send() ──────────────┘
//!     │
//!     └─► terminal state ─► teardown (cancel all tasks, close channel)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Transitions are pure** - No IO, no async, only the state they are handed
//! 2. **Effects are values** - Building one runs nothing
//! 3. **Action cascades are atomic** - Their events run depth-first before the next queued event
//! 4. **One task per identifier** - A new operation under an id cancels the old one
//! 5. **Terminal means done** - Every task is cancelled and every later send fails
//!
//! ## Guarantees
//!
//! - **Ordered processing**: channel events are processed in arrival order
//! - **Ordered outputs**: the subject sees outputs in the order transitions made them
//! - **No silent drops**: a send either succeeds or returns a [`SendError`]
//! - **Cooperative cancellation**: a cancelled operation gets a final poll to report itself
//!
//! ## Example
//!
//! ```ignore
//! use flipflop::{
//!     Effect, OperationContext, Proxy, Runtime, Terminal, Transducer, Transition,
//! };
//!
//! // 1. Define state and events
//! #[derive(Default)]
//! struct Search { query: String, results: Vec<String>, closed: bool }
//!
//! impl Terminal for Search {
//!     fn is_terminal(&self) -> bool { self.closed }
//! }
//!
//! enum SearchEvent {
//!     QueryChanged(String),
//!     Results(Vec<String>),
//!     Close,
//! }
//!
//! // 2. Define the transducer (pure decisions)
//! struct SearchMachine;
//!
//! impl Transducer for SearchMachine {
//!     type State = Search;
//!     type Event = SearchEvent;
//!     type Output = usize;
//!     type Env = SearchClient;
//!
//!     fn update(&self, state: &mut Search, event: SearchEvent)
//!         -> Transition<SearchEvent, usize, SearchClient>
//!     {
//!         match event {
//!             SearchEvent::QueryChanged(query) => {
//!                 state.query = query.clone();
//!                 // Same id: a newer query cancels the older request.
//!                 Transition::effect(Effect::operation_with_id(
//!                     "search",
//!                     |ctx: OperationContext<SearchEvent, SearchClient>| async move {
//!                         let hits = ctx.env().search(&query).await?;
//!                         ctx.send(SearchEvent::Results(hits))?;
//!                         Ok(())
//!                     },
//!                 ))
//!             }
//!             SearchEvent::Results(results) => {
//!                 state.results = results;
//!                 Transition::output(state.results.len())
//!             }
//!             SearchEvent::Close => {
//!                 state.closed = true;
//!                 Transition::none()
//!             }
//!         }
//!     }
//! }
//!
//! // 3. Run it
//! let proxy = Proxy::new();
//! let input = proxy.input();
//! let mut runtime = Runtime::new(SearchMachine);
//! let mut subject = flipflop::NoSubject;
//!
//! input.send(SearchEvent::QueryChanged("rust".into()))?;
//! let last = runtime.run(Search::default(), &proxy, client, &mut subject).await?;
//! ```
//!
//! ## What This Is Not
//!
//! Flipflop is **not**:
//! - A UI framework or view binding
//! - An actor framework with supervision
//! - A durable workflow engine
//!
//! Flipflop **is**:
//! > A runtime that executes pure transition logic safely, with cancellable
//! > background work and deterministic ordering.

// Core modules
mod config;
mod core;
mod dispatch;
mod effect;
mod engine;
mod error;
mod metrics;
mod proxy;
mod registry;
mod runtime;
mod storage;
mod subject;
mod transducer;


// Stress tests (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export core types
pub use crate::core::{EffectId, Events, IntoEvents, Terminal};

// Re-export transducer types
pub use transducer::{Transducer, Transition, TransitionOf};

// Re-export effect types
pub use effect::{Action, Effect, Operation, OperationContext};

// Re-export error types
pub use crate::error::{ConfigError, RunError, SendError};

// Re-export configuration
pub use config::{Config, DEFAULT_BUFFER_CAPACITY};

// Re-export event source types
pub use proxy::{Input, Proxy};

// Re-export registry types
pub use registry::{TaskRegistry, TaskTicket};

// Re-export storage and subject types
pub use storage::{LocalState, SharedState, StateStorage};
pub use subject::{FnSubject, NoSubject, Subject};

// Re-export runtime types
pub use metrics::RunMetrics;
pub use runtime::Runtime;

// Re-export engine types (host entry point)
pub use engine::{Engine, EngineBuilder, EngineHandle, RunOutcome};

// Re-export commonly used external types
pub use async_trait::async_trait;
