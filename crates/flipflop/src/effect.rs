//! Effects: declarative descriptions of work a transition asks for.
//!
//! An [`Effect`] is a value. Building one runs nothing; only the execution
//! loop interprets it. There are two kinds of work:
//!
//! - **Actions** run inline. Their follow-up events are processed
//!   depth-first before the loop takes another event from its channel.
//! - **Operations** run as independent tasks and talk back through an
//!   [`Input`]. An operation with an identifier replaces (and cancels) any
//!   operation already running under that identifier.
//!
//! Effects compose with [`Effect::sequence`] / [`Effect::then`] (ordered)
//! and [`Effect::combine`] / [`Effect::and`] (unordered).

use crate::core::{EffectId, Events, IntoEvents};
use crate::error::SendError;
use crate::proxy::Input;
use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

pub(crate) type ActionFn<E, Env> = Box<dyn FnOnce(Env) -> BoxFuture<'static, Events<E>> + Send>;

pub(crate) type OperationFn<E, Env> =
    Box<dyn FnOnce(OperationContext<E, Env>) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Work requested by a transition.
pub enum Effect<E, Env> {
    /// Inline work yielding follow-up events.
    Action(Action<E, Env>),
    /// A cancellable background task.
    Operation(Operation<E, Env>),
    /// Cancel the operation registered under an identifier, if any.
    Cancel(EffectId),
    /// Members dispatched in order. An action member, with its whole event
    /// cascade, completes before the next member starts.
    Sequence(Vec<Effect<E, Env>>),
    /// Members dispatched with no ordering between them.
    Combine(Vec<Effect<E, Env>>),
}

/// An effect that runs inline in the execution loop.
pub struct Action<E, Env> {
    pub(crate) run: ActionFn<E, Env>,
}

impl<E, Env> Action<E, Env> {
    pub(crate) fn run(self, env: Env) -> BoxFuture<'static, Events<E>> {
        (self.run)(env)
    }
}

/// An effect that runs as its own task.
pub struct Operation<E, Env> {
    pub(crate) id: Option<EffectId>,
    pub(crate) run: OperationFn<E, Env>,
}

impl<E, Env> Operation<E, Env> {
    pub fn id(&self) -> Option<&EffectId> {
        self.id.as_ref()
    }
}

impl<E, Env> Effect<E, Env>
where
    E: Send + 'static,
    Env: Send + 'static,
{
    /// An action computed synchronously from the environment.
    ///
    /// ```rust
    /// use flipflop::Effect;
    ///
    /// enum Event { Loaded(u32) }
    ///
    /// let effect: Effect<Event, u32> = Effect::action(|base: u32| Some(Event::Loaded(base + 1)));
    /// assert!(effect.is_action());
    /// ```
    pub fn action<F, R>(f: F) -> Self
    where
        F: FnOnce(Env) -> R + Send + 'static,
        R: IntoEvents<E>,
    {
        Self::Action(Action {
            run: Box::new(move |env| future::ready(f(env).into_events()).boxed()),
        })
    }

    /// An action whose body awaits. The loop processes nothing else while
    /// it is suspended.
    pub fn async_action<F, Fut, R>(f: F) -> Self
    where
        F: FnOnce(Env) -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoEvents<E>,
    {
        Self::Action(Action {
            run: Box::new(move |env| f(env).map(|events| events.into_events()).boxed()),
        })
    }

    /// An action that immediately yields one event.
    pub fn event(event: E) -> Self {
        Self::Action(Action {
            run: Box::new(move |_| future::ready(Some(event).into_events()).boxed()),
        })
    }

    /// An operation no identifier can reach. It is still cancelled when the
    /// run tears down.
    pub fn operation<F, Fut>(f: F) -> Self
    where
        F: FnOnce(OperationContext<E, Env>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Operation(Operation {
            id: None,
            run: Box::new(move |ctx| f(ctx).boxed()),
        })
    }

    /// An operation registered under `id`, replacing whatever ran there.
    pub fn operation_with_id<F, Fut>(id: impl Into<EffectId>, f: F) -> Self
    where
        F: FnOnce(OperationContext<E, Env>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Operation(Operation {
            id: Some(id.into()),
            run: Box::new(move |ctx| f(ctx).boxed()),
        })
    }
}

impl<E, Env> Effect<E, Env> {
    pub fn cancel(id: impl Into<EffectId>) -> Self {
        Self::Cancel(id.into())
    }

    pub fn sequence(effects: impl IntoIterator<Item = Self>) -> Self {
        Self::Sequence(effects.into_iter().collect())
    }

    pub fn combine(effects: impl IntoIterator<Item = Self>) -> Self {
        Self::Combine(effects.into_iter().collect())
    }

    /// Run `next` after `self`. Nested sequences are flattened.
    pub fn then(self, next: Self) -> Self {
        let mut members = match self {
            Self::Sequence(members) => members,
            single => vec![single],
        };
        match next {
            Self::Sequence(more) => members.extend(more),
            single => members.push(single),
        }
        Self::Sequence(members)
    }

    /// Run `other` alongside `self`. Nested combinations are flattened.
    pub fn and(self, other: Self) -> Self {
        let mut members = match self {
            Self::Combine(members) => members,
            single => vec![single],
        };
        match other {
            Self::Combine(more) => members.extend(more),
            single => members.push(single),
        }
        Self::Combine(members)
    }

    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action(_))
    }

    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }

    /// Number of leaf effects (actions, operations, cancels) in the tree.
    pub fn len(&self) -> usize {
        match self {
            Self::Action(_) | Self::Operation(_) | Self::Cancel(_) => 1,
            Self::Sequence(members) | Self::Combine(members) => {
                members.iter().map(Self::len).sum()
            }
        }
    }

    /// True for compositions with no leaves.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E, Env> fmt::Debug for Effect<E, Env> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(_) => f.write_str("Action"),
            Self::Operation(op) => match &op.id {
                Some(id) => write!(f, "Operation({id})"),
                None => f.write_str("Operation"),
            },
            Self::Cancel(id) => write!(f, "Cancel({id})"),
            Self::Sequence(members) => f.debug_tuple("Sequence").field(members).finish(),
            Self::Combine(members) => f.debug_tuple("Combine").field(members).finish(),
        }
    }
}

/// What an operation's closure receives.
pub struct OperationContext<E, Env> {
    id: Option<EffectId>,
    env: Env,
    input: Input<E>,
    token: CancellationToken,
}

impl<E, Env> OperationContext<E, Env> {
    pub(crate) fn new(
        id: Option<EffectId>,
        env: Env,
        input: Input<E>,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            env,
            input,
            token,
        }
    }

    pub fn id(&self) -> Option<&EffectId> {
        self.id.as_ref()
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Send-only handle to the transducer's channel.
    pub fn input(&self) -> &Input<E> {
        &self.input
    }

    /// Resolves once this operation has been cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<E: Send, Env> OperationContext<E, Env> {
    /// Shorthand for `self.input().send(event)`.
    pub fn send(&self, event: E) -> Result<(), SendError> {
        self.input.send(event)
    }

    /// Shorthand for `self.input().send_await(event)`.
    pub async fn send_await(&self, event: E) -> Result<(), SendError> {
        self.input.send_await(event).await
    }
}
