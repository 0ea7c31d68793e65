//! Effect dispatcher: turns effect values into running work.

use crate::core::{EffectId, Events};
use crate::effect::{Action, Operation, OperationContext};
use crate::proxy::Input;
use crate::registry::TaskRegistry;
use futures::future::{BoxFuture, FutureExt};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, trace, warn, Instrument};

/// How an operation's task ended.
#[derive(Debug)]
pub(crate) enum Completion {
    /// Ran to the end on its own.
    Finished(anyhow::Result<()>),
    /// Finished within its grace period after being cancelled.
    FinishedAfterCancel(anyhow::Result<()>),
    /// Still running when the grace period ran out; dropped.
    Dropped,
}

/// Interprets leaf effects on behalf of the execution loop.
pub(crate) struct Dispatcher<E, Env> {
    env: Env,
    input: Input<E>,
    registry: TaskRegistry,
    grace: Duration,
}

impl<E, Env> Dispatcher<E, Env>
where
    E: Send + 'static,
    Env: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(env: Env, input: Input<E>, registry: TaskRegistry, grace: Duration) -> Self {
        Self {
            env,
            input,
            registry,
            grace,
        }
    }

    /// Start an action. The loop awaits the returned future before it
    /// touches anything else.
    pub(crate) fn run_action(&self, action: Action<E, Env>) -> BoxFuture<'static, Events<E>> {
        action.run(self.env.clone())
    }

    /// Spawn an operation as its own task, replacing any operation that
    /// holds the same identifier.
    pub(crate) fn spawn_operation(&self, operation: Operation<E, Env>) {
        let Operation { id, run } = operation;
        let token = CancellationToken::new();
        let ticket = self.registry.register(id.clone(), token.clone());
        let span = match &id {
            Some(id) => debug_span!("operation", %id),
            None => debug_span!("operation", id = "untracked"),
        };

        let ctx = OperationContext::new(id, self.env.clone(), self.input.clone(), token.clone());
        let registry = self.registry.clone();
        let grace = self.grace;

        tokio::spawn(
            async move {
                trace!(generation = ticket.generation(), "operation started");
                let driven = AssertUnwindSafe(drive(run(ctx), &token, grace)).catch_unwind();
                match driven.await {
                    Ok(Completion::Finished(Ok(()))) => trace!("operation finished"),
                    Ok(Completion::FinishedAfterCancel(Ok(()))) => {
                        debug!("operation finished after cancellation")
                    }
                    Ok(Completion::Finished(Err(err)))
                    | Ok(Completion::FinishedAfterCancel(Err(err))) => {
                        warn!(error = %err, "operation failed; no event delivered")
                    }
                    Ok(Completion::Dropped) => debug!("operation dropped after cancellation"),
                    Err(panic) => error!(
                        panic = panic_message(panic.as_ref()),
                        "operation panicked"
                    ),
                }
                registry.on_completed(&ticket);
            }
            .instrument(span),
        );
    }

    pub(crate) fn cancel(&self, id: &EffectId) -> bool {
        let cancelled = self.registry.cancel(id);
        trace!(%id, cancelled, "cancel requested");
        cancelled
    }
}

/// Poll an operation until it finishes or is cancelled. A cancelled
/// operation keeps being polled for `grace` (at least once) so it can
/// report its own cancellation.
pub(crate) async fn drive<F>(operation: F, token: &CancellationToken, grace: Duration) -> Completion
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    tokio::pin!(operation);
    tokio::select! {
        biased;
        _ = token.cancelled() => {}
        result = &mut operation => return Completion::Finished(result),
    }

    if grace.is_zero() {
        return match operation.as_mut().now_or_never() {
            Some(result) => Completion::FinishedAfterCancel(result),
            None => Completion::Dropped,
        };
    }
    match tokio::time::timeout(grace, operation).await {
        Ok(result) => Completion::FinishedAfterCancel(result),
        Err(_) => Completion::Dropped,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Effect;
    use crate::proxy::Proxy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn dispatcher(proxy: &Proxy<u32>, registry: &TaskRegistry) -> Dispatcher<u32, ()> {
        Dispatcher::new((), proxy.input(), registry.clone(), Duration::ZERO)
    }

    fn operation(effect: Effect<u32, ()>) -> Operation<u32, ()> {
        match effect {
            Effect::Operation(op) => op,
            other => panic!("expected operation, got {other:?}"),
        }
    }

    async fn wait_until_empty(registry: &TaskRegistry) {
        for _ in 0..200 {
            if registry.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("registry never drained: {registry:?}");
    }

    #[tokio::test]
    async fn finished_operation_leaves_the_registry() {
        let proxy = Proxy::new();
        let mut inbox = proxy.take_inbox().unwrap();
        let registry = TaskRegistry::new();
        let dispatcher = dispatcher(&proxy, &registry);

        dispatcher.spawn_operation(operation(Effect::operation_with_id(
            "one",
            |ctx: OperationContext<u32, ()>| async move {
                ctx.send(41)?;
                Ok(())
            },
        )));

        assert_eq!(inbox.recv().await.unwrap().event, 41);
        wait_until_empty(&registry).await;
    }

    #[tokio::test]
    async fn failed_operation_is_contained() {
        let proxy = Proxy::<u32>::new();
        let registry = TaskRegistry::new();
        let dispatcher = dispatcher(&proxy, &registry);

        dispatcher.spawn_operation(operation(Effect::operation(|_| async {
            anyhow::bail!("backend unavailable")
        })));
        wait_until_empty(&registry).await;
    }

    #[tokio::test]
    async fn panicking_operation_is_contained() {
        let proxy = Proxy::<u32>::new();
        let registry = TaskRegistry::new();
        let dispatcher = dispatcher(&proxy, &registry);

        dispatcher.spawn_operation(operation(Effect::operation_with_id("boom", |_| async {
            panic!("operation blew up");
        })));
        wait_until_empty(&registry).await;
    }

    #[tokio::test]
    async fn cancelled_operation_may_report_once() {
        let proxy = Proxy::new();
        let mut inbox = proxy.take_inbox().unwrap();
        let registry = TaskRegistry::new();
        let dispatcher = dispatcher(&proxy, &registry);

        dispatcher.spawn_operation(operation(Effect::operation_with_id(
            "poll",
            |ctx: OperationContext<u32, ()>| async move {
                ctx.cancelled().await;
                ctx.send(99)?;
                Ok(())
            },
        )));
        tokio::task::yield_now().await;

        assert!(dispatcher.cancel(&EffectId::from("poll")));
        assert_eq!(inbox.recv().await.unwrap().event, 99);
        assert!(!dispatcher.cancel(&EffectId::from("poll")));
    }

    #[tokio::test]
    async fn drive_drops_operations_that_ignore_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let completion = drive(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            &token,
            Duration::ZERO,
        )
        .await;
        assert!(matches!(completion, Completion::Dropped));
    }

    #[tokio::test]
    async fn drive_honours_grace_period() {
        let token = CancellationToken::new();
        token.cancel();
        let completion = drive(
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(())
            },
            &token,
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(completion, Completion::FinishedAfterCancel(Ok(()))));
    }

    #[tokio::test]
    async fn replacement_cancels_the_running_operation() {
        let proxy = Proxy::<u32>::new();
        let registry = TaskRegistry::new();
        let dispatcher = dispatcher(&proxy, &registry);
        let cancelled = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let cancelled = cancelled.clone();
            dispatcher.spawn_operation(operation(Effect::operation_with_id(
                "search",
                move |ctx: OperationContext<u32, ()>| async move {
                    ctx.cancelled().await;
                    cancelled.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);

        // The registry empties on the spot; the task notices on its next poll.
        assert_eq!(registry.cancel_all(), 1);
        assert!(registry.is_empty());
        for _ in 0..200 {
            if cancelled.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(cancelled.load(Ordering::SeqCst), 2);
    }
}
