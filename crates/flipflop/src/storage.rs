//! State storage: the cell the execution loop mutates.
//!
//! The loop is the only writer. Hosts that want to watch the state use
//! [`SharedState`] and subscribe to it.

use tokio::sync::watch;

/// A cell holding a transducer's state.
pub trait StateStorage<S> {
    /// Read the state.
    fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R;

    /// Mutate the state in place.
    fn modify<R>(&mut self, f: impl FnOnce(&mut S) -> R) -> R;

    fn get(&self) -> S
    where
        S: Clone,
    {
        self.with(S::clone)
    }

    fn set(&mut self, state: S) {
        self.modify(|current| *current = state);
    }
}

/// State owned by the run that drives it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalState<S> {
    state: S,
}

impl<S> LocalState<S> {
    pub fn new(state: S) -> Self {
        Self { state }
    }

    pub fn into_inner(self) -> S {
        self.state
    }
}

impl<S> StateStorage<S> for LocalState<S> {
    fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state)
    }

    fn modify<R>(&mut self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.state)
    }
}

/// State observable by a host while the loop mutates it.
///
/// Every transition notifies subscribers, who see the committed state.
///
/// ```rust
/// use flipflop::{SharedState, StateStorage};
///
/// let mut state = SharedState::new(0u32);
/// let observer = state.subscribe();
/// state.modify(|count| *count += 1);
/// assert_eq!(*observer.borrow(), 1);
/// ```
#[derive(Debug)]
pub struct SharedState<S> {
    cell: watch::Sender<S>,
}

impl<S> SharedState<S> {
    pub fn new(state: S) -> Self {
        let (cell, _) = watch::channel(state);
        Self { cell }
    }

    /// A read-only binding that sees every committed state.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.cell.subscribe()
    }
}

impl<S> StateStorage<S> for SharedState<S> {
    fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&*self.cell.borrow())
    }

    fn modify<R>(&mut self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut result = None;
        self.cell.send_modify(|state| result = Some(f(state)));
        match result {
            Some(result) => result,
            None => unreachable!("send_modify always runs its closure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_state_round_trips() {
        let mut state = LocalState::new(vec![1]);
        state.modify(|items| items.push(2));
        assert_eq!(state.get(), vec![1, 2]);
        state.set(vec![]);
        assert!(state.into_inner().is_empty());
    }

    #[test]
    fn modify_returns_the_closure_result() {
        let mut state = SharedState::new(10u32);
        let doubled = state.modify(|n| {
            *n *= 2;
            *n
        });
        assert_eq!(doubled, 20);
        assert_eq!(state.get(), 20);
    }

    #[tokio::test]
    async fn subscribers_observe_changes() {
        let mut state = SharedState::new(String::from("idle"));
        let mut observer = state.subscribe();
        state.set(String::from("running"));
        observer.changed().await.unwrap();
        assert_eq!(*observer.borrow_and_update(), "running");
    }
}
