//! The transducer trait: pure decisions over a state.

use crate::core::Terminal;
use crate::effect::Effect;

/// A state machine whose transitions may emit an output and request an
/// effect.
///
/// `update` must be pure: no I/O, no awaiting, nothing but reading the
/// event and mutating the state it is handed. Anything else belongs in an
/// [`Effect`]. Matching exhaustively on the event type keeps the
/// transition table complete.
///
/// # Example
///
/// ```rust
/// use flipflop::{Terminal, Transducer, Transition};
///
/// struct Counter;
///
/// #[derive(Default)]
/// struct Count(u32);
///
/// impl Terminal for Count {
///     fn is_terminal(&self) -> bool {
///         false
///     }
/// }
///
/// enum CounterEvent {
///     Increment,
/// }
///
/// impl Transducer for Counter {
///     type State = Count;
///     type Event = CounterEvent;
///     type Output = u32;
///     type Env = ();
///
///     fn update(
///         &self,
///         state: &mut Count,
///         event: CounterEvent,
///     ) -> Transition<CounterEvent, u32, ()> {
///         match event {
///             CounterEvent::Increment => {
///                 state.0 += 1;
///                 Transition::output(state.0)
///             }
///         }
///     }
/// }
/// ```
pub trait Transducer: Send + Sync + 'static {
    type State: Terminal + Send + 'static;
    type Event: Send + 'static;
    type Output: Clone + Send + 'static;
    /// Dependencies handed to every effect.
    type Env: Clone + Send + Sync + 'static;

    fn update(
        &self,
        state: &mut Self::State,
        event: Self::Event,
    ) -> Transition<Self::Event, Self::Output, Self::Env>;
}

/// Shorthand for a transducer's transition type.
pub type TransitionOf<T> = Transition<
    <T as Transducer>::Event,
    <T as Transducer>::Output,
    <T as Transducer>::Env,
>;

/// Result of one call to [`Transducer::update`].
pub struct Transition<E, O, Env> {
    effect: Option<Effect<E, Env>>,
    output: Option<O>,
}

impl<E, O, Env> Transition<E, O, Env> {
    /// Neither output nor effect.
    pub fn none() -> Self {
        Self {
            effect: None,
            output: None,
        }
    }

    pub fn output(output: O) -> Self {
        Self {
            effect: None,
            output: Some(output),
        }
    }

    pub fn effect(effect: Effect<E, Env>) -> Self {
        Self {
            effect: Some(effect),
            output: None,
        }
    }

    pub fn with_effect(effect: Effect<E, Env>, output: O) -> Self {
        Self {
            effect: Some(effect),
            output: Some(output),
        }
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    pub fn has_effect(&self) -> bool {
        self.effect.is_some()
    }

    pub fn output_ref(&self) -> Option<&O> {
        self.output.as_ref()
    }

    pub fn effect_ref(&self) -> Option<&Effect<E, Env>> {
        self.effect.as_ref()
    }

    pub fn into_parts(self) -> (Option<Effect<E, Env>>, Option<O>) {
        (self.effect, self.output)
    }
}

impl<E, O, Env> From<Effect<E, Env>> for Transition<E, O, Env> {
    fn from(effect: Effect<E, Env>) -> Self {
        Self::effect(effect)
    }
}

impl<E, O, Env> std::fmt::Debug for Transition<E, O, Env>
where
    O: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("effect", &self.effect)
            .field("output", &self.output)
            .finish()
    }
}
