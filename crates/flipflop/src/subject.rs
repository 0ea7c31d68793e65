//! Output subjects: where a transducer's outputs go.
//!
//! The loop awaits [`Subject::send`] for every output, in the order the
//! transitions produced them. A failed send aborts the run with
//! [`RunError::Sink`](crate::RunError::Sink).

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Receiver of output values.
#[async_trait]
pub trait Subject<O>: Send {
    async fn send(&mut self, output: O) -> anyhow::Result<()>;
}

/// Discards every output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSubject;

#[async_trait]
impl<O: Send + 'static> Subject<O> for NoSubject {
    async fn send(&mut self, _output: O) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Waits for channel capacity, which pushes back on the loop.
#[async_trait]
impl<O: Send + 'static> Subject<O> for mpsc::Sender<O> {
    async fn send(&mut self, output: O) -> anyhow::Result<()> {
        mpsc::Sender::send(self, output)
            .await
            .map_err(|_| anyhow!("output receiver was dropped"))
    }
}

#[async_trait]
impl<O: Send + 'static> Subject<O> for mpsc::UnboundedSender<O> {
    async fn send(&mut self, output: O) -> anyhow::Result<()> {
        mpsc::UnboundedSender::send(self, output)
            .map_err(|_| anyhow!("output receiver was dropped"))
    }
}

/// Adapts a synchronous closure into a subject.
///
/// ```rust
/// use flipflop::FnSubject;
///
/// let mut seen = Vec::new();
/// let subject = FnSubject::new(move |value: u32| {
///     seen.push(value);
///     Ok(())
/// });
/// # drop(subject);
/// ```
pub struct FnSubject<F> {
    f: F,
}

impl<F> FnSubject<F> {
    pub fn new<O>(f: F) -> Self
    where
        F: FnMut(O) -> anyhow::Result<()> + Send,
    {
        Self { f }
    }
}

#[async_trait]
impl<O, F> Subject<O> for FnSubject<F>
where
    O: Send + 'static,
    F: FnMut(O) -> anyhow::Result<()> + Send,
{
    async fn send(&mut self, output: O) -> anyhow::Result<()> {
        (self.f)(output)
    }
}

#[async_trait]
impl<O, S> Subject<O> for &mut S
where
    O: Send + 'static,
    S: Subject<O> + ?Sized,
{
    async fn send(&mut self, output: O) -> anyhow::Result<()> {
        (**self).send(output).await
    }
}

#[async_trait]
impl<O, S> Subject<O> for Box<S>
where
    O: Send + 'static,
    S: Subject<O> + ?Sized,
{
    async fn send(&mut self, output: O) -> anyhow::Result<()> {
        (**self).send(output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_sender_forwards_in_order() {
        let (mut tx, mut rx) = mpsc::channel(4);
        Subject::send(&mut tx, 1).await.unwrap();
        Subject::send(&mut tx, 2).await.unwrap();
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn dropped_receiver_rejects() {
        let (mut tx, rx) = mpsc::unbounded_channel::<u8>();
        drop(rx);
        assert!(Subject::send(&mut tx, 1).await.is_err());
    }

    #[tokio::test]
    async fn closure_subject_can_refuse() {
        let mut subject = FnSubject::new(|value: u8| {
            if value > 1 {
                anyhow::bail!("too large: {value}");
            }
            Ok(())
        });
        assert!(subject.send(1).await.is_ok());
        let err = subject.send(2).await.unwrap_err();
        assert_eq!(err.to_string(), "too large: 2");
    }

    #[tokio::test]
    async fn boxed_subjects_delegate() {
        let mut subject: Box<dyn Subject<u8>> = Box::new(NoSubject);
        assert!(subject.send(1).await.is_ok());
    }
}
