use async_trait::async_trait;
use std::future::Future;

/// A deferred unit of work executed by exactly one pool worker.
///
/// Jobs own their inputs and report their own outcome; `run` has no return
/// value so a failing job can never take its worker down with it.
#[async_trait]
pub trait Job: Send + 'static {
    async fn run(self: Box<Self>);
}

pub type BoxedJob = Box<dyn Job>;

/// Adapts a future into a [`Job`].
pub struct FutureJob<F> {
    future: F,
}

impl<F> FutureJob<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(future: F) -> Self {
        FutureJob { future }
    }
}

#[async_trait]
impl<F> Job for FutureJob<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    async fn run(self: Box<Self>) {
        self.future.await
    }
}
