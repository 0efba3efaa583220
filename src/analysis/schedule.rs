//! Suspension points for long-running analysis.
//!
//! The estimator never blocks its host for long: it awaits
//! [`Scheduler::yield_now`] between segments and [`Scheduler::sleep`]
//! between back-to-back estimations. Hosts pick what a yield means: a
//! `setTimeout(0)` macrotask in the browser, a tokio yield natively, or a
//! single re-poll in tests.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

pub trait Scheduler {
    /// Give control back to the host once.
    fn yield_now(&self) -> impl Future<Output = ()>;

    /// Pause for `duration` to let memory and CPU pressure settle.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// Returns `Pending` exactly once, waking itself first.
#[derive(Debug, Default)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Executor-agnostic scheduler: yields are a single re-poll and sleeps
/// complete immediately. Suitable for tests and offline analysis.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn yield_now(&self) -> impl Future<Output = ()> {
        YieldNow::default()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        log::trace!("inline scheduler: skipping {duration:?} cooldown");
        std::future::ready(())
    }
}

/// Scheduler backed by the tokio runtime.
#[cfg(feature = "native")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[cfg(feature = "native")]
impl Scheduler for TokioScheduler {
    fn yield_now(&self) -> impl Future<Output = ()> {
        tokio::task::yield_now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        tokio::time::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::task::{Wake, Waker};

    struct CountWakes(std::sync::atomic::AtomicUsize);

    impl Wake for CountWakes {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn yield_now_is_pending_once_and_wakes() {
        let counter = Arc::new(CountWakes(Default::default()));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);
        let mut fut = YieldNow::default();
        let mut fut = Pin::new(&mut fut);
        assert!(fut.as_mut().poll(&mut cx).is_pending());
        assert!(fut.as_mut().poll(&mut cx).is_ready());
        assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inline_scheduler_completes_under_tokio() {
        let s = InlineScheduler;
        s.yield_now().await;
        s.sleep(Duration::from_secs(3600)).await;
    }
}
