//! Stream throttling utilities

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

fn never_urgent<T>(_: &T) -> bool {
    false
}

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Throttle the stream to emit at most once per interval
    ///
    /// Uses "latest-wins" semantics - if multiple items arrive
    /// during an interval, only the latest is emitted.
    fn throttle(self, duration: Duration) -> Throttle<Self, fn(&Self::Item) -> bool>
    where
        Self: Sized,
    {
        Throttle::new(self, duration, never_urgent::<Self::Item> as fn(&Self::Item) -> bool)
    }

    /// Like [`throttle`](ThrottleExt::throttle), but items for which
    /// `is_urgent` returns true are passed through at once and restart the
    /// interval. Any older pending item is superseded by the urgent one.
    fn throttle_urgent<F>(self, duration: Duration, is_urgent: F) -> Throttle<Self, F>
    where
        Self: Sized,
        F: FnMut(&Self::Item) -> bool,
    {
        Throttle::new(self, duration, is_urgent)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// A stream combinator that throttles emission rate
    pub struct Throttle<S: Stream, F> {
        #[pin]
        stream: S,
        interval: Interval,
        is_urgent: F,
        pending: Option<S::Item>,
        finished: bool,
    }
}

impl<S, F> Throttle<S, F>
where
    S: Stream,
    F: FnMut(&S::Item) -> bool,
{
    pub fn new(stream: S, duration: Duration, is_urgent: F) -> Self {
        let mut interval = interval(duration);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { stream, interval, is_urgent, pending: None, finished: false }
    }
}

impl<S, F> Stream for Throttle<S, F>
where
    S: Stream,
    F: FnMut(&S::Item) -> bool,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Drain what is ready, keeping only the latest
        while !*this.finished {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    if (this.is_urgent)(&item) {
                        *this.pending = None;
                        this.interval.reset();
                        return Poll::Ready(Some(item));
                    }
                    *this.pending = Some(item);
                }
                Poll::Ready(None) => *this.finished = true,
                Poll::Pending => break,
            }
        }

        // Flush the last item once the inner stream has ended
        if *this.finished {
            return Poll::Ready(this.pending.take());
        }
        if this.pending.is_none() {
            return Poll::Pending;
        }

        match this.interval.poll_tick(cx) {
            Poll::Ready(_) => Poll::Ready(this.pending.take()),
            Poll::Pending => Poll::Pending,
        }
    }
}
