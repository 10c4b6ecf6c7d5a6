use futures_util::Stream;
use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::{self, Instant, Sleep};

#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Debug)]
pub(crate) struct Timeout {
    deadline: Instant,
    id: u64,
}

impl Timeout {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Queue of values that become available once their deadline passes. Runs on the tokio clock so
/// it follows `tokio::time::pause` in tests.
pub(crate) struct Timer<T> {
    next_id: u64,
    current: Option<CurrentTimerEntry<T>>,
    queue: BTreeMap<Timeout, T>,
}

impl<T> Timer<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            current: None,
            queue: BTreeMap::new(),
        }
    }

    /// Has the timer no scheduled timeouts?
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    pub fn schedule_in(&mut self, delay: Duration, value: T) -> Timeout {
        let deadline = Instant::now() + delay;

        // If the current timeout is later than the new one, push it back into the queue.
        if let Some(current) = &self.current {
            let key = current.key();

            if deadline < key.deadline {
                if let Some(CurrentTimerEntry { value, .. }) = self.current.take() {
                    self.queue.insert(key, value);
                }
            }
        }

        let id = self.next_id();
        let key = Timeout { deadline, id };
        self.queue.insert(key, value);

        key
    }

    pub fn cancel(&mut self, timeout: Timeout) -> bool {
        if let Some(current) = &self.current {
            if current.key() == timeout {
                self.current = None;
                return true;
            }
        }

        self.queue.remove(&timeout).is_some()
    }

    /// Values still waiting for their deadline, in no particular order.
    #[cfg(test)]
    pub fn scheduled(&self) -> impl Iterator<Item = &T> {
        self.current
            .iter()
            .map(|current| &current.value)
            .chain(self.queue.values())
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

impl<T: Unpin> Stream for Timer<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(current) = &mut self.current {
                match current.sleep.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        let value = self.current.take().map(|current| current.value);
                        return Poll::Ready(value);
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            let (key, value) = if let Some(entry) = self.queue.pop_first() {
                entry
            } else {
                return Poll::Ready(None);
            };

            self.current = Some(CurrentTimerEntry {
                sleep: Box::pin(time::sleep_until(key.deadline)),
                value,
                id: key.id,
            });
        }
    }
}

struct CurrentTimerEntry<T> {
    sleep: Pin<Box<Sleep>>,
    value: T,
    id: u64,
}

impl<T> CurrentTimerEntry<T> {
    fn key(&self) -> Timeout {
        Timeout {
            deadline: self.sleep.deadline(),
            id: self.id,
        }
    }
}
