// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A shared, cloneable flag a `QUIT` request trips to unwind the
//! connection-accept loop around [`crate::dispatcher::Dispatcher`].

use std::sync::{atomic::AtomicBool, Arc};

#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Trips the flag, as `do1.c`'s `QUIT` handler does to its accept loop.
    pub fn send(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Release);
    }

    /// `true` once [`StopSignal::send`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn send_trips_every_clone() {
        let signal = StopSignal::default();
        let clone = signal.clone();
        assert!(!clone.is_stopped());

        signal.send();
        assert!(clone.is_stopped());
    }
}
