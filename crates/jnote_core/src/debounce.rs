//! Re-armable single-shot timer.
//!
//! A [`DebounceTimer`] owns one background thread that sleeps until a deadline
//! and then runs its callback. Re-arming moves the deadline forward, so a burst
//! of `arm()` calls results in a single callback once the burst has been quiet
//! for the configured delay.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::Result;

#[derive(Debug, Default)]
struct TimerState {
    deadline: Option<Instant>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<TimerState>,
    cond: Condvar,
}

/// A timer that fires its callback once per quiet period.
pub struct DebounceTimer {
    delay: Duration,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceTimer {
    /// Spawn the timer thread. The timer starts disarmed.
    pub fn new<F>(delay: Duration, on_fire: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("jnote-debounce".to_string())
            .spawn(move || run(&thread_shared, on_fire))?;

        Ok(Self {
            delay,
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Configured quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule the callback `delay` from now, replacing any pending deadline.
    pub fn arm(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if state.shutdown {
            return;
        }
        state.deadline = Some(Instant::now() + self.delay);
        self.shared.cond.notify_all();
    }

    /// Drop the pending deadline, if any.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.deadline = None;
        self.shared.cond.notify_all();
    }

    /// Whether a deadline is pending.
    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().unwrap().deadline.is_some()
    }

    /// Stop the thread without firing a pending deadline, and wait for it to exit.
    ///
    /// Safe to call more than once. When called from the timer thread itself
    /// (the callback dropped the last owner) the thread is detached instead.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
            state.deadline = None;
            self.shared.cond.notify_all();
        }
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::warn!("Debounce thread panicked");
            }
        }
    }
}

fn run<F: Fn()>(shared: &Shared, on_fire: F) {
    let mut state = shared.state.lock().unwrap();
    loop {
        if state.shutdown {
            return;
        }
        match state.deadline {
            None => {
                state = shared.cond.wait(state).unwrap();
            }
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    state.deadline = None;
                    drop(state);
                    on_fire();
                    state = shared.state.lock().unwrap();
                } else {
                    state = shared.cond.wait_timeout(state, deadline - now).unwrap().0;
                }
            }
        }
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DebounceTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceTimer")
            .field("delay", &self.delay)
            .field("armed", &self.is_armed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_timer(delay_ms: u64) -> (DebounceTimer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let timer = DebounceTimer::new(Duration::from_millis(delay_ms), move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (timer, fired)
    }

    #[test]
    fn test_fires_once_after_delay() {
        let (timer, fired) = counting_timer(30);
        timer.arm();
        assert!(timer.is_armed());
        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[test]
    fn test_rearming_coalesces() {
        let (timer, fired) = counting_timer(80);
        for _ in 0..5 {
            timer.arm();
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(Duration::from_millis(400));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_prevents_fire() {
        let (timer, fired) = counting_timer(40);
        timer.arm();
        timer.cancel();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shutdown_drops_pending_deadline() {
        let (timer, fired) = counting_timer(40);
        timer.arm();
        timer.shutdown();
        timer.shutdown();
        timer.arm();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
