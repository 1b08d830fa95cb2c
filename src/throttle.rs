//! The thin adapter that turns an arbitrary single-argument function into a
//! throttled version of itself.
//!
//! The limiter core only knows about zero-argument jobs and completion
//! signals; this module owns all of the argument and result typing. A call's
//! argument and return value are carried across the limiter through shared
//! mutable storage captured by the job closure.

use std::sync::{Arc, Mutex};

use crate::{Connection, ConnectionRateLimiter, Registry, ThrottleError};

/// A function wrapped for throttled calling. Built by [`throttle`].
///
/// Cloning is cheap and shares the underlying limiter, so one `Throttled`
/// can be fanned out across many concurrent callers.
pub struct Throttled<F> {
    limiter: Arc<ConnectionRateLimiter>,
    niceness: i32,
    func: Arc<F>,
}

/// Wrap `func` so that every call is admitted by the rate limiter for
/// `connection`'s key, at `connection`'s niceness.
///
/// The limiter is resolved (or created) once, up front; calls after the
/// first pay no registry lookup.
pub fn throttle<F>(registry: &Registry, connection: &Connection, func: F) -> Throttled<F> {
    Throttled {
        limiter: registry.find_or_create(connection),
        niceness: connection.niceness,
        func: Arc::new(func),
    }
}

impl<F> Throttled<F> {
    /// Call the wrapped function with `arg`, suspending until the limiter
    /// has admitted the call and the function has run.
    ///
    /// The function's own return value, error or not, comes back untouched.
    /// `Err(ThrottleError::LimiterStopped)` means the call never ran because
    /// the limiter was stopped before it could be dispatched.
    pub async fn call<T, R>(&self, arg: T) -> Result<R, ThrottleError>
    where
        F: Fn(T) -> R + Send + Sync + 'static,
        T: Send + 'static,
        R: Send + 'static,
    {
        let func = Arc::clone(&self.func);
        let slot = Arc::new(Mutex::new(None));
        let out = Arc::clone(&slot);

        let done = self
            .limiter
            .submit(
                move || {
                    let value = func(arg);
                    *out.lock().expect("result slot lock poisoned") = Some(value);
                },
                self.niceness,
            )
            .await?;

        // A receive error means the request was dropped undispatched when
        // the limiter stopped.
        done.await.map_err(|_| ThrottleError::LimiterStopped)?;

        let value = slot.lock().expect("result slot lock poisoned").take();
        Ok(value.expect("completion signaled before the result was stored"))
    }

    /// Niceness attached to calls made through this wrapper.
    pub fn niceness(&self) -> i32 {
        self.niceness
    }
}

impl<F> Clone for Throttled<F> {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            niceness: self.niceness,
            func: Arc::clone(&self.func),
        }
    }
}
