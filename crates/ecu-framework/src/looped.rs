//! # Periodic Runner
//!
//! [`looped`] turns a hook into a background activity: the callable runs over and
//! over on its own Tokio task until the returned [`LoopHandle`] is cancelled.
//!
//! - `interval = None`: back-to-back, yielding to the scheduler between calls.
//!   Cancellation is checked once per iteration.
//! - `interval = Some(d)`: wait `d`, call, wait `d`, call... The wait starts when
//!   the previous call returns. Cancellation interrupts the wait immediately.
//!
//! A call that is already running is never interrupted. A call that panics is
//! logged and the loop carries on with the next iteration. Actor loops wrap their
//! hooks in [`catch_panic`] first, so the panic also reaches the actor's error sink.
//!
//! ```rust
//! use ecu_framework::looped;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ticks = Arc::new(AtomicUsize::new(0));
//!     let counter = ticks.clone();
//!     let handle = looped("tick", Some(Duration::from_millis(5)), move || {
//!         let counter = counter.clone();
//!         async move {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!         }
//!     });
//!
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!     handle.cancel();
//!     handle.join().await.unwrap();
//!     assert!(ticks.load(Ordering::SeqCst) > 0);
//! }
//! ```

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Handle to a running loop. Dropping it does **not** stop the loop.
#[derive(Debug)]
pub struct LoopHandle {
    name: String,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl LoopHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signals the loop to stop before its next invocation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the loop task to exit. Call [`cancel`](Self::cancel) first.
    pub async fn join(self) -> Result<(), JoinError> {
        self.join.await
    }

    pub(crate) fn abort(&self) {
        self.join.abort();
    }

    pub(crate) fn join_handle_mut(&mut self) -> &mut JoinHandle<()> {
        &mut self.join
    }
}

/// Runs `f` repeatedly on a new task with its own cancellation token.
pub fn looped<F, Fut>(name: impl Into<String>, interval: Option<Duration>, f: F) -> LoopHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    looped_with(name, CancellationToken::new(), interval, f)
}

/// Like [`looped`], but stops when `token` is cancelled. Pass a child of an
/// actor-wide token so the actor can stop all of its loops at once.
pub fn looped_with<F, Fut>(
    name: impl Into<String>,
    token: CancellationToken,
    interval: Option<Duration>,
    mut f: F,
) -> LoopHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    let loop_name = name.clone();
    let loop_token = token.clone();

    let join = tokio::spawn(async move {
        debug!(hook = %loop_name, ?interval, "Loop started");
        let mut iterations: u64 = 0;

        loop {
            match interval {
                Some(period) => {
                    tokio::select! {
                        biased;
                        _ = loop_token.cancelled() => break,
                        _ = tokio::time::sleep(period) => {}
                    }
                }
                None => {
                    if loop_token.is_cancelled() {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            }

            let call = AssertUnwindSafe(async { f().await }).catch_unwind();
            if let Err(panic) = call.await {
                error!(hook = %loop_name, panic = panic_message(&*panic), "Hook panicked");
            }
            iterations = iterations.saturating_add(1);
        }

        debug!(hook = %loop_name, iterations, "Loop stopped");
    });

    LoopHandle { name, token, join }
}

/// Polls `fut` to completion, turning a panic into its message.
pub(crate) async fn catch_panic<Fut: Future>(fut: Fut) -> Result<Fut::Output, String> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|panic| panic_message(&*panic).to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}
