//! Upper bound on how long the transport call may run.

use std::future::Future;
use std::time::Duration;

/// The bound elapsed before the future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed;

/// Run `future` to completion unless `limit` passes first.
///
/// Natively this needs a tokio runtime with the time driver enabled.
#[cfg(not(target_arch = "wasm32"))]
pub async fn within<F: Future>(limit: Duration, future: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(limit, future).await.map_err(|_| Elapsed)
}

/// Run `future` to completion unless `limit` passes first.
#[cfg(target_arch = "wasm32")]
pub async fn within<F: Future>(limit: Duration, future: F) -> Result<F::Output, Elapsed> {
    use futures::future::{Either, select};

    let future = std::pin::pin!(future);
    let timer = std::pin::pin!(sleep(limit));
    match select(future, timer).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(_) => Err(Elapsed),
    }
}

#[cfg(target_arch = "wasm32")]
async fn sleep(limit: Duration) {
    let millis = i32::try_from(limit.as_millis()).unwrap_or(i32::MAX);
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        if let Some(window) = web_sys::window() {
            if let Err(e) =
                window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis)
            {
                log::warn!("Failed to arm request timer: {:?}", e);
            }
        }
    });
    if let Err(e) = wasm_bindgen_futures::JsFuture::from(promise).await {
        log::warn!("Request timer rejected: {:?}", e);
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_completes_in_time() {
        assert_eq!(within(Duration::from_secs(1), async { 7 }).await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapses() {
        let slow = tokio::time::sleep(Duration::from_secs(10));
        assert_eq!(within(Duration::from_secs(1), slow).await, Err(Elapsed));
    }
}
