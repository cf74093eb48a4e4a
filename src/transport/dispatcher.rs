//! One-shot request dispatch with idempotent send and abort.
//!
//! [`RequestDispatcher`] wraps one [`ApiRequest`] in a shared future:
//! calling [`send`](RequestDispatcher::send) again while the request is in
//! flight joins the existing attempt, and calling it after completion
//! returns the recorded outcome without touching the network. The request
//! can be aborted at any point; every waiter then observes
//! [`Error::Aborted`].

use std::sync::Mutex;

use futures::future::{AbortHandle, Abortable, BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::http::{ApiRequest, AuthorizedClient};
use crate::error::{Error, Result};

type SharedSend<T> = Shared<BoxFuture<'static, Result<T>>>;

/// A single API request with memoized, abortable execution.
pub struct RequestDispatcher<T> {
    client: AuthorizedClient,
    request: ApiRequest,
    in_flight: Mutex<Option<SharedSend<T>>>,
    abort: Mutex<Option<AbortHandle>>,
}

impl<T> RequestDispatcher<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a dispatcher for one request.
    pub fn new(client: AuthorizedClient, request: ApiRequest) -> Self {
        Self {
            client,
            request,
            in_flight: Mutex::new(None),
            abort: Mutex::new(None),
        }
    }

    /// Send the request, or join/replay the existing attempt.
    pub async fn send(&self) -> Result<T> {
        let fut = {
            let mut slot = self.in_flight.lock().expect("dispatch slot poisoned");
            match slot.as_ref() {
                Some(fut) => {
                    debug!(url = %self.request.url, "Joining in-flight dispatch");
                    fut.clone()
                }
                None => {
                    let (handle, registration) = AbortHandle::new_pair();
                    let client = self.client.clone();
                    let request = self.request.clone();
                    let inner = async move { client.execute_json::<T>(&request).await }.boxed();
                    let fut: SharedSend<T> = Abortable::new(inner, registration)
                        .map(|outcome| match outcome {
                            Ok(result) => result,
                            Err(futures::future::Aborted) => Err(Error::Aborted),
                        })
                        .boxed()
                        .shared();
                    *slot = Some(fut.clone());
                    *self.abort.lock().expect("abort slot poisoned") = Some(handle);
                    fut
                }
            }
        };

        fut.await
    }

    /// Abort the in-flight request. A no-op before the first send and after
    /// completion.
    pub fn abort(&self) {
        if let Some(handle) = self.abort.lock().expect("abort slot poisoned").as_ref() {
            debug!(url = %self.request.url, "Aborting dispatch");
            handle.abort();
        }
    }

    /// Whether the request has been sent and has not yet completed.
    pub fn is_running(&self) -> bool {
        self.in_flight
            .lock()
            .expect("dispatch slot poisoned")
            .as_ref()
            .is_some_and(|fut| fut.peek().is_none())
    }

    /// The recorded outcome, if the request has completed.
    pub fn outcome(&self) -> Option<Result<T>> {
        self.in_flight
            .lock()
            .expect("dispatch slot poisoned")
            .as_ref()
            .and_then(|fut| fut.peek().cloned())
    }

    /// The request this dispatcher will send.
    pub fn request(&self) -> &ApiRequest {
        &self.request
    }
}

impl<T> std::fmt::Debug for RequestDispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("method", &self.request.method)
            .field("url", &self.request.url)
            .finish()
    }
}
