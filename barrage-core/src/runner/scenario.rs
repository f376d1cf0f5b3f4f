use std::future::Future;

use super::vu::VuContext;

/// One unit of work, run back to back by every active VU.
///
/// Closures taking an owned [`VuContext`] implement this directly:
///
/// ```ignore
/// let scenario = |vu: VuContext| async move {
///     let _ = vu.http(HttpRequest::get("http://localhost:8080/")).await;
/// };
/// ```
pub trait Scenario: Send + Sync + 'static {
    fn iteration(&self, vu: &VuContext) -> impl Future<Output = ()> + Send;
}

impl<F, Fut> Scenario for F
where
    F: Fn(VuContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn iteration(&self, vu: &VuContext) -> impl Future<Output = ()> + Send {
        self(vu.clone())
    }
}
