//! Persistence collaborator: durable canvas storage behind a REST service.

mod autosave;
mod http;
mod memory;

pub use autosave::{AutoSave, DEFAULT_AUTOSAVE_INTERVAL_SECS};
pub use http::HttpStore;
pub use memory::{MemoryStore, StoreCall};

use crate::canvas::{Canvas, CanvasDraft};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PersistenceError {
    #[error("canvas not found: {0}")]
    NotFound(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("HTTP error (status {status:?}): {message}")]
    Http { status: Option<u16>, message: String },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("persistence error: {0}")]
    Other(String),
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Boxed future for async operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Canvas CRUD and sharing, authenticated with the session's credential.
pub trait CanvasStore: Send + Sync {
    fn get_canvas(&self, id: &str) -> BoxFuture<'_, PersistenceResult<Canvas>>;

    fn create_canvas(&self, draft: &CanvasDraft) -> BoxFuture<'_, PersistenceResult<Canvas>>;

    fn update_canvas(
        &self,
        id: &str,
        draft: &CanvasDraft,
    ) -> BoxFuture<'_, PersistenceResult<Canvas>>;

    fn delete_canvas(&self, id: &str) -> BoxFuture<'_, PersistenceResult<()>>;

    fn list_canvases(&self) -> BoxFuture<'_, PersistenceResult<Vec<Canvas>>>;

    /// Share with the user registered under `email`.
    fn share_canvas(
        &self,
        id: &str,
        email: &str,
        can_edit: bool,
    ) -> BoxFuture<'_, PersistenceResult<Canvas>>;

    fn remove_share(&self, id: &str, user_id: &str) -> BoxFuture<'_, PersistenceResult<Canvas>>;

    fn update_share_permission(
        &self,
        id: &str,
        user_id: &str,
        can_edit: bool,
    ) -> BoxFuture<'_, PersistenceResult<Canvas>>;
}

/// Minimal executor for driving store futures in tests.
#[cfg(test)]
pub(crate) fn block_on<F: Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
