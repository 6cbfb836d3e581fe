//! Periodic full saves.

use super::{CanvasStore, PersistenceError, PersistenceResult};
use crate::canvas::{Canvas, CanvasDraft};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default auto-save interval in seconds.
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

/// Fixed-interval save timer plus the store used when the live channel is
/// unavailable.
///
/// The timer does not care which path performs the save: the session calls
/// [`AutoSave::mark_saved`] after pushing a full update over the channel,
/// or [`AutoSave::persist`] to go through the store.
pub struct AutoSave<S: CanvasStore> {
    store: Arc<S>,
    interval: Duration,
    next_due: Option<Instant>,
    last_save: Option<Instant>,
    /// Whether there are local changes since the last save.
    dirty: bool,
    canvas_id: Option<String>,
}

impl<S: CanvasStore> AutoSave<S> {
    pub fn new(store: Arc<S>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            next_due: None,
            last_save: None,
            dirty: false,
            canvas_id: None,
        }
    }

    /// Arm the timer; the first tick fires one interval from `now`.
    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now + self.interval);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_canvas_id(&mut self, id: Option<String>) {
        self.canvas_id = id;
    }

    pub fn canvas_id(&self) -> Option<&str> {
        self.canvas_id.as_deref()
    }

    pub fn last_save(&self) -> Option<Instant> {
        self.last_save
    }

    /// Whether the periodic timer has fired.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.is_some_and(|due| now >= due)
    }

    /// Whether saving would be useful. A never-touched canvas that was
    /// never stored is not worth creating.
    pub fn should_save(&self) -> bool {
        self.dirty || self.canvas_id.is_some()
    }

    /// Restart the interval without saving.
    pub fn reschedule(&mut self, now: Instant) {
        if self.next_due.is_some() {
            self.next_due = Some(now + self.interval);
        }
    }

    /// Record a save performed elsewhere.
    pub fn mark_saved(&mut self, now: Instant) {
        self.last_save = Some(now);
        self.dirty = false;
        self.reschedule(now);
    }

    /// Save through the store: update when the canvas has an id, otherwise
    /// create it and remember the new id.
    pub async fn persist(&mut self, draft: &CanvasDraft, now: Instant) -> PersistenceResult<Canvas> {
        let canvas = match self.canvas_id.clone() {
            Some(id) => self.store.update_canvas(&id, draft).await?,
            None => {
                let canvas = self.store.create_canvas(draft).await?;
                log::info!("persistence: created canvas {:?}", canvas.id);
                self.canvas_id = canvas.id.clone();
                canvas
            }
        };
        self.mark_saved(now);
        Ok(canvas)
    }

    /// Fetch the stored canvas.
    pub async fn load(&mut self, now: Instant) -> PersistenceResult<Canvas> {
        let id = self
            .canvas_id
            .clone()
            .ok_or_else(|| PersistenceError::NotFound("canvas was never saved".to_string()))?;
        let canvas = self.store.get_canvas(&id).await?;
        self.mark_saved(now);
        Ok(canvas)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
