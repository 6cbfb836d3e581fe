//! In-memory canvas store.

use super::{BoxFuture, CanvasStore, PersistenceError, PersistenceResult};
use crate::canvas::{Canvas, CanvasDraft, ShareEntry, UserRef};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// A store operation, as recorded by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get(String),
    Create,
    Update(String),
    Delete(String),
    List,
    Share(String),
    RemoveShare(String),
    UpdateShare(String),
}

/// In-memory store for tests and offline use. Every call is recorded.
#[derive(Default)]
pub struct MemoryStore {
    canvases: RwLock<HashMap<String, Canvas>>,
    users: RwLock<HashMap<String, UserRef>>,
    owner: Option<UserRef>,
    next_id: AtomicU64,
    calls: RwLock<Vec<StoreCall>>,
}

fn lock_error(e: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::Other(format!("lock error: {e}"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose created canvases belong to `owner`.
    pub fn with_owner(owner: UserRef) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }

    /// Make a user discoverable by email for sharing.
    pub fn register_user(&self, user: UserRef) -> PersistenceResult<()> {
        let email = user
            .email
            .clone()
            .ok_or_else(|| PersistenceError::Other("user has no email".to_string()))?;
        self.users.write().map_err(lock_error)?.insert(email, user);
        Ok(())
    }

    /// Seed a canvas directly, bypassing call recording.
    pub fn insert(&self, canvas: Canvas) -> PersistenceResult<String> {
        let id = match &canvas.id {
            Some(id) => id.clone(),
            None => self.mint_id(),
        };
        let canvas = Canvas {
            id: Some(id.clone()),
            ..canvas
        };
        self.canvases
            .write()
            .map_err(lock_error)?
            .insert(id.clone(), canvas);
        Ok(id)
    }

    /// Operations performed so far, oldest first.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls
            .read()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: StoreCall) -> PersistenceResult<()> {
        self.calls.write().map_err(lock_error)?.push(call);
        Ok(())
    }

    fn mint_id(&self) -> String {
        format!("canvas-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn modify(
        &self,
        id: &str,
        f: impl FnOnce(&mut Canvas) -> PersistenceResult<()>,
    ) -> PersistenceResult<Canvas> {
        let mut canvases = self.canvases.write().map_err(lock_error)?;
        let canvas = canvases
            .get_mut(id)
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;
        f(canvas)?;
        Ok(canvas.clone())
    }
}

impl CanvasStore for MemoryStore {
    fn get_canvas(&self, id: &str) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let id = id.to_string();
        Box::pin(async move {
            self.record(StoreCall::Get(id.clone()))?;
            let canvases = self.canvases.read().map_err(lock_error)?;
            canvases
                .get(&id)
                .cloned()
                .ok_or(PersistenceError::NotFound(id))
        })
    }

    fn create_canvas(&self, draft: &CanvasDraft) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let draft = draft.clone();
        Box::pin(async move {
            self.record(StoreCall::Create)?;
            let canvas = Canvas {
                id: Some(self.mint_id()),
                name: draft.name,
                elements: draft.elements,
                owner: self.owner.clone(),
                ..Canvas::default()
            };
            let id = canvas.id.clone().unwrap_or_default();
            self.canvases
                .write()
                .map_err(lock_error)?
                .insert(id, canvas.clone());
            Ok(canvas)
        })
    }

    fn update_canvas(
        &self,
        id: &str,
        draft: &CanvasDraft,
    ) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let id = id.to_string();
        let draft = draft.clone();
        Box::pin(async move {
            self.record(StoreCall::Update(id.clone()))?;
            self.modify(&id, |canvas| {
                canvas.name = draft.name;
                canvas.elements = draft.elements;
                Ok(())
            })
        })
    }

    fn delete_canvas(&self, id: &str) -> BoxFuture<'_, PersistenceResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.record(StoreCall::Delete(id.clone()))?;
            self.canvases
                .write()
                .map_err(lock_error)?
                .remove(&id)
                .map(|_| ())
                .ok_or(PersistenceError::NotFound(id))
        })
    }

    fn list_canvases(&self) -> BoxFuture<'_, PersistenceResult<Vec<Canvas>>> {
        Box::pin(async move {
            self.record(StoreCall::List)?;
            let canvases = self.canvases.read().map_err(lock_error)?;
            let mut list: Vec<Canvas> = canvases.values().cloned().collect();
            list.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(list)
        })
    }

    fn share_canvas(
        &self,
        id: &str,
        email: &str,
        can_edit: bool,
    ) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let id = id.to_string();
        let email = email.to_string();
        Box::pin(async move {
            self.record(StoreCall::Share(id.clone()))?;
            let user = self
                .users
                .read()
                .map_err(lock_error)?
                .get(&email)
                .cloned()
                .ok_or_else(|| PersistenceError::NotFound(email.clone()))?;
            self.modify(&id, |canvas| {
                match canvas.shared_with.iter_mut().find(|s| s.user.id == user.id) {
                    Some(share) => share.can_edit = can_edit,
                    None => canvas.shared_with.push(ShareEntry { user, can_edit }),
                }
                Ok(())
            })
        })
    }

    fn remove_share(&self, id: &str, user_id: &str) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.record(StoreCall::RemoveShare(id.clone()))?;
            self.modify(&id, |canvas| {
                let before = canvas.shared_with.len();
                canvas.shared_with.retain(|share| share.user.id != user_id);
                if canvas.shared_with.len() == before {
                    return Err(PersistenceError::NotFound(user_id.clone()));
                }
                Ok(())
            })
        })
    }

    fn update_share_permission(
        &self,
        id: &str,
        user_id: &str,
        can_edit: bool,
    ) -> BoxFuture<'_, PersistenceResult<Canvas>> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.record(StoreCall::UpdateShare(id.clone()))?;
            self.modify(&id, |canvas| {
                let share = canvas
                    .shared_with
                    .iter_mut()
                    .find(|share| share.user.id == user_id)
                    .ok_or_else(|| PersistenceError::NotFound(user_id.clone()))?;
                share.can_edit = can_edit;
                Ok(())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::block_on;

    fn draft(name: &str) -> CanvasDraft {
        CanvasDraft {
            name: name.to_string(),
            elements: Vec::new(),
        }
    }

    fn user(id: &str, email: &str) -> UserRef {
        UserRef {
            id: id.to_string(),
            name: id.to_string(),
            email: Some(email.to_string()),
        }
    }

    #[test]
    fn test_create_update_get() {
        let store = MemoryStore::new();
        let created = block_on(store.create_canvas(&draft("one"))).unwrap();
        let id = created.id.clone().unwrap();

        block_on(store.update_canvas(&id, &draft("renamed"))).unwrap();
        let loaded = block_on(store.get_canvas(&id)).unwrap();
        assert_eq!(loaded.name, "renamed");

        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Create,
                StoreCall::Update(id.clone()),
                StoreCall::Get(id)
            ]
        );
    }

    #[test]
    fn test_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            block_on(store.get_canvas("missing")),
            Err(PersistenceError::NotFound(_))
        ));
        assert!(matches!(
            block_on(store.update_canvas("missing", &draft("x"))),
            Err(PersistenceError::NotFound(_))
        ));
        assert!(block_on(store.delete_canvas("missing")).is_err());
    }

    #[test]
    fn test_list_and_delete() {
        let store = MemoryStore::new();
        block_on(store.create_canvas(&draft("a"))).unwrap();
        let b = block_on(store.create_canvas(&draft("b"))).unwrap();
        assert_eq!(block_on(store.list_canvases()).unwrap().len(), 2);

        block_on(store.delete_canvas(b.id.as_deref().unwrap())).unwrap();
        let list = block_on(store.list_canvases()).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "a");
    }

    #[test]
    fn test_sharing() {
        let store = MemoryStore::with_owner(user("owner", "o@example.com"));
        store.register_user(user("bo", "bo@example.com")).unwrap();
        let id = store.insert(Canvas::new("shared")).unwrap();

        let canvas = block_on(store.share_canvas(&id, "bo@example.com", false)).unwrap();
        assert!(!canvas.can_edit("bo"));

        let canvas = block_on(store.update_share_permission(&id, "bo", true)).unwrap();
        assert!(canvas.can_edit("bo"));

        let canvas = block_on(store.remove_share(&id, "bo")).unwrap();
        assert!(canvas.shared_with.is_empty());
        assert!(block_on(store.remove_share(&id, "bo")).is_err());
        assert!(matches!(
            block_on(store.share_canvas(&id, "nobody@example.com", true)),
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[test]
    fn test_created_canvas_has_owner() {
        let store = MemoryStore::with_owner(user("owner", "o@example.com"));
        let canvas = block_on(store.create_canvas(&draft("mine"))).unwrap();
        assert!(canvas.can_edit("owner"));
    }
}
