//! One open canvas: the board, its sync channel and its save schedule.
//!
//! `CanvasSession` is a single-writer event loop. The host feeds it input
//! with [`CanvasSession::handle_input`] and calls [`CanvasSession::tick`]
//! regularly; every mutation of the board happens on that one thread.

use crate::board::{Board, BoardChange, InputEvent};
use crate::canvas::{Canvas, CanvasDraft, ShareEntry, UserRef};
use crate::config::SessionConfig;
use crate::persistence::{AutoSave, CanvasStore, PersistenceResult};
use crate::sync::{
    CursorPosition, Presence, RoomUser, ServerMessage, SyncChannel, SyncError, SyncEvent,
    Transport,
};
use kurbo::Point;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct CanvasSession<T: Transport, S: CanvasStore> {
    board: Board,
    channel: SyncChannel<T>,
    autosave: AutoSave<S>,
    presence: Presence,
    name: String,
    description: String,
    owner: Option<UserRef>,
    shared_with: Vec<ShareEntry>,
    is_public: bool,
    /// When the debounced name-update goes out.
    name_due: Option<Instant>,
    name_debounce: Duration,
    last_cursor: Option<Instant>,
    cursor_throttle: Duration,
    fell_back: bool,
    errors: Vec<SyncError>,
}

impl<T: Transport, S: CanvasStore> CanvasSession<T, S> {
    pub fn new(config: &SessionConfig, transport: T, store: Arc<S>) -> Result<Self, SyncError> {
        let channel = SyncChannel::new(config, transport)?;
        let mut autosave = AutoSave::new(store, config.autosave_interval());
        autosave.set_canvas_id(config.canvas_id.clone());
        Ok(Self {
            board: Board::new(config.board()),
            channel,
            autosave,
            presence: Presence::default(),
            name: String::new(),
            description: String::new(),
            owner: None,
            shared_with: Vec::new(),
            is_public: false,
            name_due: None,
            name_debounce: config.name_debounce(),
            last_cursor: None,
            cursor_throttle: config.cursor_throttle(),
            fell_back: false,
            errors: Vec::new(),
        })
    }

    /// Arm autosave and start connecting.
    pub fn start(&mut self, now: Instant) -> Result<(), SyncError> {
        self.autosave.start(now);
        self.channel.connect(now)
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Direct board access; edits made here go out on the next tick.
    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub fn channel(&self) -> &SyncChannel<T> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut SyncChannel<T> {
        &mut self.channel
    }

    pub fn autosave(&self) -> &AutoSave<S> {
        &self.autosave
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Whether the channel gave up and persistence is carrying the canvas.
    pub fn has_fallen_back(&self) -> bool {
        self.fell_back
    }

    /// Errors for the UI (authentication failures, rejected operations).
    pub fn take_errors(&mut self) -> Vec<SyncError> {
        std::mem::take(&mut self.errors)
    }

    /// The canvas as it stands locally.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            id: self.channel.canvas_id().map(str::to_string),
            name: self.name.clone(),
            description: self.description.clone(),
            owner: self.owner.clone(),
            shared_with: self.shared_with.clone(),
            elements: self.board.elements().to_vec(),
            is_public: self.is_public,
        }
    }

    /// Feed one input event to the board and propagate what it changed.
    pub fn handle_input(&mut self, event: InputEvent, now: Instant) -> bool {
        let pointer = match &event {
            InputEvent::PointerMove(point) => Some(*point),
            _ => None,
        };
        let changed = self.board.handle(event, now);
        self.flush_changes();
        if let Some(point) = pointer {
            self.send_cursor(point, now);
        }
        changed
    }

    /// Edit the canvas name. The name-update is debounced.
    pub fn rename(&mut self, name: impl Into<String>, now: Instant) {
        self.name = name.into();
        self.name_due = Some(now + self.name_debounce);
        self.autosave.mark_dirty();
    }

    fn flush_changes(&mut self) {
        for change in self.board.take_changes() {
            self.autosave.mark_dirty();
            match change {
                BoardChange::Created(element) => {
                    self.channel.create_element(&element);
                }
                BoardChange::Updated { id, patch } => {
                    self.channel.update_element(id, patch);
                }
                BoardChange::Deleted(id) => {
                    self.channel.delete_element(id);
                }
                BoardChange::Replaced => {
                    self.channel.update_canvas(self.board.elements(), &self.name);
                }
            }
        }
    }

    fn send_cursor(&mut self, point: Point, now: Instant) {
        if self
            .last_cursor
            .is_some_and(|last| now.saturating_duration_since(last) < self.cursor_throttle)
        {
            return;
        }
        let position = CursorPosition {
            x: point.x,
            y: point.y,
        };
        if self.channel.update_cursor(position) {
            self.last_cursor = Some(now);
        }
    }

    /// Drive the session: apply inbound traffic, send due name updates and
    /// run the autosave timer.
    pub async fn tick(&mut self, now: Instant) -> PersistenceResult<()> {
        for event in self.channel.poll(now) {
            self.apply_event(event);
        }
        self.flush_changes();

        if self.name_due.is_some_and(|due| now >= due) {
            self.name_due = None;
            if !self.channel.update_name(&self.name) {
                log::debug!("name update deferred to the next save");
            }
        }

        if self.autosave.is_due(now) {
            if self.autosave.should_save() {
                self.save(now).await?;
            } else {
                self.autosave.reschedule(now);
            }
        }
        Ok(())
    }

    /// Push the full canvas: over the channel when connected, otherwise
    /// through persistence.
    pub async fn save(&mut self, now: Instant) -> PersistenceResult<()> {
        if self.channel.update_canvas(self.board.elements(), &self.name) {
            self.autosave.mark_saved(now);
            return Ok(());
        }

        log::info!("sync channel unavailable, saving through persistence");
        let draft = CanvasDraft {
            name: self.name.clone(),
            elements: self.board.elements().to_vec(),
        };
        match self.autosave.persist(&draft, now).await {
            Ok(canvas) => {
                if self.channel.canvas_id().is_none() {
                    if let Some(id) = canvas.id {
                        self.channel.set_canvas_id(id);
                    }
                }
                Ok(())
            }
            Err(err) => {
                log::warn!("save failed: {err}");
                self.autosave.reschedule(now);
                Err(err)
            }
        }
    }

    /// Page-exit hook: flush everything pending and save.
    pub async fn on_exit(&mut self, now: Instant) -> PersistenceResult<()> {
        self.flush_changes();
        if self.name_due.take().is_some() {
            self.channel.update_name(&self.name);
        }
        self.save(now).await
    }

    /// Save one last time and tear the channel down.
    pub async fn close(&mut self, now: Instant) -> PersistenceResult<()> {
        let saved = self.on_exit(now).await;
        self.channel.disconnect();
        saved
    }

    /// Replace local state with the stored canvas, as a join would.
    pub async fn load_from_store(&mut self, now: Instant) -> PersistenceResult<()> {
        let mut canvas = self.autosave.load(now).await?;
        let dropped = canvas.dedupe_ids();
        if dropped > 0 {
            log::warn!("stored canvas had {dropped} duplicate element id(s)");
        }
        self.board.load_snapshot(canvas.elements);
        self.name = canvas.name;
        self.description = canvas.description;
        self.owner = canvas.owner;
        self.shared_with = canvas.shared_with;
        self.is_public = canvas.is_public;
        self.name_due = None;
        Ok(())
    }

    fn apply_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Connected => {
                self.fell_back = false;
            }
            SyncEvent::Disconnected { retrying } => {
                log::debug!("sync disconnected (retrying: {retrying})");
            }
            SyncEvent::GaveUp => {
                log::warn!("sync channel gave up; persistence takes over");
                self.fell_back = true;
            }
            SyncEvent::Message(message) => self.apply_remote(message),
            SyncEvent::Error(err) => self.errors.push(err),
        }
    }

    fn apply_remote(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Joined {
                name,
                description,
                owner,
                elements,
                shared_with,
                is_public,
            } => {
                log::info!("joined canvas with {} element(s)", elements.len());
                self.board.load_snapshot(elements);
                self.name = name;
                self.description = description;
                self.owner = owner;
                self.shared_with = shared_with;
                self.is_public = is_public;
                self.name_due = None;
            }
            ServerMessage::CanvasUpdated { elements, name, .. } => {
                self.board.replace_elements(elements);
                if !name.is_empty() {
                    self.name = name;
                }
            }
            ServerMessage::NameUpdated { name, .. } => {
                self.name = name;
            }
            ServerMessage::ElementCreated { element, .. } => {
                self.board.apply_remote_create(element);
            }
            ServerMessage::ElementUpdated {
                element_id,
                updates,
                ..
            } => {
                if let Err(err) = self.board.apply_remote_update(element_id, &updates) {
                    log::warn!("dropping element-updated: {err}");
                }
            }
            ServerMessage::ElementDeleted { element_id, .. } => {
                if let Err(err) = self.board.apply_remote_delete(element_id) {
                    log::warn!("dropping element-deleted: {err}");
                }
            }
            ServerMessage::CursorUpdated { user_id, position } => {
                self.presence.move_cursor(user_id, position);
            }
            ServerMessage::RoomUsers { users } => {
                self.presence.set_users(users);
            }
            ServerMessage::UserJoined { user_id, name } => {
                log::info!("user {user_id} joined");
                self.presence.user_joined(RoomUser { user_id, name });
            }
            ServerMessage::UserLeft { user_id } => {
                log::info!("user {user_id} left");
                self.presence.user_left(&user_id);
            }
            ServerMessage::Error { message, .. } => {
                log::warn!("relay error: {message}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::ToolKind;
    use crate::element::{ElementId, ElementStyle, ElementType, create_element};
    use crate::persistence::{MemoryStore, StoreCall, block_on};
    use crate::sync::TransportEvent;

    #[derive(Default)]
    struct ScriptedTransport {
        sent: Vec<String>,
        inbox: Vec<TransportEvent>,
    }

    impl Transport for ScriptedTransport {
        fn open(&mut self, _url: &str, _credential: &str) -> Result<(), SyncError> {
            Ok(())
        }

        fn send(&mut self, frame: String) -> Result<(), SyncError> {
            self.sent.push(frame);
            Ok(())
        }

        fn poll(&mut self) -> Vec<TransportEvent> {
            std::mem::take(&mut self.inbox)
        }

        fn close(&mut self) {}
    }

    type TestSession = CanvasSession<ScriptedTransport, MemoryStore>;

    fn session(store: Arc<MemoryStore>) -> TestSession {
        let config = SessionConfig {
            canvas_id: Some("c1".to_string()),
            originator: Some("me".to_string()),
            ..SessionConfig::default()
        };
        CanvasSession::new(&config, ScriptedTransport::default(), store).unwrap()
    }

    fn push(session: &mut TestSession, event: TransportEvent) {
        session.channel_mut().transport_mut().inbox.push(event);
    }

    fn inbound(session: &mut TestSession, json: &str) {
        push(session, TransportEvent::Message(json.to_string()));
    }

    fn sent_types(session: &mut TestSession) -> Vec<String> {
        std::mem::take(&mut session.channel_mut().transport_mut().sent)
            .iter()
            .map(|frame| {
                let value: serde_json::Value = serde_json::from_str(frame).unwrap();
                value["type"].as_str().unwrap_or_default().to_string()
            })
            .collect()
    }

    fn connected(now: Instant) -> TestSession {
        let mut session = session(Arc::new(MemoryStore::new()));
        session.start(now).unwrap();
        push(&mut session, TransportEvent::Opened);
        block_on(session.tick(now)).unwrap();
        assert_eq!(sent_types(&mut session), vec!["join"]);
        session
    }

    #[test]
    fn test_joined_snapshot_replaces_state() {
        let now = Instant::now();
        let mut session = connected(now);
        session.handle_input(InputEvent::ToolChanged(ToolKind::Rectangle), now);
        session.handle_input(InputEvent::PointerDown(Point::new(0.0, 0.0)), now);
        session.handle_input(InputEvent::PointerUp, now);
        assert_eq!(session.board().history().len(), 2);

        inbound(
            &mut session,
            r#"{"type":"joined","name":"Plans","elements":[
                {"id":1,"type":"line","x1":0,"y1":0,"x2":1,"y2":1},
                {"id":2,"type":"rectangle","x1":0,"y1":0,"x2":1,"y2":1},
                {"id":3,"type":"text","x1":0,"y1":0,"x2":0,"y2":0,"text":"hi"}
            ],"shared_with":[],"isPublic":false}"#,
        );
        block_on(session.tick(now)).unwrap();

        let board = session.board();
        assert_eq!(board.elements().len(), 3);
        assert!(board.selection().is_empty());
        assert_eq!(board.history().len(), 1);
        assert_eq!(session.name(), "Plans");
    }

    #[test]
    fn test_local_edits_are_sent() {
        let now = Instant::now();
        let mut session = connected(now);
        session.handle_input(InputEvent::ToolChanged(ToolKind::Line), now);
        session.handle_input(InputEvent::PointerDown(Point::new(0.0, 0.0)), now);
        session.handle_input(InputEvent::PointerMove(Point::new(5.0, 5.0)), now);
        session.handle_input(InputEvent::PointerUp, now);
        assert_eq!(
            sent_types(&mut session),
            vec!["element-create", "element-update", "cursor-update"]
        );

        session.handle_input(
            InputEvent::Key {
                key: "z".to_string(),
                modifiers: crate::board::Modifiers::CTRL,
            },
            now,
        );
        assert_eq!(sent_types(&mut session), vec!["canvas-update"]);
        assert!(session.board().elements().is_empty());
    }

    #[test]
    fn test_cursor_updates_are_throttled() {
        let now = Instant::now();
        let mut session = connected(now);
        session.handle_input(InputEvent::ToolChanged(ToolKind::None), now);
        session.handle_input(InputEvent::PointerMove(Point::new(1.0, 1.0)), now);
        session.handle_input(
            InputEvent::PointerMove(Point::new(2.0, 2.0)),
            now + Duration::from_millis(10),
        );
        session.handle_input(
            InputEvent::PointerMove(Point::new(3.0, 3.0)),
            now + Duration::from_millis(60),
        );
        assert_eq!(sent_types(&mut session), vec!["cursor-update", "cursor-update"]);
    }

    #[test]
    fn test_remote_edits_apply_without_history() {
        let now = Instant::now();
        let mut session = connected(now);
        inbound(
            &mut session,
            r#"{"type":"element-created","element":{"id":5,"type":"line","x1":0,"y1":0,"x2":1,"y2":1},"createdBy":"peer"}"#,
        );
        inbound(
            &mut session,
            r#"{"type":"element-updated","elementId":5,"updates":{"x2":9},"updatedBy":"peer"}"#,
        );
        inbound(
            &mut session,
            r#"{"type":"element-updated","elementId":77,"updates":{"x2":9},"updatedBy":"peer"}"#,
        );
        inbound(&mut session, r#"{"type":"name-updated","name":"Remote","updatedBy":"peer"}"#);
        block_on(session.tick(now)).unwrap();

        let board = session.board();
        assert_eq!(board.elements().len(), 1);
        assert_eq!(board.elements()[0].x2, 9.0);
        assert_eq!(board.history().len(), 1);
        assert_eq!(session.name(), "Remote");
        assert!(sent_types(&mut session).is_empty());
    }

    #[test]
    fn test_rename_is_debounced() {
        let now = Instant::now();
        let mut session = connected(now);
        session.rename("P", now);
        session.rename("Pl", now + Duration::from_millis(200));
        session.rename("Plans", now + Duration::from_millis(400));

        block_on(session.tick(now + Duration::from_millis(800))).unwrap();
        assert!(sent_types(&mut session).is_empty());

        block_on(session.tick(now + Duration::from_millis(900))).unwrap();
        let sent = std::mem::take(&mut session.channel_mut().transport_mut().sent);
        assert_eq!(sent.len(), 1);
        let frame: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(frame["type"], "name-update");
        assert_eq!(frame["name"], "Plans");
    }

    #[test]
    fn test_presence_tracking() {
        let now = Instant::now();
        let mut session = connected(now);
        inbound(
            &mut session,
            r#"{"type":"room-users","users":[{"userId":"a"},{"userId":"b","name":"Bo"}]}"#,
        );
        inbound(
            &mut session,
            r#"{"type":"cursor-updated","userId":"b","position":{"x":4,"y":5}}"#,
        );
        block_on(session.tick(now)).unwrap();
        assert_eq!(session.presence().users().len(), 2);
        assert_eq!(
            session.presence().cursor("b"),
            Some(CursorPosition { x: 4.0, y: 5.0 })
        );

        inbound(&mut session, r#"{"type":"user-left","userId":"b"}"#);
        block_on(session.tick(now)).unwrap();
        assert_eq!(session.presence().cursor("b"), None);
    }

    #[test]
    fn test_auth_errors_reach_the_ui() {
        let now = Instant::now();
        let mut session = connected(now);
        inbound(
            &mut session,
            r#"{"type":"error","message":"token expired","code":"unauthorized"}"#,
        );
        block_on(session.tick(now)).unwrap();
        assert_eq!(
            session.take_errors(),
            vec![SyncError::Authentication("token expired".to_string())]
        );
    }

    #[test]
    fn test_autosave_goes_through_channel_when_connected() {
        let now = Instant::now();
        let mut session = connected(now);
        block_on(session.tick(now + Duration::from_secs(30))).unwrap();
        assert_eq!(sent_types(&mut session), vec!["canvas-update"]);
        assert!(session.autosave().store().calls().is_empty());
    }

    #[test]
    fn test_falls_back_to_persistence_after_giving_up() {
        let mut now = Instant::now();
        let store = Arc::new(MemoryStore::new());
        store
            .insert(Canvas {
                id: Some("c1".to_string()),
                ..Canvas::new("Stored")
            })
            .unwrap();
        let mut session = session(Arc::clone(&store));
        session.start(now).unwrap();
        push(&mut session, TransportEvent::Opened);
        block_on(session.tick(now)).unwrap();

        session
            .board_mut()
            .apply_remote_create(create_element(
                ElementId(1),
                0.0,
                0.0,
                5.0,
                5.0,
                ElementType::Line,
                &ElementStyle::default(),
            ));
        push(&mut session, TransportEvent::Closed);
        block_on(session.tick(now)).unwrap();
        for _ in 0..5 {
            now += Duration::from_secs(1);
            push(&mut session, TransportEvent::Failed("refused".to_string()));
            block_on(session.tick(now)).unwrap();
        }
        assert!(session.has_fallen_back());
        assert!(!session.is_connected());
        assert!(store.calls().is_empty());

        now += Duration::from_secs(30);
        block_on(session.tick(now)).unwrap();
        assert_eq!(store.calls(), vec![StoreCall::Update("c1".to_string())]);
        let stored = block_on(store.get_canvas("c1")).unwrap();
        assert_eq!(stored.elements.len(), 1);
    }

    #[test]
    fn test_load_from_store_replaces_state() {
        let now = Instant::now();
        let store = Arc::new(MemoryStore::new());
        store
            .insert(Canvas {
                id: Some("c1".to_string()),
                elements: vec![create_element(
                    ElementId(9),
                    0.0,
                    0.0,
                    5.0,
                    5.0,
                    ElementType::Ellipse,
                    &ElementStyle::default(),
                )],
                ..Canvas::new("Stored")
            })
            .unwrap();
        let mut session = session(store);
        block_on(session.load_from_store(now)).unwrap();
        assert_eq!(session.name(), "Stored");
        assert_eq!(session.board().elements().len(), 1);
        assert_eq!(session.board().history().len(), 1);
    }

    #[test]
    fn test_exit_saves_unsaved_canvas_through_store() {
        let now = Instant::now();
        let store = Arc::new(MemoryStore::new());
        let config = SessionConfig::default();
        let mut session =
            CanvasSession::new(&config, ScriptedTransport::default(), Arc::clone(&store)).unwrap();
        session.rename("Draft", now);

        block_on(session.close(now)).unwrap();
        assert_eq!(store.calls(), vec![StoreCall::Create]);
        assert!(session.channel().canvas_id().is_some());
        assert!(session.canvas().id.is_some());
    }
}
