//! Two sessions editing one canvas through an in-process relay.

use kurbo::Point;
use sketchroom_core::board::{InputEvent, Modifiers, ToolKind};
use sketchroom_core::element::Element;
use sketchroom_core::persistence::MemoryStore;
use sketchroom_core::sync::{
    ClientMessage, OutboundFrame, ServerMessage, SyncError, Transport, TransportEvent,
};
use sketchroom_core::{CanvasSession, SessionConfig};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Relay stand-in: keeps the room state and delivers every broadcast to all
/// open clients, the sender included.
#[derive(Default)]
struct Hub {
    name: String,
    elements: Vec<Element>,
    inboxes: Vec<Vec<TransportEvent>>,
    open: Vec<bool>,
}

impl Hub {
    fn broadcast(&mut self, message: &ServerMessage, skip: Option<usize>) {
        let json = serde_json::to_string(message).unwrap();
        for (slot, inbox) in self.inboxes.iter_mut().enumerate() {
            if self.open[slot] && Some(slot) != skip {
                inbox.push(TransportEvent::Message(json.clone()));
            }
        }
    }

    fn receive(&mut self, slot: usize, frame: &str) {
        let frame: OutboundFrame = serde_json::from_str(frame).unwrap();
        let by = frame.originator;
        let message = match frame.message {
            ClientMessage::Join { .. } => {
                let joined = ServerMessage::Joined {
                    name: self.name.clone(),
                    description: String::new(),
                    owner: None,
                    elements: self.elements.clone(),
                    shared_with: Vec::new(),
                    is_public: false,
                };
                let json = serde_json::to_string(&joined).unwrap();
                self.inboxes[slot].push(TransportEvent::Message(json));
                return;
            }
            ClientMessage::CanvasUpdate { elements, name, .. } => {
                self.elements = elements.clone();
                self.name = name.clone();
                ServerMessage::CanvasUpdated {
                    elements,
                    name,
                    updated_by: by,
                }
            }
            ClientMessage::NameUpdate { name, .. } => {
                self.name = name.clone();
                ServerMessage::NameUpdated {
                    name,
                    updated_by: by,
                }
            }
            ClientMessage::ElementCreate { element, .. } => {
                self.elements.push(element.clone());
                ServerMessage::ElementCreated {
                    element,
                    created_by: by,
                }
            }
            ClientMessage::ElementUpdate {
                element_id,
                updates,
                ..
            } => {
                if let Some(element) = self.elements.iter_mut().find(|e| e.id == element_id) {
                    updates.apply(element).unwrap();
                }
                ServerMessage::ElementUpdated {
                    element_id,
                    updates,
                    updated_by: by,
                }
            }
            ClientMessage::ElementDelete { element_id, .. } => {
                self.elements.retain(|e| e.id != element_id);
                ServerMessage::ElementDeleted {
                    element_id,
                    deleted_by: by,
                }
            }
            ClientMessage::CursorUpdate { position, .. } => {
                let moved = ServerMessage::CursorUpdated {
                    user_id: format!("user-{slot}"),
                    position,
                };
                self.broadcast(&moved, Some(slot));
                return;
            }
        };
        self.broadcast(&message, None);
    }
}

struct LoopbackTransport {
    hub: Rc<RefCell<Hub>>,
    slot: usize,
}

impl LoopbackTransport {
    fn attach(hub: &Rc<RefCell<Hub>>) -> Self {
        let mut state = hub.borrow_mut();
        state.inboxes.push(Vec::new());
        state.open.push(false);
        Self {
            hub: Rc::clone(hub),
            slot: state.inboxes.len() - 1,
        }
    }
}

impl Transport for LoopbackTransport {
    fn open(&mut self, _url: &str, _credential: &str) -> Result<(), SyncError> {
        let mut hub = self.hub.borrow_mut();
        hub.open[self.slot] = true;
        hub.inboxes[self.slot].push(TransportEvent::Opened);
        Ok(())
    }

    fn send(&mut self, frame: String) -> Result<(), SyncError> {
        self.hub.borrow_mut().receive(self.slot, &frame);
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.hub.borrow_mut().inboxes[self.slot])
    }

    fn close(&mut self) {
        self.hub.borrow_mut().open[self.slot] = false;
    }
}

type Session = CanvasSession<LoopbackTransport, MemoryStore>;

fn block_on<F: Future>(f: F) -> F::Output {
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

fn join(hub: &Rc<RefCell<Hub>>, originator: &str, now: Instant) -> Session {
    let config = SessionConfig {
        canvas_id: Some("room".to_string()),
        originator: Some(originator.to_string()),
        ..SessionConfig::default()
    };
    let transport = LoopbackTransport::attach(hub);
    let mut session = CanvasSession::new(&config, transport, Arc::new(MemoryStore::new())).unwrap();
    session.start(now).unwrap();
    // Open, then receive the joined snapshot.
    block_on(session.tick(now)).unwrap();
    block_on(session.tick(now)).unwrap();
    assert!(session.is_connected());
    session
}

fn draw(session: &mut Session, tool: ToolKind, from: Point, to: Point, now: Instant) {
    session.handle_input(InputEvent::ToolChanged(tool), now);
    session.handle_input(InputEvent::PointerDown(from), now);
    session.handle_input(InputEvent::PointerMove(to), now);
    session.handle_input(InputEvent::PointerUp, now);
}

fn sorted(session: &Session) -> Vec<Element> {
    let mut elements = session.board().elements().to_vec();
    elements.sort_by_key(|element| element.id);
    elements
}

#[test]
fn test_sessions_converge() {
    let now = Instant::now();
    let hub = Rc::new(RefCell::new(Hub::default()));
    let mut alice = join(&hub, "alice-tab", now);
    let mut bob = join(&hub, "bob-tab", now);

    draw(
        &mut alice,
        ToolKind::Rectangle,
        Point::new(10.0, 10.0),
        Point::new(50.0, 50.0),
        now,
    );
    block_on(bob.tick(now)).unwrap();
    block_on(alice.tick(now)).unwrap();

    draw(
        &mut bob,
        ToolKind::Line,
        Point::new(0.0, 0.0),
        Point::new(30.0, 5.0),
        now,
    );
    block_on(alice.tick(now)).unwrap();
    block_on(bob.tick(now)).unwrap();

    assert_eq!(alice.board().elements().len(), 2);
    assert_eq!(sorted(&alice), sorted(&bob));

    // Remote edits do not enter history: each side can only undo its own.
    assert_eq!(alice.board().history().len(), 2);
    assert_eq!(bob.board().history().len(), 2);

    // Undo travels as a full-canvas update.
    alice.handle_input(
        InputEvent::Key {
            key: "z".to_string(),
            modifiers: Modifiers::CTRL,
        },
        now,
    );
    block_on(bob.tick(now)).unwrap();
    block_on(alice.tick(now)).unwrap();
    assert!(alice.board().elements().is_empty());
    assert!(bob.board().elements().is_empty());
}

#[test]
fn test_late_joiner_gets_snapshot() {
    let now = Instant::now();
    let hub = Rc::new(RefCell::new(Hub::default()));
    let mut alice = join(&hub, "alice-tab", now);
    draw(
        &mut alice,
        ToolKind::Ellipse,
        Point::new(0.0, 0.0),
        Point::new(20.0, 20.0),
        now,
    );

    let bob = join(&hub, "bob-tab", now);
    assert_eq!(sorted(&bob), sorted(&alice));
    assert_eq!(bob.board().history().len(), 1);
}

#[test]
fn test_own_echo_does_not_clobber_newer_local_state() {
    let t0 = Instant::now();
    let hub = Rc::new(RefCell::new(Hub::default()));
    let mut alice = join(&hub, "alice-tab", t0);
    let mut bob = join(&hub, "bob-tab", t0);

    alice.rename("One", t0);
    block_on(alice.tick(t0 + Duration::from_millis(600))).unwrap();

    // Typed again before the echo of "One" came back.
    alice.rename("Two", t0 + Duration::from_millis(700));
    block_on(alice.tick(t0 + Duration::from_millis(700))).unwrap();
    assert_eq!(alice.name(), "Two");

    block_on(bob.tick(t0 + Duration::from_millis(700))).unwrap();
    assert_eq!(bob.name(), "One");

    block_on(alice.tick(t0 + Duration::from_millis(1300))).unwrap();
    block_on(bob.tick(t0 + Duration::from_millis(1300))).unwrap();
    assert_eq!(alice.name(), "Two");
    assert_eq!(bob.name(), "Two");
}

#[test]
fn test_cursor_reaches_peer() {
    let now = Instant::now();
    let hub = Rc::new(RefCell::new(Hub::default()));
    let mut alice = join(&hub, "alice-tab", now);
    let mut bob = join(&hub, "bob-tab", now);

    alice.handle_input(InputEvent::PointerMove(Point::new(7.0, 8.0)), now);
    block_on(bob.tick(now)).unwrap();
    let cursors: Vec<_> = bob.presence().cursors().collect();
    assert_eq!(cursors.len(), 1);
    assert_eq!(cursors[0].1.x, 7.0);
    assert!(alice.presence().cursors().next().is_none());
}
