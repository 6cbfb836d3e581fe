use super::protocol::{CursorPosition, RoomUser};
use std::collections::HashMap;

/// Who else is in the room and where their pointers are.
#[derive(Debug, Clone, Default)]
pub struct Presence {
    users: Vec<RoomUser>,
    cursors: HashMap<String, CursorPosition>,
}

impl Presence {
    pub fn users(&self) -> &[RoomUser] {
        &self.users
    }

    /// Replace the participant list, dropping cursors of users who left.
    pub fn set_users(&mut self, users: Vec<RoomUser>) {
        self.cursors
            .retain(|id, _| users.iter().any(|user| &user.user_id == id));
        self.users = users;
    }

    pub fn user_joined(&mut self, user: RoomUser) {
        if !self.users.iter().any(|u| u.user_id == user.user_id) {
            self.users.push(user);
        }
    }

    pub fn user_left(&mut self, user_id: &str) {
        self.users.retain(|user| user.user_id != user_id);
        self.cursors.remove(user_id);
    }

    pub fn move_cursor(&mut self, user_id: String, position: CursorPosition) {
        self.cursors.insert(user_id, position);
    }

    pub fn cursor(&self, user_id: &str) -> Option<CursorPosition> {
        self.cursors.get(user_id).copied()
    }

    pub fn cursors(&self) -> impl Iterator<Item = (&str, CursorPosition)> + '_ {
        self.cursors.iter().map(|(id, pos)| (id.as_str(), *pos))
    }
}
