//! Canvas records as stored by the persistence service and sent on join.

use crate::element::{Element, ElementId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A user as referenced from a canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// One collaborator a canvas is shared with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareEntry {
    pub user: UserRef,
    #[serde(rename = "canEdit", default)]
    pub can_edit: bool,
}

/// A named, shareable collection of elements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Canvas {
    #[serde(alias = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserRef>,
    #[serde(default, rename = "shared_with")]
    pub shared_with: Vec<ShareEntry>,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub is_public: bool,
}

/// The fields sent when creating or saving a canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasDraft {
    pub name: String,
    pub elements: Vec<Element>,
}

impl Canvas {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|element| element.id == id)
    }

    /// Drop all but the first element of each id, returning how many went.
    pub fn dedupe_ids(&mut self) -> usize {
        let before = self.elements.len();
        let mut seen = HashSet::with_capacity(before);
        self.elements.retain(|element| seen.insert(element.id));
        before - self.elements.len()
    }

    /// Whether `user_id` may modify this canvas.
    pub fn can_edit(&self, user_id: &str) -> bool {
        self.owner.as_ref().is_some_and(|owner| owner.id == user_id)
            || self
                .shared_with
                .iter()
                .any(|share| share.user.id == user_id && share.can_edit)
    }

    pub fn draft(&self) -> CanvasDraft {
        CanvasDraft {
            name: self.name.clone(),
            elements: self.elements.clone(),
        }
    }
}
