use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type StoryId = i64;
pub type NodeId = i64;

/// One generated narrative tree, scoped to a play-through session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    pub title: String,
    /// Opaque correlation key for the play-through that requested the story.
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// A labelled edge from a choice node to exactly one child in the same story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryOption {
    pub text: String,
    pub node_id: NodeId,
}

impl StoryOption {
    pub fn new(text: impl Into<String>, node_id: NodeId) -> Self {
        Self {
            text: text.into(),
            node_id,
        }
    }
}

/// One narrative beat: a choice point (has options) or an ending (has none).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryNode {
    pub id: NodeId,
    pub story_id: StoryId,
    pub content: String,
    pub is_root: bool,
    pub is_ending: bool,
    pub is_winning_ending: bool,
    /// Presentation order matters.
    pub options: Vec<StoryOption>,
}

/// The three flags a node is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFlags {
    pub is_root: bool,
    pub is_ending: bool,
    pub is_winning_ending: bool,
}

impl NodeFlags {
    pub fn root() -> Self {
        Self {
            is_root: true,
            ..Self::default()
        }
    }

    pub fn choice() -> Self {
        Self::default()
    }

    pub fn win() -> Self {
        Self {
            is_ending: true,
            is_winning_ending: true,
            ..Self::default()
        }
    }

    pub fn loss() -> Self {
        Self {
            is_ending: true,
            ..Self::default()
        }
    }
}
