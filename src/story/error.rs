use crate::story::model::{NodeId, StoryId};

/// Everything that can go wrong while building, loading or checking a story tree.
#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("failed to encode node options: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("node {node} does not belong to story {story}")]
    ForeignNode { node: NodeId, story: StoryId },

    #[error("a node flagged as a winning ending must also be an ending")]
    WinningChoice,

    #[error("ending node {0} cannot have options")]
    EndingWithOptions(NodeId),

    #[error("choice node {0} has no options")]
    ChoiceWithoutOptions(NodeId),

    #[error("node {child} already hangs under node {parent}")]
    SecondParent { child: NodeId, parent: NodeId },

    #[error("root node {0} cannot be the target of an option")]
    RootAsChild(NodeId),

    #[error("story {0} has no root node")]
    MissingRoot(StoryId),

    #[error("story {0} already has a root node")]
    DuplicateRoot(StoryId),

    #[error("{unreachable} node(s) of story {story} are unreachable from the root")]
    Unreachable { story: StoryId, unreachable: usize },

    #[error("malformed story document: {0}")]
    Malformed(String),
}
