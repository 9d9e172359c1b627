use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::storage::Store;
use crate::story::error::StoryError;
use crate::story::model::{NodeId, Story, StoryId, StoryNode};

/// A committed story loaded back with all of its nodes.
#[derive(Debug, Clone)]
pub struct StoryTree {
    pub story: Story,
    pub root_id: NodeId,
    nodes: BTreeMap<NodeId, StoryNode>,
}

/// Counts describing a checked tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeShape {
    pub nodes: usize,
    pub roots: usize,
    pub endings: usize,
    pub winning_endings: usize,
    pub options: usize,
    /// Most choices a player can make before reaching an ending.
    pub depth: usize,
}

/// JSON view of a whole story: the story row, its root and every node by id.
#[derive(Debug, Serialize)]
pub struct CompleteStory<'a> {
    pub id: StoryId,
    pub title: &'a str,
    pub session_id: &'a str,
    pub created_at: String,
    pub root_node: &'a StoryNode,
    pub all_nodes: &'a BTreeMap<NodeId, StoryNode>,
}

impl StoryTree {
    /// Load a story and its nodes. `Ok(None)` if no such story exists.
    pub fn load(store: &Store, story_id: StoryId) -> Result<Option<Self>, StoryError> {
        let Some(story) = store.story(story_id)? else {
            return Ok(None);
        };
        let nodes: BTreeMap<NodeId, StoryNode> = store
            .nodes(story_id)?
            .into_iter()
            .map(|n| (n.id, n))
            .collect();
        let root_id = nodes
            .values()
            .find(|n| n.is_root)
            .map(|n| n.id)
            .ok_or(StoryError::MissingRoot(story_id))?;

        Ok(Some(Self {
            story,
            root_id,
            nodes,
        }))
    }

    pub fn root(&self) -> &StoryNode {
        &self.nodes[&self.root_id]
    }

    pub fn node(&self, id: NodeId) -> Option<&StoryNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &StoryNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn complete(&self) -> CompleteStory<'_> {
        CompleteStory {
            id: self.story.id,
            title: &self.story.title,
            session_id: &self.story.session_id,
            created_at: self.story.created_at.to_rfc3339(),
            root_node: self.root(),
            all_nodes: &self.nodes,
        }
    }

    /// child -> parent, following options depth-first from the root.
    pub fn parent_map(&self) -> HashMap<NodeId, NodeId> {
        let mut parents = HashMap::new();
        let mut stack = vec![self.root_id];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            for option in &node.options {
                if parents.insert(option.node_id, id).is_none() {
                    stack.push(option.node_id);
                }
            }
        }
        parents
    }

    /// Node ids from the root down to `id`, or `None` if `id` is not reachable.
    pub fn path_to(&self, id: NodeId) -> Option<Vec<NodeId>> {
        if !self.nodes.contains_key(&id) {
            return None;
        }
        let parents = self.parent_map();
        let mut path = vec![id];
        let mut current = id;
        while current != self.root_id {
            current = *parents.get(&current)?;
            path.push(current);
        }
        path.reverse();
        Some(path)
    }

    /// The story as read along the path to `id`, one paragraph per node.
    pub fn final_text(&self, id: NodeId) -> Option<String> {
        let path = self.path_to(id)?;
        let text = path
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|n| n.content.as_str())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        Some(text)
    }

    /// Number of choice nodes on the longest path from the root to an ending.
    pub fn depth(&self) -> usize {
        self.longest_path(self.root_id, &mut HashSet::new())
    }

    fn longest_path(&self, node_id: NodeId, visiting: &mut HashSet<NodeId>) -> usize {
        let node = match self.nodes.get(&node_id) {
            Some(n) => n,
            None => return 0,
        };
        if node.is_ending || !visiting.insert(node_id) {
            return 0;
        }
        let max_child = node
            .options
            .iter()
            .map(|o| self.longest_path(o.node_id, visiting))
            .max()
            .unwrap_or(0);
        visiting.remove(&node_id);
        1 + max_child
    }

    /// Check every structural rule a committed story must satisfy.
    pub fn validate(&self) -> Result<TreeShape, StoryError> {
        let story_id = self.story.id;
        let mut roots = 0;
        let mut endings = 0;
        let mut winning_endings = 0;
        let mut options = 0;
        let mut parents: HashMap<NodeId, NodeId> = HashMap::new();

        for node in self.nodes() {
            if node.story_id != story_id {
                return Err(StoryError::ForeignNode {
                    node: node.id,
                    story: story_id,
                });
            }
            if node.is_root {
                roots += 1;
            }
            if node.is_winning_ending && !node.is_ending {
                return Err(StoryError::WinningChoice);
            }
            if node.is_ending {
                endings += 1;
                if node.is_winning_ending {
                    winning_endings += 1;
                }
                if !node.options.is_empty() {
                    return Err(StoryError::EndingWithOptions(node.id));
                }
            } else if node.options.is_empty() {
                return Err(StoryError::ChoiceWithoutOptions(node.id));
            }

            for option in &node.options {
                options += 1;
                let child = option.node_id;
                if !self.nodes.contains_key(&child) {
                    return Err(StoryError::ForeignNode {
                        node: child,
                        story: story_id,
                    });
                }
                if child == self.root_id {
                    return Err(StoryError::RootAsChild(child));
                }
                if let Some(&parent) = parents.get(&child) {
                    return Err(StoryError::SecondParent { child, parent });
                }
                parents.insert(child, node.id);
            }
        }

        if roots > 1 {
            return Err(StoryError::DuplicateRoot(story_id));
        }

        // One parent per node plus full reachability from the root makes it a tree.
        let reachable = self.parent_map().len() + 1;
        if reachable < self.len() {
            return Err(StoryError::Unreachable {
                story: story_id,
                unreachable: self.len() - reachable,
            });
        }

        Ok(TreeShape {
            nodes: self.len(),
            roots,
            endings,
            winning_endings,
            options,
            depth: self.depth(),
        })
    }
}
