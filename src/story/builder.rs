use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::Utc;
use log::{debug, info};
use rusqlite::Transaction;

use crate::storage::{self, Store};
use crate::story::error::StoryError;
use crate::story::model::{NodeFlags, NodeId, Story, StoryOption};

/// Per-node bookkeeping kept while the tree is still uncommitted.
#[derive(Debug)]
struct StagedNode {
    is_ending: bool,
    children: Option<Vec<NodeId>>,
}

/// Builds one story tree inside a single transaction.
///
/// Node ids are handed out as soon as rows are staged, so options can point at
/// children before anything is committed. Nothing becomes visible until
/// [`TreeBuilder::commit`] succeeds; dropping the builder rolls the whole
/// attempt back.
pub struct TreeBuilder<'conn> {
    tx: Transaction<'conn>,
    story: Story,
    root: Option<NodeId>,
    nodes: BTreeMap<NodeId, StagedNode>,
    /// child -> parent
    parents: HashMap<NodeId, NodeId>,
}

impl<'conn> TreeBuilder<'conn> {
    /// Open the transaction scope and stage the story row.
    pub fn create_story(
        store: &'conn mut Store,
        session_id: &str,
        title: &str,
    ) -> Result<Self, StoryError> {
        let tx = store.transaction()?;
        let created_at = Utc::now();
        let id = storage::insert_story(&tx, title, session_id, created_at)?;
        debug!("Staged story {id} ({title:?}) for session {session_id}");

        Ok(Self {
            tx,
            story: Story {
                id,
                title: title.to_string(),
                session_id: session_id.to_string(),
                created_at,
            },
            root: None,
            nodes: BTreeMap::new(),
            parents: HashMap::new(),
        })
    }

    /// Stage a node with an empty option list and return its id.
    pub fn create_node(&mut self, content: &str, flags: NodeFlags) -> Result<NodeId, StoryError> {
        if flags.is_winning_ending && !flags.is_ending {
            return Err(StoryError::WinningChoice);
        }
        if flags.is_root && self.root.is_some() {
            return Err(StoryError::DuplicateRoot(self.story.id));
        }

        let id = storage::insert_node(
            &self.tx,
            self.story.id,
            content,
            flags.is_root,
            flags.is_ending,
            flags.is_winning_ending,
        )?;

        if flags.is_root {
            self.root = Some(id);
        }
        self.nodes.insert(
            id,
            StagedNode {
                is_ending: flags.is_ending,
                children: None,
            },
        );
        debug!(
            "Staged node {id} (root={}, ending={}, winning={})",
            flags.is_root, flags.is_ending, flags.is_winning_ending
        );
        Ok(id)
    }

    /// Replace a node's option list in one assignment.
    ///
    /// Every child must be a non-root node of this story that is not already
    /// hanging under a different parent. Calling this again for the same node
    /// swaps the whole list.
    pub fn attach_options(
        &mut self,
        node_id: NodeId,
        options: Vec<StoryOption>,
    ) -> Result<(), StoryError> {
        let node = self.nodes.get(&node_id).ok_or(StoryError::ForeignNode {
            node: node_id,
            story: self.story.id,
        })?;

        if node.is_ending && !options.is_empty() {
            return Err(StoryError::EndingWithOptions(node_id));
        }
        if !node.is_ending && options.is_empty() {
            return Err(StoryError::ChoiceWithoutOptions(node_id));
        }

        for (i, option) in options.iter().enumerate() {
            let child = option.node_id;
            if !self.nodes.contains_key(&child) {
                return Err(StoryError::ForeignNode {
                    node: child,
                    story: self.story.id,
                });
            }
            if Some(child) == self.root {
                return Err(StoryError::RootAsChild(child));
            }
            match self.parents.get(&child) {
                Some(&parent) if parent != node_id => {
                    return Err(StoryError::SecondParent { child, parent });
                }
                _ => {}
            }
            if child == node_id || options[..i].iter().any(|o| o.node_id == child) {
                return Err(StoryError::SecondParent {
                    child,
                    parent: node_id,
                });
            }
        }

        storage::replace_options(&self.tx, node_id, &serde_json::to_string(&options)?)?;

        let children: Vec<NodeId> = options.iter().map(|o| o.node_id).collect();
        self.parents.retain(|_, parent| *parent != node_id);
        for &child in &children {
            self.parents.insert(child, node_id);
        }
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.children = Some(children);
        }
        Ok(())
    }

    /// Check the staged tree and make it durable as one unit.
    pub fn commit(self) -> Result<Story, StoryError> {
        let story_id = self.story.id;
        let root = self.root.ok_or(StoryError::MissingRoot(story_id))?;

        for (&id, node) in &self.nodes {
            if !node.is_ending && node.children.is_none() {
                return Err(StoryError::ChoiceWithoutOptions(id));
            }
        }

        let reached = self.reachable_from(root);
        if reached < self.nodes.len() {
            return Err(StoryError::Unreachable {
                story: story_id,
                unreachable: self.nodes.len() - reached,
            });
        }

        let node_count = self.nodes.len();
        self.tx.commit()?;
        info!(
            "Committed story {story_id} ({:?}) with {node_count} nodes",
            self.story.title
        );
        Ok(self.story)
    }

    fn reachable_from(&self, root: NodeId) -> usize {
        let mut seen = 0;
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            seen += 1;
            if let Some(children) = self.nodes.get(&id).and_then(|n| n.children.as_ref()) {
                queue.extend(children.iter().copied());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_node_tree_commits() {
        let mut store = Store::open_in_memory().unwrap();
        let mut builder = TreeBuilder::create_story(&mut store, "s-1", "Tiny").unwrap();
        let root = builder.create_node("start", NodeFlags::root()).unwrap();
        let end = builder.create_node("end", NodeFlags::win()).unwrap();
        builder
            .attach_options(root, vec![StoryOption::new("go", end)])
            .unwrap();
        let story = builder.commit().unwrap();

        assert_eq!(story.title, "Tiny");
        assert_eq!(store.story_count().unwrap(), 1);
        let nodes = store.nodes(story.id).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].options, vec![StoryOption::new("go", end)]);
    }

    #[test]
    fn test_dropped_builder_leaves_nothing() {
        let mut store = Store::open_in_memory().unwrap();
        {
            let mut builder = TreeBuilder::create_story(&mut store, "s-1", "Gone").unwrap();
            builder.create_node("start", NodeFlags::root()).unwrap();
            builder.create_node("end", NodeFlags::loss()).unwrap();
        }
        assert_eq!(store.story_count().unwrap(), 0);
        assert_eq!(store.node_count().unwrap(), 0);
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let mut store = Store::open_in_memory().unwrap();
        let mut builder = TreeBuilder::create_story(&mut store, "s-1", "Broken").unwrap();
        builder.create_node("start", NodeFlags::root()).unwrap();
        let err = builder.commit().unwrap_err();
        assert!(matches!(err, StoryError::ChoiceWithoutOptions(_)));
        assert_eq!(store.story_count().unwrap(), 0);
        assert_eq!(store.node_count().unwrap(), 0);
    }

    #[test]
    fn test_winning_flag_requires_ending() {
        let mut store = Store::open_in_memory().unwrap();
        let mut builder = TreeBuilder::create_story(&mut store, "s-1", "T").unwrap();
        let flags = NodeFlags {
            is_winning_ending: true,
            ..NodeFlags::choice()
        };
        assert!(matches!(
            builder.create_node("odd", flags),
            Err(StoryError::WinningChoice)
        ));
    }

    #[test]
    fn test_second_root_is_rejected() {
        let mut store = Store::open_in_memory().unwrap();
        let mut builder = TreeBuilder::create_story(&mut store, "s-1", "T").unwrap();
        builder.create_node("a", NodeFlags::root()).unwrap();
        assert!(matches!(
            builder.create_node("b", NodeFlags::root()),
            Err(StoryError::DuplicateRoot(_))
        ));
    }

    #[test]
    fn test_ending_cannot_take_options() {
        let mut store = Store::open_in_memory().unwrap();
        let mut builder = TreeBuilder::create_story(&mut store, "s-1", "T").unwrap();
        builder.create_node("root", NodeFlags::root()).unwrap();
        let end = builder.create_node("end", NodeFlags::loss()).unwrap();
        let other = builder.create_node("other", NodeFlags::loss()).unwrap();
        assert!(matches!(
            builder.attach_options(end, vec![StoryOption::new("x", other)]),
            Err(StoryError::EndingWithOptions(id)) if id == end
        ));
    }

    #[test]
    fn test_choice_needs_options() {
        let mut store = Store::open_in_memory().unwrap();
        let mut builder = TreeBuilder::create_story(&mut store, "s-1", "T").unwrap();
        let root = builder.create_node("root", NodeFlags::root()).unwrap();
        assert!(matches!(
            builder.attach_options(root, Vec::new()),
            Err(StoryError::ChoiceWithoutOptions(_))
        ));
    }

    #[test]
    fn test_child_from_another_story_is_rejected() {
        let mut store = Store::open_in_memory().unwrap();
        let foreign = {
            let mut builder = TreeBuilder::create_story(&mut store, "s-1", "A").unwrap();
            let root = builder.create_node("root", NodeFlags::root()).unwrap();
            let end = builder.create_node("end", NodeFlags::loss()).unwrap();
            builder
                .attach_options(root, vec![StoryOption::new("go", end)])
                .unwrap();
            builder.commit().unwrap();
            end
        };

        let mut builder = TreeBuilder::create_story(&mut store, "s-2", "B").unwrap();
        let root = builder.create_node("root", NodeFlags::root()).unwrap();
        assert!(matches!(
            builder.attach_options(root, vec![StoryOption::new("go", foreign)]),
            Err(StoryError::ForeignNode { node, .. }) if node == foreign
        ));
    }

    #[test]
    fn test_root_cannot_be_a_child() {
        let mut store = Store::open_in_memory().unwrap();
        let mut builder = TreeBuilder::create_story(&mut store, "s-1", "T").unwrap();
        let root = builder.create_node("root", NodeFlags::root()).unwrap();
        let mid = builder.create_node("mid", NodeFlags::choice()).unwrap();
        assert!(matches!(
            builder.attach_options(mid, vec![StoryOption::new("back", root)]),
            Err(StoryError::RootAsChild(_))
        ));
    }

    #[test]
    fn test_child_cannot_have_two_parents() {
        let mut store = Store::open_in_memory().unwrap();
        let mut builder = TreeBuilder::create_story(&mut store, "s-1", "T").unwrap();
        let root = builder.create_node("root", NodeFlags::root()).unwrap();
        let left = builder.create_node("left", NodeFlags::choice()).unwrap();
        let right = builder.create_node("right", NodeFlags::choice()).unwrap();
        let end = builder.create_node("end", NodeFlags::loss()).unwrap();
        builder
            .attach_options(left, vec![StoryOption::new("a", end)])
            .unwrap();
        assert!(matches!(
            builder.attach_options(right, vec![StoryOption::new("b", end)]),
            Err(StoryError::SecondParent { child, parent }) if child == end && parent == left
        ));
        assert!(matches!(
            builder.attach_options(
                root,
                vec![StoryOption::new("x", left), StoryOption::new("y", left)]
            ),
            Err(StoryError::SecondParent { .. })
        ));
    }

    #[test]
    fn test_reattaching_replaces_the_whole_list() {
        let mut store = Store::open_in_memory().unwrap();
        let mut builder = TreeBuilder::create_story(&mut store, "s-1", "T").unwrap();
        let root = builder.create_node("root", NodeFlags::root()).unwrap();
        let a = builder.create_node("a", NodeFlags::win()).unwrap();
        let b = builder.create_node("b", NodeFlags::loss()).unwrap();
        builder
            .attach_options(root, vec![StoryOption::new("a", a)])
            .unwrap();
        builder
            .attach_options(root, vec![StoryOption::new("b", b), StoryOption::new("a", a)])
            .unwrap();
        let story = builder.commit().unwrap();

        let nodes = store.nodes(story.id).unwrap();
        assert_eq!(
            nodes[0].options,
            vec![StoryOption::new("b", b), StoryOption::new("a", a)]
        );
    }

    #[test]
    fn test_unreachable_nodes_fail_commit() {
        let mut store = Store::open_in_memory().unwrap();
        let mut builder = TreeBuilder::create_story(&mut store, "s-1", "T").unwrap();
        let root = builder.create_node("root", NodeFlags::root()).unwrap();
        let end = builder.create_node("end", NodeFlags::win()).unwrap();
        builder.create_node("orphan", NodeFlags::loss()).unwrap();
        builder
            .attach_options(root, vec![StoryOption::new("go", end)])
            .unwrap();
        assert!(matches!(
            builder.commit(),
            Err(StoryError::Unreachable { unreachable: 1, .. })
        ));
        assert_eq!(store.node_count().unwrap(), 0);
    }
}
