//! Branching stories: the data model, the transactional tree builder, the two
//! generators and the loaded-tree view.

pub mod builder;
pub mod error;
pub mod generator;
pub mod model;
pub mod response;
pub mod sample;
pub mod tree;

pub use generator::{StoryGenerator, DEFAULT_THEME};
pub use tree::StoryTree;
