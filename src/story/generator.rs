use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::config::Settings;
use crate::llm::{OpenAiClient, StoryModel};
use crate::prompts::STORY_PROMPT;
use crate::storage::Store;
use crate::story::builder::TreeBuilder;
use crate::story::error::StoryError;
use crate::story::model::{NodeFlags, NodeId, Story, StoryOption};
use crate::story::response::DraftNode;
use crate::story::sample::generate_sample;

pub const DEFAULT_THEME: &str = "fantasy";

/// Result of one attempt on the model-backed path. The dispatcher decides
/// what to do with a failure.
#[derive(Debug)]
pub enum LlmOutcome {
    Succeeded(Story),
    Failed(anyhow::Error),
}

/// Chooses between the story model and the built-in story for each request.
pub struct StoryGenerator {
    model: Option<Box<dyn StoryModel>>,
}

impl StoryGenerator {
    /// Use the configured story model if there is a credential, otherwise the
    /// built-in story only.
    pub fn from_settings(settings: &Settings) -> Self {
        if !settings.has_llm() {
            info!("No story model credential configured; using the built-in story");
            return Self::sample_only();
        }
        match OpenAiClient::from_settings(settings) {
            Ok(client) => Self::with_model(client),
            Err(e) => {
                warn!("Story model unavailable ({e}); using the built-in story");
                Self::sample_only()
            }
        }
    }

    pub fn with_model(model: impl StoryModel + 'static) -> Self {
        Self {
            model: Some(Box::new(model)),
        }
    }

    pub fn sample_only() -> Self {
        Self { model: None }
    }

    pub fn uses_model(&self) -> bool {
        self.model.is_some()
    }

    /// Generate and commit a story. Model failures fall back to the built-in
    /// story; only a storage failure on that fallback reaches the caller.
    pub fn generate_story(&self, store: &mut Store, session_id: &str, theme: &str) -> Result<Story> {
        if let Some(model) = &self.model {
            match generate_with_llm(model.as_ref(), store, session_id, theme) {
                LlmOutcome::Succeeded(story) => return Ok(story),
                LlmOutcome::Failed(reason) => {
                    warn!("Story model path failed, falling back to the built-in story: {reason:#}");
                }
            }
        }

        generate_sample(store, session_id, theme).context("failed to store the built-in story")
    }
}

/// One attempt on the model path: request, normalize, persist, commit.
/// Any error abandons the transaction, so nothing from the attempt remains.
pub fn generate_with_llm(
    model: &dyn StoryModel,
    store: &mut Store,
    session_id: &str,
    theme: &str,
) -> LlmOutcome {
    match try_generate(model, store, session_id, theme) {
        Ok(story) => {
            info!("Story model produced story {} ({:?})", story.id, story.title);
            LlmOutcome::Succeeded(story)
        }
        Err(e) => LlmOutcome::Failed(e),
    }
}

fn try_generate(
    model: &dyn StoryModel,
    store: &mut Store,
    session_id: &str,
    theme: &str,
) -> Result<Story> {
    let response = model
        .generate(STORY_PROMPT, theme)
        .context("story model request failed")?;
    let draft = response
        .normalize(theme)
        .context("story model returned an unusable document")?;
    debug!(
        "Normalized story {:?} with {} nodes",
        draft.title,
        draft.root.count()
    );

    let mut builder = TreeBuilder::create_story(store, session_id, &draft.title)?;
    persist_node(&mut builder, &draft.root, true).context("failed to persist story nodes")?;
    Ok(builder.commit()?)
}

/// Persist `node`, then its children depth-first, then attach the collected
/// options to `node` in one go.
fn persist_node(
    builder: &mut TreeBuilder<'_>,
    node: &DraftNode,
    is_root: bool,
) -> Result<NodeId, StoryError> {
    let id = builder.create_node(
        &node.content,
        NodeFlags {
            is_root,
            is_ending: node.is_ending,
            is_winning_ending: node.is_winning_ending,
        },
    )?;

    if !node.options.is_empty() {
        let mut options = Vec::with_capacity(node.options.len());
        for option in &node.options {
            let child = persist_node(builder, &option.next, false)?;
            options.push(StoryOption::new(option.text.clone(), child));
        }
        builder.attach_options(id, options)?;
    }

    Ok(id)
}
