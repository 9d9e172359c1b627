mod config;
mod llm;
mod play;
mod prompts;
mod storage;
mod story;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use config::Settings;
use storage::Store;
use story::{StoryGenerator, StoryTree, DEFAULT_THEME};

const USAGE: &str = "\
Usage:
  storyforge generate [theme] [session_id]   generate and store a new story
  storyforge show <story_id>                 print a stored story as JSON
  storyforge play <story_id>                 play a stored story in the terminal
  storyforge latest <session_id>             print the newest story of a session as JSON

Settings come from the environment (or a .env file):
  OPENAI_API_KEY / CHOREO_OPENAI_CONNECTION_OPENAI_API_KEY   enables the story model
  CHOREO_OPENAI_CONNECTION_SERVICEURL                        alternate model endpoint
  STORY_MODEL                                                model name (default gpt-4o-mini)
  DATABASE_URL                                               SQLite path (default ./storyforge.db)

Logging: set RUST_LOG=debug or RUST_LOG=trace for verbose output";

fn main() -> Result<()> {
    // Initialize logging. Control verbosity with RUST_LOG env var:
    //   RUST_LOG=info   storyforge generate   # strategy + commit
    //   RUST_LOG=debug  storyforge generate   # + staged nodes and normalized documents
    //   RUST_LOG=trace  storyforge generate   # + full prompt and raw model output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).context(USAGE)?;

    let settings = Settings::from_env();
    let mut store = Store::connect(&settings.database).context("failed to open story database")?;

    match command.as_str() {
        "generate" => {
            let theme = args.get(2).map(String::as_str).unwrap_or(DEFAULT_THEME);
            let session_id = args
                .get(3)
                .cloned()
                .unwrap_or_else(|| format!("cli-{}", Utc::now().timestamp_millis()));

            let generator = StoryGenerator::from_settings(&settings);
            let strategy = if generator.uses_model() {
                "story model, built-in fallback"
            } else {
                "built-in"
            };
            let story = generator.generate_story(&mut store, &session_id, theme)?;
            let tree = load_tree(&store, story.id)?;
            let shape = tree.validate().context("stored story is not a valid tree")?;

            println!("Story {}: {}", story.id, story.title);
            println!("  Session  : {}", story.session_id);
            println!("  Nodes    : {}", shape.nodes);
            println!("  Endings  : {} ({} winning)", shape.endings, shape.winning_endings);
            println!("  Depth    : {}", shape.depth);
            println!("  Strategy : {strategy}");
            println!(
                "  Stored   : {} stories, {} nodes",
                store.story_count()?,
                store.node_count()?
            );
        }
        "show" => {
            let tree = load_tree(&store, parse_story_id(args.get(2))?)?;
            println!("{}", serde_json::to_string_pretty(&tree.complete())?);
        }
        "latest" => {
            let session_id = args.get(2).context(USAGE)?;
            let story = store
                .latest_story_for_session(session_id)?
                .with_context(|| format!("no story for session '{session_id}'"))?;
            let tree = load_tree(&store, story.id)?;
            println!("{}", serde_json::to_string_pretty(&tree.complete())?);
        }
        "play" => {
            let tree = load_tree(&store, parse_story_id(args.get(2))?)?;
            play::run(&tree)?;
        }
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    }

    Ok(())
}

fn parse_story_id(arg: Option<&String>) -> Result<i64> {
    let raw = arg.context(USAGE)?;
    raw.parse()
        .with_context(|| format!("story id must be a number, got '{raw}'"))
}

fn load_tree(store: &Store, story_id: i64) -> Result<StoryTree> {
    StoryTree::load(store, story_id)
        .context("failed to load story")?
        .with_context(|| format!("no story with id {story_id}"))
}
