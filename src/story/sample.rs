use log::info;

use crate::storage::Store;
use crate::story::builder::TreeBuilder;
use crate::story::error::StoryError;
use crate::story::model::{NodeFlags, NodeId, Story, StoryOption};

/// Build and commit the fixed built-in story for `theme`.
///
/// The shape never changes: 15 nodes joined by 14 options, 8 endings, 3 of
/// them winning. Only the title and the opening line mention the theme.
pub fn generate_sample(store: &mut Store, session_id: &str, theme: &str) -> Result<Story, StoryError> {
    info!("Generating built-in story for theme {theme:?}");
    let mut builder = TreeBuilder::create_story(store, session_id, &format!("Adventure: {theme}"))?;
    build_sample_tree(&mut builder, theme)?;
    builder.commit()
}

/// Stage the built-in tree into `builder` and return the root id.
pub fn build_sample_tree(builder: &mut TreeBuilder<'_>, theme: &str) -> Result<NodeId, StoryError> {
    let root = builder.create_node(
        &format!("You wake up in a world of “{theme}”. Three paths beckon."),
        NodeFlags::root(),
    )?;

    // Second level
    let bold = builder.create_node(
        "You make a bold move, rushing toward the unknown.",
        NodeFlags::choice(),
    )?;
    let careful = builder.create_node(
        "You plan carefully, mapping every step.",
        NodeFlags::choice(),
    )?;
    let seeking = builder.create_node(
        "You seek help, gathering allies and clues.",
        NodeFlags::choice(),
    )?;
    builder.attach_options(
        root,
        vec![
            StoryOption::new("Be bold", bold),
            StoryOption::new("Be careful", careful),
            StoryOption::new("Ask for help", seeking),
        ],
    )?;

    // Bold: straight to an ending either way
    let bold_win = builder.create_node(
        "Your momentum pays off—treasure in sight.",
        NodeFlags::win(),
    )?;
    let bold_trap = builder.create_node(
        "A trap snaps shut—game over.",
        NodeFlags::loss(),
    )?;
    builder.attach_options(
        bold,
        vec![
            StoryOption::new("Seize the prize", bold_win),
            StoryOption::new("Ignore the warning signs", bold_trap),
        ],
    )?;

    // Careful: one more decision behind the detour
    let detour = builder.create_node(
        "A hidden detour reveals a safer passage.",
        NodeFlags::choice(),
    )?;
    let stalled = builder.create_node(
        "You overthink and miss your chance.",
        NodeFlags::loss(),
    )?;
    builder.attach_options(
        careful,
        vec![
            StoryOption::new("Take the detour", detour),
            StoryOption::new("Keep analyzing", stalled),
        ],
    )?;

    let detour_win = builder.create_node(
        "Patience rewarded—you arrive precisely when needed.",
        NodeFlags::win(),
    )?;
    let detour_late = builder.create_node(
        "Too late; the door closes forever.",
        NodeFlags::loss(),
    )?;
    builder.attach_options(
        detour,
        vec![
            StoryOption::new("Wait for the right moment", detour_win),
            StoryOption::new("Hurry anyway", detour_late),
        ],
    )?;

    // Seeking: a pact that may go either way, and a clue with a single way forward
    let pact = builder.create_node("Allies propose a risky pact.", NodeFlags::choice())?;
    let clue = builder.create_node(
        "A clue points to an ancient gate.",
        NodeFlags::choice(),
    )?;
    builder.attach_options(
        seeking,
        vec![
            StoryOption::new("Accept the pact", pact),
            StoryOption::new("Follow the clue", clue),
        ],
    )?;

    let pact_betrayal = builder.create_node(
        "Betrayed mid-journey—lesson learned.",
        NodeFlags::loss(),
    )?;
    let pact_glory = builder.create_node(
        "Trust well-placed—you share the glory.",
        NodeFlags::win(),
    )?;
    builder.attach_options(
        pact,
        vec![
            StoryOption::new("Trust them fully", pact_glory),
            StoryOption::new("Keep your guard up", pact_betrayal),
        ],
    )?;

    let maze = builder.create_node(
        "The maze tests resolve before the gate.",
        NodeFlags::loss(),
    )?;
    builder.attach_options(clue, vec![StoryOption::new("Enter the maze", maze)])?;

    Ok(root)
}
