use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::story::model::NodeId;
use crate::story::StoryTree;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Outcome of a single play-through.
#[derive(Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Player reached an ending.
    Finished {
        won: bool,
        choices_made: usize,
        depth: usize,
        ending_id: NodeId,
        final_text: String,
    },
    /// Player typed quit, or input ran out, mid-story.
    Quit,
}

fn show_game_over<W: Write>(outcome: &PlayOutcome, out: &mut W) -> Result<()> {
    writeln!(out, "\n========================================")?;
    writeln!(out, "               THE END")?;
    writeln!(out, "========================================")?;

    match outcome {
        PlayOutcome::Finished {
            won,
            choices_made,
            depth,
            ..
        } => {
            if *won {
                writeln!(out, "  Result: VICTORY - you found a winning ending!")?;
            } else {
                writeln!(out, "  Result: DEFEAT - this path led nowhere good.")?;
            }
            writeln!(out, "  Choices: {choices_made} (longest path: {depth})")?;
        }
        PlayOutcome::Quit => {
            writeln!(out, "  You closed the book before the end.")?;
        }
    }

    writeln!(out, "========================================\n")?;
    writeln!(out, "  [r] Restart    [q] Quit\n")?;
    Ok(())
}

/// Read the player's post-game choice. Returns `true` to restart, `false` to quit.
fn prompt_restart<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<bool> {
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        match line.trim().to_lowercase().as_str() {
            "r" => return Ok(true),
            "q" => return Ok(false),
            _ => writeln!(out, "  Press [r] to restart or [q] to quit.")?,
        }
    }
}

// ---------------------------------------------------------------------------
// Single play-through
// ---------------------------------------------------------------------------

pub fn play_round<R: BufRead, W: Write>(
    tree: &StoryTree,
    input: &mut R,
    out: &mut W,
) -> Result<PlayOutcome> {
    let mut current = tree.root_id;
    let mut choices_made = 0;

    info!("Story {} started at node {current}", tree.story.id);
    writeln!(out, "\n=== {} ===", tree.story.title)?;

    loop {
        let node = tree
            .node(current)
            .with_context(|| format!("story node {current} is missing"))?;
        debug!(
            "Current node: {} (ending={}, options={})",
            node.id,
            node.is_ending,
            node.options.len()
        );

        writeln!(out, "\n{}", node.content)?;

        if node.is_ending {
            info!(
                "Story over at node {} (winning={})",
                node.id, node.is_winning_ending
            );
            return Ok(PlayOutcome::Finished {
                won: node.is_winning_ending,
                choices_made,
                depth: tree.depth(),
                ending_id: node.id,
                final_text: tree.final_text(node.id).unwrap_or_default(),
            });
        }

        writeln!(out)?;
        for (i, option) in node.options.iter().enumerate() {
            writeln!(out, "  [{}] {}", i + 1, option.text)?;
        }

        let choice = loop {
            write!(out, "\n> ")?;
            out.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(PlayOutcome::Quit);
            }
            let line = line.trim();

            if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
                return Ok(PlayOutcome::Quit);
            }
            match line.parse::<usize>() {
                Ok(n) if (1..=node.options.len()).contains(&n) => break &node.options[n - 1],
                _ => writeln!(
                    out,
                    "(Choose a number between 1 and {}.)",
                    node.options.len()
                )?,
            }
        };

        info!("Transition: {} -> {} ({:?})", node.id, choice.node_id, choice.text);
        current = choice.node_id;
        choices_made += 1;
    }
}

// ---------------------------------------------------------------------------
// Public entry point: plays in a loop until the player quits
// ---------------------------------------------------------------------------

pub fn run(tree: &StoryTree) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();

    loop {
        writeln!(out, "Type the number of an option, or 'quit' to stop.")?;
        let outcome = play_round(tree, &mut input, &mut out)?;
        if let PlayOutcome::Finished { final_text, .. } = &outcome {
            writeln!(out, "\n--- Your story ---\n{final_text}")?;
        }
        show_game_over(&outcome, &mut out)?;

        if !prompt_restart(&mut input, &mut out)? {
            writeln!(out, "Thanks for playing!")?;
            break;
        }

        info!("Player chose to restart");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::storage::Store;
    use crate::story::sample::generate_sample;

    fn sample_tree() -> StoryTree {
        let mut store = Store::open_in_memory().unwrap();
        let story = generate_sample(&mut store, "s-1", "fantasy").unwrap();
        StoryTree::load(&store, story.id).unwrap().unwrap()
    }

    fn play(tree: &StoryTree, keys: &str) -> (PlayOutcome, String) {
        let mut input = Cursor::new(keys.as_bytes().to_vec());
        let mut out = Vec::new();
        let outcome = play_round(tree, &mut input, &mut out).unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_winning_path() {
        let tree = sample_tree();
        let (outcome, transcript) = play(&tree, "1\n1\n");
        match outcome {
            PlayOutcome::Finished {
                won,
                choices_made,
                depth,
                final_text,
                ..
            } => {
                assert!(won);
                assert_eq!(choices_made, 2);
                assert_eq!(depth, 3);
                assert_eq!(final_text.split("\n\n").count(), 3);
            }
            PlayOutcome::Quit => panic!("expected the story to finish"),
        }
        assert!(transcript.contains("[1] Be bold"));
    }

    #[test]
    fn test_invalid_choices_are_retried() {
        let tree = sample_tree();
        let (outcome, transcript) = play(&tree, "9\nabc\n2\n2\n");
        assert!(matches!(
            outcome,
            PlayOutcome::Finished {
                won: false,
                choices_made: 2,
                ..
            }
        ));
        assert_eq!(transcript.matches("Choose a number between 1 and 3").count(), 2);
    }

    #[test]
    fn test_quit_and_end_of_input() {
        let tree = sample_tree();
        assert_eq!(play(&tree, "3\nquit\n").0, PlayOutcome::Quit);
        assert_eq!(play(&tree, "").0, PlayOutcome::Quit);
    }

    #[test]
    fn test_restart_prompt() {
        let mut out = Vec::new();
        assert!(prompt_restart(&mut Cursor::new(b"x\nR\n".to_vec()), &mut out).unwrap());
        assert!(!prompt_restart(&mut Cursor::new(b"q\n".to_vec()), &mut out).unwrap());
        assert!(!prompt_restart(&mut Cursor::new(Vec::new()), &mut out).unwrap());
    }
}
