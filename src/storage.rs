use std::path::Path;

use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::config::Database;
use crate::story::model::{NodeId, Story, StoryId, StoryNode, StoryOption};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS stories (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        title       TEXT NOT NULL,
        session_id  TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_stories_session ON stories(session_id);

    CREATE TABLE IF NOT EXISTS story_nodes (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        story_id           INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
        content            TEXT NOT NULL,
        is_root            INTEGER NOT NULL DEFAULT 0,
        is_ending          INTEGER NOT NULL DEFAULT 0,
        is_winning_ending  INTEGER NOT NULL DEFAULT 0,
        options            TEXT NOT NULL DEFAULT '[]'
    );

    CREATE INDEX IF NOT EXISTS idx_story_nodes_story ON story_nodes(story_id);
";

// ---------------------------------------------------------------------------
// Store: owns the SQLite connection
// ---------------------------------------------------------------------------

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn connect(database: &Database) -> rusqlite::Result<Self> {
        match database {
            Database::File(path) => Self::open(path),
            Database::InMemory => Self::open_in_memory(),
        }
    }

    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        debug!("Opening story store at {}", path.display());
        Self::initialize(Connection::open(path)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> rusqlite::Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Open the single transaction scope one generation attempt runs in.
    /// Dropping it without committing rolls everything back.
    pub fn transaction(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.conn.transaction()
    }

    pub fn story(&self, id: StoryId) -> rusqlite::Result<Option<Story>> {
        self.conn
            .query_row(
                "SELECT id, title, session_id, created_at FROM stories WHERE id = ?1",
                params![id],
                story_from_row,
            )
            .optional()
    }

    /// Most recent story generated for a play-through session.
    pub fn latest_story_for_session(&self, session_id: &str) -> rusqlite::Result<Option<Story>> {
        self.conn
            .query_row(
                "SELECT id, title, session_id, created_at FROM stories
                 WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
                params![session_id],
                story_from_row,
            )
            .optional()
    }

    /// All nodes of a story, in creation order.
    pub fn nodes(&self, story_id: StoryId) -> rusqlite::Result<Vec<StoryNode>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, story_id, content, is_root, is_ending, is_winning_ending, options
             FROM story_nodes WHERE story_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![story_id], node_from_row)?;
        rows.collect()
    }

    pub fn story_count(&self) -> rusqlite::Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM stories", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn node_count(&self) -> rusqlite::Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM story_nodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

// ---------------------------------------------------------------------------
// Row-level writes (run inside the generation transaction)
// ---------------------------------------------------------------------------

/// Stage a story row and return its id.
pub fn insert_story(
    conn: &Connection,
    title: &str,
    session_id: &str,
    created_at: DateTime<Utc>,
) -> rusqlite::Result<StoryId> {
    conn.execute(
        "INSERT INTO stories (title, session_id, created_at) VALUES (?1, ?2, ?3)",
        params![title, session_id, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Stage a node row with no options and return its id.
pub fn insert_node(
    conn: &Connection,
    story_id: StoryId,
    content: &str,
    is_root: bool,
    is_ending: bool,
    is_winning_ending: bool,
) -> rusqlite::Result<NodeId> {
    conn.execute(
        "INSERT INTO story_nodes (story_id, content, is_root, is_ending, is_winning_ending, options)
         VALUES (?1, ?2, ?3, ?4, ?5, '[]')",
        params![story_id, content, is_root, is_ending, is_winning_ending],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite a node's whole option list in one statement.
pub fn replace_options(conn: &Connection, node_id: NodeId, options_json: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE story_nodes SET options = ?1 WHERE id = ?2",
        params![options_json, node_id],
    )?;
    Ok(())
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<Story> {
    Ok(Story {
        id: row.get(0)?,
        title: row.get(1)?,
        session_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<StoryNode> {
    let raw_options: String = row.get(6)?;
    let options: Vec<StoryOption> = serde_json::from_str(&raw_options)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(StoryNode {
        id: row.get(0)?,
        story_id: row.get(1)?,
        content: row.get(2)?,
        is_root: row.get(3)?,
        is_ending: row.get(4)?,
        is_winning_ending: row.get(5)?,
        options,
    })
}
