//! Common test utilities for integration tests.

#![allow(dead_code)]

use reactmap_core::ReactionStore;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `(ts, author, text)`
pub type MessageRow<'a> = (&'a str, &'a str, &'a str);
/// `(message_ts, reaction name, reacting user)`
pub type ReactionRow<'a> = (&'a str, &'a str, &'a str);

/// Five reactions over four messages and two reacting users. `eyes` only
/// sits on a blank message, so it has no text to embed.
pub const MESSAGES: &[MessageRow<'static>] = &[
    ("1700000001.000100", "U1", "great job on the release"),
    ("1700000002.000200", "U2", "that meme is hilarious"),
    ("1700000003.000300", "U1", "lunch at noon?"),
    ("1700000004.000400", "U2", "   "),
];

pub const REACTIONS: &[ReactionRow<'static>] = &[
    ("1700000001.000100", "tada", "U2"),
    ("1700000001.000100", "clap", "U2"),
    ("1700000002.000200", "joy", "U1"),
    ("1700000003.000300", "thumbsup", "U1"),
    ("1700000004.000400", "eyes", "U1"),
];

/// Create the base message/reaction tables the way the importer does and fill them.
pub fn write_base_db(path: &Path, messages: &[MessageRow<'_>], reactions: &[ReactionRow<'_>]) {
    let conn = Connection::open(path).expect("open base db");
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            ts TEXT PRIMARY KEY,
            channel_id TEXT,
            user TEXT,
            text TEXT,
            thread_ts TEXT,
            reply_count INTEGER
        );
        CREATE TABLE IF NOT EXISTS reactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_ts TEXT,
            name TEXT,
            user TEXT
        );
        "#,
    )
    .expect("create base tables");

    for (ts, user, text) in messages {
        conn.execute(
            "INSERT INTO messages (ts, channel_id, user, text) VALUES (?1, 'C01', ?2, ?3)",
            params![ts, user, text],
        )
        .expect("insert message");
    }
    add_reactions(path, reactions);
}

/// Append reaction rows to an existing base database.
pub fn add_reactions(path: &Path, reactions: &[ReactionRow<'_>]) {
    let conn = Connection::open(path).expect("open base db");
    for (ts, name, user) in reactions {
        conn.execute(
            "INSERT INTO reactions (message_ts, name, user) VALUES (?1, ?2, ?3)",
            params![ts, name, user],
        )
        .expect("insert reaction");
    }
}

/// Temp directory holding a seeded database, plus the path to it.
pub fn seeded_db(messages: &[MessageRow<'_>], reactions: &[ReactionRow<'_>]) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("archive.db");
    write_base_db(&path, messages, reactions);
    (temp_dir, path)
}

pub fn open_store(path: &Path) -> ReactionStore {
    ReactionStore::open(path).expect("open store")
}
