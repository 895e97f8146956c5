//! Reaction context table: reactions joined to the messages they were applied to.

use crate::store::ReactionStore;
use crate::Result;
use reactmap_types::ReactionContext;
use rusqlite::params;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Per-user reaction counts: `user -> reaction -> count`.
pub type UserReactionCounts = BTreeMap<String, BTreeMap<String, u64>>;

/// Symmetric co-occurrence counts: `reaction -> other reaction -> messages`.
pub type CooccurrenceCounts = BTreeMap<String, BTreeMap<String, u64>>;

impl ReactionStore {
    /// Rebuild the context table from the base store.
    ///
    /// The table is cleared and refilled inside one transaction. Only messages
    /// with non-empty text participate. Returns the number of rows written.
    pub fn build_reaction_contexts(&self) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let cleared = tx.execute("DELETE FROM reaction_contexts", [])?;
        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO reaction_contexts
                (reaction_name, message_ts, message_text, reactor_user, message_author, channel_id)
            SELECT
                r.name,
                r.message_ts,
                m.text,
                r.user,
                m.user,
                m.channel_id
            FROM reactions r
            JOIN messages m ON r.message_ts = m.ts
            WHERE r.name IS NOT NULL
              AND m.text IS NOT NULL AND m.text != ''
            ORDER BY r.id
            "#,
            [],
        )?;
        tx.commit()?;

        info!(
            target: "reactmap::context",
            "Rebuilt reaction contexts: {} rows (replaced {})",
            inserted,
            cleared
        );
        Ok(inserted)
    }

    /// Number of rows in the context table.
    pub fn context_row_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM reaction_contexts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// All context rows, ordered by reaction name then insertion order.
    pub fn reaction_contexts(&self) -> Result<Vec<ReactionContext>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT reaction_name, message_ts, message_text, reactor_user, message_author, channel_id
            FROM reaction_contexts
            ORDER BY reaction_name, id
            "#,
        )?;
        let contexts = stmt
            .query_map([], |row| {
                Ok(ReactionContext {
                    reaction_name: row.get(0)?,
                    message_ts: row.get(1)?,
                    message_text: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    reactor_user: row.get(3)?,
                    message_author: row.get(4)?,
                    channel_id: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(contexts)
    }

    /// Distinct reaction symbols, sorted.
    pub fn unique_reactions(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT reaction_name FROM reaction_contexts ORDER BY reaction_name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Distinct non-blank message texts that received the given reaction,
    /// in first-seen order.
    pub fn messages_for_reaction(&self, reaction_name: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT message_text
            FROM reaction_contexts
            WHERE reaction_name = ?1 AND message_text IS NOT NULL
            GROUP BY message_text
            ORDER BY MIN(id)
            "#,
        )?;
        let texts = stmt
            .query_map(params![reaction_name], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(texts
            .into_iter()
            .filter(|text| !text.trim().is_empty())
            .collect())
    }

    /// How often each user applied each reaction. Rows without a reactor are skipped.
    pub fn user_reaction_counts(&self) -> Result<UserReactionCounts> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT reactor_user, reaction_name, COUNT(*) AS cnt
            FROM reaction_contexts
            WHERE reactor_user IS NOT NULL
            GROUP BY reactor_user, reaction_name
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut counts = UserReactionCounts::new();
        for row in rows {
            let (user, reaction, count) = row?;
            counts.entry(user).or_default().insert(reaction, count as u64);
        }
        debug!(target: "reactmap::context", "Loaded reaction counts for {} users", counts.len());
        Ok(counts)
    }

    /// Number of distinct messages on which each pair of reactions appears together.
    ///
    /// Each pair is counted once per message regardless of how many users
    /// reacted, and is mirrored so both `a -> b` and `b -> a` are present.
    pub fn reaction_cooccurrence(&self) -> Result<CooccurrenceCounts> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT rc1.reaction_name, rc2.reaction_name, COUNT(DISTINCT rc1.message_ts) AS cnt
            FROM reaction_contexts rc1
            JOIN reaction_contexts rc2 ON rc1.message_ts = rc2.message_ts
            WHERE rc1.reaction_name < rc2.reaction_name
            GROUP BY rc1.reaction_name, rc2.reaction_name
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut counts = CooccurrenceCounts::new();
        for row in rows {
            let (a, b, count) = row?;
            counts.entry(a.clone()).or_default().insert(b.clone(), count as u64);
            counts.entry(b).or_default().insert(a, count as u64);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use crate::store::tests::{insert_message, insert_reaction, memory_store};

    #[test]
    fn test_build_joins_reactions_to_messages() {
        let store = memory_store();
        insert_message(&store, "1.0", "U1", "ship it");
        insert_message(&store, "2.0", "U2", "");
        insert_reaction(&store, "1.0", "rocket", "U2");
        insert_reaction(&store, "2.0", "eyes", "U1");
        // reaction on a message missing from the base store
        insert_reaction(&store, "9.0", "tada", "U1");

        assert_eq!(store.build_reaction_contexts().unwrap(), 1);
        let contexts = store.reaction_contexts().unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].reaction_name, "rocket");
        assert_eq!(contexts[0].message_text, "ship it");
        assert_eq!(contexts[0].reactor_user.as_deref(), Some("U2"));
        assert_eq!(contexts[0].message_author.as_deref(), Some("U1"));
        assert_eq!(contexts[0].channel_id.as_deref(), Some("C1"));
    }

    #[test]
    fn test_rebuild_is_full_replacement() {
        let store = memory_store();
        insert_message(&store, "1.0", "U1", "ship it");
        insert_reaction(&store, "1.0", "rocket", "U2");
        assert_eq!(store.build_reaction_contexts().unwrap(), 1);
        assert_eq!(store.build_reaction_contexts().unwrap(), 1);
        assert_eq!(store.context_row_count().unwrap(), 1);

        insert_reaction(&store, "1.0", "tada", "U3");
        assert_eq!(store.build_reaction_contexts().unwrap(), 2);
        assert_eq!(store.context_row_count().unwrap(), 2);
    }

    #[test]
    fn test_duplicate_reaction_events_collapse() {
        let store = memory_store();
        insert_message(&store, "1.0", "U1", "hello");
        insert_reaction(&store, "1.0", "wave", "U2");
        insert_reaction(&store, "1.0", "wave", "U2");
        assert_eq!(store.build_reaction_contexts().unwrap(), 1);
    }

    #[test]
    fn test_unique_reactions_sorted_and_messages_distinct() {
        let store = memory_store();
        insert_message(&store, "1.0", "U1", "same text");
        insert_message(&store, "2.0", "U1", "same text");
        insert_message(&store, "3.0", "U1", "   ");
        insert_reaction(&store, "1.0", "zap", "U2");
        insert_reaction(&store, "2.0", "zap", "U3");
        insert_reaction(&store, "3.0", "eyes", "U2");
        insert_reaction(&store, "1.0", "art", "U2");
        store.build_reaction_contexts().unwrap();

        assert_eq!(store.unique_reactions().unwrap(), vec!["art", "eyes", "zap"]);
        assert_eq!(store.messages_for_reaction("zap").unwrap(), vec!["same text"]);
        assert!(store.messages_for_reaction("eyes").unwrap().is_empty());
        assert!(store.messages_for_reaction("missing").unwrap().is_empty());
    }

    #[test]
    fn test_user_counts_and_cooccurrence() {
        let store = memory_store();
        insert_message(&store, "1.0", "U1", "a");
        insert_message(&store, "2.0", "U1", "b");
        insert_reaction(&store, "1.0", "heart", "U2");
        insert_reaction(&store, "1.0", "heart", "U3");
        insert_reaction(&store, "1.0", "joy", "U2");
        insert_reaction(&store, "1.0", "joy", "U3");
        insert_reaction(&store, "2.0", "heart", "U2");
        store.build_reaction_contexts().unwrap();

        let counts = store.user_reaction_counts().unwrap();
        assert_eq!(counts["U2"]["heart"], 2);
        assert_eq!(counts["U2"]["joy"], 1);
        assert_eq!(counts["U3"]["heart"], 1);

        let co = store.reaction_cooccurrence().unwrap();
        // two reactors on message 1.0 still count as one shared message
        assert_eq!(co["heart"]["joy"], 1);
        assert_eq!(co["joy"]["heart"], 1);
        assert!(!co["heart"].contains_key("heart"));
    }
}
