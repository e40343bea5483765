//! StateStore: redb-backed persistence for posts, comments, and personas.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing). Post and comment content is truncated to the configured
//! maximum length before it is written.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use tracing::debug;

use ofsocial_core::{MAX_COMMENT_LEN, MAX_POST_LEN, truncate_chars};

use crate::error::{StateError, StateResult, StorageStep};
use crate::tables::*;
use crate::types::*;

/// Closure turning a redb or serde error into `StateError::Storage` for `step`.
macro_rules! storage_err {
    ($step:ident) => {
        |e| StateError::Storage {
            step: StorageStep::$step,
            message: e.to_string(),
        }
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(storage_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(storage_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(storage_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(POSTS).map_err(storage_err!(Table))?;
        txn.open_table(COMMENTS).map_err(storage_err!(Table))?;
        txn.open_table(PERSONAS).map_err(storage_err!(Table))?;
        txn.open_table(COUNTERS).map_err(storage_err!(Table))?;
        txn.commit().map_err(storage_err!(Transaction))?;
        Ok(())
    }

    // ── Posts ──────────────────────────────────────────────────────

    /// Store a new post and return its id.
    pub fn add_post(&self, content: &str, author: &str, is_ai_generated: bool) -> StateResult<PostId> {
        let txn = self.db.begin_write().map_err(storage_err!(Transaction))?;
        let id = next_id(&txn, POST_SEQ)?;
        let post = Post {
            id,
            content: truncate_chars(content, MAX_POST_LEN),
            author: author.to_string(),
            created_at: epoch_secs(),
            is_ai_generated,
        };
        let value = serde_json::to_vec(&post).map_err(storage_err!(Encode))?;
        {
            let mut table = txn.open_table(POSTS).map_err(storage_err!(Table))?;
            table
                .insert(id, value.as_slice())
                .map_err(storage_err!(Write))?;
        }
        txn.commit().map_err(storage_err!(Transaction))?;
        debug!(post_id = id, %author, is_ai_generated, "post stored");
        Ok(id)
    }

    /// Get a post by id.
    pub fn get_post(&self, post_id: PostId) -> StateResult<Option<Post>> {
        let txn = self.db.begin_read().map_err(storage_err!(Transaction))?;
        let table = txn.open_table(POSTS).map_err(storage_err!(Table))?;
        match table.get(post_id).map_err(storage_err!(Read))? {
            Some(guard) => {
                let post: Post =
                    serde_json::from_slice(guard.value()).map_err(storage_err!(Decode))?;
                Ok(Some(post))
            }
            None => Ok(None),
        }
    }

    /// List all posts, newest first, with their comment counts.
    pub fn list_posts(&self) -> StateResult<Vec<PostSummary>> {
        let txn = self.db.begin_read().map_err(storage_err!(Transaction))?;
        let posts = txn.open_table(POSTS).map_err(storage_err!(Table))?;
        let comments = txn.open_table(COMMENTS).map_err(storage_err!(Table))?;
        let mut results = Vec::new();
        // Ids are issued in insertion order, so reverse key order is newest first.
        for entry in posts.iter().map_err(storage_err!(Read))?.rev() {
            let (_, value) = entry.map_err(storage_err!(Read))?;
            let post: Post =
                serde_json::from_slice(value.value()).map_err(storage_err!(Decode))?;
            let (lo, hi) = comment_range(post.id);
            let mut comment_count = 0u64;
            for comment in comments.range(lo.as_str()..hi.as_str()).map_err(storage_err!(Read))? {
                comment.map_err(storage_err!(Read))?;
                comment_count += 1;
            }
            results.push(PostSummary { post, comment_count });
        }
        Ok(results)
    }

    // ── Comments ───────────────────────────────────────────────────

    /// Store a comment on an existing post and return its id.
    pub fn add_comment(&self, post_id: PostId, content: &str, author: &str) -> StateResult<CommentId> {
        let txn = self.db.begin_write().map_err(storage_err!(Transaction))?;
        {
            let posts = txn.open_table(POSTS).map_err(storage_err!(Table))?;
            if posts.get(post_id).map_err(storage_err!(Read))?.is_none() {
                return Err(StateError::PostNotFound(post_id));
            }
        }
        let id = next_id(&txn, COMMENT_SEQ)?;
        let comment = Comment {
            id,
            post_id,
            content: truncate_chars(content, MAX_COMMENT_LEN),
            author: author.to_string(),
            created_at: epoch_secs(),
        };
        let key = comment_key(post_id, id);
        let value = serde_json::to_vec(&comment).map_err(storage_err!(Encode))?;
        {
            let mut table = txn.open_table(COMMENTS).map_err(storage_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(storage_err!(Write))?;
        }
        txn.commit().map_err(storage_err!(Transaction))?;
        debug!(post_id, comment_id = id, %author, "comment stored");
        Ok(id)
    }

    /// List the comments of a post, oldest first.
    pub fn list_comments(&self, post_id: PostId) -> StateResult<Vec<Comment>> {
        let (lo, hi) = comment_range(post_id);
        let txn = self.db.begin_read().map_err(storage_err!(Transaction))?;
        let table = txn.open_table(COMMENTS).map_err(storage_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(lo.as_str()..hi.as_str()).map_err(storage_err!(Read))? {
            let (_, value) = entry.map_err(storage_err!(Read))?;
            let comment: Comment =
                serde_json::from_slice(value.value()).map_err(storage_err!(Decode))?;
            results.push(comment);
        }
        Ok(results)
    }

    // ── Personas ───────────────────────────────────────────────────

    /// List personas in insertion order.
    pub fn list_personas(&self) -> StateResult<Vec<Persona>> {
        let txn = self.db.begin_read().map_err(storage_err!(Transaction))?;
        let table = txn.open_table(PERSONAS).map_err(storage_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(storage_err!(Read))? {
            let (_, value) = entry.map_err(storage_err!(Read))?;
            let persona: Persona =
                serde_json::from_slice(value.value()).map_err(storage_err!(Decode))?;
            results.push(persona);
        }
        Ok(results)
    }

    /// Append a persona.
    pub fn add_persona(&self, persona: &Persona) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(storage_err!(Transaction))?;
        let seq = next_id(&txn, PERSONA_SEQ)?;
        let value = serde_json::to_vec(persona).map_err(storage_err!(Encode))?;
        {
            let mut table = txn.open_table(PERSONAS).map_err(storage_err!(Table))?;
            table
                .insert(seq, value.as_slice())
                .map_err(storage_err!(Write))?;
        }
        txn.commit().map_err(storage_err!(Transaction))?;
        debug!(name = %persona.name, "persona added");
        Ok(())
    }

    /// Replace the persona at `index` (position in insertion order).
    pub fn update_persona(&self, index: usize, persona: &Persona) -> StateResult<()> {
        let value = serde_json::to_vec(persona).map_err(storage_err!(Encode))?;
        let txn = self.db.begin_write().map_err(storage_err!(Transaction))?;
        {
            let mut table = txn.open_table(PERSONAS).map_err(storage_err!(Table))?;
            let seq = persona_seq_at(&table, index)?;
            table
                .insert(seq, value.as_slice())
                .map_err(storage_err!(Write))?;
        }
        txn.commit().map_err(storage_err!(Transaction))?;
        debug!(index, name = %persona.name, "persona updated");
        Ok(())
    }

    /// Remove the persona at `index` and return it.
    pub fn delete_persona(&self, index: usize) -> StateResult<Persona> {
        let txn = self.db.begin_write().map_err(storage_err!(Transaction))?;
        let removed: Persona;
        {
            let mut table = txn.open_table(PERSONAS).map_err(storage_err!(Table))?;
            let seq = persona_seq_at(&table, index)?;
            let guard = table
                .remove(seq)
                .map_err(storage_err!(Write))?
                .ok_or(StateError::PersonaNotFound(index))?;
            removed = serde_json::from_slice(guard.value()).map_err(storage_err!(Decode))?;
        }
        txn.commit().map_err(storage_err!(Transaction))?;
        debug!(index, name = %removed.name, "persona deleted");
        Ok(removed)
    }

    /// Insert the default personas if none exist. Returns true if seeded.
    pub fn seed_default_personas(&self) -> StateResult<bool> {
        if !self.list_personas()?.is_empty() {
            return Ok(false);
        }
        for persona in Persona::defaults() {
            self.add_persona(&persona)?;
        }
        debug!("default personas seeded");
        Ok(true)
    }
}

/// Issue the next id of a sequence inside an open write transaction.
fn next_id(txn: &WriteTransaction, seq: &str) -> StateResult<u64> {
    let mut counters = txn.open_table(COUNTERS).map_err(storage_err!(Table))?;
    let last = counters
        .get(seq)
        .map_err(storage_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = last + 1;
    counters.insert(seq, next).map_err(storage_err!(Write))?;
    Ok(next)
}

/// Sequence key of the persona at ordinal `index`.
fn persona_seq_at(table: &redb::Table<'_, u64, &'static [u8]>, index: usize) -> StateResult<u64> {
    match table.iter().map_err(storage_err!(Read))?.nth(index) {
        Some(entry) => {
            let (key, _) = entry.map_err(storage_err!(Read))?;
            Ok(key.value())
        }
        None => Err(StateError::PersonaNotFound(index)),
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
