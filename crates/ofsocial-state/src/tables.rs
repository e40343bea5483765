//! redb table definitions for the ofsocial state store.

use redb::TableDefinition;

/// Posts keyed by autoincrement id.
pub const POSTS: TableDefinition<u64, &[u8]> = TableDefinition::new("posts");

/// Comments keyed by `{post_id:020}:{comment_id:020}`.
pub const COMMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("comments");

/// Personas keyed by insertion sequence.
pub const PERSONAS: TableDefinition<u64, &[u8]> = TableDefinition::new("personas");

/// Last issued id per sequence name.
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

pub const POST_SEQ: &str = "post";
pub const COMMENT_SEQ: &str = "comment";
pub const PERSONA_SEQ: &str = "persona";

/// Composite comment key. Zero padding keeps lexical order numeric.
pub fn comment_key(post_id: u64, comment_id: u64) -> String {
    format!("{post_id:020}:{comment_id:020}")
}

/// Half-open key range covering every comment of `post_id`.
///
/// `;` sorts directly after `:`, so `[{post}:, {post};)` is exactly the prefix.
pub fn comment_range(post_id: u64) -> (String, String) {
    (format!("{post_id:020}:"), format!("{post_id:020};"))
}
