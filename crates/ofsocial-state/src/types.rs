//! Domain types for the ofsocial state store.

use serde::{Deserialize, Serialize};

pub use ofsocial_core::Persona;

/// Autoincrement identifier of a post.
pub type PostId = u64;

/// Autoincrement identifier of a comment.
pub type CommentId = u64;

/// A persisted post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub content: String,
    pub author: String,
    /// Unix timestamp (seconds) when the post was stored.
    pub created_at: u64,
    pub is_ai_generated: bool,
}

/// A post as listed in the feed, with its comment count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub comment_count: u64,
}

/// A persisted comment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub content: String,
    pub author: String,
    /// Unix timestamp (seconds) when the comment was stored.
    pub created_at: u64,
}
