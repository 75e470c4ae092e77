use std::{collections::HashMap, sync::Arc};

use futures::future::join_all;
use validator::Validate;

use super::reply_tree::ReplyTreeBuilder;
use crate::{
    cache::{CacheInvalidator, CacheTag, Mutation},
    error::AppError,
    models::{
        comment::{
            Comment, CommentFilter, CommentNode, CommentPatch, CreateCommentRequest, NewComment,
            UpdateCommentRequest,
        },
        vote::Vote,
    },
    session::Session,
    store::{CommentRepository, PostCounter, VoteRepository},
    utils::html::clean_html,
};

/// Owns comment records: creation, edits, soft deletion and the read paths.
///
/// Every public operation logs its own failures and hands back a typed error;
/// nothing is swallowed except per-level reply lookups inside the tree builder.
pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    votes: Arc<dyn VoteRepository>,
    posts: Arc<dyn PostCounter>,
    tree: Arc<ReplyTreeBuilder>,
    invalidator: Arc<CacheInvalidator>,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        votes: Arc<dyn VoteRepository>,
        posts: Arc<dyn PostCounter>,
        tree: Arc<ReplyTreeBuilder>,
        invalidator: Arc<CacheInvalidator>,
    ) -> Self {
        Self {
            comments,
            votes,
            posts,
            tree,
            invalidator,
        }
    }

    /// Create a comment or, with `parent_id`, a reply.
    /// Requires: Login. The author is always the session user.
    pub async fn create(
        &self,
        session: &Session,
        post_id: i64,
        request: CreateCommentRequest,
    ) -> Result<CommentNode, AppError> {
        self.try_create(session, post_id, request)
            .await
            .inspect_err(|e| e.log_at("create comment"))
    }

    async fn try_create(
        &self,
        session: &Session,
        post_id: i64,
        request: CreateCommentRequest,
    ) -> Result<CommentNode, AppError> {
        let author_id = session.require_user()?;
        request.validate()?;
        let content = sanitize(&request.content)?;

        if !self.comments.post_exists(post_id).await? {
            return Err(AppError::Validation(format!("Post {} does not exist", post_id)));
        }

        // The parent must already exist on the same post, which also keeps the
        // parent chain acyclic.
        if let Some(parent_id) = request.parent_id {
            let parent = self
                .comments
                .find_comment(parent_id)
                .await?
                .ok_or_else(|| AppError::Validation("Parent comment not found".to_string()))?;
            if parent.post_id != post_id {
                return Err(AppError::Validation(
                    "Parent comment belongs to another post".to_string(),
                ));
            }
        }

        let comment = self
            .comments
            .insert_comment(NewComment {
                post_id,
                parent_id: request.parent_id,
                author_id,
                content,
            })
            .await?;

        self.invalidator.apply(&Mutation::CommentCreated(comment.clone()));

        // Stored and visible from here on; a counter failure only leaves the post total behind.
        if let Err(e) = self.posts.increment_comment_count(post_id).await {
            e.log_at("increment comment count");
        }

        tracing::info!(
            comment_id = comment.id,
            post_id,
            parent_id = ?comment.parent_id,
            "Comment created"
        );
        Ok(CommentNode::new(comment, Vec::new()))
    }

    /// Edit a comment's content. The returned comment carries a freshly built
    /// reply subtree, never a stale cached one.
    pub async fn update(
        &self,
        id: i64,
        request: UpdateCommentRequest,
    ) -> Result<CommentNode, AppError> {
        self.try_update(id, request)
            .await
            .inspect_err(|e| e.log_at("update comment"))
    }

    async fn try_update(
        &self,
        id: i64,
        request: UpdateCommentRequest,
    ) -> Result<CommentNode, AppError> {
        request.validate()?;
        let content = sanitize(&request.content)?;

        let comment = self
            .comments
            .update_comment(
                id,
                CommentPatch {
                    content: Some(content),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(|| not_found(id))?;

        self.invalidator.apply(&Mutation::CommentUpdated(comment.clone()));
        tracing::info!(comment_id = id, "Comment updated");
        self.materialize(comment).await
    }

    /// Mark a comment as deleted. Its replies stay where they are.
    pub async fn soft_delete(&self, id: i64) -> Result<CommentNode, AppError> {
        self.try_soft_delete(id)
            .await
            .inspect_err(|e| e.log_at("delete comment"))
    }

    async fn try_soft_delete(&self, id: i64) -> Result<CommentNode, AppError> {
        let comment = self
            .comments
            .update_comment(
                id,
                CommentPatch {
                    is_deleted: Some(true),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(|| not_found(id))?;

        self.invalidator.apply(&Mutation::CommentDeleted(comment.clone()));
        tracing::info!(comment_id = id, "Comment soft-deleted");
        self.materialize(comment).await
    }

    /// A comment with its full reply subtree, or `None` if it does not exist.
    pub async fn read(&self, id: i64) -> Result<Option<CommentNode>, AppError> {
        self.try_read(id)
            .await
            .inspect_err(|e| e.log_at("read comment"))
    }

    async fn try_read(&self, id: i64) -> Result<Option<CommentNode>, AppError> {
        match self.comments.find_comment(id).await? {
            Some(comment) => Ok(Some(self.materialize(comment).await?)),
            None => Ok(None),
        }
    }

    /// Top-level comments of a post, without subtrees. Cached under `comments-<postId>`.
    pub async fn list_top_level(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        let cache = self.invalidator.cache();
        if let Some(hit) = cache.listings.get(&post_id) {
            return Ok(hit.value);
        }

        let since = cache.listings.epoch();
        let comments = self
            .comments
            .find_comments(CommentFilter::TopLevel { post_id })
            .await
            .inspect_err(|e| e.log_at("list comments"))?;
        cache.listings.insert(
            post_id,
            comments.clone(),
            [CacheTag::Comments(post_id)].into(),
            since,
        );
        Ok(comments)
    }

    /// Every top-level comment of a post with its subtree. Each subtree is built
    /// and cached on its own, and siblings are built concurrently.
    pub async fn read_by_post(&self, post_id: i64) -> Result<Vec<CommentNode>, AppError> {
        let top_level = self.list_top_level(post_id).await?;
        let ids: Vec<i64> = top_level.iter().map(|c| c.id).collect();
        let votes = match self.votes.find_comment_votes(&ids).await {
            Ok(votes) => votes,
            Err(e) => {
                e.log_at("read comment votes");
                Vec::new()
            }
        };
        let mut by_comment: HashMap<i64, Vec<Vote>> = HashMap::new();
        for vote in votes {
            if let Some(comment_id) = vote.comment_id {
                by_comment.entry(comment_id).or_default().push(vote);
            }
        }

        let subtrees = join_all(top_level.iter().map(|c| self.tree.replies(c.id))).await;
        Ok(top_level
            .into_iter()
            .zip(subtrees)
            .map(|(comment, replies)| {
                let votes = by_comment.remove(&comment.id).unwrap_or_default();
                CommentNode::new(comment, votes).with_replies(replies)
            })
            .collect())
    }

    /// Reply subtree below a comment.
    pub async fn replies(&self, id: i64) -> Vec<CommentNode> {
        self.tree.replies(id).await
    }

    async fn materialize(&self, comment: Comment) -> Result<CommentNode, AppError> {
        let votes = self.votes.find_comment_votes(&[comment.id]).await?;
        let replies = self.tree.replies(comment.id).await;
        Ok(CommentNode::new(comment, votes).with_replies(replies))
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Comment {} not found", id))
}

fn sanitize(content: &str) -> Result<String, AppError> {
    let cleaned = clean_html(content.trim());
    if cleaned.trim().is_empty() {
        return Err(AppError::Validation("Comment must not be empty".to_string()));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::ReadCache,
        models::comment::DELETED_PLACEHOLDER,
        services::Forum,
        store::MemoryStore,
    };

    fn forum() -> (Forum, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.seed_post(1);
        store.seed_post(2);
        (Forum::new(store.clone(), 64, 64), store)
    }

    fn request(content: &str, parent_id: Option<i64>) -> CreateCommentRequest {
        CreateCommentRequest {
            content: content.to_string(),
            parent_id,
        }
    }

    #[tokio::test]
    async fn test_create_requires_login() {
        let (forum, store) = forum();
        let err = forum
            .comments
            .create(&Session::anonymous(), 1, request("hello", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
        assert_eq!(store.post(1).unwrap().total_comments, 0);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_post_and_foreign_parent() {
        let (forum, _) = forum();
        let user = Session::user(1);

        let err = forum
            .comments
            .create(&user, 99, request("hello", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let other = forum
            .comments
            .create(&user, 2, request("elsewhere", None))
            .await
            .unwrap();
        let err = forum
            .comments
            .create(&user, 1, request("reply", Some(other.id())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = forum
            .comments
            .create(&user, 1, request("reply", Some(12345)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_sanitizes_and_counts() {
        let (forum, store) = forum();
        let user = Session::user(7);

        let created = forum
            .comments
            .create(&user, 1, request("  <b>hi</b><script>x()</script> ", None))
            .await
            .unwrap();
        assert_eq!(created.comment.content, "<b>hi</b>");
        assert_eq!(created.comment.author_id, 7);
        assert_eq!(store.post(1).unwrap().total_comments, 1);

        let err = forum
            .comments
            .create(&user, 1, request("<script>x()</script>", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.post(1).unwrap().total_comments, 1);
    }

    struct BrokenCounter;

    #[async_trait::async_trait]
    impl PostCounter for BrokenCounter {
        async fn increment_comment_count(&self, _post_id: i64) -> Result<(), AppError> {
            Err(AppError::StoreFailure("counter unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_counter_failure_still_returns_and_invalidates() {
        let store = Arc::new(MemoryStore::new());
        store.seed_post(1);
        let cache = Arc::new(ReadCache::new(16));
        let invalidator = Arc::new(CacheInvalidator::new(cache.clone()));
        let tree = Arc::new(ReplyTreeBuilder::new(store.clone(), store.clone(), cache, 8));
        let service = CommentService::new(
            store.clone(),
            store.clone(),
            Arc::new(BrokenCounter),
            tree,
            invalidator,
        );
        let user = Session::user(1);

        assert!(service.list_top_level(1).await.unwrap().is_empty());
        let created = service.create(&user, 1, request("kept", None)).await.unwrap();

        let listed = service.list_top_level(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id());
        assert_eq!(store.post(1).unwrap().total_comments, 0);
    }

    #[tokio::test]
    async fn test_new_reply_is_visible_through_cached_reads() {
        let (forum, _) = forum();
        let user = Session::user(1);
        let a = forum
            .comments
            .create(&user, 1, request("A", None))
            .await
            .unwrap();

        // Warm both caches.
        let listed = forum.comments.read_by_post(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].replies.is_empty());

        let b = forum
            .comments
            .create(&user, 1, request("B", Some(a.id())))
            .await
            .unwrap();
        let c = forum
            .comments
            .create(&user, 1, request("C", Some(b.id())))
            .await
            .unwrap();

        let listed = forum.comments.read_by_post(1).await.unwrap();
        assert_eq!(listed[0].replies.len(), 1);
        assert_eq!(listed[0].replies[0].id(), b.id());
        assert_eq!(listed[0].replies[0].replies[0].id(), c.id());

        let read = forum.comments.read(a.id()).await.unwrap().unwrap();
        assert_eq!(read.replies[0].id(), b.id());
        assert_eq!(forum.comments.replies(b.id()).await[0].id(), c.id());
    }

    #[tokio::test]
    async fn test_update_changes_content_and_refreshes_listing() {
        let (forum, _) = forum();
        let user = Session::user(1);
        let a = forum
            .comments
            .create(&user, 1, request("before", None))
            .await
            .unwrap();
        forum.comments.list_top_level(1).await.unwrap();

        let updated = forum
            .comments
            .update(
                a.id(),
                UpdateCommentRequest {
                    content: "after".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.comment.content, "after");
        assert_eq!(forum.comments.list_top_level(1).await.unwrap()[0].content, "after");

        let err = forum
            .comments
            .update(
                404,
                UpdateCommentRequest {
                    content: "nothing".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_replies_and_redacts() {
        let (forum, store) = forum();
        let user = Session::user(1);
        let a = forum
            .comments
            .create(&user, 1, request("parent", None))
            .await
            .unwrap();
        let b = forum
            .comments
            .create(&user, 1, request("child", Some(a.id())))
            .await
            .unwrap();
        forum.comments.read_by_post(1).await.unwrap();

        let deleted = forum.comments.soft_delete(a.id()).await.unwrap();
        assert!(deleted.comment.is_deleted);
        assert_eq!(deleted.comment.content, DELETED_PLACEHOLDER);
        assert_eq!(deleted.replies[0].id(), b.id());

        let listed = forum.comments.read_by_post(1).await.unwrap();
        assert_eq!(listed[0].comment.content, DELETED_PLACEHOLDER);
        assert_eq!(listed[0].replies[0].comment.content, "child");

        let stored = store.find_comment(a.id()).await.unwrap().unwrap();
        assert_eq!(stored.content, "parent");

        let err = forum.comments.soft_delete(404).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_missing_comment_is_none() {
        let (forum, _) = forum();
        assert_eq!(forum.comments.read(1).await.unwrap(), None);
        assert!(forum.comments.replies(1).await.is_empty());
        assert!(forum.comments.read_by_post(1).await.unwrap().is_empty());
    }
}
