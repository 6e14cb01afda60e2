//! Post detail, authoring and comments.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostScope, PostsRepo,
    PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use crate::domain::error::DomainError;
use crate::domain::posts::{normalize_comment_text, normalize_post_text, validate_image};
use crate::infra::uploads::{UploadStorage, UploadStorageError};

#[derive(Debug, Error)]
pub enum PostsError {
    #[error("post not found")]
    NotFound,
    #[error("post submission is invalid")]
    Invalid(PostFieldErrors),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Storage(#[from] UploadStorageError),
}

/// What to do with a post's image on submission.
#[derive(Debug, Clone, Default)]
pub enum ImageChange {
    /// Leave the current image untouched (or none on create).
    #[default]
    Keep,
    Clear,
    Replace { filename: String, data: Bytes },
}

/// Raw values of a create or edit submission.
#[derive(Debug, Clone, Default)]
pub struct PostSubmission {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: ImageChange,
}

/// Per-field validation messages shown next to the form inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFieldErrors {
    pub text: Option<String>,
    pub group: Option<String>,
    pub image: Option<String>,
}

impl PostFieldErrors {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.group.is_none() && self.image.is_none()
    }

    fn record(&mut self, error: DomainError) {
        if let DomainError::Validation { field, message } = error {
            match field {
                "group" => self.group = Some(message),
                "image" => self.image = Some(message),
                _ => self.text = Some(message),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostRecord,
    pub comments: Vec<CommentRecord>,
    pub author_post_count: u64,
}

#[derive(Debug, Clone)]
pub enum EditOutcome {
    Updated(PostRecord),
    /// The editor does not own the post; nothing was changed.
    NotAuthor,
}

struct ValidatedPost {
    text: String,
    group_id: Option<i64>,
    image: ImageChange,
}

#[derive(Clone)]
pub struct PostsService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    storage: Arc<UploadStorage>,
}

impl PostsService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        storage: Arc<UploadStorage>,
    ) -> Self {
        Self {
            posts,
            writer,
            groups,
            comments,
            storage,
        }
    }

    pub async fn find_post(&self, id: i64) -> Result<PostRecord, PostsError> {
        self.posts.find_post(id).await?.ok_or(PostsError::NotFound)
    }

    pub async fn detail(&self, id: i64) -> Result<PostDetail, PostsError> {
        let post = self.find_post(id).await?;
        let comments = self.comments.list_comments(post.id).await?;
        let author_post_count = self
            .posts
            .count_posts(PostScope::Author(post.author.id))
            .await?;

        Ok(PostDetail {
            post,
            comments,
            author_post_count,
        })
    }

    /// Groups offered in the post form.
    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PostsError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn create(
        &self,
        author: &UserRecord,
        submission: PostSubmission,
    ) -> Result<PostRecord, PostsError> {
        let validated = self.validate(submission).await?;
        let image = match validated.image {
            ImageChange::Replace { filename, data } => Some(self.store_image(&filename, data).await?),
            ImageChange::Keep | ImageChange::Clear => None,
        };

        let post = match self
            .writer
            .create_post(CreatePostParams {
                author_id: author.id,
                text: validated.text,
                group_id: validated.group_id,
                image: image.clone(),
            })
            .await
        {
            Ok(post) => post,
            Err(err) => {
                if let Some(stored) = image {
                    self.discard_image(&stored).await;
                }
                return Err(err.into());
            }
        };

        info!(
            target = "yatube::application::posts",
            post_id = post.id,
            author = %author.username,
            "Post created"
        );
        Ok(post)
    }

    pub async fn edit(
        &self,
        editor: &UserRecord,
        id: i64,
        submission: PostSubmission,
    ) -> Result<EditOutcome, PostsError> {
        let current = self.find_post(id).await?;
        if current.author.id != editor.id {
            return Ok(EditOutcome::NotAuthor);
        }

        let validated = self.validate(submission).await?;
        let (image, uploaded) = match validated.image {
            ImageChange::Keep => (current.image.clone(), None),
            ImageChange::Clear => (None, None),
            ImageChange::Replace { filename, data } => {
                let stored = self.store_image(&filename, data).await?;
                (Some(stored.clone()), Some(stored))
            }
        };

        let updated = match self
            .writer
            .update_post(UpdatePostParams {
                id,
                text: validated.text,
                group_id: validated.group_id,
                image: image.clone(),
            })
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                if let Some(stored) = uploaded {
                    self.discard_image(&stored).await;
                }
                return Err(match err {
                    RepoError::NotFound => PostsError::NotFound,
                    other => PostsError::Repo(other),
                });
            }
        };

        if let Some(previous) = current.image
            && image.as_deref() != Some(previous.as_str())
        {
            self.discard_image(&previous).await;
        }

        info!(
            target = "yatube::application::posts",
            post_id = updated.id,
            "Post updated"
        );
        Ok(EditOutcome::Updated(updated))
    }

    /// Attach a comment to a post. Blank text is ignored and yields `None`.
    pub async fn add_comment(
        &self,
        author: &UserRecord,
        post_id: i64,
        text: &str,
    ) -> Result<Option<CommentRecord>, PostsError> {
        let post = self.find_post(post_id).await?;
        let Ok(text) = normalize_comment_text(text) else {
            return Ok(None);
        };

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                text,
            })
            .await?;
        Ok(Some(comment))
    }

    async fn validate(&self, submission: PostSubmission) -> Result<ValidatedPost, PostsError> {
        let mut errors = PostFieldErrors::default();

        let text = match normalize_post_text(&submission.text) {
            Ok(text) => text,
            Err(err) => {
                errors.record(err);
                String::new()
            }
        };

        if let Some(group_id) = submission.group_id
            && self.groups.find_group(group_id).await?.is_none()
        {
            errors.group = Some(
                "Select a valid choice. That choice is not one of the available choices.".into(),
            );
        }

        if let ImageChange::Replace { data, .. } = &submission.image
            && let Err(err) = validate_image(data)
        {
            errors.record(err);
        }

        if !errors.is_empty() {
            return Err(PostsError::Invalid(errors));
        }

        Ok(ValidatedPost {
            text,
            group_id: submission.group_id,
            image: submission.image,
        })
    }

    async fn store_image(&self, filename: &str, data: Bytes) -> Result<String, PostsError> {
        let stored = self.storage.store(filename, data).await?;
        info!(
            target = "yatube::application::posts",
            path = %stored.stored_path,
            size_bytes = stored.size_bytes,
            checksum = %stored.checksum,
            "Post image stored"
        );
        Ok(stored.stored_path)
    }

    async fn discard_image(&self, stored_path: &str) {
        if let Err(err) = self.storage.delete(stored_path).await {
            warn!(
                target = "yatube::application::posts",
                path = %stored_path,
                error = %err,
                "Failed to delete post image"
            );
        }
    }
}
