use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Result of a follow or unfollow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowChange {
    Created,
    Removed,
    Unchanged,
}

/// Subscription edges between readers and authors.
///
/// Following yourself, following twice and unfollowing an author you do not
/// follow are all accepted and leave the stored edges untouched.
#[derive(Clone)]
pub struct FollowService {
    follows: Arc<dyn FollowsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl FollowService {
    pub fn new(follows: Arc<dyn FollowsRepo>, users: Arc<dyn UsersRepo>) -> Self {
        Self { follows, users }
    }

    pub async fn follow(
        &self,
        follower: &UserRecord,
        username: &str,
    ) -> Result<FollowChange, FollowError> {
        let author = self.resolve_author(username).await?;
        if author.id == follower.id {
            return Ok(FollowChange::Unchanged);
        }

        let change = if self.follows.follow(follower.id, author.id).await? {
            FollowChange::Created
        } else {
            FollowChange::Unchanged
        };
        debug!(
            target = "yatube::application::follows",
            follower = follower.id,
            author = author.id,
            ?change,
            "Follow requested"
        );
        Ok(change)
    }

    pub async fn unfollow(
        &self,
        follower: &UserRecord,
        username: &str,
    ) -> Result<FollowChange, FollowError> {
        let author = self.resolve_author(username).await?;
        let change = if self.follows.unfollow(follower.id, author.id).await? {
            FollowChange::Removed
        } else {
            FollowChange::Unchanged
        };
        debug!(
            target = "yatube::application::follows",
            follower = follower.id,
            author = author.id,
            ?change,
            "Unfollow requested"
        );
        Ok(change)
    }

    async fn resolve_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_user_by_username(username)
            .await?
            .ok_or(FollowError::UnknownAuthor)
    }
}
