use std::sync::Arc;

use thiserror::Error;

use crate::application::pagination::{Page, Paginator};
use crate::application::repos::{
    FollowsRepo, GroupsRepo, PostScope, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{GroupRecord, PostRecord, UserRecord};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group")]
    UnknownGroup,
    #[error("unknown author")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<PostRecord>,
}

#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: UserRecord,
    pub page: Page<PostRecord>,
    /// Whether the current viewer follows `author`. Always false for anonymous viewers.
    pub following: bool,
    pub post_count: u64,
}

/// Paginated post listings: home, group, profile and the follow feed.
#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    paginator: Paginator,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        paginator: Paginator,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            paginator,
        }
    }

    pub async fn index(&self, requested_page: i64) -> Result<Page<PostRecord>, FeedError> {
        Ok(self.paginate(PostScope::All, requested_page).await?)
    }

    pub async fn group(&self, slug: &str, requested_page: i64) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_group_by_slug(slug)
            .await?
            .ok_or(FeedError::UnknownGroup)?;
        let page = self
            .paginate(PostScope::Group(group.id), requested_page)
            .await?;
        Ok(GroupFeed { group, page })
    }

    pub async fn profile(
        &self,
        username: &str,
        viewer: Option<&UserRecord>,
        requested_page: i64,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self
            .users
            .find_user_by_username(username)
            .await?
            .ok_or(FeedError::UnknownAuthor)?;
        let page = self
            .paginate(PostScope::Author(author.id), requested_page)
            .await?;

        let following = match viewer {
            Some(viewer) if viewer.id != author.id => {
                self.follows.is_following(viewer.id, author.id).await?
            }
            _ => false,
        };

        Ok(ProfileFeed {
            post_count: page.total,
            author,
            page,
            following,
        })
    }

    /// Posts by the authors `viewer` follows.
    pub async fn follow_feed(
        &self,
        viewer: &UserRecord,
        requested_page: i64,
    ) -> Result<Page<PostRecord>, FeedError> {
        Ok(self
            .paginate(PostScope::FollowedBy(viewer.id), requested_page)
            .await?)
    }

    async fn paginate(
        &self,
        scope: PostScope,
        requested_page: i64,
    ) -> Result<Page<PostRecord>, RepoError> {
        let total = self.posts.count_posts(scope).await?;
        let window = self.paginator.window(requested_page, total);
        let items = if window.is_empty() {
            Vec::new()
        } else {
            self.posts.list_posts(scope, window.request()).await?
        };
        Ok(Page::new(window, items))
    }
}
