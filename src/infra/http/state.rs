use std::sync::Arc;

use crate::application::{
    auth::AuthService,
    feed::FeedService,
    follows::FollowService,
    pagination::Paginator,
    posts::PostsService,
    repos::{
        CommentsRepo, FollowsRepo, GroupsRepo, HealthRepo, PostsRepo, PostsWriteRepo,
        SessionsRepo, UsersRepo,
    },
};
use crate::cache::{CacheConfig, CacheState, PageCache, TtlPageStore};
use crate::config::Settings;
use crate::infra::{db::PostgresRepositories, error::InfraError, uploads::UploadStorage};

use super::SessionCookie;

/// Every persistence collaborator the handlers need.
#[derive(Clone)]
pub struct Repositories {
    pub posts: Arc<dyn PostsRepo>,
    pub posts_write: Arc<dyn PostsWriteRepo>,
    pub groups: Arc<dyn GroupsRepo>,
    pub comments: Arc<dyn CommentsRepo>,
    pub follows: Arc<dyn FollowsRepo>,
    pub users: Arc<dyn UsersRepo>,
    pub sessions: Arc<dyn SessionsRepo>,
    pub health: Arc<dyn HealthRepo>,
}

impl Repositories {
    pub fn from_postgres(db: Arc<PostgresRepositories>) -> Self {
        Self {
            posts: db.clone(),
            posts_write: db.clone(),
            groups: db.clone(),
            comments: db.clone(),
            follows: db.clone(),
            users: db.clone(),
            sessions: db.clone(),
            health: db,
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostsService>,
    pub follows: Arc<FollowService>,
    pub auth: Arc<AuthService>,
    pub health: Arc<dyn HealthRepo>,
    pub upload_storage: Arc<UploadStorage>,
    pub cache: CacheState,
    pub session: SessionCookie,
    pub max_request_bytes: usize,
}

impl HttpState {
    pub fn build(repos: Repositories, settings: &Settings) -> Result<Self, InfraError> {
        let upload_storage = Arc::new(UploadStorage::new(settings.uploads.directory.clone())?);
        let session_ttl = time::Duration::try_from(settings.session.ttl)
            .map_err(|err| InfraError::configuration(format!("session.ttl_hours: {err}")))?;
        let max_request_bytes = usize::try_from(settings.uploads.max_request_bytes.get())
            .map_err(|err| {
                InfraError::configuration(format!("uploads.max_request_bytes: {err}"))
            })?;

        let paginator = Paginator::new(settings.pagination.page_size);
        let feed = FeedService::new(
            repos.posts.clone(),
            repos.groups.clone(),
            repos.users.clone(),
            repos.follows.clone(),
            paginator,
        );
        let posts = PostsService::new(
            repos.posts.clone(),
            repos.posts_write.clone(),
            repos.groups.clone(),
            repos.comments.clone(),
            upload_storage.clone(),
        );
        let follows = FollowService::new(repos.follows.clone(), repos.users.clone());
        let auth = AuthService::new(repos.users.clone(), repos.sessions.clone(), session_ttl);

        let cache_config = CacheConfig::from(&settings.cache);
        let store: Arc<dyn PageCache> = Arc::new(TtlPageStore::new(&cache_config));
        let session_cookie: Arc<str> = Arc::from(settings.session.cookie_name.as_str());

        Ok(Self {
            feed: Arc::new(feed),
            posts: Arc::new(posts),
            follows: Arc::new(follows),
            auth: Arc::new(auth),
            health: repos.health,
            upload_storage,
            cache: CacheState {
                config: cache_config,
                store,
                session_cookie: session_cookie.clone(),
            },
            session: SessionCookie::new(session_cookie, settings.session.secure_cookie),
            max_request_bytes,
        })
    }
}
