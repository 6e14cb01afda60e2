#![allow(dead_code)]

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use tempfile::TempDir;
use time::{Duration, OffsetDateTime, macros::datetime};
use tower::ServiceExt;
use tracing::level_filters::LevelFilter;
use yatube::{
    application::{
        pagination::PageRequest,
        repos::{
            CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams,
            CreateSessionParams, CreateUserParams, FollowsRepo, GroupsRepo, HealthRepo, PostScope,
            PostsRepo, PostsWriteRepo, RepoError, SessionsRepo, UpdatePostParams, UsersRepo,
        },
    },
    config::{
        CacheSettings, DatabaseSettings, LogFormat, LoggingSettings, PaginationSettings,
        ServerSettings, SessionSettings, Settings, UploadSettings,
    },
    domain::entities::{
        CommentRecord, GroupRecord, PostRecord, SessionRecord, UserRecord,
    },
    infra::http::{HttpState, Repositories, build_router},
};

pub const SESSION_COOKIE: &str = "yatube_session";
pub const PAGE_SIZE: u32 = 10;

/// 2x1 GIF, the smallest image the validators accept.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x21, 0xf9,
    0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00,
    0x00, 0x02, 0x02, 0x0c, 0x0a, 0x00, 0x3b,
];

const EPOCH: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);

#[derive(Debug, Clone)]
struct StoredPost {
    id: i64,
    text: String,
    pub_date: OffsetDateTime,
    author_id: i64,
    group_id: Option<i64>,
    image: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredComment {
    id: i64,
    post_id: i64,
    author_id: i64,
    text: String,
    created_at: OffsetDateTime,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: Vec<UserRecord>,
    sessions: Vec<SessionRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<StoredPost>,
    comments: Vec<StoredComment>,
    follows: Vec<(i64, i64)>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: i64) -> Option<&UserRecord> {
        self.users.iter().find(|user| user.id == id)
    }

    fn to_record(&self, post: &StoredPost) -> Option<PostRecord> {
        let author = self.user(post.author_id)?.summary();
        let group = post
            .group_id
            .and_then(|id| self.groups.iter().find(|group| group.id == id))
            .map(GroupRecord::summary);
        Some(PostRecord {
            id: post.id,
            text: post.text.clone(),
            pub_date: post.pub_date,
            author,
            group,
            image: post.image.clone(),
        })
    }

    fn in_scope(&self, post: &StoredPost, scope: PostScope) -> bool {
        match scope {
            PostScope::All => true,
            PostScope::Group(id) => post.group_id == Some(id),
            PostScope::Author(id) => post.author_id == id,
            PostScope::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|(follower, author)| *follower == user_id && *author == post.author_id),
        }
    }
}

/// In-memory stand-in for the Postgres repositories.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    pub fail_health: std::sync::atomic::AtomicBool,
    pub fail_post_writes: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_user(&self, username: &str) -> UserRecord {
        let mut inner = self.lock();
        let id = inner.next_id();
        let user = UserRecord {
            id,
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: String::new(),
            joined_at: EPOCH,
        };
        inner.users.push(user.clone());
        user
    }

    pub fn add_group(&self, title: &str, slug: &str) -> GroupRecord {
        let mut inner = self.lock();
        let id = inner.next_id();
        let group = GroupRecord {
            id,
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("About {title}"),
        };
        inner.groups.push(group.clone());
        group
    }

    /// Later calls get later publication dates.
    pub fn add_post(&self, author: &UserRecord, text: &str, group: Option<&GroupRecord>) -> i64 {
        let mut inner = self.lock();
        let id = inner.next_id();
        inner.posts.push(StoredPost {
            id,
            text: text.to_string(),
            pub_date: EPOCH + Duration::minutes(id),
            author_id: author.id,
            group_id: group.map(|group| group.id),
            image: None,
        });
        id
    }

    pub fn delete_all_posts(&self) {
        let mut inner = self.lock();
        inner.posts.clear();
        inner.comments.clear();
    }

    pub fn post(&self, id: i64) -> Option<PostRecord> {
        let inner = self.lock();
        inner
            .posts
            .iter()
            .find(|post| post.id == id)
            .and_then(|post| inner.to_record(post))
    }

    pub fn post_count(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn latest_post(&self) -> Option<PostRecord> {
        let inner = self.lock();
        inner
            .posts
            .iter()
            .max_by_key(|post| post.id)
            .and_then(|post| inner.to_record(post))
    }

    pub fn comment_count(&self, post_id: i64) -> usize {
        self.lock()
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .count()
    }

    pub fn follow_edges(&self, user_id: i64, author_id: i64) -> usize {
        self.lock()
            .follows
            .iter()
            .filter(|edge| **edge == (user_id, author_id))
            .count()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    fn check_post_writes(&self) -> Result<(), RepoError> {
        if self.fail_post_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RepoError::Persistence("post writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn list_posts(
        &self,
        scope: PostScope,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let inner = self.lock();
        let mut posts: Vec<&StoredPost> = inner
            .posts
            .iter()
            .filter(|post| inner.in_scope(post, scope))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        Ok(posts
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .filter_map(|post| inner.to_record(post))
            .collect())
    }

    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let inner = self.lock();
        Ok(inner
            .posts
            .iter()
            .filter(|post| inner.in_scope(post, scope))
            .count() as u64)
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.post(id))
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.check_post_writes()?;
        let mut inner = self.lock();
        let id = inner.next_id();
        let post = StoredPost {
            id,
            text: params.text,
            pub_date: EPOCH + Duration::minutes(id),
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
        };
        inner.posts.push(post.clone());
        inner.to_record(&post).ok_or(RepoError::InvalidInput {
            message: "unknown author".into(),
        })
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        self.check_post_writes()?;
        let mut inner = self.lock();
        let post = inner
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        let post = post.clone();
        inner.to_record(&post).ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups = self.lock().groups.clone();
        groups.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
        Ok(groups)
    }

    async fn find_group(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self.lock().groups.iter().find(|group| group.id == id).cloned())
    }

    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self
            .lock()
            .groups
            .iter()
            .find(|group| group.slug == slug)
            .cloned())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut inner = self.lock();
        if inner.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".into(),
            });
        }
        let id = inner.next_id();
        let group = GroupRecord {
            id,
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        inner.groups.push(group.clone());
        Ok(group)
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_comments(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let inner = self.lock();
        let mut comments: Vec<&StoredComment> = inner
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments
            .into_iter()
            .filter_map(|comment| {
                let author = inner.user(comment.author_id)?.summary();
                Some(CommentRecord {
                    id: comment.id,
                    post_id: comment.post_id,
                    author,
                    text: comment.text.clone(),
                    created_at: comment.created_at,
                })
            })
            .collect())
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut inner = self.lock();
        if !inner.posts.iter().any(|post| post.id == params.post_id) {
            return Err(RepoError::InvalidInput {
                message: "unknown post".into(),
            });
        }
        let id = inner.next_id();
        let created_at = EPOCH + Duration::minutes(id);
        let author = inner
            .user(params.author_id)
            .map(UserRecord::summary)
            .ok_or(RepoError::InvalidInput {
                message: "unknown author".into(),
            })?;
        inner.comments.push(StoredComment {
            id,
            post_id: params.post_id,
            author_id: params.author_id,
            text: params.text.clone(),
            created_at,
        });
        Ok(CommentRecord {
            id,
            post_id: params.post_id,
            author,
            text: params.text,
            created_at,
        })
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        Ok(self.lock().follows.contains(&(user_id, author_id)))
    }

    async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut inner = self.lock();
        if user_id == author_id {
            return Err(RepoError::Integrity {
                message: "follows_no_self_follow".into(),
            });
        }
        if inner.follows.contains(&(user_id, author_id)) {
            return Ok(false);
        }
        inner.follows.push((user_id, author_id));
        Ok(true)
    }

    async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut inner = self.lock();
        let before = inner.follows.len();
        inner.follows.retain(|edge| *edge != (user_id, author_id));
        Ok(inner.follows.len() != before)
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.lock().user(id).cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut inner = self.lock();
        if inner.users.iter().any(|user| user.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".into(),
            });
        }
        let id = inner.next_id();
        let user = UserRecord {
            id,
            username: params.username,
            first_name: params.first_name,
            last_name: params.last_name,
            password_hash: params.password_hash,
            joined_at: OffsetDateTime::now_utc(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let session = SessionRecord {
            id: params.id,
            user_id: params.user_id,
            secret_hash: params.secret_hash,
            created_at: OffsetDateTime::now_utc(),
            expires_at: params.expires_at,
        };
        self.lock().sessions.push(session.clone());
        Ok(session)
    }

    async fn find_session(&self, id: &str) -> Result<Option<SessionRecord>, RepoError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .find(|session| session.id == id)
            .cloned())
    }

    async fn delete_session(&self, id: &str) -> Result<(), RepoError> {
        self.lock().sessions.retain(|session| session.id != id);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut inner = self.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|session| !session.is_expired_at(now));
        Ok((before - inner.sessions.len()) as u64)
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn ping(&self) -> Result<(), RepoError> {
        if self.fail_health.load(std::sync::atomic::Ordering::SeqCst) {
            Err(RepoError::Timeout)
        } else {
            Ok(())
        }
    }
}

pub fn test_settings(upload_dir: &std::path::Path) -> Settings {
    Settings {
        server: ServerSettings {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            graceful_shutdown: StdDuration::from_secs(1),
        },
        logging: LoggingSettings {
            level: LevelFilter::WARN,
            format: LogFormat::Compact,
        },
        database: DatabaseSettings {
            url: None,
            max_connections: NonZeroU32::new(1).expect("non-zero"),
        },
        uploads: UploadSettings {
            directory: upload_dir.to_path_buf(),
            max_request_bytes: NonZeroU64::new(1024 * 1024).expect("non-zero"),
        },
        pagination: PaginationSettings {
            page_size: NonZeroU32::new(PAGE_SIZE).expect("non-zero"),
        },
        cache: CacheSettings {
            enabled: true,
            index_ttl_seconds: 20,
            max_entries: 64,
        },
        session: SessionSettings {
            cookie_name: SESSION_COOKIE.to_string(),
            ttl: StdDuration::from_secs(3600),
            secure_cookie: false,
        },
    }
}

/// The real router wired to [`MemoryStore`].
pub struct TestApp {
    pub router: Router,
    pub state: HttpState,
    pub store: Arc<MemoryStore>,
    pub uploads: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(adjust: impl FnOnce(&mut Settings)) -> Self {
        let uploads = tempfile::tempdir().expect("create upload dir");
        let mut settings = test_settings(uploads.path());
        adjust(&mut settings);

        let store = Arc::new(MemoryStore::default());
        let repos = Repositories {
            posts: store.clone(),
            posts_write: store.clone(),
            groups: store.clone(),
            comments: store.clone(),
            follows: store.clone(),
            users: store.clone(),
            sessions: store.clone(),
            health: store.clone(),
        };
        let state = HttpState::build(repos, &settings).expect("build state");
        let router = build_router(state.clone());

        Self {
            router,
            state,
            store,
            uploads,
        }
    }

    /// Number of files under the post image directory.
    pub fn stored_image_count(&self) -> usize {
        std::fs::read_dir(self.uploads.path().join("posts"))
            .map(|entries| entries.filter_map(Result::ok).count())
            .unwrap_or(0)
    }

    /// Cookie header value for a fresh session of `user`.
    pub async fn login(&self, user: &UserRecord) -> String {
        let session = self
            .state
            .auth
            .start_session(user)
            .await
            .expect("start session");
        format!("{SESSION_COOKIE}={}", session.token)
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).expect("request"))
            .await
    }

    pub async fn post_form(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        form: MultipartBody,
        cookie: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, form.content_type());
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.finish())).expect("request"))
            .await
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
}

pub fn post_cards(html: &str) -> usize {
    html.matches("class=\"post-card\"").count()
}

/// Minimal multipart/form-data encoder.
pub struct MultipartBody {
    boundary: &'static str,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "yatube-test-boundary",
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.body
    }
}
