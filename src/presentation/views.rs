use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::{PAGE_QUERY_PARAM, Page};
use crate::application::posts::PostFieldErrors;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use crate::infra::http::forms::SignupFieldErrors;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

const DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[day padding:none] [month repr:long] [year]");
const ISO_DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(viewer: Option<&UserRecord>) -> Response {
    let view = LayoutContext::new(viewer, "Page not found", ());
    let mut response = render_template_response(NotFoundTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Navbar identity of the signed-in user.
#[derive(Clone)]
pub struct ViewerView {
    pub username: String,
    pub display_name: String,
}

impl From<&UserRecord> for ViewerView {
    fn from(user: &UserRecord) -> Self {
        Self {
            username: user.username.clone(),
            display_name: user.display_name(),
        }
    }
}

pub struct LayoutContext<T> {
    pub title: String,
    pub viewer: Option<ViewerView>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(viewer: Option<&UserRecord>, title: impl Into<String>, content: T) -> Self {
        Self {
            title: title.into(),
            viewer: viewer.map(ViewerView::from),
            content,
        }
    }
}

#[derive(Clone)]
pub struct GroupBadge {
    pub slug: String,
    pub title: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub text: String,
    pub author_username: String,
    pub author_name: String,
    pub published: String,
    pub iso_date: String,
    pub group: Option<GroupBadge>,
    pub image_url: Option<String>,
}

impl From<PostRecord> for PostCard {
    fn from(post: PostRecord) -> Self {
        Self {
            id: post.id,
            text: post.text,
            author_username: post.author.username,
            author_name: post.author.display_name,
            published: format_date(post.pub_date),
            iso_date: format_iso_date(post.pub_date),
            group: post.group.map(|group| GroupBadge {
                slug: group.slug,
                title: group.title,
            }),
            image_url: post.image.map(|path| media_url(&path)),
        }
    }
}

pub fn media_url(path: &str) -> String {
    format!("/media/{}", path.trim_start_matches('/'))
}

/// Previous/next navigation under a post list.
#[derive(Clone)]
pub struct PaginatorView {
    pub number: u64,
    pub num_pages: u64,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
    pub first_href: Option<String>,
    pub last_href: Option<String>,
}

impl PaginatorView {
    pub fn from_page<T>(page: &Page<T>) -> Self {
        let href = |number: u64| format!("?{PAGE_QUERY_PARAM}={number}");
        Self {
            number: page.number,
            num_pages: page.num_pages,
            previous_href: page.previous_page_number().map(href),
            next_href: page.next_page_number().map(href),
            first_href: (page.number > 2).then(|| href(1)),
            last_href: (page.number + 1 < page.num_pages).then(|| href(page.num_pages)),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.num_pages > 1
    }
}

pub struct PostListContext {
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

impl PostListContext {
    pub fn from_page(page: Page<PostRecord>) -> Self {
        let paginator = PaginatorView::from_page(&page);
        Self {
            posts: page.items.into_iter().map(PostCard::from).collect(),
            paginator,
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<()>,
    pub list: PostListContext,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<()>,
    pub list: PostListContext,
}

pub struct GroupContext {
    pub title: String,
    pub description: String,
}

#[derive(Template)]
#[template(path = "group_list.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupContext>,
    pub list: PostListContext,
}

pub struct ProfileContext {
    pub username: String,
    pub display_name: String,
    pub post_count: u64,
    pub following: bool,
    /// Signed in and looking at someone else's profile.
    pub can_follow: bool,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContext>,
    pub list: PostListContext,
}

pub struct CommentView {
    pub author_username: String,
    pub author_name: String,
    pub text: String,
    pub created: String,
}

impl From<CommentRecord> for CommentView {
    fn from(comment: CommentRecord) -> Self {
        Self {
            author_username: comment.author.username,
            author_name: comment.author.display_name,
            text: comment.text,
            created: format_date(comment.created_at),
        }
    }
}

pub struct PostDetailContext {
    pub post: PostCard,
    pub author_post_count: u64,
    pub comments: Vec<CommentView>,
    pub can_edit: bool,
    pub can_comment: bool,
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

pub struct GroupOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormContext {
    pub action: String,
    pub is_edit: bool,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub current_image: Option<String>,
    pub errors: PostFieldErrors,
}

impl PostFormContext {
    pub fn new(
        action: String,
        is_edit: bool,
        text: String,
        groups: Vec<GroupRecord>,
        selected_group: Option<i64>,
        current_image: Option<String>,
        errors: PostFieldErrors,
    ) -> Self {
        let groups = groups
            .into_iter()
            .map(|group| GroupOption {
                selected: Some(group.id) == selected_group,
                id: group.id,
                title: group.title,
            })
            .collect();
        Self {
            action,
            is_edit,
            text,
            groups,
            current_image: current_image.map(|path| media_url(&path)),
            errors,
        }
    }
}

#[derive(Template)]
#[template(path = "post_create.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormContext>,
}

#[derive(Template)]
#[template(path = "about_author.html")]
pub struct AboutAuthorTemplate {
    pub view: LayoutContext<()>,
}

#[derive(Template)]
#[template(path = "about_tech.html")]
pub struct AboutTechTemplate {
    pub view: LayoutContext<()>,
}

#[derive(Default)]
pub struct LoginContext {
    pub username: String,
    pub next: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginContext>,
}

#[derive(Default)]
pub struct SignupContext {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub errors: SignupFieldErrors,
}

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupTemplate {
    pub view: LayoutContext<SignupContext>,
}

#[derive(Template)]
#[template(path = "logged_out.html")]
pub struct LoggedOutTemplate {
    pub view: LayoutContext<()>,
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub view: LayoutContext<()>,
}

fn format_date(value: OffsetDateTime) -> String {
    value
        .format(DATE_FORMAT)
        .unwrap_or_else(|_| format_iso_date(value))
}

fn format_iso_date(value: OffsetDateTime) -> String {
    value.format(ISO_DATE_FORMAT).unwrap_or_default()
}
