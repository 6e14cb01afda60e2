use std::io::ErrorKind;

use axum::{
    Form, Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::Multipart;
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;

use crate::{
    application::{
        error::HttpError,
        feed::FeedError,
        follows::FollowError,
        pagination::parse_page_number,
        posts::{EditOutcome, PostFieldErrors, PostsError},
    },
    cache::page_cache_layer,
    domain::{entities::UserRecord, posts::preview},
    infra::{assets, uploads::UploadStorageError},
    presentation::views::{
        AboutAuthorTemplate, AboutTechTemplate, CommentView, FollowTemplate, GroupContext,
        GroupTemplate, IndexTemplate, LayoutContext, PostCard, PostDetailContext,
        PostDetailTemplate, PostFormContext, PostFormTemplate, PostListContext, ProfileContext,
        ProfileTemplate, render_not_found_response, render_template_response,
    },
};

use super::{
    HttpState, accounts, db_health_response,
    forms::{CommentForm, PostForm, PostFormError},
    middleware::{log_responses, set_request_context},
    session::{CurrentViewer, RequireUser},
};

const CREATE_PATH: &str = "/create/";
const FOLLOW_FEED_PATH: &str = "/follow/";

pub fn build_router(state: HttpState) -> Router {
    // Only the home page goes through the page cache.
    let cached_routes = Router::new()
        .route("/", get(index))
        .route_layer(middleware::from_fn_with_state(
            state.cache.clone(),
            page_cache_layer,
        ));

    let body_limit = DefaultBodyLimit::max(state.max_request_bytes);

    Router::new()
        .merge(cached_routes)
        .route("/group/{slug}/", get(group_posts))
        .route("/profile/{username}/", get(profile))
        .route("/profile/{username}/follow/", post(profile_follow))
        .route("/profile/{username}/unfollow/", post(profile_unfollow))
        .route("/posts/{id}/", get(post_detail))
        .route("/posts/{id}/edit/", get(post_edit_form).post(post_edit))
        .route("/posts/{id}/comment/", post(add_comment))
        .route(CREATE_PATH, get(post_create_form).post(post_create))
        .route(FOLLOW_FEED_PATH, get(follow_index))
        .route("/about/author/", get(about_author))
        .route("/about/tech/", get(about_tech))
        .merge(accounts::routes())
        .route("/media/{*path}", get(serve_media))
        .route("/static/{*path}", get(assets::serve_static))
        .route("/_health/db", get(db_health))
        .fallback(not_found)
        .layer(body_limit)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    fn number(&self) -> i64 {
        parse_page_number(self.page.as_deref())
    }
}

/// Post ids that are not integers are treated like unknown posts.
fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

fn post_detail_path(id: i64) -> String {
    format!("/posts/{id}/")
}

fn profile_path(username: &str) -> String {
    format!("/profile/{username}/")
}

async fn index(
    State(state): State<HttpState>,
    viewer: CurrentViewer,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let page = state.feed.index(query.number()).await?;
    let view = LayoutContext::new(viewer.user(), "Latest posts", ());
    Ok(render_template_response(
        IndexTemplate {
            view,
            list: PostListContext::from_page(page),
        },
        StatusCode::OK,
    ))
}

async fn group_posts(
    State(state): State<HttpState>,
    viewer: CurrentViewer,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let feed = match state.feed.group(&slug, query.number()).await {
        Ok(feed) => feed,
        Err(FeedError::UnknownGroup) => return Ok(render_not_found_response(viewer.user())),
        Err(err) => return Err(err.into()),
    };

    let view = LayoutContext::new(
        viewer.user(),
        feed.group.title.clone(),
        GroupContext {
            title: feed.group.title,
            description: feed.group.description,
        },
    );
    Ok(render_template_response(
        GroupTemplate {
            view,
            list: PostListContext::from_page(feed.page),
        },
        StatusCode::OK,
    ))
}

async fn profile(
    State(state): State<HttpState>,
    viewer: CurrentViewer,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let feed = match state
        .feed
        .profile(&username, viewer.user(), query.number())
        .await
    {
        Ok(feed) => feed,
        Err(FeedError::UnknownAuthor) => return Ok(render_not_found_response(viewer.user())),
        Err(err) => return Err(err.into()),
    };

    let can_follow = viewer
        .user()
        .is_some_and(|user| user.id != feed.author.id);
    let display_name = feed.author.display_name();
    let view = LayoutContext::new(
        viewer.user(),
        format!("Profile of {display_name}"),
        ProfileContext {
            username: feed.author.username,
            display_name,
            post_count: feed.post_count,
            following: feed.following,
            can_follow,
        },
    );
    Ok(render_template_response(
        ProfileTemplate {
            view,
            list: PostListContext::from_page(feed.page),
        },
        StatusCode::OK,
    ))
}

async fn post_detail(
    State(state): State<HttpState>,
    viewer: CurrentViewer,
    Path(raw_id): Path<String>,
) -> Result<Response, HttpError> {
    let Some(id) = parse_post_id(&raw_id) else {
        return Ok(render_not_found_response(viewer.user()));
    };
    let detail = match state.posts.detail(id).await {
        Ok(detail) => detail,
        Err(PostsError::NotFound) => return Ok(render_not_found_response(viewer.user())),
        Err(err) => return Err(err.into()),
    };

    let can_edit = viewer
        .user()
        .is_some_and(|user| user.id == detail.post.author.id);
    let title = preview(&detail.post.text);
    let view = LayoutContext::new(
        viewer.user(),
        title,
        PostDetailContext {
            post: PostCard::from(detail.post),
            author_post_count: detail.author_post_count,
            comments: detail.comments.into_iter().map(CommentView::from).collect(),
            can_edit,
            can_comment: viewer.user().is_some(),
        },
    );
    Ok(render_template_response(
        PostDetailTemplate { view },
        StatusCode::OK,
    ))
}

async fn post_create_form(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
) -> Result<Response, HttpError> {
    render_post_form(
        &state,
        &user,
        None,
        String::new(),
        None,
        None,
        PostFieldErrors::default(),
    )
    .await
}

async fn post_create(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    mut multipart: Multipart,
) -> Result<Response, HttpError> {
    let form = PostForm::from_multipart(&mut multipart)
        .await
        .map_err(post_form_error)?;

    let submission = match form.submission() {
        Ok(submission) => submission,
        Err(errors) => return rerender_post_form(&state, &user, None, &form, None, errors).await,
    };

    match state.posts.create(&user, submission).await {
        Ok(_) => Ok(Redirect::to(&profile_path(&user.username)).into_response()),
        Err(PostsError::Invalid(errors)) => {
            rerender_post_form(&state, &user, None, &form, None, errors).await
        }
        Err(err) => Err(err.into()),
    }
}

async fn post_edit_form(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Path(raw_id): Path<String>,
) -> Result<Response, HttpError> {
    let Some(id) = parse_post_id(&raw_id) else {
        return Ok(render_not_found_response(Some(&user)));
    };
    let post = match state.posts.find_post(id).await {
        Ok(post) => post,
        Err(PostsError::NotFound) => return Ok(render_not_found_response(Some(&user))),
        Err(err) => return Err(err.into()),
    };
    if post.author.id != user.id {
        return Ok(Redirect::to(&post_detail_path(id)).into_response());
    }

    render_post_form(
        &state,
        &user,
        Some(id),
        post.text,
        post.group.map(|group| group.id),
        post.image,
        PostFieldErrors::default(),
    )
    .await
}

async fn post_edit(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Path(raw_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, HttpError> {
    let Some(id) = parse_post_id(&raw_id) else {
        return Ok(render_not_found_response(Some(&user)));
    };
    let current = match state.posts.find_post(id).await {
        Ok(post) => post,
        Err(PostsError::NotFound) => return Ok(render_not_found_response(Some(&user))),
        Err(err) => return Err(err.into()),
    };
    if current.author.id != user.id {
        return Ok(Redirect::to(&post_detail_path(id)).into_response());
    }

    let form = PostForm::from_multipart(&mut multipart)
        .await
        .map_err(post_form_error)?;
    let submission = match form.submission() {
        Ok(submission) => submission,
        Err(errors) => {
            return rerender_post_form(&state, &user, Some(id), &form, current.image, errors)
                .await;
        }
    };

    match state.posts.edit(&user, id, submission).await {
        Ok(EditOutcome::Updated(_)) | Ok(EditOutcome::NotAuthor) => {
            Ok(Redirect::to(&post_detail_path(id)).into_response())
        }
        Err(PostsError::Invalid(errors)) => {
            rerender_post_form(&state, &user, Some(id), &form, current.image, errors).await
        }
        Err(PostsError::NotFound) => Ok(render_not_found_response(Some(&user))),
        Err(err) => Err(err.into()),
    }
}

async fn rerender_post_form(
    state: &HttpState,
    user: &UserRecord,
    post_id: Option<i64>,
    form: &PostForm,
    current_image: Option<String>,
    errors: PostFieldErrors,
) -> Result<Response, HttpError> {
    render_post_form(
        state,
        user,
        post_id,
        form.text.clone(),
        form.selected_group(),
        current_image,
        errors,
    )
    .await
}

async fn render_post_form(
    state: &HttpState,
    user: &UserRecord,
    post_id: Option<i64>,
    text: String,
    selected_group: Option<i64>,
    current_image: Option<String>,
    errors: PostFieldErrors,
) -> Result<Response, HttpError> {
    let groups = state.posts.group_choices().await?;
    let (action, title) = match post_id {
        Some(id) => (format!("/posts/{id}/edit/"), "Edit post"),
        None => (CREATE_PATH.to_string(), "New post"),
    };
    let content = PostFormContext::new(
        action,
        post_id.is_some(),
        text,
        groups,
        selected_group,
        current_image,
        errors,
    );
    let view = LayoutContext::new(Some(user), title, content);
    Ok(render_template_response(
        PostFormTemplate { view },
        StatusCode::OK,
    ))
}

fn post_form_error(err: PostFormError) -> HttpError {
    let public_message = match err {
        PostFormError::PayloadTooLarge => "Upload is too large",
        PostFormError::Invalid(_) => "Form data was invalid",
    };
    HttpError::from_error(
        "infra::http::public::post_form",
        err.status(),
        public_message,
        &err,
    )
}

async fn add_comment(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Path(raw_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Result<Response, HttpError> {
    let Some(id) = parse_post_id(&raw_id) else {
        return Ok(render_not_found_response(Some(&user)));
    };
    match state.posts.add_comment(&user, id, &form.text).await {
        Ok(_) => Ok(Redirect::to(&post_detail_path(id)).into_response()),
        Err(PostsError::NotFound) => Ok(render_not_found_response(Some(&user))),
        Err(err) => Err(err.into()),
    }
}

async fn follow_index(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let page = state.feed.follow_feed(&user, query.number()).await?;
    let view = LayoutContext::new(Some(&user), "Subscriptions", ());
    Ok(render_template_response(
        FollowTemplate {
            view,
            list: PostListContext::from_page(page),
        },
        StatusCode::OK,
    ))
}

async fn profile_follow(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Path(username): Path<String>,
) -> Result<Response, HttpError> {
    follow_response(&user, state.follows.follow(&user, &username).await)
}

async fn profile_unfollow(
    State(state): State<HttpState>,
    RequireUser(user): RequireUser,
    Path(username): Path<String>,
) -> Result<Response, HttpError> {
    follow_response(&user, state.follows.unfollow(&user, &username).await)
}

fn follow_response<T>(
    user: &UserRecord,
    result: Result<T, FollowError>,
) -> Result<Response, HttpError> {
    match result {
        Ok(_) => Ok(Redirect::to(FOLLOW_FEED_PATH).into_response()),
        Err(FollowError::UnknownAuthor) => Ok(render_not_found_response(Some(user))),
        Err(err) => Err(err.into()),
    }
}

async fn about_author(viewer: CurrentViewer) -> Response {
    let view = LayoutContext::new(viewer.user(), "About the author", ());
    render_template_response(AboutAuthorTemplate { view }, StatusCode::OK)
}

async fn about_tech(viewer: CurrentViewer) -> Response {
    let view = LayoutContext::new(viewer.user(), "Technologies", ());
    render_template_response(AboutTechTemplate { view }, StatusCode::OK)
}

async fn not_found(viewer: CurrentViewer) -> Response {
    render_not_found_response(viewer.user())
}

async fn db_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.upload_storage.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => media_not_found(SOURCE),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            media_not_found(SOURCE)
        }
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored upload"
            );
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read uploaded file",
                &err,
            )
            .into_response()
        }
    }
}

fn media_not_found(source: &'static str) -> Response {
    HttpError::new(
        source,
        StatusCode::NOT_FOUND,
        "Upload not found",
        "The requested upload is not available",
    )
    .into_response()
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    // Stored names carry a random prefix, so a path never changes content.
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
