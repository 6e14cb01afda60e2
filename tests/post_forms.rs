mod common;

use axum::http::StatusCode;

use common::{MultipartBody, SMALL_GIF, TestApp, body_text, location};

#[tokio::test]
async fn anonymous_authoring_redirects_to_login() {
    let app = TestApp::new();

    let response = app.get("/create/", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/auth/login/?next=%2Fcreate%2F"));

    let response = app
        .post_multipart("/create/", MultipartBody::new().text("text", "sneaky"), None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn create_form_lists_groups() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let group = app.store.add_group("Novels", "novels");
    let cookie = app.login(&author).await;

    let response = app.get("/create/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(&format!("<option value=\"{}\"", group.id)));
    assert!(html.contains("New post"));
}

#[tokio::test]
async fn creating_a_post_with_group_and_image_redirects_to_profile() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let group = app.store.add_group("Novels", "novels");
    let cookie = app.login(&author).await;

    let form = MultipartBody::new()
        .text("text", "Happy families are all alike")
        .text("group", &group.id.to_string())
        .file("image", "small.gif", "image/gif", SMALL_GIF);
    let response = app.post_multipart("/create/", form, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/profile/leo/"));

    let post = app.store.latest_post().expect("post stored");
    assert_eq!(post.text, "Happy families are all alike");
    assert_eq!(post.author.username, "leo");
    assert_eq!(post.group.map(|group| group.slug).as_deref(), Some("novels"));
    let image = post.image.expect("image stored");
    assert!(image.starts_with("posts/"));

    let media = app.get(&format!("/media/{image}"), None).await;
    assert_eq!(media.status(), StatusCode::OK);

    let group_page = body_text(app.get("/group/novels/", None).await).await;
    assert!(group_page.contains(&format!("/media/{image}")));
}

#[tokio::test]
async fn blank_text_rerenders_the_form() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let cookie = app.login(&author).await;

    let response = app
        .post_multipart("/create/", MultipartBody::new().text("text", "   "), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("This field is required."));
    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn unknown_group_and_bad_image_are_field_errors() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let cookie = app.login(&author).await;

    let form = MultipartBody::new()
        .text("text", "Some text")
        .text("group", "4242")
        .file("image", "notes.txt", "text/plain", b"definitely not an image");
    let response = app.post_multipart("/create/", form, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Select a valid choice."));
    assert!(html.contains("Upload a valid image."));
    assert!(html.contains("Some text"));
    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn author_can_edit_their_post() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let group = app.store.add_group("Novels", "novels");
    let id = app.store.add_post(&author, "Draft", None);
    let cookie = app.login(&author).await;

    let form_page = body_text(app.get(&format!("/posts/{id}/edit/"), Some(&cookie)).await).await;
    assert!(form_page.contains("Draft"));
    assert!(form_page.contains("Edit post"));

    let form = MultipartBody::new()
        .text("text", "Final")
        .text("group", &group.id.to_string());
    let response = app
        .post_multipart(&format!("/posts/{id}/edit/"), form, Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some(format!("/posts/{id}/").as_str()));

    let post = app.store.post(id).expect("post kept");
    assert_eq!(post.text, "Final");
    assert_eq!(post.group.map(|group| group.id), Some(group.id));
    assert_eq!(app.store.post_count(), 1);
}

#[tokio::test]
async fn non_authors_are_sent_to_the_detail_page() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let intruder = app.store.add_user("anna");
    let id = app.store.add_post(&author, "Original", None);
    let cookie = app.login(&intruder).await;

    let response = app.get(&format!("/posts/{id}/edit/"), Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some(format!("/posts/{id}/").as_str()));

    let response = app
        .post_multipart(
            &format!("/posts/{id}/edit/"),
            MultipartBody::new().text("text", "Hijacked"),
            Some(&cookie),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.post(id).map(|post| post.text).as_deref(), Some("Original"));
}

#[tokio::test]
async fn editing_a_missing_post_is_not_found() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let cookie = app.login(&author).await;

    let response = app.get("/posts/777/edit/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn edit_keeps_image_unless_cleared() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let cookie = app.login(&author).await;

    let form = MultipartBody::new()
        .text("text", "With picture")
        .file("image", "small.gif", "image/gif", SMALL_GIF);
    app.post_multipart("/create/", form, Some(&cookie)).await;
    let post = app.store.latest_post().expect("post stored");
    let image = post.image.clone().expect("image stored");

    let response = app
        .post_multipart(
            &format!("/posts/{}/edit/", post.id),
            MultipartBody::new().text("text", "Still with picture"),
            Some(&cookie),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.post(post.id).and_then(|post| post.image), Some(image.clone()));

    let response = app
        .post_multipart(
            &format!("/posts/{}/edit/", post.id),
            MultipartBody::new()
                .text("text", "No picture")
                .text("image-clear", "on"),
            Some(&cookie),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.post(post.id).and_then(|post| post.image), None);

    let media = app.get(&format!("/media/{image}"), None).await;
    assert_eq!(media.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_saves_remove_the_uploaded_image() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let id = app.store.add_post(&author, "Plain", None);
    let cookie = app.login(&author).await;
    app.store
        .fail_post_writes
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let form = MultipartBody::new()
        .text("text", "With picture")
        .file("image", "small.gif", "image/gif", SMALL_GIF);
    let response = app.post_multipart("/create/", form, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.stored_image_count(), 0);

    let form = MultipartBody::new()
        .text("text", "Now with picture")
        .file("image", "small.gif", "image/gif", SMALL_GIF);
    let response = app
        .post_multipart(&format!("/posts/{id}/edit/"), form, Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.stored_image_count(), 0);
    assert_eq!(app.store.post(id).and_then(|post| post.image), None);
}

#[tokio::test]
async fn upload_together_with_clear_is_rejected() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let id = app.store.add_post(&author, "Plain", None);
    let cookie = app.login(&author).await;

    let form = MultipartBody::new()
        .text("text", "Confused")
        .text("image-clear", "on")
        .file("image", "small.gif", "image/gif", SMALL_GIF);
    let response = app
        .post_multipart(&format!("/posts/{id}/edit/"), form, Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.store.post(id).map(|post| post.text).as_deref(), Some("Plain"));
}

#[tokio::test]
async fn oversized_uploads_are_rejected() {
    let app = TestApp::with_settings(|settings| {
        settings.uploads.max_request_bytes = std::num::NonZeroU64::new(512).expect("non-zero");
    });
    let author = app.store.add_user("leo");
    let cookie = app.login(&author).await;

    let form = MultipartBody::new()
        .text("text", "Heavy")
        .file("image", "big.gif", "image/gif", &vec![0u8; 4096]);
    let response = app.post_multipart("/create/", form, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn comments_require_a_signed_in_user() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let id = app.store.add_post(&author, "Discuss", None);

    let response = app
        .post_form(&format!("/posts/{id}/comment/"), "text=Hello", None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).is_some_and(|target| target.starts_with("/auth/login/")));
    assert_eq!(app.store.comment_count(id), 0);

    let cookie = app.login(&author).await;
    let response = app
        .post_form(&format!("/posts/{id}/comment/"), "text=Hello", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some(format!("/posts/{id}/").as_str()));
    assert_eq!(app.store.comment_count(id), 1);
}

#[tokio::test]
async fn blank_comments_are_ignored() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let id = app.store.add_post(&author, "Discuss", None);
    let cookie = app.login(&author).await;

    let response = app
        .post_form(&format!("/posts/{id}/comment/"), "text=+++", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.comment_count(id), 0);

    let missing = app
        .post_form("/posts/999/comment/", "text=Hello", Some(&cookie))
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
