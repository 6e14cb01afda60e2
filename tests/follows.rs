mod common;

use axum::http::StatusCode;

use common::{TestApp, body_text, location, post_cards};

#[tokio::test]
async fn following_adds_the_author_to_the_feed() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let reader = app.store.add_user("anna");
    let bystander = app.store.add_user("ivan");
    let id = app.store.add_post(&author, "For my followers", None);
    let reader_cookie = app.login(&reader).await;
    let bystander_cookie = app.login(&bystander).await;

    let profile = body_text(app.get("/profile/leo/", Some(&reader_cookie)).await).await;
    assert!(profile.contains("/profile/leo/follow/"));

    let response = app
        .post_form("/profile/leo/follow/", "", Some(&reader_cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/follow/"));
    assert_eq!(app.store.follow_edges(reader.id, author.id), 1);

    let feed = body_text(app.get("/follow/", Some(&reader_cookie)).await).await;
    assert!(feed.contains(&format!("data-post-id=\"{id}\"")));

    let other_feed = body_text(app.get("/follow/", Some(&bystander_cookie)).await).await;
    assert_eq!(post_cards(&other_feed), 0);

    let profile = body_text(app.get("/profile/leo/", Some(&reader_cookie)).await).await;
    assert!(profile.contains("/profile/leo/unfollow/"));
}

#[tokio::test]
async fn following_twice_keeps_a_single_edge() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let reader = app.store.add_user("anna");
    let cookie = app.login(&reader).await;

    for _ in 0..2 {
        let response = app.post_form("/profile/leo/follow/", "", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }
    assert_eq!(app.store.follow_edges(reader.id, author.id), 1);
}

#[tokio::test]
async fn following_yourself_is_a_no_op() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let cookie = app.login(&author).await;

    let response = app.post_form("/profile/leo/follow/", "", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.follow_edges(author.id, author.id), 0);

    let profile = body_text(app.get("/profile/leo/", Some(&cookie)).await).await;
    assert!(!profile.contains("/profile/leo/follow/"));
}

#[tokio::test]
async fn unfollowing_removes_the_author_from_the_feed() {
    let app = TestApp::new();
    let author = app.store.add_user("leo");
    let reader = app.store.add_user("anna");
    app.store.add_post(&author, "Soon gone", None);
    let cookie = app.login(&reader).await;

    app.post_form("/profile/leo/follow/", "", Some(&cookie)).await;
    let feed = body_text(app.get("/follow/", Some(&cookie)).await).await;
    assert_eq!(post_cards(&feed), 1);

    let response = app
        .post_form("/profile/leo/unfollow/", "", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.follow_edges(reader.id, author.id), 0);

    let feed = body_text(app.get("/follow/", Some(&cookie)).await).await;
    assert_eq!(post_cards(&feed), 0);

    // Unfollowing again is harmless.
    let response = app
        .post_form("/profile/leo/unfollow/", "", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn follow_feed_is_paginated_newest_first() {
    let app = TestApp::new();
    let first = app.store.add_user("leo");
    let second = app.store.add_user("fyodor");
    let reader = app.store.add_user("anna");
    for n in 0..7 {
        app.store.add_post(&first, &format!("leo {n}"), None);
        app.store.add_post(&second, &format!("fyodor {n}"), None);
    }
    let cookie = app.login(&reader).await;
    app.post_form("/profile/leo/follow/", "", Some(&cookie)).await;
    app.post_form("/profile/fyodor/follow/", "", Some(&cookie)).await;

    let page_one = body_text(app.get("/follow/", Some(&cookie)).await).await;
    assert_eq!(post_cards(&page_one), 10);
    assert!(page_one.find("fyodor 6").unwrap_or(usize::MAX) < page_one.find("leo 6").unwrap_or(0));

    let page_two = body_text(app.get("/follow/?page=2", Some(&cookie)).await).await;
    assert_eq!(post_cards(&page_two), 4);
}

#[tokio::test]
async fn following_an_unknown_author_is_not_found() {
    let app = TestApp::new();
    let reader = app.store.add_user("anna");
    let cookie = app.login(&reader).await;

    let response = app
        .post_form("/profile/ghost/follow/", "", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_visitors_cannot_follow_or_read_the_feed() {
    let app = TestApp::new();
    app.store.add_user("leo");

    let feed = app.get("/follow/", None).await;
    assert_eq!(feed.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&feed), Some("/auth/login/?next=%2Ffollow%2F"));

    let follow = app.post_form("/profile/leo/follow/", "", None).await;
    assert_eq!(follow.status(), StatusCode::SEE_OTHER);
    assert!(location(&follow).is_some_and(|target| target.starts_with("/auth/login/")));
}
