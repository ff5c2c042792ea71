#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use rnb::auth::{create_jwt, Role};
use rnb::repo::inmem::InMemRepo;
use rnb::routes::{config, AppState};
use rnb::stats::VisitorStats;
use serial_test::serial;
use std::sync::Arc;

// Helper to ensure JWT secret present & unique temp data dir per test
fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("RNB_DATA_DIR", tempfile::tempdir().unwrap().path());
}

fn admin_token() -> String {
    create_jwt(99, vec![Role::Admin]).unwrap()
}

fn token_for(user_id: i64) -> String {
    create_jwt(user_id, vec![Role::User]).unwrap()
}

fn service_state() -> AppState {
    AppState {
        repo: Arc::new(InMemRepo::new()),
        stats: VisitorStats::default(),
    }
}

/// Request payload for seeding a user over the admin endpoint.
fn new_user_json(name: &str) -> serde_json::Value {
    serde_json::json!({"name": name, "email": format!("{name}@example.com")})
}

macro_rules! create_user {
    ($app:expr, $name:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/v1/admin/users")
            .insert_header(("Authorization", format!("Bearer {}", admin_token())))
            .set_json(&new_user_json($name))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), 201);
        let user: serde_json::Value =
            serde_json::from_slice(&test::read_body(resp).await).unwrap();
        user["id"].as_i64().unwrap()
    }};
}

#[actix_web::test]
#[serial]
async fn story_submit_vote_comment_flow() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(service_state()))
            .configure(config),
    )
    .await;

    let alice = create_user!(app, "alice");
    let bob = create_user!(app, "bob");

    // duplicate email is a client error
    let req = test::TestRequest::post()
        .uri("/api/v1/admin/users")
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .set_json(&serde_json::json!({"name": "alice2", "email": "alice@example.com"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // anonymous submission is rejected
    let req = test::TestRequest::post()
        .uri("/api/v1/stories")
        .set_json(&serde_json::json!({"name": "No auth", "summary": "", "url": ""}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // submit (alice)
    let req = test::TestRequest::post()
        .uri("/api/v1/stories")
        .insert_header(("Authorization", format!("Bearer {}", token_for(alice))))
        .set_json(&serde_json::json!({
            "name": "Interesting link",
            "summary": "",
            "url": "http://example.com/article"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let story: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let story_id = story["id"].as_i64().unwrap();
    assert_eq!(story["points"].as_i64().unwrap(), 1);

    // listed
    let req = test::TestRequest::get().uri("/api/v1/stories").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let listed: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // upvote (bob)
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{story_id}/upvote"))
        .insert_header(("Authorization", format!("Bearer {}", token_for(bob))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let vote: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(vote["points"].as_i64().unwrap(), 2);

    // a second upvote by the same user is rejected
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{story_id}/upvote"))
        .insert_header(("Authorization", format!("Bearer {}", token_for(bob))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // the upvote credited the author's karma
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/users/{alice}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let user: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(user["points"].as_i64().unwrap(), 2);

    // comment (bob) and read the forest back
    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .insert_header(("Authorization", format!("Bearer {}", token_for(bob))))
        .set_json(&serde_json::json!({"story_id": story_id, "text": "worth reading"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/stories/{story_id}/comments"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let forest: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let roots = forest.as_array().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0]["text"].as_str().unwrap(), "worth reading");
    assert!(roots[0]["children"].as_array().unwrap().is_empty());

    // comment count landed on the story
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/stories/{story_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let story: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(story["comment_count"].as_i64().unwrap(), 1);
}

#[actix_web::test]
#[serial]
async fn newest_ordering_and_missing_ids() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(service_state()))
            .configure(config),
    )
    .await;

    let alice = create_user!(app, "alice");
    for (name, url) in [("one", "http://example.com/1"), ("two", "http://example.com/2")] {
        let req = test::TestRequest::post()
            .uri("/api/v1/stories")
            .insert_header(("Authorization", format!("Bearer {}", token_for(alice))))
            .set_json(&serde_json::json!({"name": name, "summary": "", "url": url}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    let req = test::TestRequest::get()
        .uri("/api/v1/stories?order=newest")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let listed: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let names: Vec<_> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["two", "one"]);

    let req = test::TestRequest::get().uri("/api/v1/stories/9999").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn admin_guards_and_deletion() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(service_state()))
            .configure(config),
    )
    .await;

    let alice = create_user!(app, "alice");
    let req = test::TestRequest::post()
        .uri("/api/v1/stories")
        .insert_header(("Authorization", format!("Bearer {}", token_for(alice))))
        .set_json(&serde_json::json!({"name": "Moderated", "summary": "", "url": ""}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let story: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let story_id = story["id"].as_i64().unwrap();

    // non-admin PATCH is rejected
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/stories/{story_id}"))
        .insert_header(("Authorization", format!("Bearer {}", token_for(alice))))
        .set_json(&serde_json::json!({"status": 50}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // admin PATCH works
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/stories/{story_id}"))
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .set_json(&serde_json::json!({"status": 50}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let story: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(story["status"].as_i64().unwrap(), 50);

    // suspended stories fall off the list
    let req = test::TestRequest::get().uri("/api/v1/stories").to_request();
    let resp = test::call_service(&app, req).await;
    let listed: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(listed.as_array().unwrap().is_empty());

    // admin DELETE removes the story entirely
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/stories/{story_id}"))
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/stories/{story_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn visitor_stats_count_distinct_hits() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(service_state()))
            .configure(config),
    )
    .await;

    for ip in ["1.2.3.4", "5.6.7.8"] {
        let req = test::TestRequest::get()
            .uri("/api/v1/stories")
            .insert_header(("X-Forwarded-For", ip))
            .insert_header(("User-Agent", "Mozilla/5.0"))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
    }
    // crawlers are not counted
    let req = test::TestRequest::get()
        .uri("/api/v1/stories")
        .insert_header(("X-Forwarded-For", "9.9.9.9"))
        .insert_header(("User-Agent", "googlebot/2.1"))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::get().uri("/stats/users/count").to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["users"].as_u64().unwrap(), 2);
}
