#![cfg(feature = "inmem-store")]

use rnb::error::ApiError;
use rnb::models::{NewStory, NewUser, User, VoteTarget};
use rnb::repo::inmem::InMemRepo;
use rnb::repo::{StoryRepo, UserRepo, VoteRepo};
use rnb::submit::submit_story;
use serial_test::serial;

fn repo() -> InMemRepo {
    std::env::set_var("RNB_DATA_DIR", tempfile::tempdir().unwrap().path());
    InMemRepo::new()
}

async fn user(r: &InMemRepo, name: &str) -> User {
    r.create_user(NewUser {
        name: name.into(),
        email: format!("{name}@example.com"),
        role: None,
    })
    .await
    .unwrap()
}

fn entry(name: &str, url: &str) -> NewStory {
    NewStory { name: name.into(), summary: "".into(), url: url.into() }
}

#[tokio::test]
#[serial]
async fn resubmission_becomes_an_upvote() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let bob = user(&r, "bob").await;

    let first = submit_story(
        &r,
        entry("Original", "http://example.com/a/?utm_source=tw"),
        alice.id,
        "10.0.0.1",
    )
    .await
    .unwrap();
    // stored under the normalized form
    assert_eq!(first.url, "http://example.com/a");

    // a differently-decorated URL for the same page lands on the same story
    let second = submit_story(&r, entry("Dup", "http://example.com/a/"), bob.id, "10.0.0.2")
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.name, "Original");
    assert_eq!(second.points, 2);
    assert_eq!(
        r.count_item_votes(VoteTarget::Story(first.id)).await.unwrap(),
        2
    );
    assert_eq!(r.list_stories().await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn resubmitting_your_own_story_changes_nothing() {
    let r = repo();
    let alice = user(&r, "alice").await;

    let first = submit_story(&r, entry("Mine", "http://example.com/b"), alice.id, "10.0.0.1")
        .await
        .unwrap();

    // the author already holds the self-vote ledger row, so the hidden
    // upvote is a duplicate and the submission degrades to a redirect
    let again = submit_story(&r, entry("Mine again", "http://example.com/b"), alice.id, "10.0.0.1")
        .await
        .unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.points, 1);
    assert_eq!(
        r.count_item_votes(VoteTarget::Story(first.id)).await.unwrap(),
        1
    );
}

#[tokio::test]
#[serial]
async fn submission_validation() {
    let r = repo();
    let alice = user(&r, "alice").await;

    // name too short
    let err = submit_story(&r, entry("x", "http://example.com"), alice.id, "ip")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest { .. }));

    // bad scheme
    let err = submit_story(&r, entry("No scheme", "ftp://example.com"), alice.id, "ip")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest { .. }));

    // URL-less submissions are allowed (discussion posts)
    let s = submit_story(&r, entry("Ask: how?", ""), alice.id, "ip").await.unwrap();
    assert_eq!(s.url, "");

    // a second URL-less submission is not a duplicate of the first
    let s2 = submit_story(&r, entry("Ask: why?", ""), alice.id, "ip").await.unwrap();
    assert_ne!(s2.id, s.id);
}

#[tokio::test]
#[serial]
async fn zero_karma_users_cannot_submit() {
    let r = repo();
    let alice = user(&r, "alice").await;
    r.adjust_user_points(alice.id, -1).await.unwrap();

    let err = submit_story(&r, entry("Nope", "http://example.com"), alice.id, "ip")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotAuthorized { .. }));
}
