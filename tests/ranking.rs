#![cfg(feature = "inmem-store")]

use rnb::models::{NewStory, NewUser, User};
use rnb::repo::inmem::InMemRepo;
use rnb::repo::{StoryRepo, UserRepo};
use rnb::submit::submit_story;
use rnb::vote::{cast_story_vote, VoteKind};
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

async fn submit(r: &InMemRepo, by: &User, name: &str, url: &str) -> rnb::models::Story {
    submit_story(
        r,
        NewStory { name: name.into(), summary: "".into(), url: url.into() },
        by.id,
        "10.0.0.1",
    )
    .await
    .unwrap()
}

#[tokio::test]
#[serial]
async fn fresh_stories_list_newest_first() {
    let r = repo();
    let u = user(&r, "alice").await;
    let s1 = submit(&r, &u, "first", "http://example.com/1").await;
    let s2 = submit(&r, &u, "second", "http://example.com/2").await;
    let s3 = submit(&r, &u, "third", "http://example.com/3").await;

    // equal points, so age decay alone decides the order
    let listed: Vec<_> = r.list_stories().await.unwrap().iter().map(|s| s.id).collect();
    assert_eq!(listed, vec![s3.id, s2.id, s1.id]);
}

#[tokio::test]
#[serial]
async fn points_can_outweigh_age() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let bob = user(&r, "bob").await;
    let carol = user(&r, "carol").await;

    let s1 = submit(&r, &alice, "old but good", "http://example.com/1").await;
    let s2 = submit(&r, &alice, "middling", "http://example.com/2").await;
    let s3 = submit(&r, &alice, "newest", "http://example.com/3").await;

    // two upvotes lift the oldest story over the middle one but the
    // decay exponent keeps the 1-point newest story on top
    cast_story_vote(&r, s1.id, bob.id, "10.0.0.2", VoteKind::Up).await.unwrap();
    cast_story_vote(&r, s1.id, carol.id, "10.0.0.3", VoteKind::Up).await.unwrap();

    let listed: Vec<_> = r.list_stories().await.unwrap().iter().map(|s| s.id).collect();
    assert_eq!(listed, vec![s3.id, s1.id, s2.id]);
}

#[tokio::test]
#[serial]
async fn rank_is_persisted_on_the_row() {
    let r = repo();
    let u = user(&r, "alice").await;
    let s = submit(&r, &u, "ranked", "http://example.com/r").await;

    let stored = r.get_story(s.id).await.unwrap();
    // single story, divisor 1: rank is points * 100
    assert!((stored.rank - 100.0).abs() < f64::EPSILON);
}
