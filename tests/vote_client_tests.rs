// tests/vote_client_tests.rs

use std::{sync::Arc, time::Duration};

use threads::{
    client::{HttpVoteApi, VoteController, VoteError, VotePhase},
    config::Config,
    models::{
        comment::CreateCommentRequest,
        vote::{Subject, VoteTotals, VoteType},
    },
    routes,
    services::Forum,
    session::Session,
    state::AppState,
    store::MemoryStore,
    utils::jwt::sign_jwt,
};

const SECRET: &str = "test_secret_for_vote_client_tests";

/// Spawns the app on a random port with one comment on post 1.
/// Returns the base URL, the forum behind it and the comment id.
async fn spawn_app() -> (String, Forum, i64) {
    let store = Arc::new(MemoryStore::new());
    store.seed_post(1);

    let config = Config {
        jwt_secret: SECRET.to_string(),
        rust_log: "error".to_string(),
        ..Config::default()
    };
    let forum = Forum::new(store, config.cache_capacity, config.max_reply_depth);
    let comment = forum
        .comments
        .create(
            &Session::user(1),
            1,
            CreateCommentRequest {
                content: "vote on me".to_string(),
                parent_id: None,
            },
        )
        .await
        .expect("Failed to create comment");

    let app = routes::create_router(AppState {
        forum: forum.clone(),
        config,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let address = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, forum, comment.id())
}

fn controller(address: &str, user_id: Option<i64>, subject: Subject) -> VoteController {
    let token = user_id.map(|id| sign_jwt(id, SECRET, 600).unwrap());
    VoteController::new(
        Arc::new(HttpVoteApi::new(address, token)),
        subject,
        user_id,
        VoteTotals::default(),
        None,
        Duration::from_millis(20),
    )
}

#[tokio::test]
async fn press_settles_against_server() {
    let (address, forum, comment_id) = spawn_app().await;
    let subject = Subject::Comment(comment_id);
    let widget = controller(&address, Some(2), subject);

    let predicted = widget.press(VoteType::Upvote).unwrap();
    assert_eq!(predicted.count, 1);
    assert_eq!(predicted.phase, VotePhase::Debouncing);

    let settled = widget.settled().await;
    assert_eq!(settled.count, 1);
    assert_eq!(settled.vote_type, Some(VoteType::Upvote));
    assert!(settled.vote_id.is_some());
    assert_eq!(settled.error, None);
    assert_eq!(forum.votes.totals(subject).await.unwrap().total_upvotes, 1);

    // Switching moves the count by two and keeps one record.
    assert_eq!(widget.press(VoteType::Downvote).unwrap().count, -1);
    let settled = widget.settled().await;
    assert_eq!(settled.count, -1);
    let totals = forum.votes.totals(subject).await.unwrap();
    assert_eq!((totals.total_upvotes, totals.total_downvotes), (0, 1));

    // Pressing the active direction retracts.
    assert_eq!(widget.press(VoteType::Downvote).unwrap().count, 0);
    let settled = widget.settled().await;
    assert_eq!(settled.vote_id, None);
    assert_eq!(forum.votes.totals(subject).await.unwrap(), VoteTotals::default());
}

#[tokio::test]
async fn signed_out_press_is_refused_locally() {
    let (address, forum, comment_id) = spawn_app().await;
    let subject = Subject::Comment(comment_id);
    let widget = controller(&address, None, subject);

    assert!(matches!(
        widget.press(VoteType::Upvote),
        Err(VoteError::LoginRequired)
    ));
    assert_eq!(widget.view().count, 0);
    assert_eq!(forum.votes.totals(subject).await.unwrap(), VoteTotals::default());
}

#[tokio::test]
async fn rejected_vote_rolls_back() {
    let (address, _, _) = spawn_app().await;
    let widget = controller(&address, Some(2), Subject::Comment(9999));

    assert_eq!(widget.press(VoteType::Upvote).unwrap().count, 1);
    let settled = widget.settled().await;
    assert_eq!(settled.count, 0);
    assert_eq!(settled.vote_type, None);
    assert!(settled.error.is_some());
}
