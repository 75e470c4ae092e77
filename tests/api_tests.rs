// tests/api_tests.rs

use std::sync::Arc;

use serde_json::{Value, json};
use threads::{
    config::Config, routes, services::Forum, state::AppState, store::MemoryStore,
    utils::jwt::sign_jwt,
};

const SECRET: &str = "test_secret_for_integration_tests";

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app() -> String {
    // 1. In-memory store with one post to comment on
    let store = Arc::new(MemoryStore::new());
    store.seed_post(1);
    store.seed_post(2);

    // 2. Create test configuration and state
    let config = Config {
        jwt_secret: SECRET.to_string(),
        rust_log: "error".to_string(),
        ..Config::default()
    };
    let forum = Forum::new(store, config.cache_capacity, config.max_reply_depth);
    let state = AppState { forum, config };

    // 3. Create the router with the app state
    let app = routes::create_router(state);

    // 4. Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    // 5. Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

fn token(user_id: i64) -> String {
    sign_jwt(user_id, SECRET, 600).expect("Failed to sign token")
}

async fn create_comment(
    client: &reqwest::Client,
    address: &str,
    user_id: i64,
    post_id: i64,
    body: Value,
) -> reqwest::Response {
    client
        .post(format!("{}/api/posts/{}/comments", address, post_id))
        .bearer_auth(token(user_id))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request")
}

async fn vote(
    client: &reqwest::Client,
    address: &str,
    user_id: i64,
    comment_id: i64,
    vote_type: &str,
) -> Value {
    let response = client
        .post(format!("{}/api/comments/{}/votes", address, comment_id))
        .bearer_auth(token(user_id))
        .json(&json!({ "type": vote_type }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.unwrap()
}

#[tokio::test]
async fn unknown_path_is_404() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn thread_scenario_works() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Top-level comment A shows up with no replies
    let response = create_comment(&client, &address, 1, 1, json!({ "content": "A" })).await;
    assert_eq!(response.status().as_u16(), 201);
    let a: Value = response.json().await.unwrap();
    let a_id = a["id"].as_i64().unwrap();
    assert_eq!(a["author_id"], 1);

    let listed: Value = client
        .get(format!("{}/api/posts/1/comments", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], a_id);
    assert_eq!(listed[0]["replies"], json!([]));

    // Reply B appears under A
    let response = create_comment(
        &client,
        &address,
        1,
        1,
        json!({ "content": "B", "parent_id": a_id }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 201);
    let b: Value = response.json().await.unwrap();
    let b_id = b["id"].as_i64().unwrap();

    let read: Value = client
        .get(format!("{}/api/comments/{}", address, a_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(read["replies"][0]["id"], b_id);

    // U2 upvotes, then switches to a downvote
    let up = vote(&client, &address, 2, b_id, "UPVOTE").await;
    assert_eq!(up["totals"]["total_upvotes"], 1);
    assert_eq!(up["vote"]["type"], "UPVOTE");

    let down = vote(&client, &address, 2, b_id, "DOWNVOTE").await;
    assert_eq!(down["totals"]["total_upvotes"], 0);
    assert_eq!(down["totals"]["total_downvotes"], 1);
    assert_eq!(down["vote"]["id"], up["vote"]["id"]);

    let replies: Value = client
        .get(format!("{}/api/comments/{}/replies", address, a_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(replies[0]["total_upvotes"], 0);
    assert_eq!(replies[0]["total_downvotes"], 1);
    let votes = replies[0]["votes"].as_array().unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0]["user_id"], 2);
}

#[tokio::test]
async fn voting_requires_login() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let a: Value = create_comment(&client, &address, 1, 1, json!({ "content": "A" }))
        .await
        .json()
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/comments/{}/votes", address, a["id"]))
        .json(&json!({ "type": "UPVOTE" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    let response = client
        .post(format!("{}/api/comments/{}/votes", address, a["id"]))
        .bearer_auth("not-a-token")
        .json(&json!({ "type": "UPVOTE" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn invalid_comments_are_rejected() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = create_comment(&client, &address, 1, 1, json!({ "content": "" })).await;
    assert_eq!(response.status().as_u16(), 400);

    let response = create_comment(&client, &address, 1, 99, json!({ "content": "hi" })).await;
    assert_eq!(response.status().as_u16(), 400);

    let other: Value = create_comment(&client, &address, 1, 2, json!({ "content": "P2" }))
        .await
        .json()
        .await
        .unwrap();
    let response = create_comment(
        &client,
        &address,
        1,
        1,
        json!({ "content": "cross-post", "parent_id": other["id"] }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn missing_records_are_404() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/comments/4242", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let response = client
        .delete(format!("{}/api/posts/1/votes/4242", address))
        .bearer_auth(token(1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn delete_and_edit_keep_thread_shape() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let a: Value = create_comment(&client, &address, 1, 1, json!({ "content": "A" }))
        .await
        .json()
        .await
        .unwrap();
    let b: Value = create_comment(
        &client,
        &address,
        1,
        1,
        json!({ "content": "B", "parent_id": a["id"] }),
    )
    .await
    .json()
    .await
    .unwrap();

    let response = client
        .put(format!("{}/api/comments/{}", address, b["id"]))
        .bearer_auth(token(1))
        .json(&json!({ "content": "B edited" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .delete(format!("{}/api/comments/{}", address, a["id"]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = client
        .delete(format!("{}/api/comments/{}", address, a["id"]))
        .bearer_auth(token(1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let listed: Value = client
        .get(format!("{}/api/posts/1/comments", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed[0]["is_deleted"], true);
    assert_eq!(listed[0]["content"], "[deleted]");
    assert_eq!(listed[0]["replies"][0]["content"], "B edited");
}
