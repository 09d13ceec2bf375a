//! Registration, activation, login, password reset and shutdown draining

mod common;

use common::test_app;
use greenlight_api::email::EmailTemplate;
use greenlight_api::server;
use http::{Method, StatusCode};
use serde_json::json;
use shared::error::ErrorCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const PASSWORD: &str = "pa55word-long";

#[tokio::test]
async fn register_activate_login_and_fetch_profile() {
    let app = test_app();

    let res = app
        .request(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({ "name": "Alice", "email": "alice@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::ACCEPTED);
    assert_eq!(res.body["data"]["activated"], false);
    let user_id = res.body["data"]["id"].as_i64().unwrap();

    let sent = app.sent_emails().await;
    assert_eq!(sent.len(), 1);
    let (recipient, template) = &sent[0];
    assert_eq!(recipient, "alice@example.com");
    let activation_token = match template {
        EmailTemplate::Welcome {
            user_id: id,
            activation_token,
        } => {
            assert_eq!(*id, user_id);
            activation_token.clone()
        }
        other => panic!("unexpected template {other:?}"),
    };

    let res = app
        .request(
            Method::PUT,
            "/v1/users/activated",
            None,
            Some(json!({ "token": activation_token })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["activated"], true);

    // consumed
    let res = app
        .request(
            Method::PUT,
            "/v1/users/activated",
            None,
            Some(json!({ "token": activation_token })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.body["details"]["token"].is_string());

    let res = app
        .request(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "alice@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let token = res.body["data"]["token"].as_str().unwrap().to_string();

    let res = app.request(Method::GET, "/v1/users/me", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["user"]["id"], user_id);
    assert_eq!(res.body["data"]["permissions"], json!(["movies:read"]));
}

#[tokio::test]
async fn wrong_password_is_invalid_credentials() {
    let app = test_app();
    app.request(
        Method::POST,
        "/v1/users",
        None,
        Some(json!({ "name": "Alice", "email": "alice@example.com", "password": PASSWORD })),
    )
    .await;

    let res = app
        .request(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "alice@example.com", "password": "not-the-password" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), u64::from(ErrorCode::InvalidCredentials.code()));

    let res = app
        .request(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "nobody@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_rejects_invalid_input_and_duplicates() {
    let app = test_app();

    let res = app
        .request(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({ "name": "", "email": "not-an-email", "password": "short" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.code(), u64::from(ErrorCode::ValidationFailed.code()));
    for field in ["name", "email", "password"] {
        assert!(res.body["details"][field].is_string(), "{field}");
    }

    app.create_user("taken@example.com", true, &[]).await;
    let res = app
        .request(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({ "name": "Bob", "email": "TAKEN@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.code(), u64::from(ErrorCode::EmailAlreadyExists.code()));
}

#[tokio::test]
async fn activation_resend_and_already_active() {
    let app = test_app();
    app.create_user("pending@example.com", false, &[]).await;
    app.create_user("active@example.com", true, &[]).await;

    let res = app
        .request(
            Method::POST,
            "/v1/tokens/activation",
            None,
            Some(json!({ "email": "pending@example.com" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::ACCEPTED);

    let res = app
        .request(
            Method::POST,
            "/v1/tokens/activation",
            None,
            Some(json!({ "email": "active@example.com" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.code(), u64::from(ErrorCode::AccountAlreadyActivated.code()));

    let res = app
        .request(
            Method::POST,
            "/v1/tokens/activation",
            None,
            Some(json!({ "email": "ghost@example.com" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    let sent = app.sent_emails().await;
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].1, EmailTemplate::Activation { .. }));
}

#[tokio::test]
async fn password_reset_invalidates_every_reset_token() {
    let app = test_app();
    let user = app.create_user("alice@example.com", true, &[]).await;
    let session = app.login_token(&user).await;

    for _ in 0..2 {
        let res = app
            .request(
                Method::POST,
                "/v1/tokens/password-reset",
                None,
                Some(json!({ "email": "alice@example.com" })),
            )
            .await;
        assert_eq!(res.status, StatusCode::ACCEPTED);
    }

    let tokens: Vec<String> = app
        .sent_emails()
        .await
        .into_iter()
        .filter_map(|(_, t)| match t {
            EmailTemplate::PasswordReset { reset_token } => Some(reset_token),
            _ => None,
        })
        .collect();
    assert_eq!(tokens.len(), 2);

    let new_password = "an0ther-long-pass";
    let res = app
        .request(
            Method::PUT,
            "/v1/users/password",
            None,
            Some(json!({ "password": new_password, "token": tokens[0] })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);

    // the second outstanding token died with the first
    let res = app
        .request(
            Method::PUT,
            "/v1/users/password",
            None,
            Some(json!({ "password": new_password, "token": tokens[1] })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    // other scopes are untouched
    let res = app.request(Method::GET, "/v1/users/me", Some(&session), None).await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app
        .request(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "alice@example.com", "password": new_password })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
}

#[tokio::test]
async fn password_reset_requires_activated_account() {
    let app = test_app();
    app.create_user("pending@example.com", false, &[]).await;
    let res = app
        .request(
            Method::POST,
            "/v1/tokens/password-reset",
            None,
            Some(json!({ "email": "pending@example.com" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.sent_emails().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn serve_waits_for_background_tasks_past_warning_interval() {
    let app = test_app();
    assert_eq!(app.state.config.shutdown_warn_interval, Duration::from_secs(30));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    app.state.runner.run("slow_email", async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        flag.store(true, Ordering::SeqCst);
        Ok::<(), String>(())
    });

    let started = tokio::time::Instant::now();
    server::serve(app.state.clone(), listener, async {})
        .await
        .unwrap();

    assert!(finished.load(Ordering::SeqCst));
    assert!(app.state.runner.is_empty());
    assert!(started.elapsed() >= Duration::from_secs(60));
}
