mod common;

use actix_web::{http::StatusCode, test};
use serde_json::Value;

use common::{register_request, registration_fields, FilePart, TestContext, DEFAULT_AVATAR, PNG};

#[actix_web::test]
async fn test_register_creates_one_account_without_exposing_secrets() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let fields = registration_fields("a@example.com", "alice", "+15550100");
    let resp = test::call_service(&app, register_request(&fields, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let raw = test::read_body(resp).await;
    let text = String::from_utf8(raw.to_vec()).unwrap();
    let body: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(body["status"], 201);
    assert_eq!(ctx.store.account_count(), 1);

    let account = ctx.store.account_by_email("a@example.com").unwrap();
    assert_eq!(body["user_id"], account.id);
    assert!(!account.email_verified);
    assert_eq!(account.avatar, DEFAULT_AVATAR);
    assert!(account.password_digest.starts_with("$argon2id$"));

    assert!(!text.contains(&account.password_digest));
    assert!(!text.contains("password123"));
    assert!(!text.contains(&account.token));
}

#[actix_web::test]
async fn test_each_registration_gets_a_unique_token() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    for (email, username, phone) in [
        ("a@example.com", "alice", "+15550100"),
        ("b@example.com", "bob", "+15550101"),
        ("c@example.com", "carol", "+15550102"),
    ] {
        let fields = registration_fields(email, username, phone);
        let resp = test::call_service(&app, register_request(&fields, None).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let tokens: std::collections::HashSet<String> = ["a@example.com", "b@example.com", "c@example.com"]
        .iter()
        .map(|email| ctx.store.account_by_email(email).unwrap().token)
        .collect();
    assert_eq!(tokens.len(), 3);
}

#[actix_web::test]
async fn test_register_sends_verification_link() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let fields = registration_fields("a@example.com", "alice", "+15550100");
    test::call_service(&app, register_request(&fields, None).to_request()).await;

    let mailer = ctx.mailer.clone();
    assert!(common::eventually(|| !mailer.sent().is_empty()).await);

    let token = ctx.mailer.token_from_link("a@example.com", "verify").unwrap();
    assert_eq!(token, ctx.store.account_by_email("a@example.com").unwrap().token);
}

#[actix_web::test]
async fn test_invalid_input_is_rejected_before_storage() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let fields = vec![
        ("username", "alice"),
        ("name", "Alice"),
        ("email", "not-an-email"),
        ("password", "short"),
        ("phone", "+15550100"),
        ("language", "en"),
    ];
    let resp = test::call_service(&app, register_request(&fields, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(body["status"], 400);
    assert!(body["detail"].as_str().unwrap().contains("email"));

    assert_eq!(ctx.store.calls(), 0);
    assert_eq!(ctx.store.account_count(), 0);
}

#[actix_web::test]
async fn test_duplicate_email_conflicts() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let first = registration_fields("a@example.com", "alice", "+15550100");
    let resp = test::call_service(&app, register_request(&first, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let second = registration_fields("a@example.com", "alice2", "+15550199");
    let resp = test::call_service(&app, register_request(&second, None).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "CONFLICT");
    assert_eq!(body["message"], "email already in use");
    assert_eq!(ctx.store.account_count(), 1);
}

#[actix_web::test]
async fn test_avatar_is_uploaded_once_and_stored() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let fields = registration_fields("a@example.com", "alice", "+15550100");
    let avatar = FilePart {
        file_name: "me.png",
        content_type: "image/png",
        bytes: PNG,
    };
    let resp = test::call_service(&app, register_request(&fields, Some(avatar)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    assert_eq!(ctx.objects.put_count(), 1);
    let key = ctx.objects.puts.lock().unwrap()[0].clone();
    let account = ctx.store.account_by_email("a@example.com").unwrap();
    assert_eq!(account.avatar, format!("https://cdn.test/{}", key));
}

#[actix_web::test]
async fn test_wrong_type_avatar_is_rejected_without_upload() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let fields = registration_fields("a@example.com", "alice", "+15550100");
    let avatar = FilePart {
        file_name: "notes.txt",
        content_type: "text/plain",
        bytes: b"just some text",
    };
    let resp = test::call_service(&app, register_request(&fields, Some(avatar)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "UPLOAD_ERROR");
    assert_eq!(ctx.objects.put_count(), 0);
    assert_eq!(ctx.store.account_count(), 0);
}

#[actix_web::test]
async fn test_oversized_avatar_is_rejected_without_upload() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let mut big = PNG.to_vec();
    big.resize(common::MAX_AVATAR_BYTES + 1, 0);

    let fields = registration_fields("a@example.com", "alice", "+15550100");
    let avatar = FilePart {
        file_name: "big.png",
        content_type: "image/png",
        bytes: &big,
    };
    let resp = test::call_service(&app, register_request(&fields, Some(avatar)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "UPLOAD_ERROR");
    assert_eq!(ctx.objects.put_count(), 0);
    assert_eq!(ctx.store.calls(), 0);
}

#[actix_web::test]
async fn test_failed_create_discards_uploaded_avatar() {
    let ctx = TestContext::new();
    let app = ctx.app().await;

    let first = registration_fields("a@example.com", "alice", "+15550100");
    test::call_service(&app, register_request(&first, None).to_request()).await;

    let clash = registration_fields("b@example.com", "alice", "+15550101");
    let avatar = FilePart {
        file_name: "me.png",
        content_type: "image/png",
        bytes: PNG,
    };
    let resp = test::call_service(&app, register_request(&clash, Some(avatar)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let objects = ctx.objects.clone();
    assert!(common::eventually(|| objects.deleted().len() == 1).await);
    let key = ctx.objects.puts.lock().unwrap()[0].clone();
    assert_eq!(ctx.objects.deleted()[0], format!("https://cdn.test/{}", key));
}

#[actix_web::test]
async fn test_create_past_deadline_discards_uploaded_avatar() {
    let ctx = TestContext::with_register_deadline(std::time::Duration::from_millis(200));
    let app = ctx.app().await;
    ctx.store.stall_creates();

    let fields = registration_fields("a@example.com", "alice", "+15550100");
    let avatar = FilePart {
        file_name: "me.png",
        content_type: "image/png",
        bytes: PNG,
    };
    let resp = test::call_service(&app, register_request(&fields, Some(avatar)).to_request()).await;
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "TIMEOUT");

    assert_eq!(ctx.objects.put_count(), 1);
    let url = format!("https://cdn.test/{}", ctx.objects.puts.lock().unwrap()[0]);
    let objects = ctx.objects.clone();
    assert!(common::eventually(|| objects.deleted() == vec![url.clone()]).await);
    assert_eq!(ctx.store.account_count(), 0);
}
