mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::util::ServiceExt;

use pedidos_api::services::notifications::AddRecipientRequest;

use common::TestApp;

#[tokio::test]
async fn sync_users_folds_active_user_emails_into_recipients() {
    let app = TestApp::spawn().await;
    let admin = app.seed_user("admin").await;
    let vendedor = app.seed_user("vendedor").await;
    let departed = app.seed_user("facturador").await;
    app.services
        .users
        .delete(departed.id, admin.id)
        .await
        .expect("deactivate user");

    // A manually configured recipient survives the sync untouched.
    app.services
        .notifications
        .add_extra_email(AddRecipientRequest {
            email: "bodega@example.com".into(),
            name: None,
        })
        .await
        .expect("add manual recipient");

    let config = app
        .services
        .notifications
        .sync_users()
        .await
        .expect("sync users");

    let emails: Vec<&str> = config
        .extra_recipients
        .iter()
        .map(|r| r.email.as_str())
        .collect();
    assert!(emails.contains(&"bodega@example.com"));
    assert!(emails.contains(&admin.email.as_str()));
    assert!(emails.contains(&vendedor.email.as_str()));
    // Deactivated accounts are not pulled in.
    assert!(!emails.contains(&departed.email.as_str()));

    // Running it again adds nothing.
    let again = app
        .services
        .notifications
        .sync_users()
        .await
        .expect("second sync");
    assert_eq!(again.extra_recipients.len(), config.extra_recipients.len());
}

#[tokio::test]
async fn sync_users_endpoint_is_admin_only() {
    let app = TestApp::spawn().await;
    let admin = app.seed_user("admin").await;
    let vendedor = app.seed_user("vendedor").await;

    let post = |token: String| {
        Request::builder()
            .method("POST")
            .uri("/api/v1/notifications/sync-users")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request")
    };

    let res = app
        .router()
        .oneshot(post(app.token_for(&vendedor)))
        .await
        .expect("sync as vendedor");
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .router()
        .oneshot(post(app.token_for(&admin)))
        .await
        .expect("sync as admin");
    assert_eq!(res.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("body");
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    let recipients = value["extra_recipients"].as_array().expect("recipients");
    assert!(recipients
        .iter()
        .any(|r| r["email"] == admin.email.as_str()));
}
