mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, sea_query::Expr};
use serde_json::json;

use chatdesk::db::entities::subscription;
use chatdesk::services::signature;
use common::{PASSWORD, spawn_app};

#[tokio::test]
async fn health_check_responds() {
    let app = spawn_app().await;
    let res = app.call(Method::GET, "/api/health", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text, "OK");
}

#[tokio::test]
async fn register_login_and_me() {
    let app = spawn_app().await;
    let (token, body) = app.register("acme", "ada@acme.com").await;
    assert_eq!(body["subscription"]["status"], "TRIALING");
    assert_eq!(body["user"]["role"], "OWNER");

    let me = app.get("/api/auth/me", &token).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], "ada@acme.com");
    assert!(me.body.get("password_hash").is_none());

    let login = app.login("ADA@acme.com", PASSWORD).await;
    assert_eq!(login.status, StatusCode::OK);
    let cookie = login.headers[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));

    // The session cookie works in place of the bearer token.
    let session = cookie.split(';').next().unwrap().to_string();
    let req = Request::builder()
        .uri("/api/auth/me")
        .header(header::COOKIE, session)
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(req).await.status, StatusCode::OK);

    let anonymous = app.call(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let app = spawn_app().await;
    app.register("acme", "ada@acme.com").await;

    let res = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "company_name": "Other",
                "subdomain": "acme",
                "name": "Bob",
                "email": "bob@other.com",
                "password": PASSWORD,
            })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let availability = app.call(Method::GET, "/api/public/subdomains/acme", None, None).await;
    assert_eq!(availability.body["available"], false);
}

#[tokio::test]
async fn repeated_failures_lock_the_account() {
    let app = spawn_app().await;
    app.register("acme", "ada@acme.com").await;

    for _ in 0..5 {
        let res = app.login("ada@acme.com", "wrong-password").await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }
    let locked = app.login("ada@acme.com", PASSWORD).await;
    assert_eq!(locked.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(locked.body["code"], "RATE_LIMITED");
    assert!(locked.headers.contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn tenants_cannot_see_each_others_data() {
    let app = spawn_app().await;
    let (acme, _) = app.register("acme", "ada@acme.com").await;
    let (globex, _) = app.register("globex", "hank@globex.com").await;

    let bot = app.post("/api/bots", &acme, json!({ "name": "Support" })).await;
    assert_eq!(bot.status, StatusCode::CREATED);
    let bot_id = bot.body["id"].as_i64().unwrap();

    let foreign = app.get(&format!("/api/bots/{bot_id}"), &globex).await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);
    let listed = app.get("/api/bots", &globex).await;
    assert_eq!(listed.body.as_array().unwrap().len(), 0);

    let delete = app
        .call(Method::DELETE, &format!("/api/bots/{bot_id}"), Some(&globex), None)
        .await;
    assert_eq!(delete.status, StatusCode::NOT_FOUND);
    assert_eq!(app.get(&format!("/api/bots/{bot_id}"), &acme).await.status, StatusCode::OK);
}

#[tokio::test]
async fn token_is_rejected_on_another_tenants_host() {
    let app = spawn_app().await;
    let (acme, _) = app.register("acme", "ada@acme.com").await;
    app.register("globex", "hank@globex.com").await;

    let on_host = |host: &str| {
        Request::builder()
            .uri("/api/bots")
            .header(header::HOST, host)
            .header(header::AUTHORIZATION, format!("Bearer {acme}"))
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(app.send(on_host("acme.chatdesk.test")).await.status, StatusCode::OK);
    assert_eq!(app.send(on_host("globex.chatdesk.test")).await.status, StatusCode::FORBIDDEN);
    // Unknown subdomains are treated as the platform host.
    assert_eq!(app.send(on_host("nobody.chatdesk.test")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn viewers_are_read_only() {
    let app = spawn_app().await;
    let (owner, _) = app.register("acme", "ada@acme.com").await;

    let created = app
        .post(
            "/api/users",
            &owner,
            json!({ "email": "vic@acme.com", "name": "Vic", "password": PASSWORD, "role": "VIEWER" }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.text);

    let login = app.login("vic@acme.com", PASSWORD).await;
    let viewer = login.body["token"].as_str().unwrap().to_string();

    assert_eq!(app.get("/api/bots", &viewer).await.status, StatusCode::OK);
    let denied = app.post("/api/bots", &viewer, json!({ "name": "Nope" })).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.body["code"], "FORBIDDEN");
    assert_eq!(app.get("/api/billing", &viewer).await.status, StatusCode::FORBIDDEN);

    // Deactivation applies to tokens already issued.
    let vic_id = created.body["id"].as_i64().unwrap();
    let deactivated = app
        .call(
            Method::PUT,
            &format!("/api/users/{vic_id}/active"),
            Some(&owner),
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(deactivated.status, StatusCode::OK);
    assert_eq!(app.get("/api/bots", &viewer).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_trial_blocks_paid_actions() {
    let app = spawn_app().await;
    let (token, body) = app.register("acme", "ada@acme.com").await;
    let tenant_id = body["tenant"]["id"].as_i64().unwrap() as i32;

    subscription::Entity::update_many()
        .col_expr(
            subscription::Column::TrialEndsAt,
            Expr::value(Utc::now() - Duration::days(1)),
        )
        .filter(subscription::Column::TenantId.eq(tenant_id))
        .exec(&app.state.db_pool)
        .await
        .unwrap();

    let res = app.post("/api/bots", &token, json!({ "name": "Support" })).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["code"], "TRIAL_EXPIRED");

    let billing = app.get("/api/billing", &token).await;
    assert_eq!(billing.body["can_perform_paid_action"], false);
    // Reads still work.
    assert_eq!(app.get("/api/bots", &token).await.status, StatusCode::OK);
}

#[tokio::test]
async fn billing_webhook_requires_a_valid_signature() {
    let app = spawn_app().await;
    let (token, body) = app.register("acme", "ada@acme.com").await;
    let tenant_id = body["tenant"]["id"].as_i64().unwrap();

    let payload = json!({ "tenant_id": tenant_id, "event": "activated", "plan": "PRO" }).to_string();
    let webhook = |sig: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/api/billing/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Signature", sig)
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    let forged = app.send(webhook("deadbeef")).await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);

    let signed = signature::sign("whsec-test", payload.as_bytes());
    let accepted = app.send(webhook(&signed)).await;
    assert_eq!(accepted.status, StatusCode::OK, "{}", accepted.text);
    assert_eq!(accepted.body["status"], "ACTIVE");
    assert_eq!(accepted.body["plan"], "PRO");

    let notifications = app.get("/api/notifications?unread=true", &token).await;
    let kinds: Vec<&str> = notifications
        .body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"SUBSCRIPTION_ACTIVATED"));

    // Activating twice is not a valid transition.
    let again = app.send(webhook(&signed)).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn widget_chat_answers_from_the_knowledge_base() {
    let app = spawn_app().await;
    let (token, _) = app.register("acme", "ada@acme.com").await;

    let kb = app.post("/api/knowledge-bases", &token, json!({ "name": "Help" })).await;
    let kb_id = kb.body["id"].as_i64().unwrap();
    let faq = app
        .post(
            &format!("/api/knowledge-bases/{kb_id}/faqs"),
            &token,
            json!({ "question": "What are your opening hours?", "answer": "We are open 9 to 5." }),
        )
        .await;
    assert_eq!(faq.status, StatusCode::CREATED);

    let bot = app
        .post("/api/bots", &token, json!({ "name": "Support", "knowledge_base_id": kb_id }))
        .await;
    let bot_id = bot.body["id"].as_i64().unwrap();
    let widget = app
        .post(
            "/api/widgets",
            &token,
            json!({ "bot_id": bot_id, "name": "Shop", "allowed_domains": ["shop.acme.com"] }),
        )
        .await;
    assert_eq!(widget.status, StatusCode::CREATED, "{}", widget.text);
    let key = widget.body["public_key"].as_str().unwrap().to_string();

    let config = app.call(Method::GET, &format!("/api/public/widgets/{key}"), None, None).await;
    assert_eq!(config.status, StatusCode::OK);
    assert_eq!(config.body["bot_name"], "Support");

    let chat = |origin: &str| {
        Request::builder()
            .method(Method::POST)
            .uri(format!("/api/public/widgets/{key}/chat"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ORIGIN, origin)
            .body(Body::from(
                json!({ "session_id": "visitor-1", "message": "What are your opening hours?" }).to_string(),
            ))
            .unwrap()
    };

    let answered = app.send(chat("https://shop.acme.com")).await;
    assert_eq!(answered.status, StatusCode::OK, "{}", answered.text);
    assert_eq!(answered.body["reply"], "We are open 9 to 5.");

    let blocked = app.send(chat("https://evil.example")).await;
    assert_eq!(blocked.status, StatusCode::FORBIDDEN);

    let conversations = app.get("/api/conversations", &token).await;
    assert_eq!(conversations.body["total"], 1);
    assert_eq!(conversations.body["items"][0]["message_count"], 2);

    let script = app.call(Method::GET, &format!("/widget/{key}/embed.js"), None, None).await;
    assert_eq!(script.status, StatusCode::OK);
    assert!(script.headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/javascript"));
    assert!(script.text.contains(&key));

    let unknown = app.call(Method::GET, "/api/public/widgets/missing", None, None).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}
