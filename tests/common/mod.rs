#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use chatdesk::db;
use chatdesk::server::config::ServerConfig;
use chatdesk::services::reply::KnowledgeResponder;
use chatdesk::web::{AppState, create_axum_router};

pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

pub async fn spawn_app() -> TestApp {
    let config = Arc::new(ServerConfig::for_tests());
    let pool = db::connect_and_prepare(&config.database_url)
        .await
        .expect("in-memory database");
    let state = Arc::new(AppState::with_generator(pool, config, Arc::new(KnowledgeResponder)));
    TestApp {
        router: create_axum_router(state.clone()),
        state,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response {
        let response = self.router.clone().oneshot(req).await.expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Response {
            status,
            headers,
            body,
            text,
        }
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response {
        self.call(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Response {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Registers a workspace and returns the owner's token and the response body.
    pub async fn register(&self, subdomain: &str, email: &str) -> (String, Value) {
        let res = self
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "company_name": format!("{subdomain} Inc"),
                    "subdomain": subdomain,
                    "name": "Owner",
                    "email": email,
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.text);
        let token = res.body["token"].as_str().expect("token").to_string();
        (token, res.body)
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }
}
