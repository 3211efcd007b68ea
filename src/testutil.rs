//! Request helpers for the router-level flow tests.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response};
use axum::Router;
use tower::ServiceExt;

use crate::mailer::RecordingMailer;

fn request(method: &str, uri: &str, cookie: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    request("GET", uri, cookie).body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    request("POST", uri, cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_json(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    request("POST", uri, cookie)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

/// `name=value` pair of the session cookie a response sets, if any.
pub fn session_cookie(res: &Response<Body>) -> Option<String> {
    res.headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn location(res: &Response<Body>) -> Option<String> {
    res.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn body_json(res: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Drive the whole registration flow; returns the authenticated session
/// cookie.
pub async fn register_and_confirm(
    app: &Router,
    mailer: &RecordingMailer,
    username: &str,
    email: &str,
    password: &str,
) -> String {
    let res = send(
        app,
        post_form(
            "/cadastro",
            &format!("username={username}&email={email}&password={password}"),
            None,
        ),
    )
    .await;
    assert_eq!(location(&res).as_deref(), Some("/confirmar"));
    let cookie = session_cookie(&res).expect("registration sets a session cookie");
    let code = mailer.last_code().expect("confirmation code was mailed");

    let res = send(
        app,
        post_json(
            "/verificar-codigo",
            &format!("{{\"codigo\":\"{code}\"}}"),
            Some(&cookie),
        ),
    )
    .await;
    let body = body_json(res).await;
    assert_eq!(body["success"], true, "confirmation failed: {body}");
    cookie
}

pub async fn login(app: &Router, email: &str, password: &str) -> Response<Body> {
    send(
        app,
        post_form("/", &format!("email={email}&password={password}"), None),
    )
    .await
}
