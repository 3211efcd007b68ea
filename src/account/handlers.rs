//! Session-gated account maintenance: delete account, change email, change
//! password. Every flow follows the same primitive: mail a 6-digit code into
//! a flow-specific session slot, later compare a submitted code against it.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::SignedCookieJar;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    account::dto::{CodeRequest, NewEmailRequest, NewPasswordRequest},
    auth::{codes::generate_code, password::hash_password, MIN_PASSWORD_LEN},
    session::{expired_cookie, ApiAuth, ApiResponse, CodeFlow},
    state::AppState,
};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/send_delete_code", get(send_delete_code))
        .route("/verify_delete_code", post(verify_delete_code))
        .route("/send_change_email_code", get(send_change_email_code))
        .route("/verify_change_email_code", post(verify_change_email_code))
        .route("/send_new_email_code", post(send_new_email_code))
        .route("/verify_new_email_code", post(verify_new_email_code))
        .route("/send_change_password_code", get(send_change_password_code))
        .route(
            "/verify_change_password_code",
            post(verify_change_password_code),
        )
        .route("/update_password", post(update_password))
}

/// Generate a code into the flow's session slot, then mail it. The slot is
/// written before the send, so a failed send leaves the code armed (same as
/// the original flow).
async fn send_flow_code(
    state: &AppState,
    auth: &ApiAuth,
    flow: CodeFlow,
    recipient: &str,
    subject: &str,
    intro: &str,
) -> Json<ApiResponse> {
    let code = generate_code();
    state
        .sessions
        .with(auth.session_id, |s| {
            s.codes.insert(flow, code.clone());
        })
        .await;

    let body = format!("{intro}: {code}");
    match state.mailer.send(recipient, subject, &body).await {
        Ok(()) => ApiResponse::ok(),
        Err(e) => {
            error!(error = %e, flow = ?flow, "code email failed");
            ApiResponse::fail("Failed to send email")
        }
    }
}

async fn code_matches(state: &AppState, session_id: Uuid, flow: CodeFlow, submitted: &str) -> bool {
    state
        .sessions
        .get(session_id)
        .await
        .and_then(|s| s.codes.get(&flow).cloned())
        .map_or(false, |stored| stored == submitted)
}

#[instrument(skip(state, auth))]
pub async fn send_delete_code(State(state): State<AppState>, auth: ApiAuth) -> Json<ApiResponse> {
    send_flow_code(
        &state,
        &auth,
        CodeFlow::DeleteAccount,
        &auth.user.email,
        "Seu código de confirmação para exclusão de conta NuksEdition",
        "Seu código de confirmação para exclusão de conta é",
    )
    .await
}

#[instrument(skip(state, auth, jar, payload))]
pub async fn verify_delete_code(
    State(state): State<AppState>,
    auth: ApiAuth,
    jar: SignedCookieJar,
    Json(payload): Json<CodeRequest>,
) -> Response {
    if !code_matches(&state, auth.session_id, CodeFlow::DeleteAccount, &payload.code).await {
        return ApiResponse::failed().into_response();
    }

    if let Err(e) = state.users.remove(&auth.user.email).await {
        error!(error = %e, email = %auth.user.email, "delete account persist failed");
        return ApiResponse::fail("Internal error").into_response();
    }

    // Full logout: the session dies with the account.
    state.sessions.remove(auth.session_id).await;
    info!(email = %auth.user.email, "account deleted");
    (jar.remove(expired_cookie()), ApiResponse::ok()).into_response()
}

#[instrument(skip(state, auth))]
pub async fn send_change_email_code(
    State(state): State<AppState>,
    auth: ApiAuth,
) -> Json<ApiResponse> {
    send_flow_code(
        &state,
        &auth,
        CodeFlow::ChangeEmail,
        &auth.user.email,
        "Seu código de confirmação para alteração de e-mail NuksEdition",
        "Seu código de confirmação para alteração de e-mail é",
    )
    .await
}

/// Advisory only: the later steps of the flow never re-check this result.
/// Kept that way on purpose, matching the original behavior.
#[instrument(skip(state, auth, payload))]
pub async fn verify_change_email_code(
    State(state): State<AppState>,
    auth: ApiAuth,
    Json(payload): Json<CodeRequest>,
) -> Json<ApiResponse> {
    if code_matches(&state, auth.session_id, CodeFlow::ChangeEmail, &payload.code).await {
        ApiResponse::ok()
    } else {
        ApiResponse::failed()
    }
}

#[instrument(skip(state, auth, payload))]
pub async fn send_new_email_code(
    State(state): State<AppState>,
    auth: ApiAuth,
    Json(payload): Json<NewEmailRequest>,
) -> Json<ApiResponse> {
    let new_email = payload.new_email.trim().to_lowercase();
    if state.users.contains(&new_email).await {
        warn!(email = %new_email, "candidate email already registered");
        return ApiResponse::fail("email_exists");
    }

    let code = generate_code();
    state
        .sessions
        .with(auth.session_id, |s| {
            s.new_email = Some(new_email.clone());
            s.codes.insert(CodeFlow::NewEmail, code.clone());
        })
        .await;

    let body = format!("Seu código de confirmação para o novo e-mail é: {code}");
    match state
        .mailer
        .send(
            &new_email,
            "Seu código de confirmação para o novo e-mail NuksEdition",
            &body,
        )
        .await
    {
        Ok(()) => ApiResponse::ok(),
        Err(e) => {
            error!(error = %e, email = %new_email, "new email code failed");
            ApiResponse::fail("Failed to send email")
        }
    }
}

#[instrument(skip(state, auth, payload))]
pub async fn verify_new_email_code(
    State(state): State<AppState>,
    auth: ApiAuth,
    Json(payload): Json<CodeRequest>,
) -> Json<ApiResponse> {
    if !code_matches(&state, auth.session_id, CodeFlow::NewEmail, &payload.code).await {
        return ApiResponse::failed();
    }
    let Some(new_email) = state
        .sessions
        .get(auth.session_id)
        .await
        .and_then(|s| s.new_email)
    else {
        return ApiResponse::failed();
    };

    match state.users.rename(&auth.user.email, &new_email).await {
        Ok(true) => {
            state
                .sessions
                .with(auth.session_id, |s| {
                    if let Some(a) = s.auth.as_mut() {
                        a.email = new_email.clone();
                    }
                })
                .await;
            info!(old = %auth.user.email, new = %new_email, "email changed");
            ApiResponse::ok()
        }
        // The record vanished out of band; the original reports success
        // regardless, so keep that.
        Ok(false) => {
            warn!(email = %auth.user.email, "record missing during email change");
            ApiResponse::ok()
        }
        Err(e) => {
            error!(error = %e, "email change persist failed");
            ApiResponse::fail("Internal error")
        }
    }
}

#[instrument(skip(state, auth))]
pub async fn send_change_password_code(
    State(state): State<AppState>,
    auth: ApiAuth,
) -> Json<ApiResponse> {
    send_flow_code(
        &state,
        &auth,
        CodeFlow::ChangePassword,
        &auth.user.email,
        "Seu código de confirmação para alteração de senha NuksEdition",
        "Seu código de confirmação para alteração de senha é",
    )
    .await
}

/// Advisory only, same caveat as [`verify_change_email_code`]:
/// `/update_password` does not re-check it.
#[instrument(skip(state, auth, payload))]
pub async fn verify_change_password_code(
    State(state): State<AppState>,
    auth: ApiAuth,
    Json(payload): Json<CodeRequest>,
) -> Json<ApiResponse> {
    if code_matches(
        &state,
        auth.session_id,
        CodeFlow::ChangePassword,
        &payload.code,
    )
    .await
    {
        ApiResponse::ok()
    } else {
        ApiResponse::failed()
    }
}

#[instrument(skip(state, auth, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    auth: ApiAuth,
    Json(payload): Json<NewPasswordRequest>,
) -> Json<ApiResponse> {
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return ApiResponse::fail("Password too short");
    }

    let hash = match hash_password(&payload.new_password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return ApiResponse::fail("Internal error");
        }
    };
    match state
        .users
        .update(&auth.user.email, |u| u.password_hash = hash)
        .await
    {
        Ok(true) => {
            info!(email = %auth.user.email, "password changed");
            ApiResponse::ok()
        }
        Ok(false) => ApiResponse::fail("User not found"),
        Err(e) => {
            error!(error = %e, "password change persist failed");
            ApiResponse::fail("Internal error")
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        app::build_app,
        state::AppState,
        testutil::{body_json, get, location, login, post_json, register_and_confirm, send},
    };

    #[tokio::test]
    async fn maintenance_endpoints_require_a_login() {
        let (state, _mailer) = AppState::fake();
        let app = build_app(state);

        for uri in [
            "/send_delete_code",
            "/send_change_email_code",
            "/send_change_password_code",
        ] {
            let body = body_json(send(&app, get(uri, None)).await).await;
            assert_eq!(body["success"], false, "{uri}");
            assert_eq!(body["error"], "Not logged in", "{uri}");
        }

        for uri in [
            "/verify_delete_code",
            "/verify_change_email_code",
            "/verify_change_password_code",
            "/verify_new_email_code",
        ] {
            let body =
                body_json(send(&app, post_json(uri, "{\"code\":\"123456\"}", None)).await).await;
            assert_eq!(body["error"], "Not logged in", "{uri}");
        }
    }

    #[tokio::test]
    async fn delete_account_flow() {
        let (state, mailer) = AppState::fake();
        let app = build_app(state.clone());
        let cookie = register_and_confirm(&app, &mailer, "bob", "bob@x.com", "secret1").await;

        let body = body_json(send(&app, get("/send_delete_code", Some(&cookie))).await).await;
        assert_eq!(body["success"], true);
        let code = mailer.last_code().unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        // A mismatch leaves both the account and the session alone.
        let body = body_json(
            send(
                &app,
                post_json(
                    "/verify_delete_code",
                    &format!("{{\"code\":\"{wrong}\"}}"),
                    Some(&cookie),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(body["success"], false);
        assert!(state.users.contains("bob@x.com").await);

        let body = body_json(
            send(
                &app,
                post_json(
                    "/verify_delete_code",
                    &format!("{{\"code\":\"{code}\"}}"),
                    Some(&cookie),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(body["success"], true);
        assert!(!state.users.contains("bob@x.com").await);

        // Logging in with the deleted email reports exactly "not found".
        let res = login(&app, "bob@x.com", "secret1").await;
        assert_eq!(location(&res).as_deref(), Some("/?error=email_not_found"));

        // A second delete on the now-dead session answers uniformly.
        let body = body_json(
            send(
                &app,
                post_json(
                    "/verify_delete_code",
                    &format!("{{\"code\":\"{code}\"}}"),
                    Some(&cookie),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(body["error"], "Not logged in");
    }

    #[tokio::test]
    async fn change_email_flow_rekeys_the_record() {
        let (state, mailer) = AppState::fake();
        let app = build_app(state.clone());
        let cookie = register_and_confirm(&app, &mailer, "bob", "old@x.com", "secret1").await;

        // Step 1: advisory check against the current address.
        let body =
            body_json(send(&app, get("/send_change_email_code", Some(&cookie))).await).await;
        assert_eq!(body["success"], true);
        assert_eq!(mailer.sent().last().unwrap().to, "old@x.com");
        let code = mailer.last_code().unwrap();
        let body = body_json(
            send(
                &app,
                post_json(
                    "/verify_change_email_code",
                    &format!("{{\"code\":\"{code}\"}}"),
                    Some(&cookie),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(body["success"], true);

        // Step 2: code to the candidate address.
        let body = body_json(
            send(
                &app,
                post_json(
                    "/send_new_email_code",
                    "{\"new_email\":\"new@x.com\"}",
                    Some(&cookie),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(body["success"], true);
        assert_eq!(mailer.sent().last().unwrap().to, "new@x.com");
        let code = mailer.last_code().unwrap();

        // Step 3: confirm, record moves.
        let body = body_json(
            send(
                &app,
                post_json(
                    "/verify_new_email_code",
                    &format!("{{\"code\":\"{code}\"}}"),
                    Some(&cookie),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(body["success"], true);
        assert!(!state.users.contains("old@x.com").await);
        assert!(state.users.contains("new@x.com").await);

        let res = login(&app, "old@x.com", "secret1").await;
        assert_eq!(location(&res).as_deref(), Some("/?error=email_not_found"));
        let res = login(&app, "new@x.com", "secret1").await;
        assert_eq!(location(&res).as_deref(), Some("/home"));
    }

    #[tokio::test]
    async fn candidate_email_must_be_free() {
        let (state, mailer) = AppState::fake();
        let app = build_app(state);
        register_and_confirm(&app, &mailer, "eve", "taken@x.com", "secret1").await;
        let cookie = register_and_confirm(&app, &mailer, "bob", "bob@x.com", "secret1").await;
        let before = mailer.sent().len();

        let body = body_json(
            send(
                &app,
                post_json(
                    "/send_new_email_code",
                    "{\"new_email\":\"taken@x.com\"}",
                    Some(&cookie),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "email_exists");
        assert_eq!(mailer.sent().len(), before);
    }

    #[tokio::test]
    async fn change_password_flow() {
        let (state, mailer) = AppState::fake();
        let app = build_app(state);
        let cookie = register_and_confirm(&app, &mailer, "bob", "bob@x.com", "secret1").await;

        let body =
            body_json(send(&app, get("/send_change_password_code", Some(&cookie))).await).await;
        assert_eq!(body["success"], true);
        let code = mailer.last_code().unwrap();
        let body = body_json(
            send(
                &app,
                post_json(
                    "/verify_change_password_code",
                    &format!("{{\"code\":\"{code}\"}}"),
                    Some(&cookie),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(body["success"], true);

        let body = body_json(
            send(
                &app,
                post_json(
                    "/update_password",
                    "{\"new_password\":\"abc\"}",
                    Some(&cookie),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(body["error"], "Password too short");

        let body = body_json(
            send(
                &app,
                post_json(
                    "/update_password",
                    "{\"new_password\":\"secret2\"}",
                    Some(&cookie),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(body["success"], true);

        let res = login(&app, "bob@x.com", "secret1").await;
        assert_eq!(location(&res).as_deref(), Some("/?error=wrong_password"));
        let res = login(&app, "bob@x.com", "secret2").await;
        assert_eq!(location(&res).as_deref(), Some("/home"));
    }

    #[tokio::test]
    async fn update_password_for_a_vanished_record() {
        let (state, mailer) = AppState::fake();
        let app = build_app(state.clone());
        let cookie = register_and_confirm(&app, &mailer, "bob", "bob@x.com", "secret1").await;

        // Deleted out of band, session still alive.
        state.users.remove("bob@x.com").await.unwrap();

        let body = body_json(
            send(
                &app,
                post_json(
                    "/update_password",
                    "{\"new_password\":\"secret2\"}",
                    Some(&cookie),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "User not found");
    }
}
