use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::SignedCookieJar;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        codes::generate_code,
        dto::{ConfirmCodeRequest, ErrorQuery, LoginForm, RegisterForm},
        password::{hash_password, verify_password},
        MIN_PASSWORD_LEN,
    },
    session::{
        expired_cookie, session_id, ApiResponse, Authenticated, PendingRegistration, Session,
    },
    state::AppState,
    store::UserRecord,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(login_page).post(login))
        .route("/cadastro", get(register_page).post(register))
        .route("/confirmar", get(confirm_page))
        .route("/verificar-codigo", post(verify_registration_code))
        .route("/reenviar-codigo", post(resend_registration_code))
        .route("/logout", get(logout))
}

#[instrument(skip(state, jar, query))]
pub async fn login_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<ErrorQuery>,
) -> Html<String> {
    // Landing back on the login page abandons any half-done registration.
    if let Some(id) = session_id(&jar) {
        state.sessions.with(id, |s| s.pending = None).await;
    }
    Html(render_login(query.error.as_deref()))
}

#[instrument(skip(state, jar, form))]
pub async fn login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(mut form): Form<LoginForm>,
) -> Response {
    form.email = form.email.trim().to_lowercase();

    // Unknown email and wrong password are deliberately distinct outcomes.
    let Some(user) = state.users.get(&form.email).await else {
        warn!(email = %form.email, "login unknown email");
        return Redirect::to("/?error=email_not_found").into_response();
    };

    let ok = match verify_password(&form.password, &user.password_hash) {
        Ok(ok) => ok,
        Err(e) => {
            error!(error = %e, "verify_password failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    if !ok {
        warn!(email = %form.email, "login wrong password");
        return Redirect::to("/?error=wrong_password").into_response();
    }

    let (jar, id) = state.sessions.attach(jar).await;
    state
        .sessions
        .with(id, |s| {
            s.auth = Some(Authenticated {
                username: user.username.clone(),
                email: form.email.clone(),
            });
        })
        .await;

    info!(email = %form.email, "user logged in");
    (jar, Redirect::to("/home")).into_response()
}

pub async fn register_page(Query(query): Query<ErrorQuery>) -> Html<String> {
    Html(render_register(query.error.as_deref()))
}

#[instrument(skip(state, jar, form))]
pub async fn register(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(mut form): Form<RegisterForm>,
) -> Response {
    form.email = form.email.trim().to_lowercase();

    if form.password.len() < MIN_PASSWORD_LEN {
        warn!("registration password too short");
        return Redirect::to("/cadastro?error=password_too_short").into_response();
    }
    if state.users.contains(&form.email).await {
        warn!(email = %form.email, "registration email already taken");
        return Redirect::to("/cadastro?error=email_exists").into_response();
    }

    let code = generate_code();
    let body = format!(
        "Olá {}, seu código de confirmação é: {}",
        form.username, code
    );
    // Send first. Only a delivered (well, accepted) code leaves pending
    // state behind; a send failure aborts with nothing to clean up.
    if let Err(e) = state
        .mailer
        .send(&form.email, "Seu código de confirmação NuksEdition", &body)
        .await
    {
        error!(error = %e, email = %form.email, "confirmation email failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Ocorreu um erro ao enviar o e-mail de confirmação.",
        )
            .into_response();
    }

    let (jar, id) = state.sessions.attach(jar).await;
    state
        .sessions
        .with(id, |s| {
            s.pending = Some(PendingRegistration {
                username: form.username.clone(),
                email: form.email.clone(),
                password: form.password.clone(),
                code,
            });
        })
        .await;

    info!(email = %form.email, "registration pending confirmation");
    (jar, Redirect::to("/confirmar")).into_response()
}

#[instrument(skip(state, jar))]
pub async fn confirm_page(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let pending = match session_id(&jar) {
        Some(id) => state.sessions.get(id).await.and_then(|s| s.pending),
        None => None,
    };
    match pending {
        Some(p) => Html(render_confirm(&p.email)).into_response(),
        None => Redirect::to("/cadastro").into_response(),
    }
}

#[instrument(skip(state, jar, payload))]
pub async fn verify_registration_code(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Json(payload): Json<ConfirmCodeRequest>,
) -> Json<ApiResponse> {
    let Some(id) = session_id(&jar) else {
        return ApiResponse::fail("session_expired");
    };
    let Some(pending) = state.sessions.get(id).await.and_then(|s| s.pending) else {
        return ApiResponse::fail("session_expired");
    };

    if payload.codigo != pending.code {
        warn!(email = %pending.email, "registration code mismatch");
        return ApiResponse::fail("Código incorreto");
    }

    // The account exists only from here on.
    let hash = match hash_password(&pending.password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return ApiResponse::fail("Internal error");
        }
    };
    let record = UserRecord {
        id: Uuid::new_v4().to_string(),
        username: pending.username.clone(),
        password_hash: hash,
        created_on: creation_date(),
    };
    if let Err(e) = state.users.put(&pending.email, record).await {
        error!(error = %e, email = %pending.email, "persisting new account failed");
        return ApiResponse::fail("Internal error");
    }

    // Fresh session: every transient field gone, only the login survives.
    state
        .sessions
        .with(id, |s| {
            *s = Session::default();
            s.auth = Some(Authenticated {
                username: pending.username.clone(),
                email: pending.email.clone(),
            });
        })
        .await;

    info!(email = %pending.email, "account confirmed and created");
    ApiResponse::ok()
}

#[instrument(skip(state, jar))]
pub async fn resend_registration_code(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Json<ApiResponse> {
    let Some(id) = session_id(&jar) else {
        return ApiResponse::fail("Session expired");
    };
    let Some(pending) = state.sessions.get(id).await.and_then(|s| s.pending) else {
        return ApiResponse::fail("Session expired");
    };

    // Overwrite first: the previous code is dead whether or not the new
    // one reaches the inbox.
    let code = generate_code();
    state
        .sessions
        .with(id, |s| {
            if let Some(p) = s.pending.as_mut() {
                p.code = code.clone();
            }
        })
        .await;

    let body = format!(
        "Olá {}, seu novo código de confirmação é: {}",
        pending.username, code
    );
    match state
        .mailer
        .send(
            &pending.email,
            "Seu novo código de confirmação NuksEdition",
            &body,
        )
        .await
    {
        Ok(()) => ApiResponse::ok(),
        Err(e) => {
            error!(error = %e, email = %pending.email, "resend failed");
            ApiResponse::fail("Failed to send email")
        }
    }
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> (SignedCookieJar, Redirect) {
    let jar = match session_id(&jar) {
        Some(id) => {
            state.sessions.remove(id).await;
            jar.remove(expired_cookie())
        }
        None => jar,
    };
    (jar, Redirect::to("/"))
}

fn creation_date() -> String {
    let today = OffsetDateTime::now_utc().date();
    format!(
        "{:02}/{:02}/{:04}",
        today.day(),
        u8::from(today.month()),
        today.year()
    )
}

fn render_login(error: Option<&str>) -> String {
    let banner = match error {
        Some("email_not_found") => "<p class=\"error\">E-mail não encontrado.</p>",
        Some("wrong_password") => "<p class=\"error\">Senha incorreta.</p>",
        Some(_) => "<p class=\"error\">Não foi possível entrar.</p>",
        None => "",
    };
    format!(
        "<!doctype html><html><head><title>NuksEdition - Login</title></head><body>{banner}\
         <form method=\"post\" action=\"/\">\
         <input name=\"email\" type=\"email\" placeholder=\"E-mail\" required>\
         <input name=\"password\" type=\"password\" placeholder=\"Senha\" required>\
         <button type=\"submit\">Entrar</button></form>\
         <a href=\"/cadastro\">Criar conta</a></body></html>"
    )
}

fn render_register(error: Option<&str>) -> String {
    let banner = match error {
        Some("password_too_short") => "<p class=\"error\">A senha precisa de pelo menos 6 caracteres.</p>",
        Some("email_exists") => "<p class=\"error\">Este e-mail já está cadastrado.</p>",
        Some(_) => "<p class=\"error\">Não foi possível cadastrar.</p>",
        None => "",
    };
    format!(
        "<!doctype html><html><head><title>NuksEdition - Cadastro</title></head><body>{banner}\
         <form method=\"post\" action=\"/cadastro\">\
         <input name=\"username\" placeholder=\"Usuário\" required>\
         <input name=\"email\" type=\"email\" placeholder=\"E-mail\" required>\
         <input name=\"password\" type=\"password\" placeholder=\"Senha\" required>\
         <button type=\"submit\">Cadastrar</button></form></body></html>"
    )
}

fn render_confirm(email: &str) -> String {
    format!(
        "<!doctype html><html><head><title>NuksEdition - Confirmação</title></head><body>\
         <p>Enviamos um código de 6 dígitos para {email}.</p>\
         <input id=\"codigo\" maxlength=\"6\" placeholder=\"000000\">\
         <button id=\"verificar\">Verificar</button>\
         <button id=\"reenviar\">Reenviar código</button></body></html>"
    )
}
