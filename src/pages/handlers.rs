//! Logged-in pages and the protected downloads. Everything here fails closed
//! to the login page via [`PageAuth`].

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use axum_extra::extract::SignedCookieJar;
use tracing::{instrument, warn};

use crate::{
    session::{expired_cookie, PageAuth},
    state::AppState,
    store::UserRecord,
};

pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/home", get(home))
        .route("/explorar", get(explore))
        .route("/config", get(settings))
        .route("/user", get(profile))
        .route("/download/calculadora", get(download_calculator))
        .route("/download_snake_game", get(download_snake))
}

pub async fn home(auth: PageAuth) -> Html<String> {
    render_page(
        "NuksEdition",
        &format!("<h1>Bem-vindo, {}!</h1>", auth.user.username),
    )
}

pub async fn explore(auth: PageAuth) -> Html<String> {
    render_page(
        "NuksEdition - Explorar",
        &format!(
            "<h1>Explorar</h1><p>{}</p>\
             <a href=\"/download/calculadora\">Calculadora</a> \
             <a href=\"/download_snake_game\">Snake</a>",
            auth.user.username
        ),
    )
}

pub async fn settings(_auth: PageAuth) -> Html<String> {
    render_page("NuksEdition - Configurações", "<h1>Configurações</h1>")
}

#[instrument(skip(state, auth, jar))]
pub async fn profile(
    State(state): State<AppState>,
    auth: PageAuth,
    jar: SignedCookieJar,
) -> Response {
    let Some(record) = state.users.get(&auth.user.email).await else {
        // Account vanished underneath a live session; the login is stale.
        warn!(email = %auth.user.email, "profile for missing record, forcing logout");
        state.sessions.remove(auth.session_id).await;
        return (jar.remove(expired_cookie()), Redirect::to("/")).into_response();
    };
    render_profile(&record, &auth.user.email).into_response()
}

pub async fn download_calculator(State(state): State<AppState>, _auth: PageAuth) -> Response {
    stream_download(&state, "Calculadora.exe").await
}

pub async fn download_snake(State(state): State<AppState>, _auth: PageAuth) -> Response {
    stream_download(&state, "NuksEdition_Snake.exe").await
}

async fn stream_download(state: &AppState, file: &str) -> Response {
    let path = state.config.downloads_dir.join(file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (
                    header::CONTENT_TYPE,
                    "application/octet-stream".to_string(),
                ),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{file}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "download not available");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn render_page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><title>{title}</title></head><body>{body}\
         <nav><a href=\"/home\">Home</a> <a href=\"/explorar\">Explorar</a> \
         <a href=\"/config\">Configurações</a> <a href=\"/user\">Conta</a> \
         <a href=\"/logout\">Sair</a></nav></body></html>"
    ))
}

fn render_profile(record: &UserRecord, email: &str) -> Html<String> {
    render_page(
        "NuksEdition - Conta",
        &format!(
            "<h1>{}</h1><p>E-mail: {}</p><p>Conta criada em: {}</p>",
            record.username, email, record.created_on
        ),
    )
}
