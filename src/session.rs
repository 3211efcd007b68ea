//! Server-side sessions keyed by an opaque token in a signed cookie.
//!
//! The session is the state machine behind the registration and
//! account-maintenance flows: an optional login, an optional pending
//! registration, and one confirmation-code slot per maintenance flow.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait, extract::FromRequestParts, http::request::Parts, response::Redirect, Json,
};
use axum_extra::extract::cookie::{Cookie, Key, SignedCookieJar};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Login details kept while a browser is authenticated.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub username: String,
    pub email: String,
}

/// Candidate account held between registration submit and code confirmation.
/// Nothing is persisted until the code matches.
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub code: String,
}

/// Account-maintenance flows using the request-code/verify-code primitive.
/// Each flow owns one code slot; re-requesting overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeFlow {
    DeleteAccount,
    ChangeEmail,
    NewEmail,
    ChangePassword,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub auth: Option<Authenticated>,
    pub pending: Option<PendingRegistration>,
    pub codes: HashMap<CodeFlow, String>,
    /// Candidate address during the change-email flow.
    pub new_email: Option<String>,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.insert(id, Session::default());
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Session> {
        self.inner.read().await.get(&id).cloned()
    }

    /// Mutate the session under `id`; `None` when it does not exist.
    pub async fn with<R>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.inner.write().await.get_mut(&id).map(f)
    }

    pub async fn remove(&self, id: Uuid) {
        self.inner.write().await.remove(&id);
    }

    /// Reuse the live session named by the cookie, or mint a fresh one and
    /// set the cookie on the returned jar.
    pub async fn attach(&self, jar: SignedCookieJar) -> (SignedCookieJar, Uuid) {
        if let Some(id) = session_id(&jar) {
            if self.inner.read().await.contains_key(&id) {
                return (jar, id);
            }
        }
        let id = self.create().await;
        let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
            .path("/")
            .http_only(true)
            .build();
        (jar.add(cookie), id)
    }
}

/// Session token from the (signature-checked) cookie, if present.
pub fn session_id(jar: &SignedCookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok())
}

/// Removal cookie matching the one `attach` sets.
pub fn expired_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// JSON envelope shared by every flow endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok() -> Json<Self> {
        Json(Self {
            success: true,
            error: None,
        })
    }

    pub fn failed() -> Json<Self> {
        Json(Self {
            success: false,
            error: None,
        })
    }

    pub fn fail(error: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            error: Some(error.into()),
        })
    }
}

async fn authenticated(parts: &mut Parts, state: &AppState) -> Option<(Uuid, Authenticated)> {
    let jar = match SignedCookieJar::<Key>::from_request_parts(parts, state).await {
        Ok(jar) => jar,
        Err(err) => match err {},
    };
    let id = session_id(&jar)?;
    let session = state.sessions.get(id).await?;
    session.auth.map(|user| (id, user))
}

/// Guard for JSON endpoints. Missing cookie, dead session and anonymous
/// session all answer the same way.
#[derive(Debug)]
pub struct ApiAuth {
    pub session_id: Uuid,
    pub user: Authenticated,
}

#[async_trait]
impl FromRequestParts<AppState> for ApiAuth {
    type Rejection = Json<ApiResponse>;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match authenticated(parts, state).await {
            Some((session_id, user)) => Ok(Self { session_id, user }),
            None => {
                warn!("unauthenticated api request");
                Err(ApiResponse::fail("Not logged in"))
            }
        }
    }
}

/// Guard for page endpoints; anonymous browsers land on the login page.
#[derive(Debug)]
pub struct PageAuth {
    pub session_id: Uuid,
    pub user: Authenticated,
}

#[async_trait]
impl FromRequestParts<AppState> for PageAuth {
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match authenticated(parts, state).await {
            Some((session_id, user)) => Ok(Self { session_id, user }),
            None => Err(Redirect::to("/")),
        }
    }
}
