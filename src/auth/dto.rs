use serde::Deserialize;

/// Login form posted to `/`.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form posted to `/cadastro`.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Body of `/verificar-codigo`. The field name is fixed by the frontend.
#[derive(Debug, Deserialize)]
pub struct ConfirmCodeRequest {
    pub codigo: String,
}

/// `?error=` banner carried back to the login and registration pages.
#[derive(Debug, Deserialize)]
pub struct ErrorQuery {
    pub error: Option<String>,
}
