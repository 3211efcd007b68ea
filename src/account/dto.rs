use serde::Deserialize;

/// Submitted confirmation code for the maintenance flows.
#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

/// Candidate address for the change-email flow.
#[derive(Debug, Deserialize)]
pub struct NewEmailRequest {
    pub new_email: String,
}

/// Replacement password for `/update_password`.
#[derive(Debug, Deserialize)]
pub struct NewPasswordRequest {
    pub new_password: String,
}
