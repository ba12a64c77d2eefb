use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

pub const MAX_FILENAME_LEN: usize = 255;
pub const MIN_PASSWORD_LEN: usize = 6;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static username regex"));

/// User-facing input problems. Raised before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Filename cannot be empty")]
    EmptyFilename,
    #[error("Filename cannot contain slashes")]
    FilenameSlash,
    #[error("Filename cannot start with a dot")]
    FilenameDot,
    #[error("Filename is too long")]
    FilenameTooLong,
    #[error("Name cannot be empty")]
    EmptyName,
    #[error("Please fill in all fields")]
    MissingCredentials,
    #[error("Username can only contain letters, numbers, and underscores")]
    InvalidUsername,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("No code to run")]
    EmptyCode,
}

pub fn validate_filename(filename: &str) -> Result<(), ValidationError> {
    if filename.trim().is_empty() {
        return Err(ValidationError::EmptyFilename);
    }
    if filename.contains('/') || filename.contains('\\') {
        return Err(ValidationError::FilenameSlash);
    }
    if filename.starts_with('.') {
        return Err(ValidationError::FilenameDot);
    }
    if filename.chars().count() > MAX_FILENAME_LEN {
        return Err(ValidationError::FilenameTooLong);
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        Err(ValidationError::EmptyName)
    } else {
        Ok(())
    }
}

/// Checks sign-in / sign-up input. `confirm` is only given for sign-up.
pub fn validate_credentials(
    username: &str,
    password: &str,
    confirm: Option<&str>,
) -> Result<(), ValidationError> {
    if username.is_empty() || password.is_empty() {
        return Err(ValidationError::MissingCredentials);
    }
    if !USERNAME_RE.is_match(username) {
        return Err(ValidationError::InvalidUsername);
    }
    if let Some(confirm) = confirm
        && confirm != password
    {
        return Err(ValidationError::PasswordMismatch);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}
