use serde::Deserialize;

use crate::db::Role;

/// Partial account update. The username is not exposed for change here;
/// role and password edits go through in plaintext, as the admin screen
/// expects.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub password: Option<String>,
    pub role: Option<Role>,
    pub name: Option<String>,
    pub email: Option<String>,
}
