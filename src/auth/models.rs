//! Response shapes of the Thingbox API

use serde::{Deserialize, Serialize};

use crate::serde_utils::string_or_number;

/// Items and templates travel as opaque JSON
pub type Item = serde_json::Value;
pub type Template = serde_json::Value;

/// Response of `GET /auth`: a fresh session token plus where to send the user
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SignInResponse {
    pub token: String,
    pub redirect_url: String,
}

/// The signed-in user, as reported by `GET /user`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub screen_name: String,
    #[serde(with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PublicKeyResponse {
    pub public_key_b58: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdminTokenResponse {
    pub admin_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClearedResponse {
    pub cleared: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SuccessResponse {
    pub success: bool,
}
