use axum::http::{HeaderMap, header::AUTHORIZATION};

use crate::{dao::models::UserEntity, error::ServiceError, state::SharedState};

/// Caller identity attached to authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    /// User id.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl From<UserEntity> for CurrentUser {
    fn from(value: UserEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
        }
    }
}

/// Extract the credential from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// Resolve a bearer credential to a user.
pub async fn authenticate(state: &SharedState, token: &str) -> Result<CurrentUser, ServiceError> {
    let store = state.require_store().await?;
    store
        .find_user_by_token(token.to_string())
        .await?
        .map(CurrentUser::from)
        .ok_or_else(|| ServiceError::Unauthorized("invalid credential".into()))
}
