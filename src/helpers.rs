//! Shared helper functions for handlers.

use serde::{Deserialize, Deserializer};
use tracing::error;
use validator::Validate;

use crate::credentials::PasswordService;
use crate::error::{ApiError, ApiResult};
use crate::store::{Store, StoreError, ValidationError};
use crate::AppState;

/// Runs a blocking store operation under the configured retry policy and maps
/// its failure onto an HTTP error.
pub async fn run_store<T, F>(state: &AppState, operation: &'static str, f: F) -> ApiResult<T>
where
    F: Fn(&Store) -> Result<T, StoreError> + Clone + Send + 'static,
    T: Send + 'static,
{
    state
        .store
        .run_with_retry(&state.retry, operation, f)
        .await
        .map_err(ApiError::from_store)
}

/// Runs a store operation exactly once. For inserts without a natural key,
/// where a retry after a lost acknowledgement would write the rows twice.
pub async fn run_store_once<T, F>(state: &AppState, operation: &'static str, f: F) -> ApiResult<T>
where
    F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    state
        .store
        .run(operation, f)
        .await
        .map_err(ApiError::from_store)
}

pub fn validate_payload<T: Validate>(payload: &T) -> ApiResult<()> {
    payload
        .validate()
        .map_err(|e| ApiError::from_store(ValidationError::from(e).into()))
}

/// Checks the password policy, then hashes with the configured cost.
pub fn hash_password(state: &AppState, password: &str) -> ApiResult<String> {
    if let Err(e) = state.password_policy.validate(password) {
        return Err(ApiError::from_store(
            ValidationError::field("password", e.to_string()).into(),
        ));
    }

    PasswordService::hash_password_with_cost(password, state.password_hash_cost).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
    })
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in patch payloads.
pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        description: Option<Option<String>>,
    }

    #[test]
    fn test_nullable_distinguishes_absent_and_null() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.description, None);

        let cleared: Patch = serde_json::from_str(r#"{"description":null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));

        let set: Patch = serde_json::from_str(r#"{"description":"x"}"#).unwrap();
        assert_eq!(set.description, Some(Some("x".to_string())));
    }
}
