//! Unit tests for bearer credential loading.
//!
//! Keychain entries for these keys are absent in test environments, so every
//! lookup falls through to the env var.
//!
//! NOTE: These tests mutate process-global env vars and must run serially.

use tasksync::auth::{Authenticator, StaticToken};
use tasksync::config::load_credential;
use tasksync::AppError;

const KEY: &str = "tasksync_test_absent_entry";
const ENV: &str = "TASKSYNC_TEST_CREDENTIAL";

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn env_var_fallback_supplies_token() {
    unsafe {
        std::env::set_var(ENV, "env-token");
    }

    let token = load_credential(KEY, ENV).await;

    unsafe {
        std::env::remove_var(ENV);
    }
    assert_eq!(token.unwrap(), "env-token");
}

/// A missing credential names both sources in the error.
#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn missing_credential_names_both_sources() {
    unsafe {
        std::env::remove_var(ENV);
    }

    let err = load_credential(KEY, ENV).await.unwrap_err();

    assert!(matches!(err, AppError::Credential(_)));
    let message = err.to_string();
    assert!(message.contains(KEY), "{message}");
    assert!(message.contains(ENV), "{message}");
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn empty_env_var_counts_as_missing() {
    unsafe {
        std::env::set_var(ENV, "");
    }

    let result = load_credential(KEY, ENV).await;

    unsafe {
        std::env::remove_var(ENV);
    }
    assert!(matches!(result, Err(AppError::Credential(_))));
}

#[tokio::test]
async fn static_token_yields_value_or_credential_error() {
    assert_eq!(StaticToken::new("abc").access_token().await.unwrap(), "abc");
    assert!(matches!(
        StaticToken::new("").access_token().await,
        Err(AppError::Credential(_))
    ));
}
