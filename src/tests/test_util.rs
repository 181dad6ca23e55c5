use std::sync::{Arc, Once};
use uuid::Uuid;

use crate::core::config::AppConfig;
use crate::core::middleware::issue_token;
use crate::core::shared::state::AppState;

pub const TEST_JWT_SECRET: &str = "test-secret";

static INIT: Once = Once::new();

pub fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Fresh in-memory application state.
pub fn test_state() -> Arc<AppState> {
    test_state_with(AppConfig::in_memory(TEST_JWT_SECRET))
}

pub fn test_state_with(config: AppConfig) -> Arc<AppState> {
    setup();
    Arc::new(AppState::in_memory(config))
}

/// `Authorization` header value for a new user of `company_id`.
pub fn bearer_for(state: &AppState, company_id: Uuid) -> String {
    match issue_token(&state.config.auth, Uuid::new_v4(), company_id, None) {
        Ok(token) => format!("Bearer {token}"),
        Err(e) => panic!("Failed to issue test token: {e}"),
    }
}

#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("Expected Ok, got Err: {:?}", err),
        }
    };
}
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(val) => panic!("Expected Err, got Ok: {:?}", val),
            Err(err) => err,
        }
    };
}
