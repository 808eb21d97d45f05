use uuid::Uuid;

use crate::helpers::TestApp;

/// Test user holding a valid bearer token.
pub struct TestUser {
    pub user_id: Uuid,
    pub token: String,
}

/// Issue a token for a fresh user id.
pub fn register_test_user(app: &TestApp) -> TestUser {
    let user_id = Uuid::new_v4();
    let token = app
        .state
        .jwt
        .issue_token(user_id, chrono::Duration::hours(1))
        .expect("Failed to issue token");
    TestUser { user_id, token }
}

pub fn bearer(user: &TestUser) -> String {
    format!("Bearer {}", user.token)
}
