use async_trait::async_trait;

use crate::repository::RepoError;

/// Push transport for per-user messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> Result<(), RepoError>;
}

/// Per-user channel name, derived from the owning user id.
pub fn destination_for(user_id: i64) -> String {
    format!("/user/{}/queue/notifications", user_id)
}

/// Inverse of [`destination_for`].
pub fn user_of_destination(destination: &str) -> Option<i64> {
    destination
        .strip_prefix("/user/")?
        .strip_suffix("/queue/notifications")?
        .parse()
        .ok()
}
