//! Platform permission probing
//!
//! Optional capability supplied by the host platform. The recording
//! orchestrator consults it before opening the microphone.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    Microphone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// Not decided yet; asking may succeed
    Prompt,
    /// The platform has no such capability
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResult {
    pub status: PermissionStatus,
    pub can_request: bool,
}

#[async_trait::async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn check(&self, permission: PermissionType) -> PermissionResult;

    async fn request(&self, permission: PermissionType) -> PermissionResult;
}

/// Check `permission`, asking for it when the platform allows a prompt.
pub async fn ensure_permission(
    resolver: &dyn PermissionResolver,
    permission: PermissionType,
) -> PermissionResult {
    let current = resolver.check(permission).await;
    if current.status == PermissionStatus::Prompt && current.can_request {
        return resolver.request(permission).await;
    }
    current
}
