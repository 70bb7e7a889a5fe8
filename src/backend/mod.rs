//! Conversational backends behind one capability trait

pub mod analyst;
pub mod dashscope;
pub mod platform;

use async_trait::async_trait;

use crate::config::BackendKind;
use crate::error::Result;
use crate::models::{BackendRequest, SessionConnection};

pub use analyst::{AnalystBackend, AnalystReply};
pub use dashscope::{DashScopeBackend, GenerationResponse};
pub use platform::{GatewayForwarder, PlatformApi, PlatformRequest, PlatformResponse};

#[cfg(test)]
use mockall::automock;

/// A backend reply in the backend's own shape. Converted to the canonical
/// shape by [`crate::translate::translate`].
#[derive(Debug, Clone)]
pub enum RawReply {
    ChatLlm(GenerationResponse),
    Analyst(AnalystReply),
}

/// Capability shared by every conversational backend.
///
/// Each implementation owns its transport and credentials. The session is
/// passed on every call because the analyst backend authenticates with the
/// caller's active connection; backends that hold their own key ignore it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BackendClient: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Single prompt in, plain text out.
    async fn complete(
        &self,
        session: &SessionConnection,
        prompt: &str,
        model: &str,
    ) -> Result<String>;

    /// Full conversation in, native reply out.
    async fn chat(&self, session: &SessionConnection, request: &BackendRequest)
    -> Result<RawReply>;
}
