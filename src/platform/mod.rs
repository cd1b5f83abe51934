//! Chat platform collaborator: message delivery, invite links, display names.
//!
//! Nothing here is part of the referral bookkeeping; every failure is
//! cosmetic to the caller.

pub mod telegram;

use crate::domain::{errors::PlatformError, fields::UserId};
use async_trait::async_trait;

pub use telegram::TelegramClient;

#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), PlatformError>;

    /// Issues a group invite link named after `owner`'s invite token.
    async fn create_invite_link(&self, owner: UserId) -> Result<String, PlatformError>;

    async fn lookup_user(&self, id: UserId) -> Result<String, PlatformError>;
}
