use super::PlatformClient;
use crate::{
    config::TelegramConfig,
    domain::{
        errors::PlatformError,
        fields::{InviteToken, UserId},
    },
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub chat_member: Option<ChatMemberUpdated>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub new_chat_members: Option<Vec<TgUser>>,
    #[serde(default)]
    pub left_chat_member: Option<TgUser>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Fields that mark a message generated by the chat itself rather than
/// written by its sender.
const SERVICE_FIELDS: &[&str] = &[
    "new_chat_title",
    "new_chat_photo",
    "delete_chat_photo",
    "group_chat_created",
    "supergroup_chat_created",
    "channel_chat_created",
    "migrate_to_chat_id",
    "migrate_from_chat_id",
    "pinned_message",
    "message_auto_delete_timer_changed",
    "video_chat_scheduled",
    "video_chat_started",
    "video_chat_ended",
    "video_chat_participants_invited",
    "forum_topic_created",
    "forum_topic_edited",
    "forum_topic_closed",
    "forum_topic_reopened",
    "general_forum_topic_hidden",
    "general_forum_topic_unhidden",
    "write_access_allowed",
    "users_shared",
    "chat_shared",
    "proximity_alert_triggered",
    "boost_added",
];

impl Message {
    /// Join, leave and other notices the platform posts on a user's behalf.
    pub fn is_service(&self) -> bool {
        self.new_chat_members.is_some()
            || self.left_chat_member.is_some()
            || SERVICE_FIELDS.iter().any(|field| self.other.contains_key(*field))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub old_chat_member: ChatMember,
    pub new_chat_member: ChatMember,
    #[serde(default)]
    pub invite_link: Option<ChatInviteLink>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ChatMember {
    pub user: TgUser,
    pub status: MemberStatus,
    /// Only sent for `restricted` members.
    #[serde(default)]
    pub is_member: Option<bool>,
}

impl ChatMember {
    pub fn is_present(&self) -> bool {
        match self.status {
            MemberStatus::Creator | MemberStatus::Administrator | MemberStatus::Member => true,
            MemberStatus::Restricted => self.is_member.unwrap_or(true),
            MemberStatus::Left | MemberStatus::Kicked => false,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ChatInviteLink {
    pub invite_link: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Escapes text for messages sent with the HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Bot API client.
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: Secret<String>,
    group_id: i64,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            group_id: config.group_id,
        }
    }

    /// Points the bot at `url`. Membership updates are only delivered when
    /// requested explicitly.
    pub async fn set_webhook(&self, url: &str, secret: &Secret<String>) -> Result<(), PlatformError> {
        let _: bool = self
            .call(
                "setWebhook",
                &json!({
                    "url": url,
                    "secret_token": secret.expose_secret(),
                    "allowed_updates": ["message", "chat_member"],
                }),
            )
            .await?;
        tracing::info!("webhook set up at {}", url);
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<T, PlatformError> {
        let url = format!("{}/bot{}/{}", self.api_base, self.token.expose_secret(), method);
        let response: ApiResponse<T> = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(PlatformError::Api(
                response
                    .description
                    .unwrap_or_else(|| format!("{} failed", method)),
            ));
        }
        response
            .result
            .ok_or_else(|| PlatformError::Api(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), PlatformError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_invite_link(&self, owner: UserId) -> Result<String, PlatformError> {
        let link: ChatInviteLink = self
            .call(
                "createChatInviteLink",
                &json!({
                    "chat_id": self.group_id,
                    "name": InviteToken::new(owner).inner(),
                    "creates_join_request": false,
                }),
            )
            .await?;
        tracing::info!("created invite link for user {}", owner);
        Ok(link.invite_link)
    }

    async fn lookup_user(&self, id: UserId) -> Result<String, PlatformError> {
        let chat: Chat = self
            .call("getChat", &json!({ "chat_id": id.inner() }))
            .await?;
        Ok(chat
            .username
            .map(|u| format!("@{}", u))
            .or(chat.first_name)
            .unwrap_or_else(|| id.to_string()))
    }
}
