//! Routes platform updates to the event processor and answers bot commands.

use crate::{
    domain::{
        errors::ProcessError,
        events::MembershipEvent,
        fields::{InviteToken, UserId},
        model::LeaderboardEntry,
    },
    notifier::Notifier,
    platform::{
        telegram::{ChatMemberUpdated, Message, Update},
        PlatformClient,
    },
    processor::EventProcessor,
};
use std::sync::Arc;

pub struct Bot {
    processor: Arc<EventProcessor>,
    notifier: Arc<Notifier>,
    platform: Arc<dyn PlatformClient>,
    group_id: i64,
    leaderboard_limit: i64,
}

/// Maps a membership change in the tracked group to an event.
///
/// Updates from other chats and updates whose status did not change map to
/// nothing.
pub fn membership_event(change: &ChatMemberUpdated, group_id: i64) -> Option<MembershipEvent> {
    if change.chat.id != group_id {
        return None;
    }

    let user_id = UserId::from(change.new_chat_member.user.id);
    let was_present = change.old_chat_member.is_present();
    let is_present = change.new_chat_member.is_present();

    match (was_present, is_present) {
        (false, true) => {
            let token = change
                .invite_link
                .as_ref()
                .and_then(|link| link.name.clone())
                .map(InviteToken::from);
            Some(MembershipEvent::join(user_id, token))
        }
        (true, false) => Some(MembershipEvent::leave(user_id)),
        _ => {
            tracing::debug!(
                "skipping status update {:?} -> {:?} for user {}",
                change.old_chat_member.status,
                change.new_chat_member.status,
                user_id
            );
            None
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Leaderboard,
    MyReferrals,
}

impl Command {
    /// Parses `/name`, `/name@bot` and `/name args`.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?.strip_prefix('/')?;
        let name = word.split('@').next()?;
        match name.to_lowercase().as_str() {
            "start" => Some(Self::Start),
            "leaderboard" => Some(Self::Leaderboard),
            "myreferrals" => Some(Self::MyReferrals),
            _ => None,
        }
    }
}

pub fn format_leaderboard(entries: &[(LeaderboardEntry, String)]) -> String {
    if entries.is_empty() {
        return "No referrals yet! Be the first to invite someone! 🎯".to_string();
    }

    let mut text = String::from("🏆 <b>Top Inviters</b> 🏆\n\n");
    for (rank, (entry, name)) in entries.iter().enumerate() {
        let medal = match rank {
            0 => "🥇",
            1 => "🥈",
            2 => "🥉",
            _ => "👤",
        };
        text.push_str(&format!(
            "{} {}. {}: {} active referrals\n",
            medal,
            rank + 1,
            name,
            entry.active_count
        ));
    }
    text
}

impl Bot {
    pub fn new(
        processor: Arc<EventProcessor>,
        notifier: Arc<Notifier>,
        platform: Arc<dyn PlatformClient>,
        group_id: i64,
        leaderboard_limit: i64,
    ) -> Self {
        Self {
            processor,
            notifier,
            platform,
            group_id,
            leaderboard_limit,
        }
    }

    /// Handles one update. Errors are those worth a redelivery.
    pub async fn handle(&self, update: Update) -> Result<(), ProcessError> {
        if let Some(change) = update.chat_member.as_ref() {
            if let Some(event) = membership_event(change, self.group_id) {
                self.apply(&event).await?;
            }
        }

        if let Some(message) = update.message {
            self.handle_message(message).await?;
        }

        Ok(())
    }

    async fn apply(&self, event: &MembershipEvent) -> Result<(), ProcessError> {
        let outcome = self.processor.apply(event).await?;
        self.notifier.notify(&outcome).await;
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Result<(), ProcessError> {
        let Some(from) = message.from.as_ref() else {
            return Ok(());
        };
        if from.is_bot {
            return Ok(());
        }
        if message.is_service() {
            tracing::debug!("ignoring service message from {}", from.id);
            return Ok(());
        }
        let private = message.chat.is_private();
        if !private && message.chat.id != self.group_id {
            return Ok(());
        }

        let user_id = UserId::from(from.id);
        self.apply(&MembershipEvent::first_interaction(user_id))
            .await?;

        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            return Ok(());
        };
        tracing::info!("user {} sent {:?}", user_id, command);

        let reply = match command {
            Command::Start if private => self.start(user_id).await,
            Command::Start => {
                "📱 <b>Get your referral link in private!</b>\n👉 Send me /start in a private chat."
                    .to_string()
            }
            Command::Leaderboard => self.leaderboard().await,
            Command::MyReferrals => self.my_referrals(user_id).await,
        };
        self.reply(message.chat.id, &reply).await;
        Ok(())
    }

    async fn start(&self, user_id: UserId) -> String {
        if let Err(e) = self.processor.ensure_user(user_id).await {
            tracing::error!("could not register user {} >>> {:?}", user_id, e);
            return "❌ <b>Error!</b>\n\nPlease try again later.".to_string();
        }

        match self.platform.create_invite_link(user_id).await {
            Ok(link) => format!(
                "🎉 <b>Welcome to the Referral Program!</b> 🎉\n\n\
                 📱 <b>Your unique invite link:</b>\n{}\n\n\
                 🔥 Share this link to invite others to the group!\n\n\
                 📊 <b>Available Commands:</b>\n\
                 👉 /start - Get a new invite link\n\
                 👉 /leaderboard - View top inviters\n\
                 👉 /myreferrals - Check your referral count\n\n\
                 ✨ <i>You'll get notified when someone you invited becomes active!</i>",
                link
            ),
            Err(e) => {
                tracing::error!("error creating invite link for {} >>> {}", user_id, e);
                "❌ <b>Error!</b>\n\n\
                 Could not create an invite link. Please ensure the bot is an admin \
                 in the group and can invite users via link."
                    .to_string()
            }
        }
    }

    async fn leaderboard(&self) -> String {
        let entries = match self
            .processor
            .store()
            .leaderboard(self.leaderboard_limit)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("error showing leaderboard >>> {:?}", e);
                return "❌ Error fetching leaderboard. Please try again later.".to_string();
            }
        };

        let mut named = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = self.notifier.display_name(entry.user_id).await;
            named.push((entry, name));
        }
        format_leaderboard(&named)
    }

    async fn my_referrals(&self, user_id: UserId) -> String {
        let store = self.processor.store();
        let stats = async {
            let total = store.total_referrals(user_id).await?;
            let active = store.active_referrals(user_id).await?;
            Ok::<_, crate::domain::errors::DatabaseError>((total, active))
        };

        match stats.await {
            Ok((total, active)) => format!(
                "📊 <b>Your Referral Stats</b>\n\n\
                 👥 Total Referrals: {}\n\
                 ✅ Active Referrals: {}\n\n\
                 Use /start to get a new invite link!",
                total, active
            ),
            Err(e) => {
                tracing::error!("error showing referral stats for {} >>> {:?}", user_id, e);
                "❌ Error fetching your stats. Please try again later.".to_string()
            }
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.platform.send_message(chat_id, text).await {
            tracing::warn!("could not reply in chat {} >>> {}", chat_id, e);
        }
    }
}
