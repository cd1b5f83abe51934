use crate::{
    domain::{
        events::{AppEvent, EventOutcome, ReferralEvent},
        fields::{MembershipState, UserId},
        machine::CounterDelta,
    },
    platform::{telegram::escape_html, PlatformClient},
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Tells inviters about committed changes to their active referrals.
///
/// Runs after the event is committed; a failed delivery is logged and dropped.
pub struct Notifier {
    platform: Arc<dyn PlatformClient>,
    tx: broadcast::Sender<AppEvent>,
}

impl Notifier {
    pub fn new(platform: Arc<dyn PlatformClient>, tx: broadcast::Sender<AppEvent>) -> Self {
        Self { platform, tx }
    }

    pub async fn notify(&self, outcome: &EventOutcome) {
        if outcome.previous.is_none() && outcome.current == Some(MembershipState::InsideSilent) {
            let _ = self.tx.send(AppEvent::NewMember(outcome.user_id));
        }

        if !outcome.should_notify() {
            return;
        }
        let (Some(inviter), Some(delta)) = (outcome.inviter_id, outcome.delta) else {
            return;
        };

        let referral = ReferralEvent {
            inviter,
            invitee: outcome.user_id,
            active_referrals: outcome.inviter_active.unwrap_or(0),
        };
        let text = match delta {
            CounterDelta::Increment => format!(
                "🎉 New active referral! {} joined with your invite link and said hello.\nYour active referrals: {} 🌟",
                self.display_name(outcome.user_id).await,
                referral.active_referrals
            ),
            CounterDelta::Decrement => format!(
                "ℹ️ One of your referred users left the group.\nYou now have {} active referrals.",
                referral.active_referrals
            ),
        };
        let event = match delta {
            CounterDelta::Increment => AppEvent::ReferralActivated(referral),
            CounterDelta::Decrement => AppEvent::ReferralLost(referral),
        };
        let _ = self.tx.send(event);

        match self.platform.send_message(inviter.inner(), &text).await {
            Ok(()) => tracing::info!("sent notification to inviter {}", inviter),
            Err(e) => tracing::warn!("could not notify inviter {} >>> {}", inviter, e),
        }
    }

    pub async fn display_name(&self, id: UserId) -> String {
        match self.platform.lookup_user(id).await {
            Ok(name) => escape_html(&name),
            Err(e) => {
                tracing::warn!("display name lookup for {} failed >>> {}", id, e);
                format!("User {}", id)
            }
        }
    }
}
