mod common;

use common::*;
use referral_server::{
    bot::{membership_event, Bot},
    domain::{events::AppEvent, machine::EventKind},
    notifier::Notifier,
    platform::{telegram::Update, PlatformClient},
    repository::{MemoryUserStore, UserStore},
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;

const GROUP: i64 = -1002384613497;

struct Harness {
    store: MemoryUserStore,
    platform: Arc<RecordingPlatform>,
    bot: Bot,
    events: broadcast::Receiver<AppEvent>,
}

fn harness_with(platform: RecordingPlatform) -> Harness {
    let store = MemoryUserStore::new();
    let platform = Arc::new(platform);
    let (tx, events) = broadcast::channel(16);
    let client: Arc<dyn PlatformClient> = platform.clone();
    let notifier = Arc::new(Notifier::new(client.clone(), tx));
    let bot = Bot::new(Arc::new(processor(&store)), notifier, client, GROUP, 10);
    Harness {
        store,
        platform,
        bot,
        events,
    }
}

fn harness() -> Harness {
    harness_with(RecordingPlatform::default())
}

fn member_update(user: i64, old: &str, new: &str, link_name: Option<&str>) -> Update {
    let person = json!({ "id": user, "is_bot": false, "first_name": "Someone" });
    let mut change = json!({
        "chat": { "id": GROUP, "type": "supergroup" },
        "from": person,
        "date": 1700000000,
        "old_chat_member": { "user": person, "status": old },
        "new_chat_member": { "user": person, "status": new },
    });
    if let Some(name) = link_name {
        change["invite_link"] = json!({
            "invite_link": "https://t.me/+xyz",
            "name": name,
            "creates_join_request": false,
            "is_primary": false,
            "is_revoked": false
        });
    }
    serde_json::from_value(json!({ "update_id": 1, "chat_member": change })).unwrap()
}

fn message(user: i64, chat_id: i64, chat_type: &str, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 2,
        "message": {
            "message_id": 5,
            "from": { "id": user, "is_bot": false, "first_name": "Someone" },
            "chat": { "id": chat_id, "type": chat_type },
            "date": 1700000000,
            "text": text
        }
    }))
    .unwrap()
}

fn service_message(user: i64, notice: serde_json::Value) -> Update {
    let mut message = json!({
        "message_id": 6,
        "from": { "id": user, "is_bot": false, "first_name": "Someone" },
        "chat": { "id": GROUP, "type": "supergroup" },
        "date": 1700000000
    });
    if let (Some(body), Some(fields)) = (message.as_object_mut(), notice.as_object()) {
        body.extend(fields.clone());
    }
    serde_json::from_value(json!({ "update_id": 3, "message": message })).unwrap()
}

#[test]
fn status_changes_map_to_events() {
    let joined = member_update(2, "left", "member", Some("ref_1_1700000000"));
    let event = membership_event(joined.chat_member.as_ref().unwrap(), GROUP).unwrap();
    assert_eq!(event.kind, EventKind::Join);
    assert_eq!(event.inviter_token.unwrap().owner(), Some(id(1)));

    let kicked = member_update(2, "member", "kicked", None);
    let event = membership_event(kicked.chat_member.as_ref().unwrap(), GROUP).unwrap();
    assert_eq!(event.kind, EventKind::Leave);

    let duplicate = member_update(2, "member", "member", None);
    assert!(membership_event(duplicate.chat_member.as_ref().unwrap(), GROUP).is_none());

    let promoted = member_update(2, "member", "administrator", None);
    assert!(membership_event(promoted.chat_member.as_ref().unwrap(), GROUP).is_none());

    let elsewhere = member_update(2, "left", "member", None);
    assert!(membership_event(elsewhere.chat_member.as_ref().unwrap(), GROUP + 1).is_none());
}

#[tokio::test]
async fn inviter_hears_only_about_active_referrals() {
    let mut h = harness();

    h.bot
        .handle(member_update(2, "left", "member", Some("ref_1_1700000000")))
        .await
        .unwrap();
    assert!(h.platform.messages_to(1).is_empty());
    assert_eq!(h.events.try_recv().unwrap(), AppEvent::NewMember(id(2)));

    h.bot.handle(message(2, GROUP, "supergroup", "hi all")).await.unwrap();
    h.bot.handle(message(2, GROUP, "supergroup", "hello again")).await.unwrap();

    let sent = h.platform.messages_to(1);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Your active referrals: 1"));
    assert!(sent[0].contains("User 2"));
    assert!(matches!(h.events.try_recv().unwrap(), AppEvent::ReferralActivated(_)));

    h.bot.handle(member_update(2, "member", "left", None)).await.unwrap();
    let sent = h.platform.messages_to(1);
    assert_eq!(sent.len(), 2);
    assert!(sent[1].contains("You now have 0 active referrals"));
    assert_eq!(h.store.active_referrals(id(1)).await.unwrap(), 0);
}

#[tokio::test]
async fn failed_notification_keeps_the_committed_state() {
    let h = harness_with(RecordingPlatform::failing());

    h.bot
        .handle(member_update(2, "left", "member", Some("ref_1_1700000000")))
        .await
        .unwrap();
    h.bot.handle(message(2, GROUP, "supergroup", "hi")).await.unwrap();

    assert_eq!(h.store.active_referrals(id(1)).await.unwrap(), 1);
    assert_eq!(h.store.get_user(id(1)).await.unwrap().unwrap().referral_count, 1);
}

#[tokio::test]
async fn messages_from_other_groups_are_ignored() {
    let h = harness();

    h.bot
        .handle(member_update(2, "left", "member", Some("ref_1_1700000000")))
        .await
        .unwrap();
    h.bot.handle(message(2, GROUP - 1, "supergroup", "hi")).await.unwrap();

    assert_eq!(h.store.active_referrals(id(1)).await.unwrap(), 0);
}

#[tokio::test]
async fn start_in_private_hands_out_a_link() {
    let h = harness();

    h.bot.handle(message(7, 7, "private", "/start")).await.unwrap();

    let replies = h.platform.messages_to(7);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("https://t.me/+ref_7_"));
    assert!(h.store.get_user(id(7)).await.unwrap().is_some());
}

#[tokio::test]
async fn my_referrals_reports_total_and_active() {
    let h = harness();

    for invitee in [2, 3] {
        h.bot
            .handle(member_update(invitee, "left", "member", Some("ref_1_1700000000")))
            .await
            .unwrap();
    }
    h.bot.handle(message(3, GROUP, "supergroup", "hey")).await.unwrap();
    h.bot.handle(message(1, 1, "private", "/myreferrals")).await.unwrap();

    let replies = h.platform.messages_to(1);
    let stats = replies.last().unwrap();
    assert!(stats.contains("Total Referrals: 2"));
    assert!(stats.contains("Active Referrals: 1"));
}

#[tokio::test]
async fn leaderboard_command_falls_back_to_ids() {
    let h = harness();

    h.bot
        .handle(member_update(2, "left", "member", Some("ref_1_1700000000")))
        .await
        .unwrap();
    h.bot.handle(message(2, GROUP, "supergroup", "hey")).await.unwrap();
    h.bot.handle(message(9, GROUP, "supergroup", "/leaderboard")).await.unwrap();

    let board = h.platform.messages_to(GROUP);
    assert_eq!(board.len(), 1);
    assert!(board[0].contains("🥇 1. User 1: 1 active referrals"));
}

#[tokio::test]
async fn join_notice_is_not_an_interaction() {
    let h = harness();
    let person = json!({ "id": 2, "is_bot": false, "first_name": "Someone" });

    h.bot
        .handle(member_update(2, "left", "member", Some("ref_1_1700000000")))
        .await
        .unwrap();
    h.bot
        .handle(service_message(2, json!({ "new_chat_members": [person] })))
        .await
        .unwrap();

    assert_eq!(h.store.active_referrals(id(1)).await.unwrap(), 0);
    assert!(!h.store.get_user(id(2)).await.unwrap().unwrap().has_chatted);
    assert!(h.platform.messages_to(1).is_empty());

    h.bot.handle(message(2, GROUP, "supergroup", "hello")).await.unwrap();
    assert_eq!(h.store.active_referrals(id(1)).await.unwrap(), 1);
}

#[tokio::test]
async fn leave_notice_before_the_member_update_changes_nothing() {
    let h = harness();
    let person = json!({ "id": 2, "is_bot": false, "first_name": "Someone" });

    h.bot
        .handle(member_update(2, "left", "member", Some("ref_1_1700000000")))
        .await
        .unwrap();
    h.bot
        .handle(service_message(2, json!({ "left_chat_member": person })))
        .await
        .unwrap();
    h.bot.handle(member_update(2, "member", "left", None)).await.unwrap();

    assert_eq!(h.store.get_user(id(1)).await.unwrap().unwrap().referral_count, 0);
    assert!(h.platform.messages_to(1).is_empty());
}
