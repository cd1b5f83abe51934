mod common;

use common::*;
use proptest::prelude::*;
use referral_server::{
    domain::{
        events::MembershipEvent,
        fields::{InviteToken, UserId},
        machine::EventKind,
    },
    repository::{MemoryUserStore, UserStore},
};
use std::collections::HashMap;

const POPULATION: i64 = 6;

fn event_strategy() -> impl Strategy<Value = MembershipEvent> {
    (
        0..POPULATION,
        prop_oneof![
            Just(EventKind::Join),
            Just(EventKind::Leave),
            Just(EventKind::FirstInteraction),
        ],
        proptest::option::of(0..POPULATION),
    )
        .prop_map(|(user, kind, inviter)| MembershipEvent {
            user_id: UserId::from(user),
            kind,
            inviter_token: match kind {
                EventKind::Join => inviter.map(|i| InviteToken::new(UserId::from(i))),
                _ => None,
            },
        })
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn counters_match_live_aggregate_after_every_event(
        events in proptest::collection::vec(event_strategy(), 1..60),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let store = MemoryUserStore::new();
            let p = processor(&store);
            let mut first_inviter: HashMap<UserId, Option<UserId>> = HashMap::new();

            for event in &events {
                p.apply(event).await.unwrap();

                let drift = store.counter_drift().await.unwrap();
                prop_assert!(drift.is_empty(), "after {:?}: {:?}", event, drift);

                for user in store.users().await {
                    prop_assert!(user.referral_count >= 0);
                    prop_assert_ne!(user.inviter_id, Some(user.id));
                    let recorded = first_inviter.entry(user.id).or_insert(user.inviter_id);
                    prop_assert_eq!(*recorded, user.inviter_id);
                    if let Some(inviter) = user.inviter_id {
                        prop_assert!(store.get_user(inviter).await.unwrap().is_some());
                    }
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn replaying_an_event_is_a_no_op(
        events in proptest::collection::vec(event_strategy(), 1..30),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let store = MemoryUserStore::new();
            let p = processor(&store);

            for event in &events {
                p.apply(event).await.unwrap();
                let before = store.users().await;
                let replay = p.apply(event).await.unwrap();

                prop_assert_eq!(replay.delta, None);
                prop_assert_eq!(replay.previous, replay.current);
                prop_assert_eq!(store.users().await, before);
            }
            Ok(())
        })?;
    }
}
