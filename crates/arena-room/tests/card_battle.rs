//! Stage flow of the card battle controller.

mod common;

use arena_protocol::{
    CardId, FinalPlacement, ItemId, MatchEvent, MatchMode, Recipient, Stage, UserAction, UserId,
};
use arena_room::{CardBattle, MatchConfig, RoomError, StageController};
use common::*;

async fn battle(config: MatchConfig, difficulty: f64) -> Harness {
    let h = Harness::new(
        MatchMode::CardBattle,
        &[1, 2],
        playlist(&[10, 11, 12, 13, 14, 15], difficulty),
        config,
    )
    .await;
    h.join(1).await.unwrap();
    h.join(2).await.unwrap();
    h
}

async fn with_battle<R>(h: &Harness, f: impl FnOnce(&CardBattle) -> R) -> R {
    h.with_room(|room| match room.controller() {
        StageController::CardBattle(cb) => f(cb),
        _ => unreachable!("not a card battle"),
    })
    .await
}

fn other(user: UserId) -> UserId {
    if user == uid(1) { uid(2) } else { uid(1) }
}

/// Waits for discard, keeps both hands, and returns the active user once
/// card play opens.
async fn to_card_play(h: &Harness) -> UserId {
    tokio::time::sleep(secs(1) + ms(100)).await;
    assert_eq!(h.stage().await, Stage::CardDiscard);
    for id in [1, 2] {
        h.act(id, UserAction::DiscardCards { card_ids: vec![] })
            .await
            .unwrap();
    }
    assert_eq!(h.stage().await, Stage::CardPlay);
    with_battle(h, |cb| cb.active_user()).await.unwrap()
}

/// Plays the active user's first card and runs to gameplay. Returns the
/// item being played.
async fn to_gameplay(h: &Harness, active: UserId) -> ItemId {
    let card = with_battle(h, |cb| cb.hand(active)[0]).await;
    h.act(active.0, UserAction::PlayCard { card_id: card.id })
        .await
        .unwrap();
    assert_eq!(h.stage().await, Stage::FinishSelection);
    tokio::time::sleep(secs(1) + ms(100)).await;
    h.ready_all().await;
    tokio::time::sleep(secs(1) + ms(100)).await;
    assert_eq!(h.stage().await, Stage::Gameplay);
    card.item_id
}

// =========================================================================
// Setup
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_start_deals_hands_and_life() {
    let mut h = battle(common::config(), 1500.0).await;

    assert_eq!(h.stage().await, Stage::RoundWarmup);
    for id in [uid(1), uid(2)] {
        assert_eq!(with_battle(&h, |cb| cb.hand(id).len()).await, 3);
        assert_eq!(with_battle(&h, |cb| cb.life(id)).await, Some(1_000_000));
    }
    let mut order = with_battle(&h, |cb| cb.turn_order().to_vec()).await;
    order.sort();
    assert_eq!(order, vec![uid(1), uid(2)]);

    // Hands are private.
    let hands: Vec<Recipient> = events(&h.drain())
        .into_iter()
        .filter(|(_, e)| matches!(e, MatchEvent::HandUpdated { .. }))
        .map(|(r, _)| r)
        .collect();
    assert!(hands.contains(&Recipient::User(uid(1))));
    assert!(hands.contains(&Recipient::User(uid(2))));
    assert!(!hands.contains(&Recipient::All));
}

// =========================================================================
// Discarding
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_discard_replaces_cards() {
    let h = battle(common::config(), 1500.0).await;
    tokio::time::sleep(secs(1) + ms(100)).await;

    let discarded = with_battle(&h, |cb| cb.hand(uid(1))[0]).await;
    h.act(1, UserAction::DiscardCards { card_ids: vec![discarded.id] })
        .await
        .unwrap();

    let hand = with_battle(&h, |cb| cb.hand(uid(1)).to_vec()).await;
    assert_eq!(hand.len(), 3);
    assert!(!hand.iter().any(|c| c.id == discarded.id));

    let err = h
        .act(1, UserAction::DiscardCards { card_ids: vec![] })
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::InvalidState(_)));
    assert_eq!(h.stage().await, Stage::CardDiscard);
}

#[tokio::test(start_paused = true)]
async fn test_discard_rejects_foreign_and_repeated_cards() {
    let h = battle(common::config(), 1500.0).await;
    tokio::time::sleep(secs(1) + ms(100)).await;

    let foreign = UserAction::DiscardCards {
        card_ids: vec![CardId(999)],
    };
    assert!(h.act(1, foreign).await.is_err());

    let card = with_battle(&h, |cb| cb.hand(uid(1))[0]).await;
    let twice = UserAction::DiscardCards {
        card_ids: vec![card.id, card.id],
    };
    assert!(h.act(1, twice).await.is_err());

    let hand = with_battle(&h, |cb| cb.hand(uid(1)).to_vec()).await;
    assert!(hand.contains(&card));
}

#[tokio::test(start_paused = true)]
async fn test_discard_timeout_opens_card_play() {
    let h = battle(common::config(), 1500.0).await;
    tokio::time::sleep(secs(1) + ms(100)).await;

    tokio::time::sleep(secs(10) + ms(100)).await;

    assert_eq!(h.stage().await, Stage::CardPlay);
}

// =========================================================================
// Playing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_only_active_user_may_play() {
    let h = battle(common::config(), 1500.0).await;
    let active = to_card_play(&h).await;
    let waiting = other(active);

    let card = with_battle(&h, |cb| cb.hand(waiting)[0]).await;
    let err = h
        .act(waiting.0, UserAction::PlayCard { card_id: card.id })
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::InvalidState(_)));
    assert_eq!(h.stage().await, Stage::CardPlay);

    let card = with_battle(&h, |cb| cb.hand(active)[0]).await;
    h.act(active.0, UserAction::PlayCard { card_id: card.id })
        .await
        .unwrap();

    assert_eq!(h.stage().await, Stage::FinishSelection);
    assert_eq!(h.with_room(|r| r.current_item()).await, Some(card.item_id));
    let hand = with_battle(&h, |cb| cb.hand(active).to_vec()).await;
    assert!(!hand.contains(&card));
}

#[tokio::test(start_paused = true)]
async fn test_card_play_timeout_plays_random_card() {
    let mut h = battle(common::config(), 1500.0).await;
    let active = to_card_play(&h).await;
    h.drain();

    tokio::time::sleep(secs(10) + ms(100)).await;

    assert_eq!(h.stage().await, Stage::FinishSelection);
    let played = events(&h.drain()).into_iter().any(|(_, e)| {
        matches!(e, MatchEvent::CardPlayed { user_id, .. } if user_id == active)
    });
    assert!(played);
}

// =========================================================================
// Damage and ending
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_damage_scales_with_difficulty() {
    let mut h = battle(common::config(), 3000.0).await;
    let active = to_card_play(&h).await;
    let item = to_gameplay(&h, active).await;
    h.drain();

    let scores = [(uid(1), 1000), (uid(2), 400)];
    h.with_room(|r| r.complete_gameplay(item, &scores))
        .await
        .unwrap();

    // (1000 - 400) * 3000 / 1500
    assert_eq!(with_battle(&h, |cb| cb.life(uid(2))).await, Some(1_000_000 - 1200));
    assert_eq!(with_battle(&h, |cb| cb.life(uid(1))).await, Some(1_000_000));
    assert!(events(&h.drain()).iter().any(|(_, e)| *e
        == MatchEvent::LifeChanged {
            user_id: uid(2),
            damage: 1200,
            life: 1_000_000 - 1200,
        }));
    assert_eq!(h.stage().await, Stage::Results);
}

#[tokio::test(start_paused = true)]
async fn test_match_ends_when_life_reaches_zero() {
    let config = MatchConfig {
        starting_life: 100,
        ..common::config()
    };
    let mut h = battle(config, 1500.0).await;
    let active = to_card_play(&h).await;
    let item = to_gameplay(&h, active).await;

    let scores = [(uid(1), 1000), (uid(2), 400)];
    h.with_room(|r| r.complete_gameplay(item, &scores))
        .await
        .unwrap();
    assert_eq!(with_battle(&h, |cb| cb.life(uid(2))).await, Some(0));

    tokio::time::sleep(secs(1) + ms(100)).await;

    assert_eq!(h.stage().await, Stage::Ended);
    let placements = events(&h.drain())
        .into_iter()
        .find_map(|(_, e)| match e {
            MatchEvent::MatchEnded { placements } => Some(placements),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        placements,
        vec![
            FinalPlacement {
                user_id: uid(1),
                placement: 1
            },
            FinalPlacement {
                user_id: uid(2),
                placement: 2
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_turn_rotates_between_rounds() {
    let h = battle(common::config(), 1500.0).await;
    let first = to_card_play(&h).await;
    let item = to_gameplay(&h, first).await;

    let scores = [(uid(1), 500), (uid(2), 500)];
    h.with_room(|r| r.complete_gameplay(item, &scores))
        .await
        .unwrap();
    // Results, then the next warmup.
    tokio::time::sleep(secs(1) + ms(100)).await;
    assert_eq!(h.stage().await, Stage::RoundWarmup);
    assert_eq!(h.with_room(|r| r.round()).await, 2);

    let second = to_card_play(&h).await;
    assert_eq!(second, other(first));

    // The played item is gone from every hand.
    for id in [uid(1), uid(2)] {
        let hand = with_battle(&h, |cb| cb.hand(id).to_vec()).await;
        assert!(hand.iter().all(|c| c.item_id != item));
    }
}

#[tokio::test(start_paused = true)]
async fn test_match_ends_when_one_user_remains() {
    let mut h = battle(common::config(), 1500.0).await;
    tokio::time::sleep(secs(1) + ms(100)).await;

    h.with_room(|r| r.leave(uid(2))).await.unwrap();

    assert_eq!(h.stage().await, Stage::Ended);
    let ended = events(&h.drain()).into_iter().find_map(|(_, e)| match e {
        MatchEvent::MatchEnded { placements } => Some(placements),
        _ => None,
    });
    assert_eq!(ended.unwrap()[0].user_id, uid(1));
}

#[tokio::test(start_paused = true)]
async fn test_active_user_leaving_during_discard_passes_the_turn() {
    let mut h = Harness::new(
        MatchMode::CardBattle,
        &[1, 2, 3],
        playlist(&[10, 11, 12, 13, 14, 15], 1500.0),
        common::config(),
    )
    .await;
    for id in [1, 2, 3] {
        h.join(id).await.unwrap();
    }
    tokio::time::sleep(secs(1) + ms(100)).await;
    assert_eq!(h.stage().await, Stage::CardDiscard);
    let leaving = with_battle(&h, |cb| cb.active_user()).await.unwrap();
    h.drain();

    h.with_room(|r| r.leave(leaving)).await.unwrap();

    let active = with_battle(&h, |cb| cb.active_user()).await.unwrap();
    assert_ne!(active, leaving);
    assert!(events(&h.drain()).iter().any(|(recipient, e)| *recipient == Recipient::All
        && *e == MatchEvent::ActiveUserChanged { user_id: active }));

    let remaining: Vec<i64> = [1, 2, 3]
        .into_iter()
        .filter(|id| UserId(*id) != leaving)
        .collect();
    for id in remaining {
        h.act(id, UserAction::DiscardCards { card_ids: vec![] })
            .await
            .unwrap();
    }
    assert_eq!(h.stage().await, Stage::CardPlay);

    // The new active user plays right away instead of the stage running
    // out its countdown.
    let card = with_battle(&h, |cb| cb.hand(active)[0]).await;
    h.act(active.0, UserAction::PlayCard { card_id: card.id })
        .await
        .unwrap();
    assert_eq!(h.stage().await, Stage::FinishSelection);
}

#[tokio::test(start_paused = true)]
async fn test_vote_is_not_a_card_battle_action() {
    let h = battle(common::config(), 1500.0).await;
    tokio::time::sleep(secs(1) + ms(100)).await;

    let err = h
        .act(1, UserAction::VoteItem { item_id: ItemId(10) })
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::InvalidState(_)));
}
