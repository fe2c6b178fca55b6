//! Integration tests for matchmaking and rooms driven through the public
//! API only.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use duochat_moderation::BanStore;
use duochat_protocol::{RoomId, ServerEvent, UserId};
use duochat_room::{LeaveOutcome, MatchOutcome, Matchmaker, RoomRegistry, UserSender};
use tokio::sync::mpsc::{self, UnboundedReceiver};

// =========================================================================
// Helpers
// =========================================================================

struct Client {
    id: UserId,
    tx: UserSender,
    rx: UnboundedReceiver<ServerEvent>,
}

fn client(id: u64) -> Client {
    let (tx, rx) = mpsc::unbounded_channel();
    Client {
        id: UserId(id),
        tx,
        rx,
    }
}

fn matchmaker() -> Arc<Matchmaker> {
    Arc::new(Matchmaker::new(
        Arc::new(RoomRegistry::new()),
        Arc::new(BanStore::new()),
    ))
}

/// Next event that isn't a queue notice.
async fn next_non_waiting(rx: &mut UnboundedReceiver<ServerEvent>) -> ServerEvent {
    loop {
        match rx.recv().await {
            Some(ServerEvent::WaitingForPartner) => continue,
            Some(event) => return event,
            None => panic!("channel closed"),
        }
    }
}

/// Everything already queued on `rx`, without waiting.
fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// The room an event belongs to, for events produced inside one.
fn event_room(event: &ServerEvent) -> Option<RoomId> {
    match event {
        ServerEvent::ChatStarted { room }
        | ServerEvent::Message { room, .. }
        | ServerEvent::PartnerDisconnected { room } => Some(*room),
        _ => None,
    }
}

async fn paired(mm: &Matchmaker, a: &Client, b: &Client) -> RoomId {
    mm.request_partner(a.id, &a.tx).await.unwrap();
    match mm.request_partner(b.id, &b.tx).await.unwrap() {
        MatchOutcome::Paired(room) => room,
        other => panic!("expected Paired, got {other:?}"),
    }
}

// =========================================================================
// Pairing order
// =========================================================================

#[tokio::test]
async fn test_waiting_users_are_paired_oldest_first() {
    let mm = matchmaker();
    let waiting: Vec<_> = (1..=3).map(client).collect();
    for c in &waiting {
        assert_eq!(
            mm.request_partner(c.id, &c.tx).await.unwrap(),
            MatchOutcome::Waiting
        );
    }

    // Each newcomer takes the longest-waiting user.
    for (n, expected) in (10..13).zip([1, 2, 3]) {
        let c = client(n);
        mm.request_partner(c.id, &c.tx).await.unwrap();
        assert_eq!(
            mm.registry().partner_of(c.id).await,
            Some(UserId(expected))
        );
    }
    assert_eq!(mm.waiting_count().await, 0);
}

#[tokio::test]
async fn test_leaving_the_queue_preserves_order_of_the_rest() {
    let mm = matchmaker();
    let waiting: Vec<_> = (1..=3).map(client).collect();
    for c in &waiting {
        mm.request_partner(c.id, &c.tx).await.unwrap();
    }

    assert_eq!(mm.leave(UserId(1)).await, LeaveOutcome::LeftQueue);
    let c = client(4);
    mm.request_partner(c.id, &c.tx).await.unwrap();

    assert_eq!(mm.registry().partner_of(UserId(4)).await, Some(UserId(2)));
    assert!(mm.is_waiting(UserId(3)).await);
}

// =========================================================================
// Relay
// =========================================================================

#[tokio::test]
async fn test_relay_reaches_only_the_two_occupants() {
    let mm = matchmaker();
    let mut a = client(1);
    let mut b = client(2);
    let mut c = client(3);
    let mut d = client(4);
    for x in [&a, &b, &c, &d] {
        mm.request_partner(x.id, &x.tx).await.unwrap();
    }
    for x in [&mut a, &mut b, &mut c, &mut d] {
        assert!(matches!(
            next_non_waiting(&mut x.rx).await,
            ServerEvent::ChatStarted { .. }
        ));
    }

    mm.registry().relay(a.id, "hi".into()).await.unwrap();

    for x in [&mut a, &mut b] {
        match x.rx.recv().await.unwrap() {
            ServerEvent::Message {
                message, user_id, ..
            } => {
                assert_eq!(message, "hi");
                assert_eq!(user_id, UserId(1));
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }
    // Let the room actor run; nothing must have reached the other room.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(c.rx.try_recv().is_err());
    assert!(d.rx.try_recv().is_err());
}

#[tokio::test]
async fn test_relay_preserves_per_sender_order() {
    let mm = matchmaker();
    let a = client(1);
    let mut b = client(2);
    mm.request_partner(a.id, &a.tx).await.unwrap();
    mm.request_partner(b.id, &b.tx).await.unwrap();
    next_non_waiting(&mut b.rx).await;

    for i in 0..20 {
        mm.registry().relay(a.id, format!("line {i}")).await.unwrap();
    }

    for i in 0..20 {
        match b.rx.recv().await.unwrap() {
            ServerEvent::Message { message, .. } => {
                assert_eq!(message, format!("line {i}"));
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_relay_after_partner_left_fails() {
    let mm = matchmaker();
    let a = client(1);
    let b = client(2);
    mm.request_partner(a.id, &a.tx).await.unwrap();
    mm.request_partner(b.id, &b.tx).await.unwrap();

    mm.leave(b.id).await;

    assert!(mm.registry().relay(a.id, "anyone?".into()).await.is_err());
    assert_eq!(mm.registry().room_count().await, 0);
}

// =========================================================================
// Disconnects
// =========================================================================

#[tokio::test]
async fn test_disconnected_waiting_user_is_never_selected() {
    let mm = matchmaker();
    let gone = client(1);
    mm.request_partner(gone.id, &gone.tx).await.unwrap();
    // The connection went away without an explicit leave.
    drop(gone);

    let mut b = client(2);
    assert_eq!(
        mm.request_partner(b.id, &b.tx).await.unwrap(),
        MatchOutcome::Waiting
    );
    let c = client(3);
    mm.request_partner(c.id, &c.tx).await.unwrap();

    assert!(matches!(
        next_non_waiting(&mut b.rx).await,
        ServerEvent::ChatStarted { .. }
    ));
    assert_eq!(mm.registry().partner_of(UserId(2)).await, Some(UserId(3)));
    assert_eq!(mm.registry().room_of(UserId(1)).await, None);
}

#[tokio::test]
async fn test_partner_disconnect_leaves_survivor_free_to_rematch() {
    let mm = matchmaker();
    let mut a = client(1);
    let b = client(2);
    mm.request_partner(a.id, &a.tx).await.unwrap();
    mm.request_partner(b.id, &b.tx).await.unwrap();
    next_non_waiting(&mut a.rx).await;

    let room = mm.registry().room_of(a.id).await.unwrap();
    mm.leave(b.id).await;

    assert_eq!(a.rx.recv().await, Some(ServerEvent::PartnerDisconnected { room }));
    assert_eq!(
        mm.request_partner(a.id, &a.tx).await.unwrap(),
        MatchOutcome::Waiting
    );
}

// =========================================================================
// Re-pairing
// =========================================================================

#[tokio::test]
async fn test_old_room_message_arrives_before_new_chat_started() {
    let mm = matchmaker();
    let a = client(1);
    let mut b = client(2);
    let c = client(3);
    let old = paired(&mm, &a, &b).await;
    mm.request_partner(c.id, &c.tx).await.unwrap();

    mm.registry().relay(a.id, "from-old-room".into()).await.unwrap();
    let MatchOutcome::Paired(new) = mm.request_partner(b.id, &b.tx).await.unwrap() else {
        panic!("expected b to pair with the waiting user");
    };

    let events = drain(&mut b.rx);
    assert_eq!(events.len(), 3, "{events:?}");
    assert_eq!(events[0], ServerEvent::ChatStarted { room: old });
    assert!(matches!(
        &events[1],
        ServerEvent::Message { room, message, user_id, .. }
            if *room == old && message == "from-old-room" && *user_id == a.id
    ));
    assert_eq!(events[2], ServerEvent::ChatStarted { room: new });
    assert_eq!(mm.registry().partner_of(b.id).await, Some(c.id));
}

#[tokio::test]
async fn test_partner_disconnected_precedes_rematch() {
    let mm = matchmaker();
    let mut a = client(1);
    let b = client(2);
    let c = client(3);
    let old = paired(&mm, &a, &b).await;
    mm.request_partner(c.id, &c.tx).await.unwrap();

    mm.leave(b.id).await;
    let MatchOutcome::Paired(new) = mm.request_partner(a.id, &a.tx).await.unwrap() else {
        panic!("expected a to pair with the waiting user");
    };

    assert_eq!(
        drain(&mut a.rx),
        vec![
            ServerEvent::WaitingForPartner,
            ServerEvent::ChatStarted { room: old },
            ServerEvent::PartnerDisconnected { room: old },
            ServerEvent::ChatStarted { room: new },
        ]
    );
    assert_eq!(mm.registry().room_of(a.id).await, Some(new));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_relays_racing_a_new_chat_never_follow_the_new_chat_started() {
    let mm = matchmaker();
    let a = client(1);
    let mut b = client(2);
    let c = client(3);
    let old = paired(&mm, &a, &b).await;
    mm.request_partner(c.id, &c.tx).await.unwrap();

    let chatter = {
        let mm = Arc::clone(&mm);
        tokio::spawn(async move {
            for i in 0..200 {
                // Fails once the room is gone.
                if mm.registry().relay(UserId(1), format!("m{i}")).await.is_err() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
    };
    tokio::task::yield_now().await;
    let MatchOutcome::Paired(new) = mm.request_partner(b.id, &b.tx).await.unwrap() else {
        panic!("expected b to pair with the waiting user");
    };
    chatter.await.unwrap();

    let events = drain(&mut b.rx);
    let started = events
        .iter()
        .position(|e| *e == ServerEvent::ChatStarted { room: new })
        .unwrap();
    assert!(events[..started].iter().all(|e| event_room(e) == Some(old)));
    assert!(events[started + 1..].iter().all(|e| event_room(e) == Some(new)));
    drop(a);
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_double_book() {
    const USERS: u64 = 64;
    let mm = matchmaker();
    let mut receivers = Vec::new();
    let mut tasks = Vec::new();

    for n in 1..=USERS {
        let c = client(n);
        receivers.push(c.rx);
        let mm = Arc::clone(&mm);
        let tx = c.tx;
        tasks.push(tokio::spawn(async move {
            mm.request_partner(UserId(n), &tx).await.unwrap();
            // Keep the sender alive until the test has inspected state.
            tx
        }));
    }
    let mut senders = Vec::new();
    for t in tasks {
        senders.push(t.await.unwrap());
    }

    // Every user is either in exactly one room or still waiting.
    let mut paired = HashSet::new();
    for n in 1..=USERS {
        let user = UserId(n);
        if let Some(partner) = mm.registry().partner_of(user).await {
            assert_ne!(partner, user);
            assert_eq!(mm.registry().partner_of(partner).await, Some(user));
            assert!(!mm.is_waiting(user).await);
            paired.insert(user);
        } else {
            assert!(mm.is_waiting(user).await);
        }
    }
    assert_eq!(paired.len() % 2, 0);
    assert_eq!(mm.registry().room_count().await, paired.len() / 2);
    // With an even head count and nobody leaving, at most one can wait.
    assert!(mm.waiting_count().await <= 1);

    // And each paired user saw exactly one chat_started.
    for (i, rx) in receivers.iter_mut().enumerate() {
        let mut started = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ServerEvent::ChatStarted { .. }) {
                started += 1;
            }
        }
        let expected = usize::from(paired.contains(&UserId(i as u64 + 1)));
        assert_eq!(started, expected);
    }
    drop(senders);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_leave_and_request_do_not_pair_a_leaver() {
    let mm = matchmaker();
    let waiting = client(1);
    mm.request_partner(waiting.id, &waiting.tx).await.unwrap();

    let leaver = {
        let mm = Arc::clone(&mm);
        tokio::spawn(async move { mm.leave(UserId(1)).await })
    };
    let requester = client(2);
    let outcome = mm.request_partner(requester.id, &requester.tx).await.unwrap();
    let left = leaver.await.unwrap();

    // Either the request won (pair, then leave dissolves the room) or
    // the leave won (the requester waits). Never both in a room.
    match (outcome, left) {
        (MatchOutcome::Paired(room), LeaveOutcome::LeftRoom(left_room)) => {
            assert_eq!(room, left_room);
            assert_eq!(mm.registry().room_of(UserId(2)).await, None);
        }
        (MatchOutcome::Waiting, LeaveOutcome::LeftQueue) => {
            assert!(mm.is_waiting(UserId(2)).await);
        }
        other => panic!("inconsistent outcome {other:?}"),
    }
    assert_eq!(mm.registry().room_of(UserId(1)).await, None);
}

// =========================================================================
// Bans
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ban_blocks_matchmaking_until_it_lapses() {
    let bans = Arc::new(BanStore::new());
    let mm = Matchmaker::new(Arc::new(RoomRegistry::new()), Arc::clone(&bans));
    let c = client(1);
    bans.ban(c.id, Duration::from_secs(60)).await;

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(
        mm.request_partner(c.id, &c.tx).await.unwrap(),
        MatchOutcome::Banned { remaining_secs: 50 }
    );

    tokio::time::advance(Duration::from_secs(51)).await;
    assert_eq!(
        mm.request_partner(c.id, &c.tx).await.unwrap(),
        MatchOutcome::Waiting
    );
}
