use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use super::*;
use crate::events::{event_queue, CallEvent, EventSink};

const ROOM: &str = "observable-abc123";

fn drain(rx: &mut mpsc::UnboundedReceiver<CallEvent>) -> Vec<ChannelEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            CallEvent::Channel(event) => events.push(event),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    events
}

fn member_counts(events: &[ChannelEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            ChannelEvent::Members(members) => Some(members.len()),
            _ => None,
        })
        .collect()
}

async fn join(
    hub: &LocalRelayHub,
) -> (SignalingChannel, mpsc::UnboundedReceiver<CallEvent>) {
    let (tx, rx) = event_queue();
    let channel = SignalingChannel::join(Arc::new(hub.connect()), ROOM, EventSink::new(tx))
        .await
        .expect("join succeeds");
    (channel, rx)
}

#[tokio::test]
async fn members_events_carry_full_member_list() {
    let hub = LocalRelayHub::new();
    let (first, mut first_rx) = join(&hub).await;
    let (second, mut second_rx) = join(&hub).await;

    assert_eq!(member_counts(&drain(&mut first_rx)), vec![1, 2]);
    assert_eq!(member_counts(&drain(&mut second_rx)), vec![2]);
    assert_eq!(
        hub.members(ROOM),
        vec![first.client_id().to_string(), second.client_id().to_string()]
    );
}

#[tokio::test]
async fn messages_reach_peer_but_not_author() {
    let hub = LocalRelayHub::new();
    let (first, mut first_rx) = join(&hub).await;
    let (second, mut second_rx) = join(&hub).await;
    drain(&mut first_rx);
    drain(&mut second_rx);

    let message = SignalingMessage::Sdp(SessionDescription::offer("v=0"));
    first.send(&message).expect("send succeeds");

    assert!(drain(&mut first_rx).is_empty());
    let received = drain(&mut second_rx);
    assert_eq!(received.len(), 1);
    match &received[0] {
        ChannelEvent::Message(envelope) => {
            assert_eq!(envelope.origin, first.client_id());
            assert_eq!(envelope.room, ROOM);
            assert_eq!(envelope.message, message);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    drop(second);
}

#[tokio::test]
async fn close_is_idempotent_and_updates_remaining_members() {
    let hub = LocalRelayHub::new();
    let (first, mut first_rx) = join(&hub).await;
    let (second, _second_rx) = join(&hub).await;
    drain(&mut first_rx);

    second.close();
    second.close();

    assert_eq!(member_counts(&drain(&mut first_rx)), vec![1]);
    assert!(matches!(
        second.send(&SignalingMessage::Candidate(IceCandidate::new("c"))),
        Err(SignalingError::Closed)
    ));
    assert_eq!(hub.members(ROOM), vec![first.client_id().to_string()]);
}

#[tokio::test]
async fn join_fails_when_relay_unreachable() {
    let hub = LocalRelayHub::new();
    hub.set_offline(true);
    let (tx, _rx) = event_queue();

    let result = SignalingChannel::join(Arc::new(hub.connect()), ROOM, EventSink::new(tx)).await;

    assert!(matches!(result, Err(SignalingError::Unavailable { .. })));
}

#[tokio::test]
async fn channel_failure_is_reported_once() {
    let hub = LocalRelayHub::new();
    let (_channel, mut rx) = join(&hub).await;
    drain(&mut rx);

    hub.fail_room(ROOM, "socket reset");
    hub.fail_room(ROOM, "socket reset again");

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ChannelEvent::Failed(SignalingError::Unavailable { reason }) if reason == "socket reset"
    ));
}

#[test]
fn inbox_discards_payloads_for_other_rooms_and_garbage() {
    let (tx, mut rx) = event_queue();
    let inbox = RelayInbox::new(ROOM, "client-1", EventSink::new(tx));

    inbox.deliver_data(json!({"unexpected": true}), "client-2");
    inbox.deliver_data(
        json!({"room": "observable-other", "message": {"candidate": {"candidate": "c"}}}),
        "client-2",
    );
    inbox.deliver_data(
        json!({"room": ROOM, "message": {"candidate": {"candidate": "c"}}}),
        "client-1",
    );
    assert!(drain(&mut rx).is_empty());

    inbox.deliver_data(
        json!({"room": ROOM, "message": {"candidate": {"candidate": "c"}}}),
        "client-2",
    );
    assert_eq!(drain(&mut rx).len(), 1);
}
