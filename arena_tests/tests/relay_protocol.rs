//! Wire-level tests against the relay using hand-written frames.

use arena_shared::{
    config::ArenaConfig,
    math::Vec3,
    net::{
        ClientEvent, CombatEvent, Hello, MoveRequest, PlayerId, PlayerMoved, PlayerSnapshot,
        ServerEvent,
    },
};
use arena_tests::{start_relay, start_relay_with, RawPeer};
use serde_json::json;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn join_sends_id_then_existing_peers() -> anyhow::Result<()> {
    let (relay, cfg) = start_relay().await?;

    let (mut a, a_id) = RawPeer::join(&cfg).await?;
    a.send(&ClientEvent::Move(MoveRequest {
        position: Vec3::new(3.0, 0.0, 1.0),
    }))
    .await?;
    assert!(a.drain().await.is_empty());

    let (mut b, b_id) = RawPeer::join(&cfg).await?;
    assert_eq!(
        b.drain().await,
        vec![ServerEvent::PlayerConnected(PlayerSnapshot {
            player_id: a_id,
            position: Vec3::new(3.0, 0.0, 1.0),
        })]
    );
    assert_eq!(
        a.drain().await,
        vec![ServerEvent::PlayerConnected(PlayerSnapshot {
            player_id: b_id,
            position: Vec3::ZERO,
        })]
    );

    relay.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_protocol_is_rejected() -> anyhow::Result<()> {
    let (relay, cfg) = start_relay().await?;

    let mut peer = RawPeer::connect(&cfg).await?;
    peer.send(&ClientEvent::Hello(Hello { protocol: 99 })).await?;
    match peer.recv().await {
        Some(ServerEvent::Rejected(r)) => assert!(r.reason.contains("protocol mismatch")),
        other => panic!("expected rejected, got {other:?}"),
    }
    assert!(peer.is_closed().await);
    assert!(relay.players().await?.is_empty());

    relay.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_frame_must_be_hello() -> anyhow::Result<()> {
    let (relay, cfg) = start_relay().await?;

    let mut peer = RawPeer::connect(&cfg).await?;
    peer.send(&ClientEvent::Move(MoveRequest {
        position: Vec3::ZERO,
    }))
    .await?;
    assert!(matches!(peer.recv().await, Some(ServerEvent::Rejected(_))));
    assert!(relay.players().await?.is_empty());

    relay.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_connection_times_out() -> anyhow::Result<()> {
    let (relay, cfg) = start_relay_with(ArenaConfig {
        handshake_timeout_ms: 50,
        ..ArenaConfig::default()
    })
    .await?;

    let mut peer = RawPeer::connect(&cfg).await?;
    match peer.recv().await {
        Some(ServerEvent::Rejected(r)) => assert!(r.reason.contains("timed out")),
        other => panic!("expected rejected, got {other:?}"),
    }

    relay.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_frames_are_dropped_without_disconnecting() -> anyhow::Result<()> {
    let (relay, cfg) = start_relay().await?;
    let (mut a, a_id) = RawPeer::join(&cfg).await?;
    let (mut b, _) = RawPeer::join(&cfg).await?;
    a.drain().await;

    a.send(&json!({"event": "move", "data": {}})).await?;
    a.send(&json!({"event": "teleport", "data": {"x": 1}})).await?;
    a.send(&json!({"event": "move", "data": {"position": {"x": 2.0, "y": 0.0, "z": 0.0}}}))
        .await?;

    assert_eq!(
        b.drain().await,
        vec![ServerEvent::Move(PlayerMoved {
            player_id: a_id,
            position: Vec3::new(2.0, 0.0, 0.0),
        })]
    );
    assert_eq!(relay.players().await?.len(), 2);

    relay.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn combat_uses_sender_as_attacker() -> anyhow::Result<()> {
    let (relay, cfg) = start_relay().await?;
    let (mut a, a_id) = RawPeer::join(&cfg).await?;
    let (mut b, b_id) = RawPeer::join(&cfg).await?;
    a.drain().await;

    a.send(&json!({
        "event": "combat",
        "data": {"attackerId": b_id.0, "targetId": b_id.0, "abilityName": "specialAbility"}
    }))
    .await?;

    let expected = vec![ServerEvent::Combat(CombatEvent {
        attacker_id: a_id,
        target_id: b_id,
        ability_name: "specialAbility".into(),
        damage: Some(50),
    })];
    assert_eq!(a.drain().await, expected);
    assert_eq!(b.drain().await, expected);

    relay.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn combat_against_missing_target_is_silent() -> anyhow::Result<()> {
    let (relay, cfg) = start_relay().await?;
    let (mut a, _) = RawPeer::join(&cfg).await?;
    let (mut b, _) = RawPeer::join(&cfg).await?;
    a.drain().await;
    let before = relay.players().await?;

    a.send(&json!({
        "event": "combat",
        "data": {"targetId": 99, "abilityName": "basicAttack"}
    }))
    .await?;

    assert!(a.drain().await.is_empty());
    assert!(b.drain().await.is_empty());
    assert_eq!(relay.players().await?, before);

    relay.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kick_closes_connection_and_notifies_peers() -> anyhow::Result<()> {
    let (relay, cfg) = start_relay().await?;
    let (mut a, a_id) = RawPeer::join(&cfg).await?;
    let (mut b, b_id) = RawPeer::join(&cfg).await?;
    a.drain().await;

    let out = relay.console(&format!("kick {b_id}")).await?;
    assert_eq!(out, vec![format!("Kicked {b_id}")]);

    assert!(b.is_closed().await);
    assert_eq!(a.drain().await, vec![ServerEvent::PlayerDisconnected(b_id)]);
    let ids: Vec<PlayerId> = relay
        .players()
        .await?
        .into_iter()
        .map(|p| p.player_id)
        .collect();
    assert_eq!(ids, vec![a_id]);

    relay.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closing_the_socket_removes_the_session() -> anyhow::Result<()> {
    let (relay, cfg) = start_relay().await?;
    let (mut a, _) = RawPeer::join(&cfg).await?;
    let (b, b_id) = RawPeer::join(&cfg).await?;
    a.drain().await;

    b.close().await?;
    assert_eq!(a.drain().await, vec![ServerEvent::PlayerDisconnected(b_id)]);
    assert_eq!(relay.players().await?.len(), 1);

    relay.shutdown().await
}
