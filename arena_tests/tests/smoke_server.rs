use arena_server::server::bind_ephemeral;
use arena_shared::{
    math::Vec3,
    net::{PlayerId, PlayerSnapshot, ServerEvent},
};
use arena_tests::{init_tracing, RawPeer};
use tokio::sync::oneshot;

/// Smoke test: relay starts, answers the console, and shuts down cleanly.
#[tokio::test]
async fn relay_starts_and_stops() -> anyhow::Result<()> {
    let (server, cfg) = bind_ephemeral().await?;
    let relay = server.spawn()?;
    assert_eq!(relay.local_addr().to_string(), cfg.server_addr);

    let status = relay.console("status").await?;
    assert_eq!(status[0], "Sessions: 0");

    relay.shutdown().await?;
    Ok(())
}

/// `run` serves in the foreground and closes sessions once its shutdown
/// future resolves.
#[tokio::test]
async fn relay_runs_until_shutdown_future_resolves() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = bind_ephemeral().await?;
    let (stop, stopped) = oneshot::channel::<()>();
    let running = tokio::spawn(server.run(async {
        let _ = stopped.await;
    }));

    let (mut a, a_id) = RawPeer::join(&cfg).await?;
    let (_b, b_id) = RawPeer::join(&cfg).await?;
    assert_eq!((a_id, b_id), (PlayerId(0), PlayerId(1)));
    assert_eq!(
        a.drain().await,
        vec![ServerEvent::PlayerConnected(PlayerSnapshot {
            player_id: b_id,
            position: Vec3::ZERO,
        })]
    );

    let _ = stop.send(());
    running.await??;
    assert!(a.is_closed().await);
    Ok(())
}
