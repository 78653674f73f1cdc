//! Smoke test: server can run a few ticks without panicking.

use arena_server::server::bind_ephemeral;

#[tokio::test]
async fn server_runs_few_ticks() -> anyhow::Result<()> {
    let mut server = bind_ephemeral(64).await?;
    server.run_for_ticks(3).await?;
    assert_eq!(server.tick(), 3);
    Ok(())
}
