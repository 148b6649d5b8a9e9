//! Snapshot CLI: connects to a local OpenD instance using the `FUTU_*`
//! environment variables and prints one portfolio snapshot as JSON.

use futu_portfolio::PortfolioSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let session = PortfolioSession::from_env();
    let snapshot = session.get_snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    session.disconnect().await;
    Ok(())
}
