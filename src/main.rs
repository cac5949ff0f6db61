#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gatekeeper::app::run().await
}
