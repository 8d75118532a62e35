#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chargeguard::cli::run().await
}
