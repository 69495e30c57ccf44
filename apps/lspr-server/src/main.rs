#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lspr_server::cli::run().await
}
