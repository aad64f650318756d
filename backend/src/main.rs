#[tokio::main]
async fn main() -> anyhow::Result<()> {
    qrinvite::start_server().await
}
