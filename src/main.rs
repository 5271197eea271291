use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = bunq_firefly_import::args::parse();
    bunq_firefly_import::cli::main(args).await
}
