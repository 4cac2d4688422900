#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = ipe_competencies::run().await {
        eprintln!("ipe-competencies fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
