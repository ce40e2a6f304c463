//! `bgreplace` command-line tool

#[cfg(feature = "cli")]
use bgreplace::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("bgreplace was built without the `cli` feature");
    std::process::exit(1);
}
