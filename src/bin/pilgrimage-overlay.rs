//! Pilgrimage overlay command line tool
//!
//! Builds anime-versus-reality comparison images with local character
//! extraction (ONNX Runtime or Tract) and optional generative compositing.

#[cfg(feature = "cli")]
use pilgrimage_overlay::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
