use std::path::PathBuf;
use utoipa::OpenApi;
use voxchat_api::router::ApiDoc;

/// Writes the OpenAPI document to the path given as the first argument,
/// or to `openapi.json` in the working directory.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("openapi.json"));
    std::fs::write(&path, ApiDoc::openapi().to_pretty_json()?)?;
    println!("OpenAPI document written to {}", path.display());
    Ok(())
}
