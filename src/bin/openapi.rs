use anyhow::Result;

fn main() -> Result<()> {
    let doc = tessera::api::openapi();
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
