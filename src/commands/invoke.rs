use crate::Config;
use crate::pipeline::{InvocationEvent, Pipeline};
use tokio::io::AsyncReadExt;

/// Run one API-gateway style event (`-` reads it from stdin) and print the response JSON
pub async fn handle_invoke_command(
    config: &Config,
    event_source: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = if event_source == "-" {
        let mut raw = String::new();
        tokio::io::stdin().read_to_string(&mut raw).await?;
        raw
    } else {
        tokio::fs::read_to_string(&event_source).await?
    };

    let event: InvocationEvent = serde_json::from_str(&raw)?;
    let pipeline = Pipeline::from_config(config).await?;
    let response = pipeline.handle_event(&event).await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
