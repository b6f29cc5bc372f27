use crate::Config;
use crate::pipeline::{FormatOptimizer, path};
use std::path::PathBuf;

/// Run the optimizer on a local file, e.g. `render photo.jpg webp/300x400/fp=10,20 -o out.webp`
pub async fn handle_render_command(
    config: &Config,
    input: PathBuf,
    transform: String,
    output: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    if !input.exists() {
        eprintln!("Error: Image file not found: {:?}", input);
        std::process::exit(1);
    }

    let params = path::parse_transform(&transform);
    if let Some(message) = &params.error {
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }

    let data = tokio::fs::read(&input).await?;
    let input_size = data.len();

    let optimizer = FormatOptimizer::new(
        config.pipeline.default_quality,
        config.app.copyright_holder.clone(),
    );
    let result = optimizer.optimize(data, &params).await?;
    tokio::fs::write(&output, &result.buffer).await?;

    println!("Input:  {:?} ({} bytes)", input, input_size);
    println!("Output: {:?}", output);
    println!("Format: {} ({})", result.format, result.format.mime_type());
    println!("Size:   {}", result.size);
    println!(
        "Bytes:  {} ({:.1}% of input)",
        result.buffer.len(),
        result.buffer.len() as f64 * 100.0 / input_size.max(1) as f64
    );

    if output
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| !ext.eq_ignore_ascii_case(result.format.extension()))
    {
        println!(
            "Note: output was encoded as {}, consider the .{} extension",
            result.format,
            result.format.extension()
        );
    }

    Ok(())
}
