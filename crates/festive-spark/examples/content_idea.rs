/// Generate one branded content idea from the command line.
///
/// Run: cargo run --example content_idea -- Diwali Coca-Cola "A refreshing drink that brings people together."
/// Requires: GEMINI_API_KEY (or GOOGLE_API_KEY / OPENAI_API_KEY) in env.
/// Set RUST_LOG=festive_spark=debug to watch the pipeline stages.
use festive_spark::{ContentIdeaGenerator, ErrorKind, RetryPolicy, with_retry};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let festival = args.next().unwrap_or_else(|| "Diwali".to_string());
    let brand = args.next().unwrap_or_else(|| "Coca-Cola".to_string());
    let insight = args
        .next()
        .unwrap_or_else(|| "A refreshing drink that brings people together.".to_string());

    let generator = ContentIdeaGenerator::from_env()?;

    // A malformed answer is worth another attempt; bad input is not.
    let result = with_retry(&RetryPolicy::default(), || {
        generator.generate_content_idea(&festival, &brand, &insight)
    })
    .await;

    let idea = match result {
        Ok(idea) => idea,
        Err(err) if err.kind == ErrorKind::InvalidInput => {
            eprintln!("Please fix: {}", err.violated_fields().join(", "));
            eprintln!("{err}");
            std::process::exit(2);
        }
        Err(err) => return Err(err.into()),
    };

    println!("Idea:       {}", idea.idea());
    println!("Format:     {}", idea.format());
    println!("Visual cue: {}", idea.visual_cue());
    println!("Copy line:  {}", idea.copy_line());
    println!("Rationale:  {}", idea.rationale());
    match idea.technique() {
        Some(technique) => println!("Technique:  {technique}"),
        None => println!("Technique:  (not named)"),
    }

    Ok(())
}
