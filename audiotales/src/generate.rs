use anyhow::{Context, bail};
use tales_client::{StoryRequest, TalesClient};
use tales_config::{GenerationConfig, PAGE_RANGE};
use tales_stream::{StreamEvent, StreamOutcome};
use tokio_util::sync::CancellationToken;

/// Build the generation request, filling unset options from config
fn story_request(
    config: &GenerationConfig,
    prompt: String,
    pages: Option<u32>,
    path: Option<String>,
) -> anyhow::Result<StoryRequest> {
    if prompt.trim().is_empty() {
        bail!("a story prompt is required");
    }

    let pages = pages.unwrap_or(config.pages);
    if !PAGE_RANGE.contains(&pages) {
        bail!(
            "a story must have between {} and {} pages, got {pages}",
            PAGE_RANGE.start(),
            PAGE_RANGE.end()
        );
    }

    Ok(StoryRequest {
        story: prompt,
        pages,
        path: path.unwrap_or_else(|| config.stories_path.clone()),
    })
}

/// Write a story, echoing each progress event as a line on stdout
///
/// # Errors
///
/// Fails if the run cannot start, the stream breaks, or the run ends with an
/// error event
pub async fn run(
    client: &TalesClient,
    config: &GenerationConfig,
    prompt: String,
    pages: Option<u32>,
    path: Option<String>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let request = story_request(config, prompt, pages, path)?;

    let mut print = |event: StreamEvent| {
        tracing::debug!(kind = event.kind(), "generation event");
        let line = event
            .describe()
            .or_else(|| event.current_text().map(str::to_owned));
        if let Some(line) = line {
            println!("{line}");
        }
    };

    let summary = client
        .run_generation(&request, config.framing, &mut print, cancel)
        .await
        .context("story generation failed")?;

    match summary.outcome {
        StreamOutcome::Completed => {
            tracing::info!(events = summary.events, skipped = summary.skipped, "story generated");
        }
        StreamOutcome::Failed(error) => bail!("story generation failed: {error}"),
        StreamOutcome::Ended => {
            tracing::warn!(
                events = summary.events,
                "generation stream closed before the run reported completion"
            );
        }
        StreamOutcome::Cancelled => tracing::info!("story generation abandoned"),
    }

    Ok(())
}
