use tales_client::TalesClient;

/// Print every story and its page count
pub async fn stories(client: &TalesClient) -> anyhow::Result<()> {
    let stories = client.list_stories().await?;

    if stories.is_empty() {
        println!("No stories yet. Write one with `audiotales generate`.");
        return Ok(());
    }

    for story in &stories {
        let pages = story.pages.len();
        println!("{} ({pages} page{})", story.story, if pages == 1 { "" } else { "s" });
    }

    Ok(())
}

/// Print the voices the speech service offers, marking the ones the reader supports
pub async fn voices(client: &TalesClient) -> anyhow::Result<()> {
    for voice in client.voices().await? {
        if tales_narration::is_supported_voice(&voice) {
            println!("{voice}");
        } else {
            println!("{voice} (unsupported)");
        }
    }

    Ok(())
}
