//! Classify command handler

use std::path::Path;

use crate::config::Config;
use crate::services::{ClassificationService, Task, inference::load_configured_models};

pub async fn cmd_classify(config: &Config, path: &Path, segment: bool) -> anyhow::Result<()> {
    let profile = config.profile.resolve();

    let extension_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| profile.allows_extension(ext));
    if !extension_ok {
        anyhow::bail!("Only {} files are allowed.", profile.extension_list());
    }

    let models = config.models.clone();
    let (classifier, segmenter) =
        tokio::task::spawn_blocking(move || load_configured_models(&models)).await??;

    let service = ClassificationService::from_config(config, &profile, classifier, segmenter);
    let task = if segment { Task::Segment } else { Task::Classify };

    let result = service
        .classify_path(task, path)
        .await
        .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;

    println!("{}: {} ({})", path.display(), result.label, result.confidence);

    Ok(())
}
