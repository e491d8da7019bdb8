//! Init command handler

use std::path::Path;

use crate::config::Config;
use crate::domain::Variant;

pub fn cmd_init(path: &Path, variant: Variant, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    let config = Config::for_variant(variant);
    config.save_to_path(path)?;

    println!("✓ Wrote {variant} config to {}", path.display());
    println!("  Classifier model: {}", config.models.classifier.path);
    if let Some(segmenter) = &config.models.segmenter {
        println!("  Segmentation model: {}", segmenter.path);
    }
    println!("Set session.secret (64+ bytes) before running in production.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_variant_config_once() {
        let dir = std::env::temp_dir().join(format!("imgclass-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        cmd_init(&path, Variant::Medical, false).unwrap();
        let written = Config::load_from_path(&path).unwrap();
        assert_eq!(written.profile.variant, Variant::Medical);
        assert!(written.models.segmenter.is_some());

        cmd_init(&path, Variant::Animal, false).unwrap();
        let unchanged = Config::load_from_path(&path).unwrap();
        assert_eq!(unchanged.profile.variant, Variant::Medical);

        cmd_init(&path, Variant::Animal, true).unwrap();
        let replaced = Config::load_from_path(&path).unwrap();
        assert_eq!(replaced.profile.variant, Variant::Animal);
    }
}
