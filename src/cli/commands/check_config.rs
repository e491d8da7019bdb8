//! Check-config command handler

use crate::config::Config;

pub fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    let profile = config.profile.resolve();

    println!("Configuration OK");
    println!("{:-<50}", "");
    println!("Variant:            {}", profile.variant);
    println!("Allowed extensions: {}", profile.extension_list());
    println!("Image size:         {0}x{0}", profile.image_size);
    println!("Threshold:          {}", profile.decision_threshold);
    println!(
        "Labels:             {} / {}",
        profile.labels.positive, profile.labels.negative
    );
    println!("Colour policy:      {:?}", profile.color_policy);
    println!("Post-login route:   {}", profile.post_login_route);
    println!(
        "Classifier:         {} ({:?})",
        config.models.classifier.path, config.models.classifier.reduction
    );
    match &config.models.segmenter {
        Some(segmenter) => println!(
            "Segmenter:          {} ({:?})",
            segmenter.path, segmenter.reduction
        ),
        None => println!("Segmenter:          not configured"),
    }
    println!("Database:           {}", config.general.database_path);
    println!("Uploads:            {}", config.uploads.directory);
    println!(
        "Listen:             {}:{}",
        config.server.bind_address, config.server.port
    );

    Ok(())
}
