//! Command-line interface for imgclass.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::Variant;

/// imgclass - image upload and classification service
#[derive(Parser)]
#[command(name = "imgclass")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a config file (skips the default search locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server (default)
    Serve,

    /// Write a default config file for a variant
    Init {
        /// animal or medical
        #[arg(long, default_value_t = Variant::Animal)]
        variant: Variant,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Classify an image file with the configured model
    Classify {
        /// Image to classify
        path: PathBuf,
        /// Use the segmentation model instead of the classifier
        #[arg(long)]
        segment: bool,
    },

    /// Validate the config and print the resolved profile
    #[command(alias = "check")]
    CheckConfig,
}

pub use commands::*;
