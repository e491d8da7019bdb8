use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::LabelPair;

/// Which product this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Generic cat/dog photo classifier.
    #[default]
    Animal,
    /// Medical scan classifier with optional segmentation model.
    Medical,
}

impl Variant {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Animal => "animal",
            Self::Medical => "medical",
        }
    }

    /// Built-in settings for this variant before any config overrides.
    #[must_use]
    pub fn preset(&self) -> DeploymentProfile {
        match self {
            Self::Animal => DeploymentProfile {
                variant: *self,
                allowed_extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
                image_size: 150,
                decision_threshold: 0.5,
                post_login_route: "/dashboard".to_string(),
                color_policy: ColorPolicy::Any,
                labels: LabelPair::new("Cat", "Dog"),
                segment_labels: LabelPair::new("Foreground detected", "No foreground detected"),
            },
            Self::Medical => DeploymentProfile {
                variant: *self,
                allowed_extensions: vec!["png".into()],
                image_size: 224,
                decision_threshold: 0.5,
                post_login_route: "/home".to_string(),
                color_policy: ColorPolicy::Any,
                labels: LabelPair::new("Cancerous", "Non-Cancerous"),
                segment_labels: LabelPair::new("Tumor region detected", "No tumor region detected"),
            },
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "animal" | "catdog" => Ok(Self::Animal),
            "medical" | "mri" => Ok(Self::Medical),
            other => Err(format!("Unknown variant '{other}' (expected animal or medical)")),
        }
    }
}

/// Colour-mode rule applied to a stored upload after it is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorPolicy {
    #[default]
    Any,
    RequireRgb,
    RejectRgb,
}

impl ColorPolicy {
    /// Whether an image with (`has_color == true`) or without colour
    /// channels passes this policy.
    #[must_use]
    pub const fn permits(&self, has_color: bool) -> bool {
        match self {
            Self::Any => true,
            Self::RequireRgb => has_color,
            Self::RejectRgb => !has_color,
        }
    }
}

/// Fully resolved per-deployment settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentProfile {
    pub variant: Variant,

    /// Lowercase extensions without the leading dot.
    pub allowed_extensions: Vec<String>,

    /// Square edge length of the model input.
    pub image_size: u32,

    pub decision_threshold: f32,

    pub post_login_route: String,

    pub color_policy: ColorPolicy,

    pub labels: LabelPair,

    pub segment_labels: LabelPair,
}

impl DeploymentProfile {
    #[must_use]
    pub fn allows_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }

    /// Human-readable list for rejection messages, e.g. `PNG, JPG, JPEG`.
    #[must_use]
    pub fn extension_list(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(|e| e.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Value for the `accept` attribute of the upload input.
    #[must_use]
    pub fn accept_attribute(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(|e| format!(".{e}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_where_variants_differ() {
        let animal = Variant::Animal.preset();
        let medical = Variant::Medical.preset();

        assert_eq!(animal.image_size, 150);
        assert_eq!(medical.image_size, 224);
        assert_eq!(animal.post_login_route, "/dashboard");
        assert_eq!(medical.post_login_route, "/home");
        assert!(animal.allows_extension("JPEG"));
        assert!(!medical.allows_extension("jpg"));
        assert_eq!(medical.extension_list(), "PNG");
    }

    #[test]
    fn color_policy_permits() {
        assert!(ColorPolicy::Any.permits(true));
        assert!(ColorPolicy::Any.permits(false));
        assert!(ColorPolicy::RequireRgb.permits(true));
        assert!(!ColorPolicy::RequireRgb.permits(false));
        assert!(!ColorPolicy::RejectRgb.permits(true));
        assert!(ColorPolicy::RejectRgb.permits(false));
    }

    #[test]
    fn variant_parsing() {
        assert_eq!("Medical".parse::<Variant>().unwrap(), Variant::Medical);
        assert_eq!("catdog".parse::<Variant>().unwrap(), Variant::Animal);
        assert!("xray".parse::<Variant>().is_err());
    }

    #[test]
    fn accept_attribute_lists_dotted_extensions() {
        assert_eq!(Variant::Animal.preset().accept_attribute(), ".png,.jpg,.jpeg");
    }
}
