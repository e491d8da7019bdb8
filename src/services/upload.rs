//! Upload validation and storage.
//!
//! Cheap checks (presence, filename, extension) run before anything touches
//! disk. The colour-mode check needs the decoded image, so it runs after the
//! file is written; the returned [`StoredUpload`] guard removes the file on
//! every path that does not explicitly retain it.

use axum::body::Bytes;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{ColorPolicy, DeploymentProfile};

const MAX_STEM_CHARS: usize = 100;

/// A file part taken from a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

/// Why an upload was not accepted. The `Display` text is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    #[error("No file part in the request.")]
    MissingFilePart,

    #[error("No selected file.")]
    EmptyFilename,

    #[error("Only {allowed} files are allowed.")]
    DisallowedExtension { allowed: String },

    #[error("The uploaded file is empty.")]
    EmptyFile,

    #[error("The uploaded file is not a readable image.")]
    Undecodable,

    #[error("{}", color_message(.policy))]
    ColorMode { policy: ColorPolicy },
}

const fn color_message(policy: &ColorPolicy) -> &'static str {
    match policy {
        ColorPolicy::RequireRgb => "Only colour (RGB) images are accepted.",
        ColorPolicy::RejectRgb | ColorPolicy::Any => {
            "Colour (RGB) images are not accepted. Please upload a grayscale scan."
        }
    }
}

impl UploadRejection {
    /// Stable identifier for metrics labels.
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingFilePart => "missing_file_part",
            Self::EmptyFilename => "empty_filename",
            Self::DisallowedExtension { .. } => "disallowed_extension",
            Self::EmptyFile => "empty_file",
            Self::Undecodable => "undecodable",
            Self::ColorMode { .. } => "color_mode",
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Rejected(#[from] UploadRejection),

    #[error("Failed to store upload: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Upload task failed: {0}")]
    Task(String),
}

/// A file written to the upload directory.
///
/// Dropping the guard deletes the file unless [`StoredUpload::retain`] was
/// called first.
#[derive(Debug)]
pub struct StoredUpload {
    path: PathBuf,
    display_name: String,
    retained: bool,
}

impl StoredUpload {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sanitised client filename, safe to echo back.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn retain(&mut self) {
        self.retained = true;
    }
}

impl Drop for StoredUpload {
    fn drop(&mut self) {
        if self.retained {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove upload"),
        }
    }
}

/// An upload that passed every check, with its decoded image.
#[derive(Debug)]
pub struct AcceptedUpload {
    pub stored: StoredUpload,
    pub image: DynamicImage,
}

#[derive(Debug, Clone)]
pub struct UploadValidator {
    directory: PathBuf,
    profile: DeploymentProfile,
    namespace_files: bool,
}

impl UploadValidator {
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, profile: &DeploymentProfile, namespace_files: bool) -> Self {
        Self {
            directory: directory.into(),
            profile: profile.clone(),
            namespace_files,
        }
    }

    /// Pre-storage checks. Returns the sanitised filename.
    pub fn check(&self, file: Option<&UploadedFile>) -> Result<String, UploadRejection> {
        let file = file.ok_or(UploadRejection::MissingFilePart)?;

        if file.filename.trim().is_empty() {
            return Err(UploadRejection::EmptyFilename);
        }

        let safe_name = sanitize_filename(&file.filename).ok_or(UploadRejection::EmptyFilename)?;

        let allowed = Path::new(&safe_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.profile.allows_extension(ext));

        if !allowed {
            return Err(UploadRejection::DisallowedExtension {
                allowed: self.profile.extension_list(),
            });
        }

        if file.bytes.is_empty() {
            return Err(UploadRejection::EmptyFile);
        }

        Ok(safe_name)
    }

    /// Runs every check, writing the file before the decode and colour-mode
    /// checks. On rejection after the write the file is already gone.
    pub async fn accept(&self, file: Option<UploadedFile>) -> Result<AcceptedUpload, UploadError> {
        let safe_name = self.check(file.as_ref())?;
        let Some(file) = file else {
            return Err(UploadRejection::MissingFilePart.into());
        };

        let stored_name = if self.namespace_files {
            format!("{}_{safe_name}", uuid::Uuid::new_v4().simple())
        } else {
            safe_name.clone()
        };
        let path = self.directory.join(stored_name);

        tokio::fs::write(&path, &file.bytes).await?;

        let stored = StoredUpload {
            path,
            display_name: safe_name,
            retained: false,
        };

        let read_path = stored.path.clone();
        let image = tokio::task::spawn_blocking(move || decode_file(&read_path))
            .await
            .map_err(|e| UploadError::Task(e.to_string()))?;

        let Some(image) = image else {
            return Err(UploadRejection::Undecodable.into());
        };

        let policy = self.profile.color_policy;
        if !policy.permits(image.color().has_color()) {
            return Err(UploadRejection::ColorMode { policy }
            .into());
        }

        Ok(AcceptedUpload { stored, image })
    }
}

fn decode_file(path: &Path) -> Option<DynamicImage> {
    let reader = image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .ok()?;
    reader.decode().ok()
}

/// Reduces a client-supplied filename to a single safe path component.
///
/// Directory parts are discarded, characters outside `[A-Za-z0-9._-]` become
/// `_`, and overly long stems are truncated. Returns `None` when nothing
/// usable remains (e.g. `..`).
#[must_use]
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.chars().all(|c| c == '.' || c == '_') {
        return None;
    }

    let (stem, ext) = match cleaned.rfind('.') {
        Some(idx) if idx > 0 => (&cleaned[..idx], &cleaned[idx..]),
        _ => (cleaned.as_str(), ""),
    };

    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    Some(format!("{stem}{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Variant;
    use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("imgclass-upload-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn png_bytes(image: DynamicImage) -> Bytes {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        Bytes::from(buf.into_inner())
    }

    fn rgb_png() -> Bytes {
        png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([10, 200, 30]))))
    }

    fn gray_png() -> Bytes {
        png_bytes(DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([128]))))
    }

    fn file(name: &str, bytes: Bytes) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            bytes,
        }
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("scan.png").as_deref(), Some("scan.png"));
        assert_eq!(
            sanitize_filename("../../etc/passwd.png").as_deref(),
            Some("passwd.png")
        );
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\my scan (1).PNG").as_deref(),
            Some("my_scan__1_.PNG")
        );
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename("dir/"), None);

        let long = format!("{}.png", "a".repeat(300));
        let cleaned = sanitize_filename(&long).unwrap();
        assert_eq!(cleaned.len(), MAX_STEM_CHARS + 4);
        assert!(cleaned.ends_with(".png"));
    }

    #[test]
    fn test_check_rejections() {
        let validator = UploadValidator::new(temp_dir(), &Variant::Medical.preset(), true);

        assert_eq!(validator.check(None), Err(UploadRejection::MissingFilePart));
        assert_eq!(
            validator.check(Some(&file("  ", rgb_png()))),
            Err(UploadRejection::EmptyFilename)
        );
        assert_eq!(
            validator.check(Some(&file("photo.jpg", rgb_png()))),
            Err(UploadRejection::DisallowedExtension {
                allowed: "PNG".to_string()
            })
        );
        assert_eq!(
            validator.check(Some(&file("noext", rgb_png()))),
            Err(UploadRejection::DisallowedExtension {
                allowed: "PNG".to_string()
            })
        );
        assert_eq!(
            validator.check(Some(&file("scan.png", Bytes::new()))),
            Err(UploadRejection::EmptyFile)
        );
        assert_eq!(
            validator.check(Some(&file("SCAN.PNG", rgb_png()))).as_deref(),
            Ok("SCAN.PNG")
        );
    }

    #[test]
    fn rejection_messages_name_the_allowed_types() {
        let rejection = UploadRejection::DisallowedExtension {
            allowed: "PNG, JPG, JPEG".to_string(),
        };
        assert_eq!(
            rejection.to_string(),
            "Only PNG, JPG, JPEG files are allowed."
        );
        assert_eq!(rejection.reason_code(), "disallowed_extension");
    }

    #[tokio::test]
    async fn accepted_upload_is_removed_when_dropped() {
        let dir = temp_dir();
        let validator = UploadValidator::new(&dir, &Variant::Animal.preset(), true);

        let accepted = validator
            .accept(Some(file("cat.png", rgb_png())))
            .await
            .unwrap();
        let path = accepted.stored.path().to_path_buf();

        assert!(path.exists());
        assert!(path.starts_with(&dir));
        assert_eq!(accepted.stored.display_name(), "cat.png");
        assert_ne!(path.file_name().unwrap(), "cat.png");

        drop(accepted);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn retained_upload_survives_drop() {
        let dir = temp_dir();
        let validator = UploadValidator::new(&dir, &Variant::Animal.preset(), false);

        let mut accepted = validator
            .accept(Some(file("cat.png", rgb_png())))
            .await
            .unwrap();
        accepted.stored.retain();
        let path = accepted.stored.path().to_path_buf();
        drop(accepted);

        assert_eq!(path, dir.join("cat.png"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn undecodable_file_is_cleaned_up() {
        let dir = temp_dir();
        let validator = UploadValidator::new(&dir, &Variant::Animal.preset(), true);

        let err = validator
            .accept(Some(file("fake.png", Bytes::from_static(b"not an image"))))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Rejected(UploadRejection::Undecodable)
        ));
        assert!(dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn color_policy_runs_after_store_and_cleans_up() {
        let dir = temp_dir();
        let mut profile = Variant::Medical.preset();
        profile.color_policy = ColorPolicy::RejectRgb;
        let validator = UploadValidator::new(&dir, &profile, true);

        let err = validator
            .accept(Some(file("scan.png", rgb_png())))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::Rejected(UploadRejection::ColorMode { .. })
        ));
        assert!(dir_is_empty(&dir));

        let accepted = validator
            .accept(Some(file("scan.png", gray_png())))
            .await
            .unwrap();
        assert!(!accepted.image.color().has_color());
    }
}
