//! Upload → validate → preprocess → classify.

use image::ImageError;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{Classification, DeploymentProfile};
use crate::services::classifier::BinaryClassifier;
use crate::services::inference::{InferenceError, Model};
use crate::services::preprocess::ImagePreprocessor;
use crate::services::upload::{AcceptedUpload, UploadError, UploadRejection, UploadValidator, UploadedFile};

/// Which model a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Classify,
    Segment,
}

impl Task {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Segment => "segment",
        }
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Rejected(#[from] UploadRejection),

    /// The image passed validation but the model could not score it.
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("No segmentation model is configured")]
    Unavailable,

    #[error("File I/O failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UploadError> for ClassifyError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Rejected(r) => Self::Rejected(r),
            UploadError::Storage(e) => Self::Storage(e),
            UploadError::Task(msg) => Self::Internal(msg),
        }
    }
}

impl ClassifyError {
    /// Message suitable for a flash banner, or `None` when the failure is
    /// internal and must not be described to the user.
    #[must_use]
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Rejected(r) => Some(r.to_string()),
            Self::Inference(_) => {
                Some("The image could not be classified. Please try a different file.".to_string())
            }
            Self::Unavailable | Self::Storage(_) | Self::Internal(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub filename: String,
    pub classification: Classification,
    pub task: Task,
}

pub struct ClassificationService {
    validator: UploadValidator,
    preprocessor: ImagePreprocessor,
    classifier: Arc<BinaryClassifier>,
    segmenter: Option<Arc<BinaryClassifier>>,
    retain_uploads: bool,
}

impl ClassificationService {
    #[must_use]
    pub fn new(
        validator: UploadValidator,
        preprocessor: ImagePreprocessor,
        classifier: BinaryClassifier,
        segmenter: Option<BinaryClassifier>,
        retain_uploads: bool,
    ) -> Self {
        Self {
            validator,
            preprocessor,
            classifier: Arc::new(classifier),
            segmenter: segmenter.map(Arc::new),
            retain_uploads,
        }
    }

    /// Wires already-loaded models to the resolved profile and upload
    /// settings.
    #[must_use]
    pub fn from_config(
        config: &Config,
        profile: &DeploymentProfile,
        classifier: Arc<dyn Model>,
        segmenter: Option<Arc<dyn Model>>,
    ) -> Self {
        let classifier = BinaryClassifier::new(
            classifier,
            config.models.classifier.reduction,
            profile.decision_threshold,
            profile.labels.clone(),
            profile.image_size,
        );

        let segmenter = segmenter.zip(config.models.segmenter.as_ref()).map(|(model, cfg)| {
            BinaryClassifier::new(
                model,
                cfg.reduction,
                profile.decision_threshold,
                profile.segment_labels.clone(),
                profile.image_size,
            )
        });

        Self::new(
            UploadValidator::new(&config.uploads.directory, profile, config.uploads.namespace_files),
            ImagePreprocessor::new(profile.image_size),
            classifier,
            segmenter,
            config.uploads.retain,
        )
    }

    #[must_use]
    pub const fn has_segmenter(&self) -> bool {
        self.segmenter.is_some()
    }

    fn model_for(&self, task: Task) -> Option<&Arc<BinaryClassifier>> {
        match task {
            Task::Classify => Some(&self.classifier),
            Task::Segment => self.segmenter.as_ref(),
        }
    }

    pub async fn run(
        &self,
        task: Task,
        upload: Option<UploadedFile>,
    ) -> Result<ClassificationOutcome, ClassifyError> {
        let model = self.model_for(task).ok_or(ClassifyError::Unavailable)?.clone();

        let result = self.validator.accept(upload).await;
        let AcceptedUpload { mut stored, image } = match result {
            Ok(accepted) => accepted,
            Err(err) => {
                if let UploadError::Rejected(reason) = &err {
                    metrics::counter!("upload_rejections_total", "reason" => reason.reason_code())
                        .increment(1);
                    info!(task = task.as_str(), reason = reason.reason_code(), "Upload rejected");
                }
                return Err(err.into());
            }
        };

        let model_name = model.model_name().to_string();
        let preprocessor = self.preprocessor;
        let started = Instant::now();

        let classification = tokio::task::spawn_blocking(move || {
            let tensor = preprocessor.preprocess(&image);
            model.classify(&tensor)
        })
        .await
        .map_err(|e| ClassifyError::Internal(format!("Inference task failed: {e}")))?;

        let classification = match classification {
            Ok(c) => c,
            Err(err) => {
                warn!(task = task.as_str(), error = %err, "Inference failed on accepted upload");
                return Err(err.into());
            }
        };

        metrics::histogram!("inference_duration_seconds", "endpoint" => task.as_str())
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(
            "classifications_total",
            "endpoint" => task.as_str(),
            "label" => classification.label.clone()
        )
        .increment(1);

        if self.retain_uploads {
            stored.retain();
        }

        info!(
            task = task.as_str(),
            model = %model_name,
            label = %classification.label,
            score = classification.score,
            filename = %stored.display_name(),
            "Image classified"
        );

        Ok(ClassificationOutcome {
            filename: stored.display_name().to_string(),
            classification,
            task,
        })
    }

    /// Classifies an image already on disk. Nothing is stored or removed,
    /// and only the decode step of upload validation applies.
    pub async fn classify_path(
        &self,
        task: Task,
        path: &Path,
    ) -> Result<Classification, ClassifyError> {
        let model = self.model_for(task).ok_or(ClassifyError::Unavailable)?.clone();
        let preprocessor = self.preprocessor;
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let tensor = preprocessor.preprocess_path(&path).map_err(|e| match e {
                ImageError::IoError(io) => ClassifyError::Storage(io),
                _ => ClassifyError::Rejected(UploadRejection::Undecodable),
            })?;
            model.classify(&tensor).map_err(ClassifyError::from)
        })
        .await
        .map_err(|e| ClassifyError::Internal(format!("Inference task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputReduction;
    use crate::domain::{LabelPair, Variant};
    use crate::services::inference::Model;
    use crate::services::preprocess::ImageTensor;
    use axum::body::Bytes;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingModel {
        score: f32,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Model for CountingModel {
        fn name(&self) -> &str {
            "counting"
        }

        fn predict(&self, _input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(InferenceError::Runtime("boom".to_string()));
            }
            Ok(vec![self.score])
        }
    }

    fn service(model: Arc<CountingModel>, dir: &PathBuf) -> ClassificationService {
        let profile = Variant::Animal.preset();
        ClassificationService::new(
            UploadValidator::new(dir, &profile, true),
            ImagePreprocessor::new(profile.image_size),
            BinaryClassifier::new(
                model,
                OutputReduction::First,
                profile.decision_threshold,
                LabelPair::new("Cat", "Dog"),
                profile.image_size,
            ),
            None,
            false,
        )
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("imgclass-svc-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn png(name: &str) -> UploadedFile {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([1, 2, 3])));
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        UploadedFile {
            filename: name.to_string(),
            bytes: Bytes::from(buf.into_inner()),
        }
    }

    fn model(score: f32, fail: bool) -> Arc<CountingModel> {
        Arc::new(CountingModel {
            score,
            fail,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn classifies_and_cleans_up() {
        let dir = temp_dir();
        let model = model(0.8, false);
        let service = service(model.clone(), &dir);

        let outcome = service.run(Task::Classify, Some(png("kitty.png"))).await.unwrap();

        assert_eq!(outcome.classification.label, "Cat");
        assert_eq!(outcome.filename, "kitty.png");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert!(std::fs::read_dir(&dir).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn disallowed_extension_skips_the_model() {
        let dir = temp_dir();
        let model = model(0.8, false);
        let service = service(model.clone(), &dir);

        let err = service
            .run(Task::Classify, Some(png("kitty.gif")))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClassifyError::Rejected(UploadRejection::DisallowedExtension { .. })
        ));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inference_failure_maps_to_user_message_and_removes_file() {
        let dir = temp_dir();
        let service = service(model(0.8, true), &dir);

        let err = service.run(Task::Classify, Some(png("kitty.png"))).await.unwrap_err();

        assert!(matches!(err, ClassifyError::Inference(_)));
        assert!(err.user_message().is_some());
        assert!(std::fs::read_dir(&dir).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn classifies_a_file_on_disk_without_touching_uploads() {
        let dir = temp_dir();
        let upload_dir = temp_dir();
        let model = model(0.2, false);
        let service = service(model.clone(), &upload_dir);

        let path = dir.join("pet.png");
        std::fs::write(&path, &png("pet.png").bytes).unwrap();

        let result = service.classify_path(Task::Classify, &path).await.unwrap();
        assert_eq!(result.label, "Dog");
        assert!(path.exists());
        assert!(std::fs::read_dir(&upload_dir).unwrap().next().is_none());

        let garbage = dir.join("garbage.png");
        std::fs::write(&garbage, b"nope").unwrap();
        let err = service.classify_path(Task::Classify, &garbage).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Rejected(UploadRejection::Undecodable)));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error_not_a_bad_image() {
        let dir = temp_dir();
        let service = service(model(0.2, false), &dir);

        let err = service
            .classify_path(Task::Classify, &dir.join("absent.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClassifyError::Storage(_)));
        assert!(!err.to_string().contains("not a readable image"));
    }

    #[tokio::test]
    async fn segmentation_requires_a_model() {
        let dir = temp_dir();
        let service = service(model(0.8, false), &dir);

        assert!(!service.has_segmenter());
        let err = service.run(Task::Segment, Some(png("scan.png"))).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Unavailable));
        assert!(err.user_message().is_none());
    }
}
