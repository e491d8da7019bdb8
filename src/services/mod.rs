pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, UserInfo};
pub use auth_service_impl::SeaOrmAuthService;

pub mod upload;
pub use upload::{StoredUpload, UploadRejection, UploadValidator, UploadedFile};

pub mod preprocess;
pub use preprocess::{ImagePreprocessor, ImageTensor};

pub mod inference;
pub use inference::{InferenceError, Model, OnnxModel};

pub mod classifier;
pub use classifier::BinaryClassifier;

pub mod classification;
pub use classification::{ClassificationOutcome, ClassificationService, ClassifyError, Task};
