use image::{DynamicImage, ImageResult, imageops::FilterType};
use std::path::Path;

pub const CHANNELS: usize = 3;

/// Batch-of-one NHWC `f32` tensor, values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    size: u32,
    data: Vec<f32>,
}

impl ImageTensor {
    /// Wraps raw NHWC data. Returns `None` if the length does not match
    /// `size * size * 3`.
    #[must_use]
    pub fn from_raw(size: u32, data: Vec<f32>) -> Option<Self> {
        let side = size as usize;
        (data.len() == side * side * CHANNELS).then_some(Self { size, data })
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn shape(&self) -> [usize; 4] {
        let side = self.size as usize;
        [1, side, side, CHANNELS]
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Decode → RGB → square resize → scale to `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    size: u32,
}

impl ImagePreprocessor {
    #[must_use]
    pub const fn new(size: u32) -> Self {
        Self { size }
    }

    #[must_use]
    pub fn preprocess(&self, image: &DynamicImage) -> ImageTensor {
        // Grayscale input is replicated into three channels here.
        let rgb = image.to_rgb8();
        let resized = image::imageops::resize(&rgb, self.size, self.size, FilterType::Triangle);

        let data = resized
            .as_raw()
            .iter()
            .map(|&v| f32::from(v) / 255.0)
            .collect();

        ImageTensor {
            size: self.size,
            data,
        }
    }

    pub fn preprocess_path(&self, path: &Path) -> ImageResult<ImageTensor> {
        let image = image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()?;
        Ok(self.preprocess(&image))
    }
}
