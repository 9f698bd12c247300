use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use image::ImageFormat;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{
    errors::{LunarSegError, Result},
    preprocess,
    traits::SegmentationModel,
    Segmenter,
};

/// Outcome of a directory run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub segmented: usize,
    /// Images refused by validation (too small, not RGB).
    pub skipped: usize,
}

/// Segments every JPEG/PNG/BMP under `input_dir` one image at a time, writing
/// `<relative path>.png` under `output_dir`.
pub struct DirectorySegmenter<'a, M: SegmentationModel> {
    segmenter: &'a Segmenter<M>,
    input_dir: PathBuf,
    output_dir: PathBuf,
    show_progress: bool,
}

impl<'a, M: SegmentationModel> DirectorySegmenter<'a, M> {
    pub fn new(
        segmenter: &'a Segmenter<M>,
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            segmenter,
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            show_progress: true,
        }
    }

    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn run(&self) -> Result<BatchSummary> {
        if !self.input_dir.is_dir() {
            return Err(LunarSegError::FileSystem {
                path: self.input_dir.clone(),
                operation: "read input directory".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "input directory does not exist",
                ),
            });
        }

        let image_files = collect_image_files(&self.input_dir);
        if image_files.is_empty() {
            info!("no images found under {}", self.input_dir.display());
            return Ok(BatchSummary::default());
        }

        let progress_bar = if self.show_progress {
            ProgressBar::new(image_files.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        progress_bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
            )
            .map_err(|e| LunarSegError::Configuration {
                message: e.to_string(),
            })?
            .progress_chars("#>-"),
        );

        let segmented = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        image_files
            .par_iter()
            .progress_with(progress_bar.clone())
            .try_for_each(|path| -> Result<()> {
                match self.segment_file(path) {
                    Ok(()) => {
                        segmented.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                    Err(e) if e.is_client_error() => {
                        warn!("skipping {}: {e}", path.display());
                        skipped.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            })?;
        progress_bar.finish();

        let summary = BatchSummary {
            segmented: segmented.into_inner(),
            skipped: skipped.into_inner(),
        };
        info!(
            segmented = summary.segmented,
            skipped = summary.skipped,
            "finished segmenting {}",
            self.input_dir.display()
        );
        Ok(summary)
    }

    fn segment_file(&self, input_file: &Path) -> Result<()> {
        let bytes = fs::read(input_file).map_err(|source| LunarSegError::FileSystem {
            path: input_file.to_path_buf(),
            operation: "read image".to_string(),
            source,
        })?;
        let image = preprocess::decode(&bytes)?;
        let segmented = self.segmenter.segment_image(&image)?;

        let output_file = self.output_path(input_file)?;
        if let Some(parent) = output_file.parent() {
            fs::create_dir_all(parent).map_err(|source| LunarSegError::FileSystem {
                path: parent.to_path_buf(),
                operation: "create output directory".to_string(),
                source,
            })?;
        }
        segmented
            .save_with_format(&output_file, ImageFormat::Png)
            .map_err(|source| LunarSegError::Encode { source })
    }

    /// Mirrors `input_file`'s position under the input directory into the
    /// output directory, with a `.png` extension.
    pub fn output_path(&self, input_file: &Path) -> Result<PathBuf> {
        let relative =
            input_file
                .strip_prefix(&self.input_dir)
                .map_err(|_| LunarSegError::FileSystem {
                    path: input_file.to_path_buf(),
                    operation: "relative path".to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "file is not inside the input directory",
                    ),
                })?;
        Ok(self.output_dir.join(relative).with_extension("png"))
    }
}

pub fn is_supported_image_format(path: &Path) -> bool {
    matches!(
        ImageFormat::from_path(path),
        Ok(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Bmp)
    )
}

fn collect_image_files(input_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported_image_format(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
