// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use webpconv_codec::{
    decode_webp, encode_jpeg, has_webp_extension, output_name, JPEG_CONTENT_TYPE,
    JPEG_EXTENSION,
};

use crate::job_engine::job::{Converted, ErrorKind, JobError, Payload, Processor};

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Converts one uploaded WebP image into a JPEG.
#[derive(Clone, Debug)]
pub struct WebpToJpegJob {
    quality: u8,
    output_dir: Option<PathBuf>,
}

impl Default for WebpToJpegJob {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl WebpToJpegJob {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            output_dir: None,
        }
    }

    /// Also writes every converted file into `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    fn persist(&self, dir: &Path, name: &str, data: &[u8]) {
        let path = dir.join(name);
        match fs::write(&path, data) {
            Ok(()) => debug!("Wrote {}", path.display()),
            Err(e) => warn!("Could not write {}: {e}", path.display()),
        }
    }
}

impl Processor for WebpToJpegJob {
    fn desc(&self) -> &str {
        "convert webp to jpeg"
    }

    fn process(&self, payload: &Payload) -> Result<Converted, JobError> {
        // Only the last path component of the client supplied name is used.
        let filename = Path::new(&payload.filename)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();

        if !has_webp_extension(filename) {
            return Err(JobError::new(
                ErrorKind::InvalidInput,
                "invalid file type. Only WebP files accepted",
            ));
        }

        let image = decode_webp(&payload.data).map_err(|e| {
            JobError::new(ErrorKind::Codec, format!("error decoding WebP: {e}"))
        })?;
        let data = encode_jpeg(&image, self.quality).map_err(|e| {
            JobError::new(ErrorKind::Codec, format!("error converting to JPEG: {e}"))
        })?;
        let output_name = output_name(filename, JPEG_EXTENSION);

        if let Some(dir) = &self.output_dir {
            self.persist(dir, &output_name, &data);
        }

        Ok(Converted {
            data,
            output_name,
            content_type: JPEG_CONTENT_TYPE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_engine::pool::{PoolConfig, WorkerPool};
    use futures::executor::block_on;
    use image::codecs::webp::WebPEncoder;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::sync::Arc;
    use std::time::Duration;

    fn sample_webp(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128, 255])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_with_encoder(WebPEncoder::new_lossless(&mut buffer))
            .unwrap();
        buffer
    }

    #[test]
    fn test_converts_webp_to_jpeg() {
        let job = WebpToJpegJob::default();
        let converted = job
            .process(&Payload::new("meme.webp", sample_webp(32, 16)))
            .unwrap();

        assert_eq!(converted.output_name, "meme.jpg");
        assert_eq!(converted.content_type, "image/jpeg");
        assert_eq!(
            image::guess_format(&converted.data).unwrap(),
            ImageFormat::Jpeg
        );
        let decoded = image::load_from_memory(&converted.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test]
    fn test_extension_is_checked_case_insensitively() {
        let job = WebpToJpegJob::default();
        let converted = job
            .process(&Payload::new("PHOTO.WEBP", sample_webp(4, 4)))
            .unwrap();
        assert_eq!(converted.output_name, "PHOTO.jpg");
    }

    #[test]
    fn test_rejects_other_extensions() {
        let job = WebpToJpegJob::default();
        let err = job
            .process(&Payload::new("photo.png", sample_webp(4, 4)))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(err.detail, "invalid file type. Only WebP files accepted");
    }

    #[test]
    fn test_corrupt_data_is_a_codec_failure() {
        let job = WebpToJpegJob::default();
        let err = job
            .process(&Payload::new("broken.webp", b"RIFF but not really".to_vec()))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Codec);
        assert!(err.detail.starts_with("error decoding WebP: "), "{}", err.detail);
    }

    #[test]
    fn test_path_components_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let job = WebpToJpegJob::default().with_output_dir(dir.path());
        let converted = job
            .process(&Payload::new("../../etc/cat.webp", sample_webp(4, 4)))
            .unwrap();

        assert_eq!(converted.output_name, "cat.jpg");
        assert!(dir.path().join("cat.jpg").exists());
    }

    #[test]
    fn test_output_dir_receives_a_copy() {
        let dir = tempfile::tempdir().unwrap();
        let job = WebpToJpegJob::new(80).with_output_dir(dir.path());
        let converted = job
            .process(&Payload::new("copy.webp", sample_webp(8, 8)))
            .unwrap();

        let written = fs::read(dir.path().join("copy.jpg")).unwrap();
        assert_eq!(written, converted.data);
    }

    #[test]
    fn test_unwritable_output_dir_does_not_fail_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let job = WebpToJpegJob::default().with_output_dir(&missing);

        let converted = job.process(&Payload::new("a.webp", sample_webp(4, 4)));
        assert!(converted.is_ok());
        assert!(!missing.exists());
    }

    #[test]
    fn test_conversion_through_the_pool() {
        let pool = WorkerPool::start(PoolConfig::default(), Arc::new(WebpToJpegJob::default()))
            .unwrap();
        let data = sample_webp(64, 48);
        let input_len = data.len() as u64;

        let completed =
            block_on(pool.dispatcher().handle(Payload::new("meme.webp", data))).unwrap();

        assert_eq!(completed.output.output_name, "meme.jpg");
        assert_eq!(completed.metrics.input_bytes, input_len);
        assert_eq!(
            completed.metrics.output_bytes,
            completed.output.data.len() as u64
        );
        let decoded =
            image::load_from_memory_with_format(&completed.output.data, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));

        block_on(pool.shutdown(Duration::from_secs(2))).unwrap();
    }
}
