//! Frame sources and sinks backed by image files.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::Frame;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("failed to list {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode frame {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write frame {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Pull-based stream of frames; `Ok(None)` ends the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

/// Consumer of processed frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), SinkError>;

    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Read an image file as an RGB frame.
pub fn load_frame(path: impl AsRef<Path>) -> Result<Frame, SourceError> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|source| SourceError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Write a frame; the format follows the file extension.
pub fn save_frame(frame: &Frame, path: impl AsRef<Path>) -> Result<(), SinkError> {
    let path = path.as_ref();
    frame.save(path).map_err(|source| SinkError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

/// Image files of one directory, in lexicographic file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let read_err = |source| SourceError::ReadDir {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if is_image_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        info!("{} frames in {}", paths.len(), dir.display());
        Ok(Self { paths, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        debug!("reading {}", path.display());
        load_frame(path).map(Some)
    }
}

/// Writes `frame_000000.png`, `frame_000001.png`, ... into a directory.
#[derive(Debug)]
pub struct ImageSequenceSink {
    dir: PathBuf,
    written: usize,
}

impl ImageSequenceSink {
    /// Create the output directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SinkError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir, written: 0 })
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let path = self.path_for(self.written);
        save_frame(frame, &path)?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        info!("wrote {} frames to {}", self.written, self.dir.display());
        Ok(())
    }
}

/// Discards frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn sequence_source_reads_images_in_name_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, v) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
            RgbImage::from_pixel(3, 2, Rgb([v, v, v]))
                .save(dir.path().join(name))
                .expect("save");
        }
        fs::write(dir.path().join("notes.txt"), "skip me").expect("write");

        let mut src = ImageSequenceSource::open(dir.path()).expect("open");
        assert_eq!(src.len(), 3);
        let mut seen = Vec::new();
        while let Some(frame) = src.next_frame().expect("frame") {
            seen.push(frame.get_pixel(0, 0).0[0]);
        }
        assert_eq!(seen, vec![10, 20, 30]);
    }

    #[test]
    fn sequence_sink_numbers_frames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("out");
        let mut sink = ImageSequenceSink::create(&out).expect("sink");
        let frame = RgbImage::new(4, 4);
        sink.write_frame(&frame).expect("write");
        sink.write_frame(&frame).expect("write");
        sink.finish().expect("finish");

        assert_eq!(sink.written(), 2);
        assert!(out.join("frame_000000.png").is_file());
        assert!(out.join("frame_000001.png").is_file());
    }

    #[test]
    fn missing_directory_is_a_read_error() {
        let err = ImageSequenceSource::open("/no/such/frames").unwrap_err();
        assert!(matches!(err, SourceError::ReadDir { .. }));
    }
}
