// texture.rs: image sources for spheres and sprites, decoded off the UI thread

use image::io::Reader as ImageReader;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("unknown builtin image {0:?}")]
    UnknownBuiltin(String),

    #[error("cannot open {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot decode {src}: {source}")]
    Decode {
        src: String,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Builtin(String),
    File(PathBuf),
    Remote(String),
}

impl ImageSource {
    pub fn parse(src: &str) -> Self {
        if let Some(name) = src.strip_prefix("builtin:") {
            return ImageSource::Builtin(name.to_string());
        }
        if let Some(path) = src.strip_prefix("file://") {
            return ImageSource::File(PathBuf::from(path));
        }
        if src.starts_with("http://") || src.starts_with("https://") {
            return ImageSource::Remote(src.to_string());
        }
        ImageSource::File(PathBuf::from(src))
    }
}

/// Fetches and decodes one image. Blocking; run it on a worker thread.
pub fn load_image(src: &str) -> Result<RgbaImage, TextureError> {
    match ImageSource::parse(src) {
        ImageSource::Builtin(name) => builtin_image(&name).ok_or(TextureError::UnknownBuiltin(name)),
        ImageSource::File(path) => {
            let file = File::open(&path).map_err(|source| TextureError::Io {
                path: path.clone(),
                source,
            })?;
            decode(src, ImageReader::new(BufReader::new(file)))
        }
        ImageSource::Remote(url) => {
            let bytes = reqwest::blocking::get(&url)
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.bytes())
                .map_err(|source| TextureError::Http {
                    url: url.clone(),
                    source,
                })?;
            decode(src, ImageReader::new(Cursor::new(bytes)))
        }
    }
}

fn decode<R: std::io::BufRead + std::io::Seek>(src: &str, reader: ImageReader<R>) -> Result<RgbaImage, TextureError> {
    let decode_err = |source| TextureError::Decode {
        src: src.to_string(),
        source,
    };
    let mut reader = reader
        .with_guessed_format()
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?;
    // panoramas are routinely larger than the default limits
    reader.no_limits();
    Ok(reader.decode().map_err(decode_err)?.to_rgba8())
}

/// Procedural images: `point-marker`, `marker`, and `grid-<anything>`
/// equirectangular test panoramas tinted by their name.
pub fn builtin_image(name: &str) -> Option<RgbaImage> {
    match name {
        "point-marker" => Some(ring_icon(64, [255, 255, 255, 255], [30, 144, 255, 255])),
        "marker" => Some(ring_icon(64, [255, 200, 0, 255], [255, 255, 255, 255])),
        _ if name.starts_with("grid") => Some(grid_panorama(1024, 512, tint_for(name))),
        _ => None,
    }
}

fn ring_icon(size: u32, ring: [u8; 4], fill: [u8; 4]) -> RgbaImage {
    let c = (size as f32 - 1.0) / 2.0;
    let outer = size as f32 / 2.0;
    let inner = outer * 0.7;
    RgbaImage::from_fn(size, size, |x, y| {
        let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt();
        if d > outer {
            Rgba([0, 0, 0, 0])
        } else if d > inner {
            Rgba(ring)
        } else {
            Rgba(fill)
        }
    })
}

fn tint_for(name: &str) -> [f32; 3] {
    let h = name
        .bytes()
        .fold(0x811c_9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193));
    [
        0.4 + 0.6 * ((h & 0xff) as f32 / 255.0),
        0.4 + 0.6 * (((h >> 8) & 0xff) as f32 / 255.0),
        0.4 + 0.6 * (((h >> 16) & 0xff) as f32 / 255.0),
    ]
}

fn grid_panorama(width: u32, height: u32, tint: [f32; 3]) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let u = x as f32 / width as f32;
        let v = y as f32 / height as f32;
        let on_grid = (u * 32.0).fract() < 0.02 || (v * 16.0).fract() < 0.03;
        let horizon = (v - 0.5).abs() < 0.004;
        let shade = if horizon {
            1.0
        } else if on_grid {
            0.85
        } else if v < 0.5 {
            0.35 + 0.4 * v
        } else {
            0.55 - 0.4 * (v - 0.5)
        };
        let ch = |t: f32| (t * shade * 255.0).clamp(0.0, 255.0) as u8;
        Rgba([ch(tint[0]), ch(tint[1]), ch(tint[2]), 255])
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Ready,
    Failed,
}

type LoadResult = (String, Result<RgbaImage, TextureError>);

/// Loads each requested source once, on its own worker thread.
pub struct TextureLoader {
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
    states: HashMap<String, LoadState>,
}

impl TextureLoader {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            tx,
            rx,
            states: HashMap::new(),
        }
    }

    /// Starts loading `src` unless it was requested before.
    pub fn request(&mut self, src: &str) {
        if src.is_empty() || self.states.contains_key(src) {
            return;
        }
        self.states.insert(src.to_string(), LoadState::Pending);

        let src = src.to_string();
        let tx = self.tx.clone();
        thread::spawn(move || {
            log::debug!("loading image {src}");
            let result = load_image(&src);
            if tx.send((src, result)).is_err() {
                log::warn!("texture loader dropped before image arrived");
            }
        });
    }

    /// Decoded images that arrived since the last call. Failures are logged
    /// and leave the source untextured.
    pub fn poll(&mut self) -> Vec<(String, RgbaImage)> {
        let mut ready = Vec::new();
        while let Ok((src, result)) = self.rx.try_recv() {
            match result {
                Ok(img) => {
                    log::info!("image ready {src} ({}x{})", img.width(), img.height());
                    self.states.insert(src.clone(), LoadState::Ready);
                    ready.push((src, img));
                }
                Err(err) => {
                    log::warn!("{err}");
                    self.states.insert(src, LoadState::Failed);
                }
            }
        }
        ready
    }

    pub fn state(&self, src: &str) -> Option<LoadState> {
        self.states.get(src).copied()
    }

    pub fn pending(&self) -> usize {
        self.states.values().filter(|s| **s == LoadState::Pending).count()
    }
}

impl Default for TextureLoader {
    fn default() -> Self {
        Self::new()
    }
}
