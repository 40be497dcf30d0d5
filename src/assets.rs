use crate::canvas::Rgb;
use crate::source::SourceGrid;
use image::imageops::FilterType;
use md5::{Digest, Md5};
use rand::{seq::SliceRandom, Rng};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Error)]
pub(crate) enum AssetError {
    #[error("no .png/.jpg/.jpeg images found in {}", .dir.display())]
    Unavailable { dir: PathBuf },
    #[error("could not read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not decode {}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// A decoded image ready for one animation cycle.
pub(crate) struct LoadedImage {
    pub(crate) path: PathBuf,
    pub(crate) digest: [u8; 16],
    pub(crate) grid: SourceGrid,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Image files directly inside `dir`, sorted by name.
pub(crate) fn list_images(dir: &Path) -> Result<Vec<PathBuf>, AssetError> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "image folder unreadable");
            return Err(AssetError::Unavailable {
                dir: dir.to_path_buf(),
            });
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    if files.is_empty() {
        return Err(AssetError::Unavailable {
            dir: dir.to_path_buf(),
        });
    }
    files.sort();
    Ok(files)
}

pub(crate) fn choose_image<R: Rng + ?Sized>(
    dir: &Path,
    rng: &mut R,
) -> Result<PathBuf, AssetError> {
    let files = list_images(dir)?;
    files
        .choose(rng)
        .cloned()
        .ok_or_else(|| AssetError::Unavailable {
            dir: dir.to_path_buf(),
        })
}

/// Read, hash and decode `path`, scaled to exactly `cols` x `rows` blocks.
pub(crate) fn load_image(path: &Path, cols: usize, rows: usize) -> Result<LoadedImage, AssetError> {
    let bytes = fs::read(path).map_err(|source| AssetError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&Md5::digest(&bytes));

    let img = image::load_from_memory(&bytes)
        .map_err(|source| AssetError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    tracing::debug!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        "decoded image"
    );

    Ok(LoadedImage {
        path: path.to_path_buf(),
        digest,
        grid: grid_from_image(&img, cols, rows),
    })
}

pub(crate) fn grid_from_image(img: &image::RgbImage, cols: usize, rows: usize) -> SourceGrid {
    if cols == 0 || rows == 0 || img.width() == 0 || img.height() == 0 {
        return SourceGrid::new(0, 0, Vec::new());
    }
    let small = image::imageops::resize(img, cols as u32, rows as u32, FilterType::Triangle);
    SourceGrid::from_fn(cols, rows, |x, y| {
        let p = small.get_pixel(x as u32, y as u32).0;
        Rgb::new(p[0], p[1], p[2])
    })
}
