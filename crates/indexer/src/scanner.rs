use std::path::{Path, PathBuf};

use ahash::AHashMap;
use anyhow::{Context, Result, bail};
use ignore::WalkBuilder;
use tracing::warn;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSample {
    pub path: PathBuf,
    pub class_idx: usize,
}

/// A labeled image dataset laid out as `<root>/<class>/**/<image>`.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: Vec<String>,
    class_to_idx: AHashMap<String, usize>,
    samples: Vec<ImageSample>,
}

impl ImageFolder {
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("dataset root is not a directory: {}", root.display());
        }

        let mut classes = std::fs::read_dir(root)
            .with_context(|| format!("failed listing dataset root {}", root.display()))?
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        classes.sort();
        if classes.is_empty() {
            bail!("no class directories found under {}", root.display());
        }

        let class_to_idx = classes
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect::<AHashMap<_, _>>();

        let mut samples = Vec::new();
        for (class_idx, class) in classes.iter().enumerate() {
            let mut files = scan_image_files(&root.join(class));
            if files.is_empty() {
                warn!(class = %class, "class directory has no supported images");
            }
            files.sort();
            samples.extend(
                files
                    .into_iter()
                    .map(|path| ImageSample { path, class_idx }),
            );
        }

        Ok(Self {
            root: root.to_path_buf(),
            classes,
            class_to_idx,
            samples,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn class_index(&self, class: &str) -> Option<usize> {
        self.class_to_idx.get(class).copied()
    }

    /// Label implied by the first directory component under the root.
    pub fn class_of(&self, path: &Path) -> Option<usize> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let first = relative.components().next()?;
        self.class_index(&first.as_os_str().to_string_lossy())
    }
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn scan_image_files(dir: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(dir).standard_filters(false).build();
    walker
        .flatten()
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && is_supported_image(path))
        .collect()
}
