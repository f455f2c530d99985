use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Maps `<data_dir>/<class>/<name>.<ext>` to `<embedding_dir>/<class>/<name>.json`.
pub fn embedding_path_for(image: &Path, data_dir: &Path, embedding_dir: &Path) -> Result<PathBuf> {
    let relative = image.strip_prefix(data_dir).with_context(|| {
        format!(
            "image {} is not under data dir {}",
            image.display(),
            data_dir.display()
        )
    })?;
    Ok(embedding_dir.join(relative).with_extension("json"))
}
