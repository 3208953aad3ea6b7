// Reference document loading
// Flat source directory of Markdown and plain-text files


use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::{AidbaError, Result};

/// File extensions picked up from the source directory
const SOURCE_EXTENSIONS: [&str; 2] = ["md", "txt"];

/// A source file split into title and body; lives only for one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDocument {
    pub title: String,
    pub body: String,
    pub path: PathBuf,
}

impl ReferenceDocument {
    /// Split raw file content into title and body.
    ///
    /// A first line starting with `# ` becomes the title and is removed from
    /// the body. Otherwise the file name is the title and the first line stays.
    #[inline]
    pub fn parse(path: &Path, content: &str) -> Self {
        let (first_line, rest) = content.split_once('\n').unwrap_or((content, ""));
        let first_line = first_line.trim();

        let (title, body) = match first_line.strip_prefix("# ") {
            Some(heading) => (heading.trim().to_string(), rest.to_string()),
            None => (file_name(path), format!("{first_line}\n{rest}")),
        };

        Self {
            title,
            body,
            path: path.to_path_buf(),
        }
    }
}

/// Read every `.md`/`.txt` file directly inside `dir`, sorted by file name.
///
/// A missing directory is an error; an empty one yields no documents.
/// Subdirectories are not descended into.
#[inline]
pub async fn load_documents(dir: &Path) -> Result<Vec<ReferenceDocument>> {
    info!("Reading documents from '{}'", dir.display());

    let mut entries = fs::read_dir(dir).await.map_err(|e| {
        AidbaError::Input(format!(
            "The '{}' directory could not be read: {}",
            dir.display(),
            e
        ))
    })?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() || !is_source_file(&path) {
            debug!("Skipping {}", path.display());
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        info!("  - Processing {}", path.display());
        match fs::read_to_string(&path).await {
            Ok(content) => documents.push(ReferenceDocument::parse(&path, &content)),
            Err(e) => warn!("Skipping unreadable file {}: {}", path.display(), e),
        }
    }

    Ok(documents)
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
