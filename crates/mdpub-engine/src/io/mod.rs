use relative_path::{RelativePath, RelativePathBuf};
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions picked up when scanning for source documents.
pub const SOURCE_EXTENSIONS: [&str; 2] = ["md", "mdx"];

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid source path: {0}")]
    InvalidSource(String),
}

/// Source documents found under one root, identified by relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    pub root: PathBuf,
    pub files: Vec<RelativePathBuf>,
}

/// Read a source file and return its content
pub fn read_file(relative_path: &RelativePath, root: &Path) -> Result<String, IoError> {
    let absolute_path = relative_path.to_path(root);
    if !absolute_path.exists() {
        return Err(IoError::NotFound(absolute_path));
    }
    fs::read_to_string(&absolute_path).map_err(IoError::Io)
}

/// Write content to a file below `root`, creating parent directories
pub fn write_file(relative_path: &RelativePath, root: &Path, content: &str) -> Result<(), IoError> {
    let absolute_path = relative_path.to_path(root);

    if let Some(parent) = absolute_path.parent() {
        fs::create_dir_all(parent).map_err(IoError::Io)?;
    }

    fs::write(&absolute_path, content).map_err(IoError::Io)
}

pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Resolve a file or directory argument into a [`SourceSet`].
///
/// A single file becomes a set rooted at its parent directory. Directories
/// are scanned recursively; hidden directories and anything under `exclude`
/// are skipped.
pub fn discover_sources(path: &Path, exclude: &[PathBuf]) -> Result<SourceSet, IoError> {
    if path.is_file() {
        if !is_markdown(path) {
            return Err(IoError::InvalidSource(format!(
                "{} is not a .md or .mdx file",
                path.display()
            )));
        }
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IoError::InvalidSource(path.display().to_string()))?;
        return Ok(SourceSet {
            root,
            files: vec![RelativePathBuf::from(name)],
        });
    }

    let excluded: Vec<PathBuf> = exclude
        .iter()
        .filter_map(|dir| fs::canonicalize(dir).ok())
        .collect();
    let files = scan_markdown_files_excluding(path, &excluded)?
        .iter()
        .filter_map(|file| {
            let relative = file.strip_prefix(path).ok()?;
            RelativePathBuf::from_path(relative).ok()
        })
        .collect();

    Ok(SourceSet {
        root: path.to_path_buf(),
        files,
    })
}

/// Scan for markdown sources below `root`, sorted
pub fn scan_markdown_files(root: &Path) -> Result<Vec<PathBuf>, IoError> {
    scan_markdown_files_excluding(root, &[])
}

fn scan_markdown_files_excluding(root: &Path, excluded: &[PathBuf]) -> Result<Vec<PathBuf>, IoError> {
    validate_source_dir(root)?;

    let mut files = Vec::new();
    scan_directory_recursive(root, excluded, &mut files)?;
    files.sort();
    Ok(files)
}

fn scan_directory_recursive(
    dir: &Path,
    excluded: &[PathBuf],
    files: &mut Vec<PathBuf>,
) -> Result<(), IoError> {
    let entries = fs::read_dir(dir).map_err(IoError::Io)?;

    for entry in entries {
        let entry = entry.map_err(IoError::Io)?;
        let path = entry.path();

        if path.is_dir() {
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            let skipped = fs::canonicalize(&path).is_ok_and(|real| excluded.contains(&real));
            if !hidden && !skipped {
                scan_directory_recursive(&path, excluded, files)?;
            }
        } else if is_markdown(&path) {
            files.push(path);
        }
    }

    Ok(())
}

pub fn validate_source_dir(path: &Path) -> Result<(), IoError> {
    if !path.exists() || !path.is_dir() {
        return Err(IoError::InvalidSource(format!(
            "source directory not found: {}",
            path.display()
        )));
    }

    Ok(())
}
