//! Node repository contracts and filesystem implementation.
//!
//! # Responsibility
//! - Load every node file of a vault into one [`Graph`].
//! - Persist, relocate and remove single node files.
//!
//! # Invariants
//! - One file per node, `<level dir>/<slug>.md`, paths vault-relative.
//! - A file that fails to parse is skipped with a warning; the rest of the
//!   vault stays usable.
//! - Creation uses exclusive-create so a slug collision is detected instead
//!   of overwriting another node.
//! - No locking: concurrent invocations against one vault are not safe.

use crate::model::graph::Graph;
use crate::model::node::{Level, Node, Slug};
use crate::repo::frontmatter::{parse_document, render_document};
use log::{debug, error, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage-layer error.
#[derive(Debug)]
pub enum RepoError {
    /// Vault root is missing or unreadable.
    Unavailable { path: PathBuf, source: io::Error },
    /// Single file read/write/rename failure.
    Io { path: PathBuf, source: io::Error },
    /// File exists but cannot be parsed into a node.
    Malformed { path: PathBuf, message: String },
    /// Exclusive create hit an existing file.
    DuplicateSlug(Slug),
    /// Requested file does not exist.
    NotFound(PathBuf),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { path, source } => {
                write!(f, "vault unavailable at `{}`: {source}", path.display())
            }
            Self::Io { path, source } => write!(f, "io error at `{}`: {source}", path.display()),
            Self::Malformed { path, message } => {
                write!(f, "malformed node file `{}`: {message}", path.display())
            }
            Self::DuplicateSlug(slug) => write!(f, "node file already exists for slug {slug}"),
            Self::NotFound(path) => write!(f, "node file not found: {}", path.display()),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::Malformed { .. } => None,
            Self::DuplicateSlug(_) => None,
            Self::NotFound(_) => None,
        }
    }
}

/// File excluded from a bulk load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of loading a whole vault.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub graph: Graph,
    pub skipped: Vec<SkippedRecord>,
}

/// Repository interface for node persistence.
///
/// All paths are relative to the vault root.
pub trait NodeRepository {
    /// Vault root directory.
    fn root(&self) -> &Path;
    /// Loads every node under the level directories.
    fn load_all(&self) -> RepoResult<LoadReport>;
    /// Reads one node file from an arbitrary vault-relative path.
    fn read_node(&self, rel_path: &Path) -> RepoResult<Node>;
    /// Writes a new node at `node.path`; fails if the file exists.
    fn create_node(&self, node: &Node) -> RepoResult<()>;
    /// Overwrites the node file at `node.path`.
    fn save_node(&self, node: &Node) -> RepoResult<()>;
    /// Renames a file, creating the destination directory when needed.
    fn move_file(&self, from: &Path, to: &Path) -> RepoResult<()>;
    /// Removes one file.
    fn remove_file(&self, rel_path: &Path) -> RepoResult<()>;
}

/// Filesystem-backed repository rooted at a vault directory.
#[derive(Debug, Clone)]
pub struct FsNodeRepository {
    root: PathBuf,
}

impl FsNodeRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn absolute(&self, rel_path: &Path) -> PathBuf {
        self.root.join(rel_path)
    }

    fn ensure_parent(&self, abs_path: &Path) -> RepoResult<()> {
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).map_err(|source| RepoError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    fn load_directory(
        &self,
        dir: &str,
        report: &mut LoadReport,
    ) -> RepoResult<()> {
        let abs_dir = self.root.join(dir);
        if !abs_dir.is_dir() {
            return Ok(());
        }

        let entries = fs::read_dir(&abs_dir).map_err(|source| RepoError::Io {
            path: abs_dir.clone(),
            source,
        })?;
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| RepoError::Io {
                path: abs_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("md") {
                files.push(path);
            }
        }
        files.sort();

        for abs_path in files {
            let rel_path = PathBuf::from(dir).join(abs_path.file_name().unwrap_or_default());
            match self.read_node(&rel_path) {
                Ok(node) => {
                    if report.graph.contains(&node.slug) {
                        let reason = format!("duplicate slug {}", node.slug);
                        warn!(
                            "event=node_load module=repo status=skipped path={} reason=duplicate_slug",
                            rel_path.display()
                        );
                        report.skipped.push(SkippedRecord {
                            path: rel_path,
                            reason,
                        });
                        continue;
                    }
                    report.graph.insert(node);
                }
                Err(err) => {
                    warn!(
                        "event=node_load module=repo status=skipped path={} error={}",
                        rel_path.display(),
                        err
                    );
                    report.skipped.push(SkippedRecord {
                        path: rel_path,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl NodeRepository for FsNodeRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn load_all(&self) -> RepoResult<LoadReport> {
        let metadata = fs::metadata(&self.root).map_err(|source| {
            error!(
                "event=vault_load module=repo status=error root={} error={}",
                self.root.display(),
                source
            );
            RepoError::Unavailable {
                path: self.root.clone(),
                source,
            }
        })?;
        if !metadata.is_dir() {
            return Err(RepoError::Unavailable {
                path: self.root.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "vault root is not a directory"),
            });
        }

        let mut report = LoadReport::default();
        for level in Level::ALL {
            self.load_directory(level.directory(), &mut report)?;
        }
        debug!(
            "event=vault_load module=repo status=ok nodes={} skipped={}",
            report.graph.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn read_node(&self, rel_path: &Path) -> RepoResult<Node> {
        let abs_path = self.absolute(rel_path);
        let text = fs::read_to_string(&abs_path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                RepoError::NotFound(rel_path.to_path_buf())
            } else {
                RepoError::Io {
                    path: rel_path.to_path_buf(),
                    source,
                }
            }
        })?;
        parse_document(&text, rel_path).map_err(|message| RepoError::Malformed {
            path: rel_path.to_path_buf(),
            message,
        })
    }

    fn create_node(&self, node: &Node) -> RepoResult<()> {
        let abs_path = self.absolute(&node.path);
        self.ensure_parent(&abs_path)?;
        let text = render(node)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&abs_path)
            .map_err(|source| {
                if source.kind() == io::ErrorKind::AlreadyExists {
                    RepoError::DuplicateSlug(node.slug.clone())
                } else {
                    RepoError::Io {
                        path: node.path.clone(),
                        source,
                    }
                }
            })?;
        file.write_all(text.as_bytes())
            .map_err(|source| RepoError::Io {
                path: node.path.clone(),
                source,
            })?;
        Ok(())
    }

    fn save_node(&self, node: &Node) -> RepoResult<()> {
        let abs_path = self.absolute(&node.path);
        self.ensure_parent(&abs_path)?;
        let text = render(node)?;
        fs::write(&abs_path, text).map_err(|source| RepoError::Io {
            path: node.path.clone(),
            source,
        })
    }

    fn move_file(&self, from: &Path, to: &Path) -> RepoResult<()> {
        let abs_from = self.absolute(from);
        if !abs_from.is_file() {
            return Err(RepoError::NotFound(from.to_path_buf()));
        }
        let abs_to = self.absolute(to);
        self.ensure_parent(&abs_to)?;
        fs::rename(&abs_from, &abs_to).map_err(|source| RepoError::Io {
            path: from.to_path_buf(),
            source,
        })
    }

    fn remove_file(&self, rel_path: &Path) -> RepoResult<()> {
        fs::remove_file(self.absolute(rel_path)).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                RepoError::NotFound(rel_path.to_path_buf())
            } else {
                RepoError::Io {
                    path: rel_path.to_path_buf(),
                    source,
                }
            }
        })
    }
}

fn render(node: &Node) -> RepoResult<String> {
    render_document(node).map_err(|message| RepoError::Malformed {
        path: node.path.clone(),
        message,
    })
}

/// Formats a vault-relative path with `/` separators for metadata fields.
pub fn path_to_meta(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
