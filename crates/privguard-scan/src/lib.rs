//! # privguard-scan
//!
//! File discovery for the rule engine: per-language scanners over a
//! directory tree, with UTF-8 handling, size truncation, and symlink-cycle
//! canonicalization. Rule evaluation does not live here; scanners only
//! produce `(path, content)` pairs.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use privguard_types::Language;
use thiserror::Error;

/// Path components that are never scanned.
pub const DEFAULT_IGNORED: [&str; 6] = ["node_modules", ".git", "dist", "build", ".venv", "tool/self"];

/// A discovered source file with its loaded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Absolute path.
    pub path: PathBuf,
    pub language: Language,
    /// UTF-8 content with `\r\n` normalized to `\n`.
    pub content: String,
    /// Content was cut at `max_bytes_per_file`.
    pub truncated: bool,
}

/// A per-file, non-fatal problem encountered during discovery.
#[derive(Debug, Clone, Error)]
pub enum ScanWarning {
    #[error("skipped non-UTF-8 file {path}")]
    NonUtf8 { path: PathBuf },
    #[error("failed to read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
    #[error("walk error: {message}")]
    Walk { message: String },
}

impl ScanWarning {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ScanWarning::NonUtf8 { path } | ScanWarning::Unreadable { path, .. } => Some(path),
            ScanWarning::Walk { .. } => None,
        }
    }
}

/// Limits and extra exclusions applied during a walk.
#[derive(Debug, Clone)]
pub struct ScanLimits {
    pub max_bytes_per_file: u64,
    /// Extra path substrings to skip, from `IGNORED_PATH_EXTRA`.
    pub ignored_extra: Vec<String>,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_bytes_per_file: 1_048_576,
            ignored_extra: Vec::new(),
        }
    }
}

/// Extension table for a language, without the leading dot.
pub fn extensions(language: Language) -> &'static [&'static str] {
    match language {
        Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
        Language::TypeScript => &["ts", "tsx"],
        Language::Java => &["java"],
        Language::Python => &["py"],
        Language::Go => &["go"],
        Language::CSharp => &["cs"],
        Language::Php => &["php"],
        Language::Ruby => &["rb"],
        Language::Swift => &["swift"],
        Language::Kotlin => &["kt", "kts"],
        Language::Rust => &["rs"],
        Language::Scala => &["scala"],
    }
}

/// Map a path to the language that claims its extension.
pub fn language_for_path(path: &Path) -> Option<Language> {
    let ext = path.extension()?.to_str()?;
    Language::ALL
        .into_iter()
        .find(|lang| extensions(*lang).contains(&ext))
}

/// A per-language scanner: the unit the engine fans out over.
#[derive(Debug, Clone, Copy)]
pub struct Scanner {
    language: Language,
}

impl Scanner {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        extensions(self.language)
    }

    pub fn matches(&self, path: &Path) -> bool {
        language_for_path(path) == Some(self.language)
    }

    /// Walk `root` yielding only this scanner's files.
    pub fn scan(&self, root: &Path, limits: &ScanLimits) -> Walk {
        Walk::new(root, limits.clone(), Some(self.language))
    }
}

/// All twelve scanners, in a fixed order.
pub fn scanner_set() -> Vec<Scanner> {
    Language::ALL.into_iter().map(Scanner::new).collect()
}

/// Walk `root` yielding files of every supported language.
pub fn scan_all(root: &Path, limits: &ScanLimits) -> Walk {
    Walk::new(root, limits.clone(), None)
}

/// Lazy iterator over scanned files. Per-file problems surface as `Err`
/// items; the walk itself keeps going.
pub struct Walk {
    inner: ignore::Walk,
    limits: ScanLimits,
    language: Option<Language>,
    /// Canonical paths already yielded; breaks symlink cycles.
    seen: BTreeSet<PathBuf>,
}

impl Walk {
    fn new(root: &Path, limits: ScanLimits, language: Option<Language>) -> Self {
        let ignored: Vec<String> = DEFAULT_IGNORED
            .iter()
            .map(|s| s.to_string())
            .chain(limits.ignored_extra.iter().cloned())
            .collect();
        let root_buf = root.to_path_buf();

        let mut builder = WalkBuilder::new(root);
        // The privacy scanner looks at everything: hidden files are in
        // scope and VCS ignore files do not apply.
        builder.hidden(false);
        builder.ignore(false);
        builder.git_ignore(false);
        builder.git_global(false);
        builder.git_exclude(false);
        builder.parents(false);
        builder.follow_links(true);
        builder.filter_entry(move |entry| !is_ignored(&root_buf, entry.path(), &ignored));

        Self {
            inner: builder.build(),
            limits,
            language,
            seen: BTreeSet::new(),
        }
    }
}

impl Iterator for Walk {
    type Item = Result<ScannedFile, ScanWarning>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    return Some(Err(ScanWarning::Walk {
                        message: err.to_string(),
                    }))
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            let language = match language_for_path(path) {
                Some(lang) => lang,
                None => continue,
            };
            if let Some(wanted) = self.language {
                if language != wanted {
                    continue;
                }
            }

            // One visit per canonical path, regardless of how many symlinks
            // point at it.
            let canonical = match path.canonicalize() {
                Ok(canonical) => canonical,
                Err(err) => {
                    return Some(Err(ScanWarning::Unreadable {
                        path: path.to_path_buf(),
                        message: err.to_string(),
                    }))
                }
            };
            if !self.seen.insert(canonical.clone()) {
                continue;
            }

            return Some(
                read_scanned(&canonical, self.limits.max_bytes_per_file).map(
                    |(content, truncated)| ScannedFile {
                        path: canonical,
                        language,
                        content,
                        truncated,
                    },
                ),
            );
        }
    }
}

/// True when `path` intersects the ignored set. Entries with a `/` match as
/// segment sequences (`tool/self`); bare entries match any single component.
fn is_ignored(root: &Path, path: &Path, ignored: &[String]) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let rel_str = rel.to_string_lossy().replace('\\', "/");
    let hay = format!("/{}/", rel_str.trim_matches('/'));
    ignored.iter().any(|entry| {
        let needle = format!("/{}/", entry.trim_matches('/'));
        hay.contains(&needle)
    })
}

/// Load a file's content, enforcing the byte cap and UTF-8 contract.
fn read_scanned(path: &Path, max_bytes: u64) -> Result<(String, bool), ScanWarning> {
    let file = File::open(path).map_err(|err| ScanWarning::Unreadable {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    // Read one byte past the cap so truncation is observable without a
    // second stat call.
    let mut bytes = Vec::new();
    let read = file
        .take(max_bytes + 1)
        .read_to_end(&mut bytes)
        .map_err(|err| ScanWarning::Unreadable {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    let truncated = (read as u64) > max_bytes;
    if truncated {
        bytes.truncate(max_bytes as usize);
    }

    // Binary means "not UTF-8 decodable", nothing more: an embedded NUL is
    // valid UTF-8 and stays in scope.
    let text = match std::str::from_utf8(&bytes) {
        Ok(text) => text.to_string(),
        Err(err) if truncated && err.error_len().is_none() => {
            // The cap landed inside a multibyte char; drop the partial tail.
            std::str::from_utf8(&bytes[..err.valid_up_to()])
                .expect("validated prefix")
                .to_string()
        }
        Err(_) => {
            tracing::warn!(path = %path.display(), "skipping non-UTF-8 file");
            return Err(ScanWarning::NonUtf8 {
                path: path.to_path_buf(),
            });
        }
    };

    Ok((text.replace("\r\n", "\n"), truncated))
}
