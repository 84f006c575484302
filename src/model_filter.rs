//! Glob allow-list for the model catalog.
//!
//! The list is read from a plain text file, one pattern per line. `*`
//! matches any run of characters and `?` exactly one; everything else is
//! literal and each pattern must match the whole model id.

use regex::RegexSet;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("failed to read model filter file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model filter pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone)]
pub struct ModelFilter {
    patterns: Vec<String>,
    set: RegexSet,
}

impl ModelFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let set = RegexSet::new(patterns.iter().map(|p| glob_to_regex(p)))?;
        Ok(Self { patterns, set })
    }

    pub fn parse(content: &str) -> Result<Self, FilterError> {
        Self::new(content.lines())
    }

    pub fn load(path: &Path) -> Result<Self, FilterError> {
        let content = std::fs::read_to_string(path).map_err(|source| FilterError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// An empty filter lets everything through.
    pub fn allows(&self, model_id: &str) -> bool {
        self.is_empty() || self.set.is_match(model_id)
    }
}

/// Picks the filter file for a request.
///
/// An explicitly configured path wins even when it does not exist; the
/// conventional default is used only when present on disk.
pub fn resolve_filter_path(explicit: Option<&Path>, default: &Path) -> Option<PathBuf> {
    match explicit {
        Some(path) if path.exists() => Some(path.to_path_buf()),
        Some(path) => {
            tracing::debug!(path = %path.display(), "configured model filter file not found");
            None
        }
        None if default.exists() => Some(default.to_path_buf()),
        None => None,
    }
}

/// Loads the active filter, failing open: any read or parse problem is
/// logged and yields `None`, meaning the catalog is returned unfiltered.
pub fn load_active_filter(explicit: Option<&Path>, default: &Path) -> Option<ModelFilter> {
    let path = resolve_filter_path(explicit, default)?;
    match ModelFilter::load(&path) {
        Ok(filter) if filter.is_empty() => None,
        Ok(filter) => {
            tracing::debug!(
                path = %path.display(),
                patterns = filter.patterns().len(),
                "loaded model filter"
            );
            Some(filter)
        }
        Err(err) => {
            tracing::warn!("{err}; serving unfiltered model list");
            None
        }
    }
}

/// Runs [`load_active_filter`] on the blocking pool so filesystem access
/// never stalls a runtime worker.
pub async fn load_active_filter_async(
    explicit: Option<PathBuf>,
    default: PathBuf,
) -> Option<ModelFilter> {
    match tokio::task::spawn_blocking(move || load_active_filter(explicit.as_deref(), &default))
        .await
    {
        Ok(filter) => filter,
        Err(err) => {
            tracing::warn!("model filter task failed: {err}; serving unfiltered model list");
            None
        }
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^(?s:");
    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push_str(")$");
    regex
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn star_matches_any_suffix() {
        let filter = ModelFilter::new(["google/*"]).unwrap();
        assert!(filter.allows("google/gemini-pro"));
        assert!(filter.allows("google/gemini-flash"));
        assert!(!filter.allows("openai/gpt-4o"));
    }

    #[test]
    fn prefix_glob_is_anchored() {
        let filter = ModelFilter::new(["openai/gpt-4*"]).unwrap();
        assert!(filter.allows("openai/gpt-4o"));
        assert!(!filter.allows("openai/gpt-3.5-turbo"));
        assert!(!filter.allows("x-openai/gpt-4o"));
    }

    #[test]
    fn question_mark_matches_exactly_one_char() {
        let filter = ModelFilter::new(["model?"]).unwrap();
        assert!(filter.allows("model1"));
        assert!(!filter.allows("model"));
        assert!(!filter.allows("model12"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let filter = ModelFilter::new(["openai/gpt-3.5-turbo"]).unwrap();
        assert!(filter.allows("openai/gpt-3.5-turbo"));
        assert!(!filter.allows("openai/gpt-3x5-turbo"));
        let filter = ModelFilter::new(["meta/llama(3)+"]).unwrap();
        assert!(filter.allows("meta/llama(3)+"));
    }

    #[test]
    fn plain_id_is_exact_match() {
        let filter = ModelFilter::parse("model1\n").unwrap();
        assert!(filter.allows("model1"));
        assert!(!filter.allows("model10"));
        assert!(!filter.allows("model2"));
    }

    #[test]
    fn blank_lines_and_whitespace_are_ignored() {
        let filter = ModelFilter::parse("\n  google/*  \r\n\n\t\n").unwrap();
        assert_eq!(filter.patterns(), &["google/*".to_string()]);
    }

    #[test]
    fn empty_filter_allows_everything() {
        let filter = ModelFilter::parse("\n\n").unwrap();
        assert!(filter.is_empty());
        assert!(filter.allows("anything/at-all"));
    }

    #[test]
    fn explicit_path_wins_and_does_not_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join("filter-models.txt");
        std::fs::write(&default, "model1\n").unwrap();
        let missing = dir.path().join("missing.txt");

        assert_eq!(resolve_filter_path(None, &default), Some(default.clone()));
        assert_eq!(resolve_filter_path(Some(missing.as_path()), &default), None);
        assert!(load_active_filter(Some(missing.as_path()), &default).is_none());
    }

    #[test]
    fn empty_file_means_no_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter-models.txt");
        std::fs::File::create(&path).unwrap();
        assert!(load_active_filter(Some(path.as_path()), &path).is_none());
    }

    #[test]
    fn unreadable_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter-models.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0xff, 0xfe, 0x00, b'\n']).unwrap();
        drop(file);

        assert!(matches!(
            ModelFilter::load(&path),
            Err(FilterError::Read { .. })
        ));
        assert!(load_active_filter(Some(path.as_path()), &path).is_none());
    }

    #[tokio::test]
    async fn async_load_matches_sync_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join("filter-models.txt");
        std::fs::write(&default, "google/*\n").unwrap();

        let filter = load_active_filter_async(None, default.clone())
            .await
            .expect("default filter loaded");
        assert!(filter.allows("google/gemini-pro"));
        assert!(!filter.allows("openai/gpt-4o"));

        let missing = dir.path().join("missing.txt");
        assert!(load_active_filter_async(Some(missing), default).await.is_none());
    }

    #[test]
    fn directory_in_place_of_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_active_filter(Some(dir.path()), dir.path()).is_none());
    }
}
