//! Authorized keys

use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use russh_keys::key::PublicKey;

/// Public keys allowed to log in to the bastion
#[derive(Debug, Default)]
pub struct AuthorizedKeys {
    fingerprints: HashSet<String>,
    keys: Vec<AuthorizedKey>,
}

/// One accepted key
#[derive(Debug, Clone)]
pub struct AuthorizedKey {
    pub fingerprint: String,
    /// Trailing comment of the authorized_keys line
    pub comment: Option<String>,
}

impl AuthorizedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every listed file; missing files are skipped with a warning
    pub fn load_from_files(paths: &[impl AsRef<Path>]) -> Result<Self> {
        let mut store = Self::new();

        for path in paths {
            let expanded = expand_home(path.as_ref());
            if expanded.exists() {
                store.load_from_file(&expanded)?;
            } else {
                tracing::warn!("Authorized keys file not found: {:?}", expanded);
            }
        }

        Ok(store)
    }

    /// Load one file in OpenSSH authorized_keys format
    pub fn load_from_file(&mut self, path: &Path) -> Result<usize> {
        tracing::info!("Loading authorized keys from {:?}", path);

        let file = std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let mut count = 0;

        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .with_context(|| format!("Failed to read line {} of {:?}", line_num + 1, path))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_key_line(line) {
                Some((key, comment)) => {
                    self.add_key(&key, comment);
                    count += 1;
                }
                None => tracing::warn!(
                    "Skipping unparsable key on line {} of {:?}",
                    line_num + 1,
                    path
                ),
            }
        }

        tracing::info!("Loaded {} authorized keys from {:?}", count, path);
        Ok(count)
    }

    pub fn is_authorized(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    pub fn add_key(&mut self, key: &PublicKey, comment: Option<String>) {
        let fingerprint = key.fingerprint();
        tracing::debug!(
            "Authorized key {} ({})",
            fingerprint,
            comment.as_deref().unwrap_or("no comment")
        );
        if self.fingerprints.insert(fingerprint.clone()) {
            self.keys.push(AuthorizedKey { fingerprint, comment });
        }
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn list(&self) -> &[AuthorizedKey] {
        &self.keys
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Parse `[options] type base64 [comment]`, or a bare base64 blob
fn parse_key_line(line: &str) -> Option<(PublicKey, Option<String>)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    fields.iter().enumerate().find_map(|(i, field)| {
        let key = russh_keys::parse_public_key_base64(field).ok()?;
        let comment = fields
            .get(i + 1..)
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.join(" "));
        Some((key, comment))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthorizedKeys::load_from_files(&[dir.path().join("absent")]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_comments_and_garbage_are_ignored() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# ops team").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not a key at all").unwrap();

        let mut store = AuthorizedKeys::new();
        assert_eq!(store.load_from_file(file.path()).unwrap(), 0);
        assert!(!store.is_authorized("SHA256:anything"));
    }
}
