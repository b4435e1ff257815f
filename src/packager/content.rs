//! Content updates shipped inside every package.
//!
//! The content directory holds one subdirectory per update family
//! (`panupv2-all-contents`, `panup-all-antivirus`, ...). The newest update of
//! each family is picked by the greatest file name, which matches the vendor
//! naming scheme but is not a real version comparison.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Greatest file name of each family directory under `content_dir`
pub fn latest_per_family(content_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut latest = Vec::new();
    if !content_dir.is_dir() {
        return Ok(latest);
    }

    let mut families: Vec<PathBuf> = fs::read_dir(content_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    families.sort();

    for family in families {
        let newest = fs::read_dir(&family)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .max_by(|a, b| a.file_name().cmp(&b.file_name()));
        match newest {
            Some(path) => latest.push(path),
            None => tracing::debug!("Content family {} is empty", family.display()),
        }
    }
    Ok(latest)
}

/// Copy the latest update of every family into `dest`; returns how many
pub fn seed(content_dir: &Path, dest: &Path) -> io::Result<usize> {
    let updates = latest_per_family(content_dir)?;
    for update in &updates {
        if let Some(name) = update.file_name() {
            fs::copy(update, dest.join(name))?;
        }
    }
    Ok(updates.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, path.to_string_lossy().as_bytes()).unwrap();
    }

    #[test]
    fn test_latest_is_lexicographic_max() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("panupv2-all-contents/panupv2-all-contents-8200-5912"));
        touch(&root.join("panupv2-all-contents/panupv2-all-contents-1000-6001"));
        touch(&root.join("panupv2-all-contents/panupv2-all-contents-900-4001"));
        touch(&root.join("panup-all-antivirus/panup-all-antivirus-3500-4012"));
        fs::create_dir_all(root.join("empty-family")).unwrap();
        touch(&root.join("stray-file"));

        let names: Vec<String> = latest_per_family(root)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        // "900" sorts after "1000" as text, so the older release wins
        assert_eq!(
            names,
            vec!["panup-all-antivirus-3500-4012", "panupv2-all-contents-900-4001"]
        );
    }

    #[test]
    fn test_missing_content_dir_seeds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        assert_eq!(seed(&dir.path().join("absent"), &dest).unwrap(), 0);
    }

    #[test]
    fn test_seed_copies_into_destination() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        let dest = dir.path().join("pkg/content");
        fs::create_dir_all(&dest).unwrap();
        touch(&content.join("panupv2-all-contents/panupv2-all-contents-1000-6001"));

        assert_eq!(seed(&content, &dest).unwrap(), 1);
        assert!(dest.join("panupv2-all-contents-1000-6001").is_file());
    }
}
