//! Artifact store laid out as files under a root directory.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::error::Result;

use super::{ArtifactKey, ArtifactKind, ArtifactStore};

/// Stores each artifact at `root/<ArtifactKey::relative_path>`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.relative_path())
    }
}

impl ArtifactStore for DirectoryStore {
    fn get_bytes(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_of(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put_bytes(&self, key: &ArtifactKey, value: &[u8]) -> Result<()> {
        let path = self.path_of(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, value)?;
        Ok(())
    }

    fn delete(&self, key: &ArtifactKey) -> Result<()> {
        match fs::remove_file(self.path_of(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn contains(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.path_of(key).is_file())
    }

    fn list(&self, kind: ArtifactKind, owner: &str) -> Result<Vec<ArtifactKey>> {
        let base = self.root.join(owner).join(kind.as_str());
        let mut files = Vec::new();
        collect_files(&base, &mut files)?;

        let extension = format!(".{}", kind.extension());
        let mut keys: Vec<ArtifactKey> = files
            .into_iter()
            .filter_map(|file| {
                let relative = file.strip_prefix(&base).ok()?;
                let relative = relative.to_str()?.replace(std::path::MAIN_SEPARATOR, "/");
                let relative = relative.strip_suffix(&extension)?;
                Some(key_from_relative(kind, owner, relative))
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Inverse of [`ArtifactKey::relative_path`] below `owner/kind/`.
fn key_from_relative(kind: ArtifactKind, owner: &str, relative: &str) -> ArtifactKey {
    let mut key = ArtifactKey::new(kind, owner);
    let mut rest = relative;
    if let Some((head, tail)) = rest.split_once('/') {
        if let Some(iteration) = head.strip_prefix("it").and_then(|n| n.parse().ok()) {
            key = key.at_iteration(iteration);
            rest = tail;
        }
    }
    if rest != kind.as_str() {
        key = key.with_item(rest);
    }
    key
}

#[cfg(test)]
mod tests {
    use crate::store::{ArtifactKey, ArtifactKind, ArtifactStore};

    use super::DirectoryStore;

    #[test]
    fn files_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        let key = ArtifactKey::twf("SF1-TF1", 0, "100001");

        assert_eq!(store.get_bytes(&key).unwrap(), None);
        store.put_bytes(&key, b"0 0\n").unwrap();
        assert!(dir.path().join("SF1-TF1/twf/it0/100001.txt").is_file());
        assert_eq!(store.get_bytes(&key).unwrap(), Some(b"0 0\n".to_vec()));

        store.delete(&key).unwrap();
        assert!(!store.contains(&key).unwrap());
        store.delete(&key).unwrap();
    }

    #[test]
    fn list_reconstructs_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        let keys = vec![
            ArtifactKey::twf("p", 0, "a"),
            ArtifactKey::twf("p", 1, "SF1/b"),
            ArtifactKey::new(ArtifactKind::Twf, "p").with_item("c"),
        ];
        for key in &keys {
            store.put_bytes(key, b"").unwrap();
        }
        store.put_bytes(&ArtifactKey::gmm("p", 1), b"{}").unwrap();
        store.put_bytes(&ArtifactKey::final_gmm("p"), b"{}").unwrap();

        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(store.list(ArtifactKind::Twf, "p").unwrap(), expected);
        assert_eq!(
            store.list(ArtifactKind::Gmm, "p").unwrap(),
            vec![ArtifactKey::final_gmm("p"), ArtifactKey::gmm("p", 1)]
        );
        assert!(store.list(ArtifactKind::Joint, "p").unwrap().is_empty());
    }
}
