use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{validate_name, Error, LocalCache};

const CTAG_FILE: &str = "ctag";
const ITEMS_DIR: &str = "items";
const ETAGS_DIR: &str = "etags";
const TMP_DIR: &str = "tmp";

/// Directory backed cache:
///
/// ```text
/// <root>/ctag
/// <root>/items/<name>   serialized payload
/// <root>/etags/<name>   etag of the payload
/// <root>/tmp/           writes in progress
/// ```
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Opens the cache at `root`, creating the directories if needed.
    ///
    /// # Errors
    /// Returns an error if the directories cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();

        fs::create_dir_all(root.join(ITEMS_DIR))?;
        fs::create_dir_all(root.join(ETAGS_DIR))?;
        fs::create_dir_all(root.join(TMP_DIR))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_path(&self, name: &str) -> PathBuf {
        self.root.join(ITEMS_DIR).join(name)
    }

    fn etag_path(&self, name: &str) -> PathBuf {
        self.root.join(ETAGS_DIR).join(name)
    }

    /// Writes through a file in `tmp/` and renames it over `path`.
    fn write_replace(&self, path: &Path, content: &str) -> Result<(), Error> {
        let mut tmp_name = path
            .parent()
            .and_then(Path::file_name)
            .map(|dir| dir.to_owned())
            .unwrap_or_default();
        tmp_name.push("-");
        tmp_name.push(path.file_name().unwrap_or_default());
        let tmp = self.root.join(TMP_DIR).join(tmp_name);

        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;

        Ok(())
    }
}

impl LocalCache for FileCache {
    fn collection_fingerprint(&self) -> Result<Option<String>, Error> {
        read_optional(&self.root.join(CTAG_FILE))
    }

    fn set_collection_fingerprint(&mut self, ctag: &str) -> Result<(), Error> {
        self.write_replace(&self.root.join(CTAG_FILE), ctag)
    }

    fn item_exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.item_path(name).is_file() && self.etag_path(name).is_file()
    }

    fn item_fingerprint(&self, name: &str) -> Result<Option<String>, Error> {
        validate_name(name)?;
        read_optional(&self.etag_path(name))
    }

    fn item_names(&self) -> Result<BTreeSet<String>, Error> {
        let mut names = BTreeSet::new();

        for entry in fs::read_dir(self.root.join(ITEMS_DIR))? {
            let entry = entry?;

            if !entry.file_type()?.is_file() {
                continue;
            }

            match entry.file_name().into_string() {
                Ok(name) if validate_name(&name).is_ok() => {
                    names.insert(name);
                }
                Ok(_) => {}
                Err(name) => log::warn!("Ignoring cache entry with a non UTF-8 name: {name:?}"),
            }
        }

        Ok(names)
    }

    fn serialized_item(&self, name: &str) -> Result<Option<String>, Error> {
        validate_name(name)?;
        read_optional(&self.item_path(name))
    }

    fn upsert_item(&mut self, name: &str, payload: &str, etag: &str) -> Result<(), Error> {
        validate_name(name)?;

        // payload first: a stale etag next to a new payload only causes a re-fetch
        self.write_replace(&self.item_path(name), payload)?;
        self.write_replace(&self.etag_path(name), etag)
    }

    fn delete_item(&mut self, name: &str) -> Result<(), Error> {
        validate_name(name)?;
        remove_optional(&self.item_path(name))?;
        remove_optional(&self.etag_path(name))
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, Error> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_optional(path: &Path) -> Result<(), Error> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, FileCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path().join("data")).unwrap();

        (dir, cache)
    }

    #[test]
    fn stores_items_and_fingerprints() {
        let (_dir, mut cache) = cache();

        assert_eq!(cache.collection_fingerprint().unwrap(), None);
        assert!(!cache.item_exists("a.ics"));

        cache.upsert_item("a.ics", "BEGIN:VCALENDAR", "etag1").unwrap();
        cache.set_collection_fingerprint("ctag1").unwrap();

        assert!(cache.item_exists("a.ics"));
        assert_eq!(cache.item_fingerprint("a.ics").unwrap().as_deref(), Some("etag1"));
        assert_eq!(cache.serialized_item("a.ics").unwrap().as_deref(), Some("BEGIN:VCALENDAR"));
        assert_eq!(cache.collection_fingerprint().unwrap().as_deref(), Some("ctag1"));
        assert_eq!(cache.item_names().unwrap(), BTreeSet::from(["a.ics".to_owned()]));
    }

    #[test]
    fn upsert_replaces_both_parts() {
        let (_dir, mut cache) = cache();

        cache.upsert_item("a.ics", "old", "etag1").unwrap();
        cache.upsert_item("a.ics", "new", "etag2").unwrap();

        assert_eq!(cache.serialized_item("a.ics").unwrap().as_deref(), Some("new"));
        assert_eq!(cache.item_fingerprint("a.ics").unwrap().as_deref(), Some("etag2"));
        assert_eq!(cache.item_names().unwrap().len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, mut cache) = cache();

        cache.upsert_item("a.ics", "payload", "etag1").unwrap();
        cache.delete_item("a.ics").unwrap();
        cache.delete_item("a.ics").unwrap();

        assert!(!cache.item_exists("a.ics"));
        assert!(cache.item_names().unwrap().is_empty());
    }

    #[test]
    fn survives_reopening() {
        let (dir, mut cache) = cache();

        cache.upsert_item("a.ics", "payload", "etag1").unwrap();
        cache.set_collection_fingerprint("ctag1").unwrap();

        let reopened = FileCache::open(dir.path().join("data")).unwrap();

        assert_eq!(reopened.collection_fingerprint().unwrap().as_deref(), Some("ctag1"));
        assert!(reopened.item_exists("a.ics"));
    }

    #[test]
    fn temp_like_names_are_listed() {
        let (dir, mut cache) = cache();

        cache.upsert_item("x.tmp", "payload", "etag1").unwrap();
        cache.set_collection_fingerprint("ctag1").unwrap();

        assert_eq!(cache.item_names().unwrap(), BTreeSet::from(["x.tmp".to_owned()]));
        assert_eq!(fs::read_dir(dir.path().join("data").join(TMP_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn rejects_path_names() {
        let (_dir, mut cache) = cache();

        assert!(matches!(
            cache.upsert_item("../escape", "payload", "etag"),
            Err(Error::InvalidName(_)),
        ));
    }
}
