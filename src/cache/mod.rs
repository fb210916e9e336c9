//! Local mirror of the remote collection: one serialized payload and etag per
//! item name, plus the collection ctag.

mod file;
mod memory;

use std::collections::BTreeSet;

pub use file::FileCache;
pub use memory::MemoryCache;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid item name {0:?}")]
    InvalidName(String),
    #[error("cache storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage for the synchronized items. No locking is done: callers serialize
/// access, the last writer wins.
pub trait LocalCache {
    /// # Errors
    /// Returns an error if the storage cannot be read.
    fn collection_fingerprint(&self) -> Result<Option<String>, Error>;

    /// # Errors
    /// Returns an error if the storage cannot be written.
    fn set_collection_fingerprint(&mut self, ctag: &str) -> Result<(), Error>;

    fn item_exists(&self, name: &str) -> bool;

    /// # Errors
    /// Returns an error if the storage cannot be read.
    fn item_fingerprint(&self, name: &str) -> Result<Option<String>, Error>;

    /// # Errors
    /// Returns an error if the storage cannot be read.
    fn item_names(&self) -> Result<BTreeSet<String>, Error>;

    /// # Errors
    /// Returns an error if the storage cannot be read.
    fn serialized_item(&self, name: &str) -> Result<Option<String>, Error>;

    /// Replaces payload and etag of `name` in one step, creating the item if needed.
    ///
    /// # Errors
    /// Returns an error if the name is not usable or the storage cannot be written.
    fn upsert_item(&mut self, name: &str, payload: &str, etag: &str) -> Result<(), Error>;

    /// Removes the item. Removing a missing item is not an error.
    ///
    /// # Errors
    /// Returns an error if the storage cannot be written.
    fn delete_item(&mut self, name: &str) -> Result<(), Error>;
}

/// Rejects names which could escape or collide with the cache layout.
pub fn validate_name(name: &str) -> Result<(), Error> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0']);

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::validate_name;

    #[test]
    fn rejects_unsafe_names() {
        assert!(validate_name("a.ics").is_ok());
        assert!(validate_name("2f0c1d.ics").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name(".tmp").is_err());
        assert!(validate_name("a/b.ics").is_err());
    }
}
