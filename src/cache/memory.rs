use std::collections::{BTreeMap, BTreeSet};

use super::{validate_name, Error, LocalCache};

/// In-process cache, lost when the process exits.
#[derive(Debug, Default, Clone)]
pub struct MemoryCache {
    ctag: Option<String>,
    // name -> (payload, etag)
    items: BTreeMap<String, (String, String)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl LocalCache for MemoryCache {
    fn collection_fingerprint(&self) -> Result<Option<String>, Error> {
        Ok(self.ctag.clone())
    }

    fn set_collection_fingerprint(&mut self, ctag: &str) -> Result<(), Error> {
        self.ctag = Some(ctag.to_owned());
        Ok(())
    }

    fn item_exists(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    fn item_fingerprint(&self, name: &str) -> Result<Option<String>, Error> {
        Ok(self.items.get(name).map(|(_, etag)| etag.clone()))
    }

    fn item_names(&self) -> Result<BTreeSet<String>, Error> {
        Ok(self.items.keys().cloned().collect())
    }

    fn serialized_item(&self, name: &str) -> Result<Option<String>, Error> {
        Ok(self.items.get(name).map(|(payload, _)| payload.clone()))
    }

    fn upsert_item(&mut self, name: &str, payload: &str, etag: &str) -> Result<(), Error> {
        validate_name(name)?;
        self.items.insert(name.to_owned(), (payload.to_owned(), etag.to_owned()));
        Ok(())
    }

    fn delete_item(&mut self, name: &str) -> Result<(), Error> {
        self.items.remove(name);
        Ok(())
    }
}
