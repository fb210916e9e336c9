use std::collections::BTreeMap;

/// Maps attendee emails to the identities viewers are known by.
pub trait IdentityResolver {
    fn lookup(&self, email: &str) -> Option<String>;
}

/// Fixed email to identity table, usually loaded from the configuration.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    identities: BTreeMap<String, String>,
}

impl Directory {
    pub fn new(identities: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            identities: identities
                .into_iter()
                .map(|(email, identity)| (email.to_ascii_lowercase(), identity))
                .collect(),
        }
    }
}

impl IdentityResolver for Directory {
    fn lookup(&self, email: &str) -> Option<String> {
        self.identities.get(&email.to_ascii_lowercase()).cloned()
    }
}
