use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use url::Url;

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    pub caldav: Caldav,
    #[serde(default)]
    pub cache: Cache,
    /// Attendee email to viewer identity.
    #[serde(default)]
    pub identities: BTreeMap<String, String>,
}

#[derive(serde::Deserialize)]
pub struct Caldav {
    /// Collection URL, with a trailing slash.
    pub url: Url,
    #[serde(default)]
    pub username: String,
    pub password_file: Option<PathBuf>,
    pub password: Option<String>,
    /// Bearer token, used instead of the username and password when set.
    pub token: Option<String>,
}

impl core::fmt::Debug for Caldav {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Caldav")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password_file", &self.password_file)
            .field("password", &"<hidden>")
            .field("token", &"<hidden>")
            .finish()
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Cache {
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("no credentials: set caldav.password, caldav.password_file or caldav.token")]
    MissingCredentials,
}

/// Loads the configuration file and resolves `password_file`.
///
/// # Errors
/// Returns an error if a file cannot be read, the TOML is invalid, or no
/// credentials are configured.
pub fn init(path: &Path) -> Result<Config, Error> {
    let string = read(path)?;
    let mut config = parse(&string)?;

    if let Some(file) = &config.caldav.password_file {
        let password = read(file)?;

        config.caldav.password = Some(password.trim_end_matches(['\r', '\n']).to_owned());
    }

    if config.caldav.password.is_none() && config.caldav.token.is_none() {
        return Err(Error::MissingCredentials);
    }

    Ok(config)
}

fn parse(string: &str) -> Result<Config, Error> {
    let mut config: Config = toml::from_str(string)?;

    if !config.caldav.url.path().ends_with('/') {
        let path = format!("{}/", config.caldav.url.path());
        config.caldav.url.set_path(&path);
    }

    Ok(config)
}

fn read(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_owned(),
        source,
    })
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from("./data")
}
