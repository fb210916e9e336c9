use std::fmt::Display;
use std::panic::Location;

use log::Level;

const DEFAULT_FILTER: &str = "info";

/// Installs `env_logger`. `RUST_LOG` overrides the default `info` filter.
pub fn init() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_FILTER))
    .format_timestamp_secs()
    .init();
}

/// Logs a missing value or an error at the given level and turns it into an
/// [`anyhow::Error`] carrying `msg`.
pub trait LogExt<T> {
  fn log_at(self, level: Level, msg: &str) -> anyhow::Result<T>;

  #[track_caller]
  fn log_warn(self, msg: &str) -> anyhow::Result<T>
  where
    Self: Sized,
  {
    self.log_at(Level::Warn, msg)
  }

  #[track_caller]
  fn log_error(self, msg: &str) -> anyhow::Result<T>
  where
    Self: Sized,
  {
    self.log_at(Level::Error, msg)
  }
}

impl<T> LogExt<T> for Option<T> {
  #[track_caller]
  fn log_at(self, level: Level, msg: &str) -> anyhow::Result<T> {
    match self {
      Some(value) => Ok(value),
      None => {
        let location = Location::caller().to_string();
        log::log!(level, location = location.as_str(); "{msg}");
        anyhow::bail!(msg.to_owned())
      }
    }
  }
}

impl<T, E> LogExt<T> for Result<T, E>
where
  E: Display,
{
  #[track_caller]
  fn log_at(self, level: Level, msg: &str) -> anyhow::Result<T> {
    match self {
      Ok(value) => Ok(value),
      Err(error) => {
        let location = Location::caller().to_string();
        log::log!(level, location = location.as_str(); "{msg}: {error}");
        anyhow::bail!("{msg}: {error}")
      }
    }
  }
}
