//! Application configuration.
//!
//! A string-keyed map of JSON values where an entry may also be computed lazily, on first
//! access, from the rest of the configuration. The standard directories are set up this
//! way so that changing `root_dir` before first use moves all of them.

use crate::ConfigError;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

const ENVIRONMENT_VARIABLE: &str = "APP_ENV";
const DEFAULT_ENVIRONMENT: &str = "development";
const DIRECTORIES: [&str; 4] = ["public", "views", "config", "tmp"];

type Initializer = Box<dyn Fn(&Config) -> Value + Send + Sync>;

enum Entry {
    Ready(Value),
    Lazy { init: Initializer, cell: OnceCell<Value> },
}

pub struct Config {
    entries: HashMap<String, Entry>,
}

impl Config {
    /// An empty configuration without defaults.
    pub fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Defaults rooted at `root_dir`: `public_dir`, `views_dir`, `config_dir` and `tmp_dir`
    /// under it, and `environment` taken from `APP_ENV`.
    pub fn with_root<P: AsRef<Path>>(root_dir: P) -> Self {
        let mut config = Self::empty();
        config.set("root_dir", root_dir.as_ref().to_string_lossy().into_owned());
        for directory in DIRECTORIES {
            config.set_lazy(format!("{directory}_dir"), move |config| {
                let root = config.get_path("root_dir").unwrap_or_default();
                Value::String(root.join(directory).to_string_lossy().into_owned())
            });
        }
        let environment = std::env::var(ENVIRONMENT_VARIABLE).unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_owned());
        config.set("environment", environment);
        config
    }

    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.entries.insert(key.into(), Entry::Ready(value.into()));
    }

    /// Registers a value computed on first access and cached afterwards.
    ///
    /// The initializer must not read its own key.
    pub fn set_lazy<K, F>(&mut self, key: K, init: F)
    where
        K: Into<String>,
        F: Fn(&Config) -> Value + Send + Sync + 'static,
    {
        self.entries.insert(key.into(), Entry::Lazy { init: Box::new(init), cell: OnceCell::new() });
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.entries.get(key)? {
            Entry::Ready(value) => Some(value),
            Entry::Lazy { init, cell } => Some(cell.get_or_init(|| init(self))),
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get_str(key).map(PathBuf::from)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self.get(key).ok_or_else(|| ConfigError::Missing { key: key.to_owned() })?;
        serde_json::from_value(value.clone()).map_err(|source| ConfigError::Invalid { key: key.to_owned(), source })
    }

    pub fn environment(&self) -> &str {
        self.get_str("environment").unwrap_or(DEFAULT_ENVIRONMENT)
    }
}

impl Default for Config {
    /// defaults rooted at the working directory of the process
    fn default() -> Self {
        Self::with_root(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, entry) in &self.entries {
            match entry {
                Entry::Ready(value) => map.entry(key, value),
                Entry::Lazy { cell, .. } => match cell.get() {
                    Some(value) => map.entry(key, value),
                    None => map.entry(key, &"<lazy>"),
                },
            };
        }
        map.finish()
    }
}
