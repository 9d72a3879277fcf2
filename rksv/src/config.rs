use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::{EnvEntry, OutputRouting, ServiceDescriptor, WatchSpec, default_dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::placeholder;

/// Maximum depth for config directory nesting, `from` chains and placeholders.
pub const RECURSION_LIMIT: usize = 10;

const CONFIG_FILES: [&str; 2] = ["rksv.yaml", "rksv.yml"];
const CONFIG_DIR: &str = ".rksv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't find config: expected ./rksv.yaml, ./rksv.yml or a ./.rksv directory with YAML files")]
    NotFound,

    #[error("couldn't read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("service entry #{0} has no name")]
    MissingName(usize),

    #[error("service '{0}' is defined more than once")]
    Duplicate(String),
}

/// `watch:` block; only filesystem watching exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub fs: Option<WatchSpec>,
}

/// One service entry as written in YAML.
///
/// Every field a child may take from its `from` parent is optional here so an
/// explicit `false` or `0` can be told apart from a field left unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub watch: Option<WatchConfig>,
    #[serde(default)]
    pub inherit_env: Option<bool>,
    #[serde(default)]
    pub env: Vec<EnvEntry>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub dnr: Option<bool>,
    #[serde(default)]
    pub skip: Option<bool>,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<OutputRouting>,
    #[serde(default)]
    pub sleep: Option<u64>,
}

fn fill<T: Clone>(slot: &mut Option<T>, parent: &Option<T>) {
    if slot.is_none() {
        *slot = parent.clone();
    }
}

impl ServiceConfig {
    /// Take every unset field from `parent`. Env entries merge by name, ours win.
    /// `name`, `from` and `tags` stay our own.
    pub fn inherit_from(&mut self, parent: &ServiceConfig) {
        fill(&mut self.watch, &parent.watch);
        fill(&mut self.inherit_env, &parent.inherit_env);
        fill(&mut self.before, &parent.before);
        fill(&mut self.run, &parent.run);
        fill(&mut self.dnr, &parent.dnr);
        fill(&mut self.skip, &parent.skip);
        fill(&mut self.dir, &parent.dir);
        fill(&mut self.output, &parent.output);
        fill(&mut self.sleep, &parent.sleep);

        let mut env = parent.env.clone();
        for entry in self.env.drain(..) {
            match env.iter_mut().find(|e| e.name == entry.name) {
                Some(slot) => *slot = entry,
                None => env.push(entry),
            }
        }
        self.env = env;
    }

    fn into_descriptor(self) -> ServiceDescriptor {
        ServiceDescriptor {
            name: self.name,
            tags: self.tags,
            before: self.before,
            run: self.run.unwrap_or_default(),
            dir: self.dir.unwrap_or_else(default_dir),
            env: placeholder::resolve_env(&self.env),
            output: self.output.unwrap_or_default(),
            inherit_env: self.inherit_env.unwrap_or_default(),
            dnr: self.dnr.unwrap_or_default(),
            skip: self.skip.unwrap_or_default(),
            sleep: self.sleep.unwrap_or_default(),
            watch: self.watch.and_then(|w| w.fs),
        }
    }
}

/// Load the raw YAML: `explicit` if given, otherwise look in the current directory.
pub fn load(explicit: Option<&Path>) -> Result<Vec<ServiceConfig>, ConfigError> {
    let data = match explicit {
        Some(path) => read_file(path)?,
        None => discover(Path::new("."))?,
    };
    parse(&data)
}

/// `rksv.yaml`, then `rksv.yml`, then every YAML file below `.rksv/`.
pub fn discover(base: &Path) -> Result<String, ConfigError> {
    for name in CONFIG_FILES {
        let path = base.join(name);
        if path.is_file() {
            let data = read_file(&path)?;
            if !data.trim().is_empty() {
                debug!("loaded config from {}", path.display());
                return Ok(data);
            }
        }
    }

    let dir = base.join(CONFIG_DIR);
    if dir.is_dir() {
        let mut buf = String::new();
        read_dir_recursive(&dir, 0, &mut buf);
        if !buf.trim().is_empty() {
            return Ok(buf);
        }
    }
    Err(ConfigError::NotFound)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

/// Append every YAML file below `dir` to `buf`, in name order.
/// Unreadable entries are skipped with a warning.
fn read_dir_recursive(dir: &Path, depth: usize, buf: &mut String) {
    if depth > RECURSION_LIMIT {
        warn!("recursion limit ({RECURSION_LIMIT}) reached at '{}'", dir.display());
        return;
    }
    let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(e) => {
            warn!("couldn't read from '{}': {e}", dir.display());
            return;
        }
    };
    entries.sort();

    for path in entries {
        if path.is_dir() {
            read_dir_recursive(&path, depth + 1, buf);
            continue;
        }
        if !is_yaml(&path) {
            continue;
        }
        match fs::read_to_string(&path) {
            Ok(data) if !data.is_empty() => {
                debug!("loaded config from {}", path.display());
                buf.push_str(&data);
                buf.push('\n');
            }
            Ok(_) => {}
            Err(e) => warn!("couldn't load config file '{}': {e}", path.display()),
        }
    }
}

pub fn parse(data: &str) -> Result<Vec<ServiceConfig>, ConfigError> {
    let configs: Option<Vec<ServiceConfig>> = serde_yaml::from_str(data)?;
    Ok(configs.unwrap_or_default())
}

/// Apply `from` inheritance and placeholder substitution, keeping file order.
pub fn resolve(configs: &[ServiceConfig]) -> Result<Vec<ServiceDescriptor>, ConfigError> {
    let mut seen = HashSet::new();
    for (i, config) in configs.iter().enumerate() {
        if config.name.is_empty() {
            return Err(ConfigError::MissingName(i + 1));
        }
        if !seen.insert(config.name.as_str()) {
            return Err(ConfigError::Duplicate(config.name.clone()));
        }
    }

    let lookup: HashMap<&str, &ServiceConfig> =
        configs.iter().map(|c| (c.name.as_str(), c)).collect();
    Ok(configs
        .iter()
        .map(|config| inherit(config, &lookup, 0).into_descriptor())
        .collect())
}

fn inherit(
    config: &ServiceConfig,
    lookup: &HashMap<&str, &ServiceConfig>,
    depth: usize,
) -> ServiceConfig {
    let mut merged = config.clone();
    let Some(parent_name) = config.from.as_deref() else {
        return merged;
    };
    if depth > RECURSION_LIMIT {
        warn!("recursion limit ({RECURSION_LIMIT}) reached at '{}'", config.name);
        return merged;
    }
    let Some(parent) = lookup.get(parent_name) else {
        warn!("{}: 'from' names unknown service '{parent_name}'", config.name);
        return merged;
    };
    if parent.name != config.name {
        let parent = inherit(parent, lookup, depth + 1);
        merged.inherit_from(&parent);
    }
    merged
}
