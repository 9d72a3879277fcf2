use std::collections::{BTreeMap, HashMap, HashSet};

use common::ServiceDescriptor;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("couldn't find service or tag '{0}'")]
    Unknown(String),
}

/// Resolved services in configuration order, indexed by name and by tag.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: Vec<ServiceDescriptor>,
    by_name: HashMap<String, usize>,
    by_tag: BTreeMap<String, Vec<usize>>,
}

impl ServiceRegistry {
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_tag: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, service) in services.iter().enumerate() {
            by_name.insert(service.name.clone(), i);
            for tag in &service.tags {
                by_tag.entry(tag.clone()).or_default().push(i);
            }
        }
        ServiceRegistry {
            services,
            by_name,
            by_tag,
        }
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.by_name.get(name).map(|&i| &self.services[i])
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.by_tag.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Turn selectors into positions in [`services`](Self::services).
    ///
    /// Without selectors every service not marked `skip` is selected. A selector
    /// is looked up as a service name first, then as a tag. The result keeps the
    /// order in which services were first selected and holds no duplicates.
    pub fn select<S: AsRef<str>>(&self, selectors: &[S]) -> Result<Vec<usize>, SelectError> {
        if selectors.is_empty() {
            return Ok((0..self.services.len())
                .filter(|&i| !self.services[i].skip)
                .collect());
        }

        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for selector in selectors {
            let selector = selector.as_ref();
            let found: &[usize] = if let Some(i) = self.by_name.get(selector) {
                std::slice::from_ref(i)
            } else if let Some(group) = self.by_tag.get(selector) {
                group
            } else {
                return Err(SelectError::Unknown(selector.to_string()));
            };
            for &i in found {
                if seen.insert(i) {
                    selected.push(i);
                }
            }
        }
        Ok(selected)
    }
}
