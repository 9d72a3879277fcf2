use ::common::ServiceDescriptor;
use std::env;
use std::io;
use std::path::{Path, PathBuf};

/// Switch the current directory for the lifetime of the guard.
pub struct DirGuard {
    pub original: PathBuf,
}

#[allow(dead_code)]
impl DirGuard {
    pub fn change_to<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let original = env::current_dir()?;
        env::set_current_dir(path)?;
        Ok(Self { original })
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.original);
    }
}

#[allow(dead_code)]
pub fn service<N, R>(name: N, run: R, tags: &[&str]) -> ServiceDescriptor
where
    N: Into<String>,
    R: Into<String>,
{
    let mut desc = ServiceDescriptor::new(name, run);
    desc.inherit_env = true;
    desc.tags = tags.iter().map(|t| t.to_string()).collect();
    desc
}
