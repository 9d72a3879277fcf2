use std::process::Stdio;

use common::{SERVICE_NAME_ENV, ServiceDescriptor};
use tokio::process::Command;

use crate::error::SupervisorError;

/// A command line split into program and arguments, never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Split with shell-style quoting, so `echo 'hello world'` has one argument.
    pub fn parse(line: &str) -> Result<Self, SupervisorError> {
        let mut words = shlex::split(line)
            .ok_or_else(|| SupervisorError::InvalidCommand(line.to_string()))?
            .into_iter();
        let program = words.next().ok_or(SupervisorError::EmptyCommand)?;
        Ok(CommandLine {
            program,
            args: words.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Build the command for `desc`: working dir, stdio routing and environment.
    pub fn command(&self, desc: &ServiceDescriptor) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if desc.dir.as_os_str().is_empty() {
            cmd.current_dir(".");
        } else {
            cmd.current_dir(&desc.dir);
        }

        cmd.stdout(route(desc.output.stdout_attached()));
        cmd.stderr(route(desc.output.stderr_attached()));
        cmd.stdin(route(desc.output.stdin_attached()));

        if !desc.inherit_env {
            cmd.env_clear();
        }
        for entry in &desc.env {
            let value = match &entry.value {
                Some(value) => value.clone(),
                None => std::env::var(&entry.name).unwrap_or_default(),
            };
            cmd.env(&entry.name, value);
        }
        cmd.env(SERVICE_NAME_ENV, &desc.name);
        cmd
    }
}

fn route(attached: bool) -> Stdio {
    if attached {
        Stdio::inherit()
    } else {
        Stdio::null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{EnvEntry, OutputRouting};
    use std::collections::HashMap;
    use std::ffi::OsStr;

    fn env_of(cmd: &Command) -> HashMap<String, Option<String>> {
        cmd.as_std()
            .get_envs()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.map(|v| v.to_string_lossy().into_owned()),
                )
            })
            .collect()
    }

    #[test]
    fn test_parse_splits_quotes() {
        let line = CommandLine::parse("/bin/echo 'hello world' \"and more\"").unwrap();
        assert_eq!(line.program(), "/bin/echo");
        assert_eq!(line.args(), ["hello world", "and more"]);
    }

    #[test]
    fn test_parse_rejects_empty_and_unbalanced() {
        assert!(matches!(
            CommandLine::parse(""),
            Err(SupervisorError::EmptyCommand)
        ));
        assert!(matches!(
            CommandLine::parse("   "),
            Err(SupervisorError::EmptyCommand)
        ));
        assert!(matches!(
            CommandLine::parse("echo 'unterminated"),
            Err(SupervisorError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_command_env_without_inherit() {
        let mut desc = ServiceDescriptor::new("svc", "echo hi");
        desc.env = vec![
            EnvEntry::literal("FOO", "bar"),
            EnvEntry::passthrough("PATH"),
        ];
        let cmd = CommandLine::parse(&desc.run).unwrap().command(&desc);
        let env = env_of(&cmd);

        assert_eq!(env.get("FOO"), Some(&Some("bar".to_string())));
        assert_eq!(
            env.get("PATH"),
            Some(&Some(std::env::var("PATH").unwrap_or_default()))
        );
        assert_eq!(env.get(SERVICE_NAME_ENV), Some(&Some("svc".to_string())));
        assert_eq!(cmd.as_std().get_current_dir(), Some(std::path::Path::new(".")));
        assert_eq!(cmd.as_std().get_program(), OsStr::new("echo"));
    }

    #[tokio::test]
    async fn test_command_clears_parent_env() {
        let mut desc = ServiceDescriptor::new("svc", "/bin/sh -c env");
        desc.output = OutputRouting::default();
        let mut cmd = CommandLine::parse(&desc.run).unwrap().command(&desc);
        cmd.stdout(Stdio::piped());
        let out = cmd.output().await.unwrap();
        let text = String::from_utf8_lossy(&out.stdout);
        assert!(text.contains("RKSV_SERVICE_NAME=svc"));
        assert!(!text.contains("HOME="));
    }

    #[tokio::test]
    async fn test_command_inherits_parent_env() {
        let mut desc = ServiceDescriptor::new("svc", "/bin/sh -c env");
        desc.inherit_env = true;
        desc.env = vec![EnvEntry::literal("RKSV_TEST_VALUE", "42")];
        let mut cmd = CommandLine::parse(&desc.run).unwrap().command(&desc);
        cmd.stdout(Stdio::piped());
        let out = cmd.output().await.unwrap();
        let text = String::from_utf8_lossy(&out.stdout);
        assert!(text.contains("RKSV_TEST_VALUE=42"));
        assert!(text.contains("PATH="));
    }
}
