use std::fs;

use rksv::{ConfigError, ServiceRegistry, config};
use serial_test::serial;
use tempfile::tempdir;

use crate::common::DirGuard;

mod common;

const CONFIG: &str = r#"
- name: base
  inheritEnv: true
  env:
    - name: HOST
      value: localhost
- name: web
  from: base
  tags: [frontend]
  run: ./web
  env:
    - name: URL
      value: "http://{$HOST}/"
- name: db
  tags: [backend]
  run: postgres
- name: scratch
  skip: true
  run: ./scratch
"#;

#[test]
#[serial]
fn test_load_from_current_dir() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("rksv.yml"), CONFIG).unwrap();
    let _guard = DirGuard::change_to(dir.path()).unwrap();

    let configs = config::load(None).unwrap();
    let registry = ServiceRegistry::new(config::resolve(&configs).unwrap());

    let web = registry.get("web").unwrap();
    assert!(web.inherit_env);
    assert_eq!(web.env.len(), 2);
    assert_eq!(web.env[1].value.as_deref(), Some("http://localhost/"));

    let selected = registry.select::<&str>(&[]).unwrap();
    assert_eq!(selected, vec![0, 1, 2]);
    assert_eq!(registry.select(&["backend", "web"]).unwrap(), vec![2, 1]);
}

#[test]
#[serial]
fn test_load_from_config_dir() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join(".rksv")).unwrap();
    fs::write(dir.path().join(".rksv/10-db.yaml"), "- name: db\n  run: postgres\n").unwrap();
    fs::write(dir.path().join(".rksv/20-web.yaml"), "- name: web\n  run: ./web\n").unwrap();
    let _guard = DirGuard::change_to(dir.path()).unwrap();

    let configs = config::load(None).unwrap();
    let names: Vec<&str> = configs.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["db", "web"]);
}

#[test]
#[serial]
fn test_missing_config() {
    let dir = tempdir().unwrap();
    let _guard = DirGuard::change_to(dir.path()).unwrap();
    assert!(matches!(config::load(None), Err(ConfigError::NotFound)));
}
