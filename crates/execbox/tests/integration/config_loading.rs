use std::io::Write;

use execbox::config::{Config, ConfigError, EXAMPLE_CONFIG, ImagePolicy};

#[test]
fn test_example_config_parses() {
    let config = Config::parse_toml(EXAMPLE_CONFIG).expect("example config should parse");
    assert_eq!(config.docker_timeout, 120);
    assert_eq!(config.image_policy, ImagePolicy::IfMissing);
    assert!(config.docker_socket.is_none());
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
docker_socket = "/run/docker.sock"
docker_timeout = 30
workspace_root = "/var/tmp"
image_policy = "prefetch"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).expect("config file should load");
    assert_eq!(
        config.docker_socket.as_deref(),
        Some(std::path::Path::new("/run/docker.sock"))
    );
    assert_eq!(config.docker_timeout, 30);
    assert_eq!(config.workspace_root(), std::path::PathBuf::from("/var/tmp"));
    assert_eq!(config.image_policy, ImagePolicy::Prefetch);
}

#[test]
fn test_load_rejects_relative_workspace_root() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, r#"workspace_root = "relative/dir""#).unwrap();

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}
