use std::io;

use anyhow::Result;
use clap_serde_derive::ClapSerde;

#[derive(ClapSerde)]
pub struct Config {
    /// The address the listener binds to
    #[default("0.0.0.0".to_string())]
    #[arg(long, env)]
    pub address: String,

    /// The port the listener binds to
    #[default(3000)]
    #[arg(short, long, env)]
    pub port: u16,

    /// Base URL of the upstream detection API
    #[default("https://api.bitmind.ai".to_string())]
    #[arg(long, env)]
    pub upstream_url: String,

    /// Path of the upstream image detection endpoint
    #[default("/oracle/v1/34/detect-image".to_string())]
    #[arg(long, env)]
    pub image_path: String,

    /// Path of the upstream video detection endpoint
    #[default("/oracle/v1/34/detect-video".to_string())]
    #[arg(long, env)]
    pub video_path: String,

    /// Bearer credential sent to the upstream API
    #[default("oracle-dc220854-d6f1-4282-92d6-55d4f9fac521:64b25953".to_string())]
    #[arg(long, env = "BITMIND_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Maximum accepted body size for image detection requests, in bytes
    #[default(10_000_000)]
    #[arg(long, env)]
    pub image_body_limit: usize,

    /// Maximum accepted body size for video uploads, in bytes
    #[default(500_000_000)]
    #[arg(long, env)]
    pub video_body_limit: usize,
}

impl Config {
    /// Reads a partial configuration from a TOML file; missing keys keep their defaults.
    pub fn from_toml(path: &str) -> Result<Self> {
        let str = std::fs::read_to_string(path)?;
        let opt: <Config as ClapSerde>::Opt = toml::from_str(&str)?;
        Ok(Config::from(opt))
    }
}

/// True when loading failed only because the file does not exist.
pub fn is_missing_file(err: &anyhow::Error) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|err| err.kind() == io::ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_bitmind() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.upstream_url, "https://api.bitmind.ai");
        assert_eq!(config.image_path, "/oracle/v1/34/detect-image");
        assert_eq!(config.video_path, "/oracle/v1/34/detect-video");
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"port = 8080\nupstream_url = \"http://localhost:9000\"\n")
            .unwrap();

        let config = Config::from_toml(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.upstream_url, "http://localhost:9000");
        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.video_body_limit, 500_000_000);
    }

    #[test]
    fn missing_file_is_distinguished_from_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("DetectGateway.toml");
        let err = Config::from_toml(missing.to_str().unwrap()).err().unwrap();
        assert!(is_missing_file(&err));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"port = \"not a number\"\n").unwrap();
        let err = Config::from_toml(file.path().to_str().unwrap()).err().unwrap();
        assert!(!is_missing_file(&err));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"port = [unterminated\n").unwrap();
        let err = Config::from_toml(file.path().to_str().unwrap()).err().unwrap();
        assert!(!is_missing_file(&err));
    }
}
