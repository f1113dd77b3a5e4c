//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável, com overrides por variável
//! de ambiente (`SERIAL_DEVICE` seleciona o modo ao vivo).

use crate::source::{ByteSource, DEFAULT_BAUD, is_supported_baud};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Dispositivo serial; quando definida, substitui `source.device`.
pub const ENV_SERIAL_DEVICE: &str = "SERIAL_DEVICE";
/// Arquivo de replay; substitui `source.replay_file`.
pub const ENV_REPLAY_FILE: &str = "METER_REPLAY_FILE";
/// Porta HTTP; substitui `exporter.port`.
pub const ENV_PORT: &str = "METER_EXPORTER_PORT";
/// Caminho alternativo do `config.toml`.
pub const ENV_CONFIG: &str = "METER_EXPORTER_CONFIG";

/// Erros ao salvar a configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de serialização: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao escrever {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Fonte dos telegramas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Dispositivo serial (vazio = modo replay)
    pub device: String,
    /// Baud da porta serial
    pub baud: u32,
    /// Arquivo capturado usado no modo replay
    pub replay_file: PathBuf,
    /// Pausa entre linhas no modo replay (ms)
    pub replay_interval_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            baud: DEFAULT_BAUD,
            replay_file: PathBuf::from("samples/telegram.txt"),
            replay_interval_ms: 200,
        }
    }
}

/// Endpoint HTTP de métricas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// IP local para bind
    pub bind_ip: String,
    /// Porta HTTP
    pub port: u16,
    /// Espera antes de servir, para o listener produzir a primeira leitura (s)
    pub startup_delay_secs: f64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".into(),
            port: 9222,
            startup_delay_secs: 2.0,
        }
    }
}

impl ExporterConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.port)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs_f64(self.startup_delay_secs.clamp(0.0, 60.0))
    }
}

/// Configuração raiz.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub exporter: ExporterConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Caminho do config.toml: `METER_EXPORTER_CONFIG` ou ao lado do executável.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Aplica overrides vindos de `lookup` (normalmente `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(device) = lookup(ENV_SERIAL_DEVICE).filter(|d| !d.is_empty()) {
            self.source.device = device;
        }
        if let Some(file) = lookup(ENV_REPLAY_FILE).filter(|f| !f.is_empty()) {
            self.source.replay_file = PathBuf::from(file);
        }
        if let Some(port) = lookup(ENV_PORT) {
            match port.parse() {
                Ok(p) => self.exporter.port = p,
                Err(e) => warn!("{ENV_PORT} inválida ({port:?}): {e}"),
            }
        }
    }

    /// Aplica overrides do ambiente do processo.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Fonte selecionada: dispositivo serial se configurado, senão replay.
    pub fn byte_source(&self) -> ByteSource {
        if self.source.device.is_empty() {
            ByteSource::Replay {
                path: self.source.replay_file.clone(),
                interval: Duration::from_millis(self.source.replay_interval_ms),
            }
        } else {
            ByteSource::Serial {
                device: PathBuf::from(&self.source.device),
                baud: self.source.baud,
            }
        }
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.exporter.port == 0 {
            errors.push("Porta do exporter não pode ser 0".into());
        }
        if !(0.0..=60.0).contains(&self.exporter.startup_delay_secs) {
            errors.push(format!(
                "Espera inicial inválida: {} (0.0–60.0)",
                self.exporter.startup_delay_secs
            ));
        }
        if self.source.replay_interval_ms > 60_000 {
            errors.push(format!(
                "Intervalo de replay inválido: {} ms (0–60000)",
                self.source.replay_interval_ms
            ));
        }
        if !self.source.device.is_empty() && !is_supported_baud(self.source.baud) {
            errors.push(format!("Baud não suportado: {}", self.source.baud));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn default_source_is_replay() {
        let source = AppConfig::default().byte_source();
        assert_eq!(
            source,
            ByteSource::Replay {
                path: PathBuf::from("samples/telegram.txt"),
                interval: Duration::from_millis(200),
            }
        );
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[exporter]
port = 9999
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.exporter.port, 9999);
        // Outros campos devem ter valor padrão
        assert_eq!(config.exporter.startup_delay_secs, 2.0);
        assert_eq!(config.source.baud, 115_200);
        assert!(config.source.device.is_empty());
    }

    #[test]
    fn serial_device_env_selects_live_mode() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[(ENV_SERIAL_DEVICE, "/dev/ttyUSB0")]));
        assert_eq!(
            config.byte_source(),
            ByteSource::Serial {
                device: PathBuf::from("/dev/ttyUSB0"),
                baud: 115_200,
            }
        );
        assert_eq!(config.byte_source().pacing(), None);
    }

    #[test]
    fn empty_or_invalid_overrides_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[(ENV_SERIAL_DEVICE, ""), (ENV_PORT, "http")]));
        assert!(config.source.device.is_empty());
        assert_eq!(config.exporter.port, 9222);

        config.apply_overrides(env(&[(ENV_PORT, "9100"), (ENV_REPLAY_FILE, "/tmp/p1.txt")]));
        assert_eq!(config.exporter.port, 9100);
        assert_eq!(config.source.replay_file, PathBuf::from("/tmp/p1.txt"));
    }

    #[test]
    fn validate_catches_bad_values() {
        let mut config = AppConfig::default();
        config.exporter.port = 0;
        config.exporter.startup_delay_secs = -1.0;
        config.source.device = "/dev/ttyUSB0".into();
        config.source.baud = 12_345;
        assert_eq!(config.validate().len(), 3);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.exporter.port = 9300;
        config.source.device = "/dev/ttyAMA0".into();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path);
        assert_eq!(loaded.exporter.port, 9300);
        assert_eq!(loaded.source.device, "/dev/ttyAMA0");
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[exporter\nport = ").unwrap();

        let config = AppConfig::load(&path);
        assert_eq!(config.exporter.port, 9222);
    }

    #[test]
    fn startup_delay_is_clamped() {
        let exporter = ExporterConfig {
            startup_delay_secs: 500.0,
            ..Default::default()
        };
        assert_eq!(exporter.startup_delay(), Duration::from_secs(60));
        assert_eq!(exporter.listen_addr(), "0.0.0.0:9222");
    }
}
