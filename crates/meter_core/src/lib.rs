//! # Meter Core
//!
//! Decodificação das linhas de telegrama P1 (DSMR) emitidas pelo medidor
//! inteligente e registro das métricas publicadas pelo exporter.
//!
//! ## Módulos
//! - [`obis`] – Tabela de regras (identificador OBIS → faixa → escala → slot)
//! - [`decoder`] – Decodificação linha a linha e escrita no registro
//! - [`registry`] – Slots de métricas (gauges e visões de contador) e codificação texto
//! - [`listener`] – Laço de leitura da fonte com pausa opcional de replay
//! - [`source`] – Porta serial ou arquivo de captura
//! - [`config`] – Configuração unificada via TOML

pub mod obis;
pub mod decoder;
pub mod registry;
pub mod listener;
pub mod source;
pub mod config;

// Re-exports convenientes
pub use config::AppConfig;
pub use decoder::{DecodeError, LineOutcome, Reading, TelegramDecoder, decode_line};
pub use listener::{ListenerExit, StreamListener};
pub use registry::{MeterRegistry, Slot, SlotKind};
pub use source::{ByteSource, SourceError};
