//! # Meter Exporter
//!
//! Lê os telegramas P1 do medidor inteligente (porta serial ou arquivo de
//! captura) e expõe os valores em `/metrics` para scraping.
//!
//! ## Uso
//! ```bash
//! SERIAL_DEVICE=/dev/ttyUSB0 meter_exporter   # Medidor ao vivo
//! meter_exporter                              # Replay de samples/telegram.txt
//! ```
//!
//! ## Métricas
//! A saída é OpenMetrics: os contadores cumulativos do medidor aparecem com
//! sufixo `_total` (`power_to_tariff1_kwh_total`, `gas_meter_m3_total`...).
//! Consultas feitas para o nome sem sufixo precisam ser ajustadas.
//! `power_received_watts` é registrado mas fica em 0 (nenhuma linha o alimenta).

mod http;

use http::{METRICS_PATH, MetricsServer};
use meter_core::config::AppConfig;
use meter_core::{MeterRegistry, StreamListener, TelegramDecoder};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir (antes dos overrides de ambiente)
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    config.apply_env();

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Configuração inválida: {e}");
        }
        return ExitCode::FAILURE;
    }

    // ── Fonte de bytes ──
    let source = config.byte_source();
    let reader = match source.open() {
        Ok(reader) => reader,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Listener ──
    let registry = Arc::new(MeterRegistry::new());
    let listener = StreamListener::new(reader, source.pacing(), registry.clone());
    if let Err(e) = listener.spawn() {
        error!("Falha ao criar thread do listener: {e}");
        return ExitCode::FAILURE;
    }

    let listen_addr = config.exporter.listen_addr();

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ METER EXPORTER – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Fonte:     {}", source.describe());
    println!("  Endpoint:  http://{listen_addr}{METRICS_PATH}");
    println!("  Regras:    {} códigos OBIS", TelegramDecoder::new().rule_count());
    println!("══════════════════════════════════════════════");
    println!();

    // ── Servidor HTTP (após a espera inicial, evita scrapes antes da primeira leitura) ──
    let grace = config.exporter.startup_delay();
    let server = match MetricsServer::bind_after_grace(&listen_addr, grace, registry) {
        Ok(server) => server,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("Servindo métricas em http://{listen_addr}{METRICS_PATH}");
    server.serve();

    ExitCode::SUCCESS
}
