//! Listener do stream: lê linhas da fonte indefinidamente e alimenta o decodificador.
//!
//! Para de vez no fim do stream ou em erro de leitura; não reabre a fonte.
//! O processo continua servindo os últimos valores conhecidos.

use crate::decoder::{LineOutcome, TelegramDecoder};
use crate::registry::MeterRegistry;
use std::io::BufRead;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Contadores de linhas processadas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub lines: u64,
    pub updated: u64,
    pub ignored: u64,
    pub rejected: u64,
}

/// Motivo de término do listener.
#[derive(Debug)]
pub enum ListenerExit {
    EndOfStream(ListenerStats),
    ReadError {
        error: std::io::Error,
        stats: ListenerStats,
    },
}

impl ListenerExit {
    pub fn stats(&self) -> ListenerStats {
        match self {
            ListenerExit::EndOfStream(stats) => *stats,
            ListenerExit::ReadError { stats, .. } => *stats,
        }
    }
}

/// Laço de leitura de uma fonte de linhas.
pub struct StreamListener<R> {
    reader: R,
    pacing: Option<Duration>,
    decoder: TelegramDecoder,
    registry: Arc<MeterRegistry>,
}

impl<R: BufRead> StreamListener<R> {
    pub fn new(reader: R, pacing: Option<Duration>, registry: Arc<MeterRegistry>) -> Self {
        Self {
            reader,
            pacing,
            decoder: TelegramDecoder::new(),
            registry,
        }
    }

    /// Roda até o fim do stream ou erro de leitura.
    pub fn run(mut self) -> ListenerExit {
        self.registry.set_listener_up(true);
        let mut stats = ListenerStats::default();
        let mut buf = Vec::with_capacity(128);

        let exit = loop {
            buf.clear();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => break ListenerExit::EndOfStream(stats),
                Ok(_) => {
                    stats.lines += 1;
                    match self.decoder.apply(&buf, &self.registry) {
                        LineOutcome::Updated(_) => stats.updated += 1,
                        LineOutcome::Ignored => stats.ignored += 1,
                        LineOutcome::Rejected(_) => stats.rejected += 1,
                    }

                    if let Some(pause) = self.pacing {
                        std::thread::sleep(pause);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(error) => break ListenerExit::ReadError { error, stats },
            }
        };

        self.registry.set_listener_up(false);
        match &exit {
            ListenerExit::EndOfStream(s) => info!(
                "Fim do stream: {} linhas ({} atualizadas, {} ignoradas, {} rejeitadas)",
                s.lines, s.updated, s.ignored, s.rejected
            ),
            ListenerExit::ReadError { error, stats } => error!(
                "Erro de leitura após {} linhas: {error}. Listener parado.",
                stats.lines
            ),
        }
        exit
    }
}

impl<R: BufRead + Send + 'static> StreamListener<R> {
    /// Inicia o listener numa thread dedicada.
    pub fn spawn(self) -> std::io::Result<JoinHandle<ListenerExit>> {
        debug!("Iniciando thread telegram-listener");
        std::thread::Builder::new()
            .name("telegram-listener".into())
            .spawn(move || self.run())
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
