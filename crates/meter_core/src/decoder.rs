//! Decodificador de linhas de telegrama.
//!
//! Cada linha é tratada isoladamente: casa o prefixo OBIS, recorta a faixa
//! fixa, converte para `f64`, aplica a escala e grava no slot. Linhas sem
//! regra (cabeçalho, checksum, códigos desconhecidos) são ignoradas.
//!
//! A linha é tratada como bytes crus; só o campo recortado precisa ser texto
//! válido. Bytes inválidos fora da faixa não deslocam os offsets.

use crate::obis::{DecodeRule, RULES, match_rule};
use crate::registry::{MeterRegistry, Slot};
use std::num::ParseFloatError;
use tracing::{trace, warn};

/// Erros de extração de um campo. Nunca são fatais.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Linha {identifier} curta demais ({len} bytes, faixa {start}..{end})")]
    Truncated {
        identifier: &'static str,
        len: usize,
        start: usize,
        end: usize,
    },

    #[error("Campo de {identifier} não é texto: {field:?}")]
    NotText {
        identifier: &'static str,
        field: Vec<u8>,
    },

    #[error("Valor inválido em {identifier}: {field:?} ({source})")]
    InvalidNumber {
        identifier: &'static str,
        field: String,
        source: ParseFloatError,
    },
}

/// Valor decodificado de uma linha, já escalado.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub slot: Slot,
    pub value: f64,
}

/// Resultado de aplicar uma linha ao registro.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Updated(Reading),
    Ignored,
    Rejected(DecodeError),
}

/// Decodifica uma linha usando a tabela padrão, sem efeitos colaterais.
pub fn decode_line(line: &[u8]) -> Result<Option<Reading>, DecodeError> {
    match match_rule(RULES, line) {
        Some(rule) => extract(rule, line).map(Some),
        None => Ok(None),
    }
}

fn extract(rule: &DecodeRule, line: &[u8]) -> Result<Reading, DecodeError> {
    let raw = line.get(rule.range.clone()).ok_or(DecodeError::Truncated {
        identifier: rule.identifier,
        len: line.len(),
        start: rule.range.start,
        end: rule.range.end,
    })?;

    let field = std::str::from_utf8(raw).map_err(|_| DecodeError::NotText {
        identifier: rule.identifier,
        field: raw.to_vec(),
    })?;

    let parsed: f64 = field.parse().map_err(|source| DecodeError::InvalidNumber {
        identifier: rule.identifier,
        field: field.to_string(),
        source,
    })?;

    Ok(Reading {
        slot: rule.slot,
        value: parsed * rule.scale.factor(),
    })
}

/// Decodificador ligado a uma tabela de regras.
#[derive(Debug, Clone, Copy)]
pub struct TelegramDecoder {
    rules: &'static [DecodeRule],
}

impl TelegramDecoder {
    pub fn new() -> Self {
        Self { rules: RULES }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Decodifica a linha e, se válida, sobrescreve o slot no registro.
    pub fn apply(&self, line: &[u8], registry: &MeterRegistry) -> LineOutcome {
        let Some(rule) = match_rule(self.rules, line) else {
            trace!("Linha ignorada: {:?}", String::from_utf8_lossy(line).trim_end());
            return LineOutcome::Ignored;
        };

        match extract(rule, line) {
            Ok(reading) => {
                registry.set(reading.slot, reading.value);
                trace!("{} → {} = {}", rule.identifier, reading.slot.name(), reading.value);
                LineOutcome::Updated(reading)
            }
            Err(e) => {
                warn!("{e}");
                LineOutcome::Rejected(e)
            }
        }
    }
}

impl Default for TelegramDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
