//! Tabela de regras OBIS: identificador → faixa fixa → escala → slot.
//!
//! As faixas são medidas em bytes a partir do início da linha e assumem a
//! largura de dígitos do DSMR 4/5. Se o medidor emitir outra largura, o
//! recorte sai errado sem erro algum; a tabela mantém a largura fixa mesmo
//! assim.

use crate::registry::Slot;
use std::ops::Range;

/// Fator de conversão aplicado ao valor lido.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// ×1
    Unit,
    /// ×1000 (kW → W)
    Kilo,
}

impl Scale {
    pub const fn factor(self) -> f64 {
        match self {
            Scale::Unit => 1.0,
            Scale::Kilo => 1000.0,
        }
    }
}

/// Regra de extração de um campo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRule {
    /// Prefixo literal da linha (código OBIS).
    pub identifier: &'static str,
    /// Faixa `[start, end)` do valor numérico.
    pub range: Range<usize>,
    pub scale: Scale,
    pub slot: Slot,
}

const fn rule(identifier: &'static str, start: usize, end: usize, scale: Scale, slot: Slot) -> DecodeRule {
    DecodeRule {
        identifier,
        range: start..end,
        scale,
        slot,
    }
}

/// Regras conhecidas, avaliadas em ordem (primeiro match vence).
pub static RULES: &[DecodeRule] = &[
    rule("1-0:1.8.1", 10, 20, Scale::Unit, Slot::EnergyDeliveredTariff1),
    rule("1-0:1.8.2", 10, 20, Scale::Unit, Slot::EnergyDeliveredTariff2),
    rule("1-0:2.8.1", 10, 20, Scale::Unit, Slot::EnergyReceivedTariff1),
    rule("1-0:2.8.2", 10, 20, Scale::Unit, Slot::EnergyReceivedTariff2),
    rule("0-1:24.2.1", 26, 35, Scale::Unit, Slot::GasVolumeTotal),
    rule("1-0:1.7.0", 10, 16, Scale::Kilo, Slot::PowerDelivered),
    rule("1-0:32.7.0", 11, 16, Scale::Unit, Slot::VoltageL1),
    rule("1-0:52.7.0", 11, 16, Scale::Unit, Slot::VoltageL2),
    rule("1-0:72.7.0", 11, 16, Scale::Unit, Slot::VoltageL3),
    rule("1-0:21.7.0", 11, 17, Scale::Kilo, Slot::PowerDeliveredL1),
    rule("1-0:41.7.0", 11, 17, Scale::Kilo, Slot::PowerDeliveredL2),
    rule("1-0:61.7.0", 11, 17, Scale::Kilo, Slot::PowerDeliveredL3),
    rule("1-0:22.7.0", 11, 17, Scale::Kilo, Slot::PowerReceivedL1),
    rule("1-0:42.7.0", 11, 17, Scale::Kilo, Slot::PowerReceivedL2),
    rule("1-0:62.7.0", 11, 17, Scale::Kilo, Slot::PowerReceivedL3),
];

/// Busca a regra cujo identificador é prefixo da linha (comparação em bytes).
pub fn match_rule<'r>(rules: &'r [DecodeRule], line: &[u8]) -> Option<&'r DecodeRule> {
    rules.iter().find(|r| line.starts_with(r.identifier.as_bytes()))
}

/// Verifica os invariantes de uma tabela de regras e retorna lista de erros.
///
/// Nenhum identificador pode ser prefixo de outro, nem se repetir, e cada
/// faixa precisa começar depois do identificador e ser não vazia.
pub fn validate_rules(rules: &[DecodeRule]) -> Vec<String> {
    let mut errors = Vec::new();

    for (i, a) in rules.iter().enumerate() {
        if a.range.start >= a.range.end {
            errors.push(format!("{}: faixa vazia {:?}", a.identifier, a.range));
        }
        if a.range.start < a.identifier.len() {
            errors.push(format!(
                "{}: faixa {:?} sobrepõe o identificador",
                a.identifier, a.range
            ));
        }
        for b in &rules[i + 1..] {
            if a.identifier.starts_with(b.identifier) || b.identifier.starts_with(a.identifier) {
                errors.push(format!(
                    "identificadores ambíguos: {} / {}",
                    a.identifier, b.identifier
                ));
            }
        }
    }

    errors
}
