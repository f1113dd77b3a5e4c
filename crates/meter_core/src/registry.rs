//! Registro de métricas do medidor.
//!
//! Cada [`Slot`] é um escalar independente guardado num `AtomicU64` (bits de
//! `f64`). Um único escritor (o listener) e vários leitores (requisições
//! `/metrics`) convivem sem lock; não há consistência entre slots.
//!
//! Slots do tipo [`SlotKind::Counter`] são expostos como contador, mas por
//! dentro são sobrescritos como gauge: o medidor já reporta o registrador
//! cumulativo e o valor é repassado sem nenhuma imposição de monotonicidade.

use prometheus_client::encoding::{EncodeMetric, MetricEncoder};
use prometheus_client::metrics::MetricType;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::time::{SystemTime, UNIX_EPOCH};

/// Gauge `f64` com armazenamento atômico.
pub type FloatGauge = Gauge<f64, AtomicU64>;

// ──────────────────────────────────────────────
// Slots
// ──────────────────────────────────────────────

/// Como o slot aparece para o coletor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Último valor observado.
    Gauge,
    /// Visão de contador sobre um valor sobrescrito pelo decodificador.
    Counter,
}

/// Grandeza medida publicada pelo exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    EnergyDeliveredTariff1,
    EnergyDeliveredTariff2,
    EnergyReceivedTariff1,
    EnergyReceivedTariff2,
    GasVolumeTotal,
    PowerDelivered,
    /// Registrado para exposição, mas nenhuma regra o alimenta: fica em 0.
    PowerReceived,
    VoltageL1,
    VoltageL2,
    VoltageL3,
    PowerDeliveredL1,
    PowerDeliveredL2,
    PowerDeliveredL3,
    PowerReceivedL1,
    PowerReceivedL2,
    PowerReceivedL3,
}

impl Slot {
    /// Todos os slots, na ordem de registro.
    pub const ALL: [Slot; 16] = [
        Slot::EnergyDeliveredTariff1,
        Slot::EnergyDeliveredTariff2,
        Slot::EnergyReceivedTariff1,
        Slot::EnergyReceivedTariff2,
        Slot::GasVolumeTotal,
        Slot::PowerDelivered,
        Slot::PowerReceived,
        Slot::VoltageL1,
        Slot::VoltageL2,
        Slot::VoltageL3,
        Slot::PowerDeliveredL1,
        Slot::PowerDeliveredL2,
        Slot::PowerDeliveredL3,
        Slot::PowerReceivedL1,
        Slot::PowerReceivedL2,
        Slot::PowerReceivedL3,
    ];

    const fn index(self) -> usize {
        self as usize
    }

    /// Nome da métrica exposta. Contadores ganham o sufixo `_total` na codificação.
    pub const fn name(self) -> &'static str {
        match self {
            Slot::EnergyDeliveredTariff1 => "power_to_tariff1_kwh",
            Slot::EnergyDeliveredTariff2 => "power_to_tariff2_kwh",
            Slot::EnergyReceivedTariff1 => "power_by_tariff1_kwh",
            Slot::EnergyReceivedTariff2 => "power_by_tariff2_kwh",
            Slot::GasVolumeTotal => "gas_meter_m3",
            Slot::PowerDelivered => "power_delivered_watts",
            Slot::PowerReceived => "power_received_watts",
            Slot::VoltageL1 => "inst_volt_l1",
            Slot::VoltageL2 => "inst_volt_l2",
            Slot::VoltageL3 => "inst_volt_l3",
            Slot::PowerDeliveredL1 => "inst_pluspower_l1",
            Slot::PowerDeliveredL2 => "inst_pluspower_l2",
            Slot::PowerDeliveredL3 => "inst_pluspower_l3",
            Slot::PowerReceivedL1 => "inst_negpower_l1",
            Slot::PowerReceivedL2 => "inst_negpower_l2",
            Slot::PowerReceivedL3 => "inst_negpower_l3",
        }
    }

    pub const fn help(self) -> &'static str {
        match self {
            Slot::EnergyDeliveredTariff1 => {
                "Meter Reading electricity delivered to client (Tariff 1) in 0,001 kWh"
            }
            Slot::EnergyDeliveredTariff2 => {
                "Meter Reading electricity delivered to client (Tariff 2) in 0,001 kWh"
            }
            Slot::EnergyReceivedTariff1 => {
                "Meter Reading electricity delivered by client (Tariff 1) in 0,001 kWh"
            }
            Slot::EnergyReceivedTariff2 => {
                "Meter Reading electricity delivered by client (Tariff 2) in 0,001 kWh"
            }
            Slot::GasVolumeTotal => "Gas meter reading in m3",
            Slot::PowerDelivered => "Actual electricity power delivered (+P) in 1 Watt resolution",
            Slot::PowerReceived => "Actual electricity power received (-P) in 1 Watt resolution",
            Slot::VoltageL1 => "Instantaneous voltage L1 in V resolution",
            Slot::VoltageL2 => "Instantaneous voltage L2 in V resolution",
            Slot::VoltageL3 => "Instantaneous voltage L3 in V resolution",
            Slot::PowerDeliveredL1 => "Instantaneous active power L1 (+P) in W resolution",
            Slot::PowerDeliveredL2 => "Instantaneous active power L2 (+P) in W resolution",
            Slot::PowerDeliveredL3 => "Instantaneous active power L3 (+P) in W resolution",
            Slot::PowerReceivedL1 => "Instantaneous active power L1 (-P) in W resolution",
            Slot::PowerReceivedL2 => "Instantaneous active power L2 (-P) in W resolution",
            Slot::PowerReceivedL3 => "Instantaneous active power L3 (-P) in W resolution",
        }
    }

    pub const fn kind(self) -> SlotKind {
        match self {
            Slot::EnergyDeliveredTariff1
            | Slot::EnergyDeliveredTariff2
            | Slot::EnergyReceivedTariff1
            | Slot::EnergyReceivedTariff2
            | Slot::GasVolumeTotal => SlotKind::Counter,
            _ => SlotKind::Gauge,
        }
    }
}

// ──────────────────────────────────────────────
// Visão de contador
// ──────────────────────────────────────────────

/// Contador somente-leitura sobre um gauge compartilhado.
///
/// Nunca incrementa: apenas expõe o valor atual da variável de apoio com o
/// tipo `counter`.
#[derive(Debug, Clone)]
struct CounterView(FloatGauge);

impl EncodeMetric for CounterView {
    fn encode(&self, mut encoder: MetricEncoder) -> Result<(), std::fmt::Error> {
        encoder.encode_counter::<(), _, u64>(&self.0.get(), None)
    }

    fn metric_type(&self) -> MetricType {
        MetricType::Counter
    }
}

// ──────────────────────────────────────────────
// Registro
// ──────────────────────────────────────────────

const LAST_UPDATE_NAME: &str = "meter_last_update_timestamp_seconds";
const LISTENER_UP_NAME: &str = "meter_listener_up";

/// Registro de métricas do processo.
///
/// Criado uma vez no `main` e compartilhado via `Arc` entre o listener
/// (escritor) e o servidor HTTP (leitor).
#[derive(Debug)]
pub struct MeterRegistry {
    slots: [FloatGauge; Slot::ALL.len()],
    last_update: FloatGauge,
    listener_up: Gauge,
    exposition: Registry,
}

impl MeterRegistry {
    /// Cria o registro com todos os slots zerados e registrados para exposição.
    pub fn new() -> Self {
        let slots: [FloatGauge; Slot::ALL.len()] = Default::default();
        let last_update = FloatGauge::default();
        let listener_up = Gauge::default();
        let mut exposition = Registry::default();

        for slot in Slot::ALL {
            let backing = slots[slot.index()].clone();
            match slot.kind() {
                SlotKind::Gauge => exposition.register(slot.name(), slot.help(), backing),
                SlotKind::Counter => {
                    exposition.register(slot.name(), slot.help(), CounterView(backing))
                }
            }
        }
        exposition.register(
            LAST_UPDATE_NAME,
            "Unix time of the last successfully decoded telegram line",
            last_update.clone(),
        );
        exposition.register(
            LISTENER_UP_NAME,
            "Whether the telegram listener is still reading the source (1) or stopped (0)",
            listener_up.clone(),
        );

        Self {
            slots,
            last_update,
            listener_up,
            exposition,
        }
    }

    /// Sobrescreve o valor do slot, sem validação.
    pub fn set(&self, slot: Slot, value: f64) {
        self.slots[slot.index()].set(value);
        self.last_update.set(unix_now());
    }

    /// Valor atual do slot (0 enquanto não observado).
    pub fn read(&self, slot: Slot) -> f64 {
        self.slots[slot.index()].get()
    }

    /// Instante (Unix, segundos) da última atualização; 0 se nunca houve.
    pub fn last_update(&self) -> f64 {
        self.last_update.get()
    }

    pub fn set_listener_up(&self, up: bool) {
        self.listener_up.set(i64::from(up));
    }

    pub fn listener_up(&self) -> bool {
        self.listener_up.get() == 1
    }

    /// Codifica todas as métricas no formato texto OpenMetrics.
    pub fn encode_text(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        prometheus_client::encoding::text::encode(&mut body, &self.exposition)?;
        Ok(body)
    }
}

impl Default for MeterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
