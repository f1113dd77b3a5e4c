//! Endpoint HTTP `/metrics` (formato texto OpenMetrics).
//!
//! Atende as requisições em sequência na thread principal; cada scrape só lê
//! o registro, nunca escreve.

use meter_core::MeterRegistry;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, error, warn};

const CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Caminho de scrape.
pub const METRICS_PATH: &str = "/metrics";

#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("Falha ao bind em {addr}: {source}")]
    Bind {
        addr: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Servidor de métricas ligado ao registro compartilhado.
pub struct MetricsServer {
    server: Server,
    registry: Arc<MeterRegistry>,
}

impl MetricsServer {
    pub fn bind(addr: &str, registry: Arc<MeterRegistry>) -> Result<Self, ExporterError> {
        let server = Server::http(addr).map_err(|source| ExporterError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self { server, registry })
    }

    /// Espera `grace` antes de abrir a porta, para o listener produzir a
    /// primeira leitura. Não é uma sincronização garantida.
    pub fn bind_after_grace(
        addr: &str,
        grace: Duration,
        registry: Arc<MeterRegistry>,
    ) -> Result<Self, ExporterError> {
        std::thread::sleep(grace);
        Self::bind(addr, registry)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Atende requisições até o processo terminar.
    pub fn serve(&self) {
        for request in self.server.incoming_requests() {
            self.handle(request);
        }
    }

    /// Atende uma única requisição (bloqueia até chegar).
    pub fn handle_next(&self) -> std::io::Result<()> {
        let request = self.server.recv()?;
        self.handle(request);
        Ok(())
    }

    fn handle(&self, request: Request) {
        let response = self.route(request.method(), request.url());
        debug!(
            "{} {} → {}",
            request.method(),
            request.url(),
            response.status_code().0
        );
        if let Err(e) = request.respond(response) {
            warn!("Erro ao responder scrape: {e}");
        }
    }

    fn route(&self, method: &Method, url: &str) -> Response<Cursor<Vec<u8>>> {
        let path = url.split('?').next().unwrap_or(url);
        if path != METRICS_PATH {
            return Response::from_string("not found\n").with_status_code(StatusCode(404));
        }
        if *method != Method::Get {
            return Response::from_string("method not allowed\n").with_status_code(StatusCode(405));
        }

        match self.registry.encode_text() {
            Ok(body) => {
                let mut response = Response::from_string(body);
                if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], CONTENT_TYPE.as_bytes()) {
                    response.add_header(header);
                }
                response
            }
            Err(e) => {
                error!("Erro ao codificar métricas: {e}");
                Response::from_string("encoding error\n").with_status_code(StatusCode(500))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_core::Slot;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    fn get(addr: SocketAddr, method: &str, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(
            stream,
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    fn test_server() -> MetricsServer {
        let registry = Arc::new(MeterRegistry::new());
        registry.set(Slot::VoltageL1, 232.0);
        registry.set(Slot::EnergyDeliveredTariff1, 992.992);
        MetricsServer::bind("127.0.0.1:0", registry).unwrap()
    }

    #[test]
    fn route_status_codes() {
        let server = test_server();
        assert_eq!(server.route(&Method::Get, "/metrics").status_code().0, 200);
        assert_eq!(server.route(&Method::Get, "/metrics?x=1").status_code().0, 200);
        assert_eq!(server.route(&Method::Get, "/").status_code().0, 404);
        assert_eq!(server.route(&Method::Post, "/metrics").status_code().0, 405);
    }

    #[test]
    fn serves_metrics_over_http() {
        let server = test_server();
        let addr = server.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            server.handle_next().unwrap();
            server.handle_next().unwrap();
        });

        let ok = get(addr, "GET", "/metrics");
        assert!(ok.starts_with("HTTP/1.1 200"), "{ok}");
        assert!(ok.contains("application/openmetrics-text"), "{ok}");
        assert!(ok.contains("\ninst_volt_l1 232"), "{ok}");
        assert!(ok.contains("\npower_to_tariff1_kwh_total 992.992"), "{ok}");

        let missing = get(addr, "GET", "/nope");
        assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");

        handle.join().unwrap();
    }

    #[test]
    fn grace_period_elapses_before_serving() {
        let grace = Duration::from_millis(50);
        let start = std::time::Instant::now();
        let server =
            MetricsServer::bind_after_grace("127.0.0.1:0", grace, Arc::new(MeterRegistry::new()))
                .unwrap();
        assert!(start.elapsed() >= grace);
        assert!(server.local_addr().is_some());
    }

    #[test]
    fn default_grace_period_is_two_seconds() {
        let exporter = meter_core::config::ExporterConfig::default();
        assert_eq!(exporter.startup_delay(), Duration::from_secs(2));
    }

    #[test]
    fn bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = MetricsServer::bind(&addr, Arc::new(MeterRegistry::new()));
        assert!(matches!(err, Err(ExporterError::Bind { .. })));
    }
}
