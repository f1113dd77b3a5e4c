//! Fontes de bytes: porta serial do medidor ou arquivo de captura (replay).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Baud padrão da porta P1 (DSMR 4+).
pub const DEFAULT_BAUD: u32 = 115_200;

/// Intervalo padrão entre linhas no modo replay.
pub const DEFAULT_REPLAY_INTERVAL: Duration = Duration::from_millis(200);

/// Erros ao abrir a fonte. Fatais na inicialização.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Não foi possível abrir {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Falha ao configurar {path}: {source}")]
    Configure {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Baud não suportado: {0}")]
    UnsupportedBaud(u32),
}

/// De onde vêm as linhas do telegrama.
#[derive(Debug, Clone, PartialEq)]
pub enum ByteSource {
    /// Porta serial ao vivo; o medidor dita o ritmo.
    Serial { device: PathBuf, baud: u32 },
    /// Arquivo capturado, reproduzido com pausa entre linhas.
    Replay { path: PathBuf, interval: Duration },
}

impl ByteSource {
    /// Abre a fonte para leitura linha a linha.
    pub fn open(&self) -> Result<Box<dyn BufRead + Send>, SourceError> {
        match self {
            ByteSource::Serial { device, baud } => {
                let file = File::open(device).map_err(|source| SourceError::Open {
                    path: device.clone(),
                    source,
                })?;
                configure_tty(&file, *baud).map_err(|e| match e {
                    TtyError::Baud(b) => SourceError::UnsupportedBaud(b),
                    TtyError::Io(source) => SourceError::Configure {
                        path: device.clone(),
                        source,
                    },
                })?;
                info!("Porta serial {} aberta a {baud} baud", device.display());
                Ok(Box::new(BufReader::new(file)))
            }
            ByteSource::Replay { path, .. } => {
                let file = File::open(path).map_err(|source| SourceError::Open {
                    path: path.clone(),
                    source,
                })?;
                info!("Arquivo de replay {} aberto", path.display());
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }

    /// Pausa entre linhas: `None` para o dispositivo ao vivo.
    pub fn pacing(&self) -> Option<Duration> {
        match self {
            ByteSource::Serial { .. } => None,
            ByteSource::Replay { interval, .. } => Some(*interval),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ByteSource::Serial { device, baud } => format!("serial {} @ {baud}", device.display()),
            ByteSource::Replay { path, interval } => {
                format!("replay {} ({} ms/linha)", path.display(), interval.as_millis())
            }
        }
    }
}

// ──────────────────────────────────────────────
// termios (Unix)
// ──────────────────────────────────────────────

#[derive(Debug)]
enum TtyError {
    Baud(u32),
    Io(std::io::Error),
}

/// Indica se o baud tem constante termios correspondente.
pub fn is_supported_baud(baud: u32) -> bool {
    matches!(baud, 9_600 | 19_200 | 38_400 | 57_600 | 115_200)
}

#[cfg(unix)]
fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    match baud {
        9_600 => Some(libc::B9600),
        19_200 => Some(libc::B19200),
        38_400 => Some(libc::B38400),
        57_600 => Some(libc::B57600),
        115_200 => Some(libc::B115200),
        _ => None,
    }
}

/// Coloca o tty em modo raw 8N1 no baud pedido.
#[cfg(unix)]
fn configure_tty(file: &File, baud: u32) -> Result<(), TtyError> {
    use std::os::unix::io::AsRawFd;

    let speed = baud_constant(baud).ok_or(TtyError::Baud(baud))?;
    let fd = file.as_raw_fd();

    // SAFETY: `fd` é válido enquanto `file` viver e `tio` é inicializado por tcgetattr.
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(TtyError::Io(std::io::Error::last_os_error()));
        }
        libc::cfmakeraw(&mut tio);
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cc[libc::VMIN] = 1;
        tio.c_cc[libc::VTIME] = 0;
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(TtyError::Io(std::io::Error::last_os_error()));
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(TtyError::Io(std::io::Error::last_os_error()));
        }
    }
    Ok(())
}

/// Fora de Unix a porta é usada como já configurada pelo sistema.
#[cfg(not(unix))]
fn configure_tty(_file: &File, baud: u32) -> Result<(), TtyError> {
    if is_supported_baud(baud) {
        Ok(())
    } else {
        Err(TtyError::Baud(baud))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn replay_source_reads_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "/KFM5KAIFA-METER").unwrap();
        writeln!(file, "1-0:32.7.0(232.0*V)").unwrap();

        let source = ByteSource::Replay {
            path: file.path().to_path_buf(),
            interval: DEFAULT_REPLAY_INTERVAL,
        };
        let reader = source.open().unwrap();
        let lines: Vec<String> = reader.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, ["/KFM5KAIFA-METER", "1-0:32.7.0(232.0*V)"]);
    }

    #[test]
    fn missing_file_fails_to_open() {
        let source = ByteSource::Replay {
            path: PathBuf::from("/nonexistent/telegram.txt"),
            interval: DEFAULT_REPLAY_INTERVAL,
        };
        assert!(matches!(source.open(), Err(SourceError::Open { .. })));
    }

    #[test]
    fn missing_device_fails_to_open() {
        let source = ByteSource::Serial {
            device: PathBuf::from("/dev/nonexistent-p1"),
            baud: DEFAULT_BAUD,
        };
        assert!(matches!(source.open(), Err(SourceError::Open { .. })));
    }

    #[test]
    fn pacing_only_for_replay() {
        let serial = ByteSource::Serial {
            device: PathBuf::from("/dev/ttyUSB0"),
            baud: DEFAULT_BAUD,
        };
        let replay = ByteSource::Replay {
            path: PathBuf::from("samples/telegram.txt"),
            interval: Duration::from_millis(50),
        };
        assert_eq!(serial.pacing(), None);
        assert_eq!(replay.pacing(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn supported_bauds() {
        assert!(is_supported_baud(DEFAULT_BAUD));
        assert!(is_supported_baud(9_600));
        assert!(!is_supported_baud(12_345));
    }
}
