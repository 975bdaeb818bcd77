//! gpsd client
//!
//! A background task follows the JSON watcher stream and keeps only the
//! newest TPV fix. Each poll takes that fix, so a fix is reported once and a
//! backlog of reports never delays the position. SKY reports refresh the
//! satellite count attached to later fixes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drift_tracker_core::{GeoCoordinate, GpsError, GpsResult, GpsSource, PositionSample};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// gpsd reports about once a second; a fresh subscription waits this long
/// for its first fix.
const FIRST_FIX_WAIT: Duration = Duration::from_millis(1500);

#[derive(Debug, Deserialize)]
#[serde(tag = "class")]
enum Report {
    #[serde(rename = "TPV")]
    Tpv(TpvReport),
    #[serde(rename = "SKY")]
    Sky(SkyReport),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TpvReport {
    /// 0/1 no fix, 2 = 2D, 3 = 3D.
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
    time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SkyReport {
    #[serde(rename = "uSat")]
    used_count: Option<u32>,
    #[serde(default)]
    satellites: Vec<Satellite>,
}

#[derive(Debug, Deserialize)]
struct Satellite {
    #[serde(default)]
    used: bool,
}

impl TpvReport {
    fn fix(&self) -> Option<(GeoCoordinate, DateTime<Utc>)> {
        if self.mode < 2 {
            return None;
        }
        let coordinate = GeoCoordinate::new(self.lat?, self.lon?);
        if !coordinate.is_valid() {
            return None;
        }
        let captured_at = self
            .time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Some((coordinate, captured_at))
    }
}

impl SkyReport {
    fn satellites_used(&self) -> Option<u32> {
        self.used_count.or_else(|| {
            (!self.satellites.is_empty())
                .then(|| self.satellites.iter().filter(|s| s.used).count() as u32)
        })
    }
}

fn parse_report(line: &str) -> Option<Report> {
    serde_json::from_str(line.trim()).ok()
}

/// Newest fix not yet handed out, shared with the reader task.
#[derive(Default)]
struct LatestFix {
    sample: Mutex<Option<PositionSample>>,
    arrived: Notify,
}

impl LatestFix {
    fn store(&self, sample: PositionSample) {
        *self.sample.lock() = Some(sample);
        self.arrived.notify_one();
    }

    fn take(&self) -> Option<PositionSample> {
        self.sample.lock().take()
    }
}

/// Follows the report stream until the connection ends.
async fn read_reports(mut lines: Lines<BufReader<TcpStream>>, latest: Arc<LatestFix>) -> GpsError {
    let mut satellites = None;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_report(&line) {
                Some(Report::Tpv(tpv)) => {
                    if let Some((coordinate, captured_at)) = tpv.fix() {
                        let mut sample = PositionSample::new(coordinate, captured_at);
                        if let Some(used) = satellites {
                            sample = sample.with_satellites(used);
                        }
                        latest.store(sample);
                    }
                }
                Some(Report::Sky(sky)) => {
                    if let Some(used) = sky.satellites_used() {
                        satellites = Some(used);
                    }
                }
                Some(Report::Other) => {}
                None => debug!(line = %line, "Ignoring unparsable gpsd line"),
            },
            Ok(None) => {
                warn!("gpsd closed the connection");
                return GpsError::Closed;
            }
            Err(e) => {
                warn!("gpsd read failed: {}", e);
                return GpsError::Connection(e.to_string());
            }
        }
    }
}

pub struct GpsdSource {
    addr: String,
    connect_timeout: Duration,
    first_fix_wait: Duration,
    latest: Arc<LatestFix>,
    reader: Option<JoinHandle<GpsError>>,
}

impl GpsdSource {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            first_fix_wait: FIRST_FIX_WAIT,
            latest: Arc::new(LatestFix::default()),
            reader: None,
        }
    }

    fn is_reading(&self) -> bool {
        self.reader.as_ref().is_some_and(|reader| !reader.is_finished())
    }

    async fn connect(&self) -> GpsResult<Lines<BufReader<TcpStream>>> {
        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| GpsError::Connection(format!("connect to {} timed out", self.addr)))?
            .map_err(|e| GpsError::Connection(e.to_string()))?;

        stream
            .write_all(WATCH_COMMAND)
            .await
            .map_err(|e| GpsError::Connection(e.to_string()))?;

        info!(addr = %self.addr, "Subscribed to gpsd");
        Ok(BufReader::new(stream).lines())
    }

    /// Replaces a finished reader with one on a new connection.
    async fn subscribe(&mut self) -> GpsResult<()> {
        if let Some(reader) = self.reader.take()
            && let Ok(reason) = reader.await
        {
            debug!("Previous gpsd subscription ended: {}", reason);
        }

        let lines = self.connect().await?;
        self.reader = Some(tokio::spawn(read_reports(lines, self.latest.clone())));
        Ok(())
    }
}

impl Drop for GpsdSource {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl GpsSource for GpsdSource {
    async fn poll_fix(&mut self) -> GpsResult<Option<PositionSample>> {
        if self.is_reading() {
            return Ok(self.latest.take());
        }

        // A fix read before the connection dropped is still the newest one.
        let pending = self.latest.take();
        if let Err(e) = self.subscribe().await {
            return match pending {
                Some(sample) => Ok(Some(sample)),
                None => Err(e),
            };
        }
        if pending.is_some() {
            return Ok(pending);
        }

        let deadline = Instant::now() + self.first_fix_wait;
        loop {
            if let Some(sample) = self.latest.take() {
                return Ok(Some(sample));
            }
            if tokio::time::timeout_at(deadline, self.latest.arrived.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }
}
