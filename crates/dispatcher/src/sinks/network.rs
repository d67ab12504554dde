//! NetworkSink - UDP fire-and-forget streaming

use std::collections::HashMap;
use std::net::SocketAddr;

use contracts::{ContractError, DataSink, FieldValue, Sample, SinkRecord};
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, error, instrument, warn};

/// Datagram payload format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    /// The whole record as JSON
    #[default]
    Json,
    /// The flat telemetry frame a live visualization expects
    Visualization,
}

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Target address
    pub addr: SocketAddr,
    pub format: NetworkFormat,
    /// Max datagram size (UDP typically 65507 for IPv4)
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let format = match params.get("format").map(String::as_str) {
            Some("visualization") => NetworkFormat::Visualization,
            Some("json") | None => NetworkFormat::Json,
            Some(other) => return Err(format!("unknown format '{}'", other)),
        };

        let max_packet_size = params
            .get("max_packet_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(65000);

        Ok(Self {
            addr,
            format,
            max_packet_size,
        })
    }
}

/// Telemetry frame consumed by the visualization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationFrame {
    pub name: FieldValue,
    pub stage: FieldValue,
    pub x: f64,
    pub y: f64,
    /// Heading, sign flipped for screen coordinates
    pub angle: f64,
    pub velocity: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub acceleration: f64,
    pub altitude: f64,
}

impl VisualizationFrame {
    /// Project a sample; `None` when any column is missing
    pub fn project(sample: &Sample) -> Option<Self> {
        Some(Self {
            name: sample.get("name")?.clone(),
            stage: sample.get("stage")?.clone(),
            x: sample.number("X")?,
            y: sample.number("Y")?,
            angle: -sample.number("angle")?,
            velocity: sample.number("velocity")?,
            velocity_x: sample.number("velocity_x")?,
            velocity_y: sample.number("velocity_y")?,
            acceleration: sample.number("acceleration")?,
            altitude: sample.number("altitude")?,
        })
    }
}

/// Sink that sends records over UDP
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
    skipped: u64,
}

impl NetworkSink {
    #[instrument(name = "network_sink_new", skip(name, config), fields(target = %config.addr))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(&config.addr).await?;

        debug!(sink = %name, "NetworkSink connected");

        Ok(Self {
            name,
            config,
            socket: Some(socket),
            skipped: 0,
        })
    }

    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation(format!("sinks.{name}.params"), e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::SinkConnection {
                sink_name: name,
                message: e.to_string(),
            })
    }

    /// Records the visualization format could not project
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Encode a record; `Ok(None)` means nothing to send
    fn encode(&self, record: &SinkRecord) -> Result<Option<Vec<u8>>, ContractError> {
        let encoded = match self.config.format {
            NetworkFormat::Json => serde_json::to_vec(record),
            NetworkFormat::Visualization => match VisualizationFrame::project(&record.sample) {
                Some(frame) => serde_json::to_vec(&frame),
                None => return Ok(None),
            },
        };
        let data = encoded.map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;

        if data.len() > self.config.max_packet_size {
            warn!(
                sink = %self.name,
                size = data.len(),
                max = self.config.max_packet_size,
                "Datagram exceeds max packet size"
            );
        }
        Ok(Some(data))
    }

    fn socket(&self) -> Result<&UdpSocket, ContractError> {
        self.socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_closed(&self.name))
    }
}

impl DataSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_write",
        skip(self, record),
        fields(sink = %self.name, key = %record.key)
    )]
    async fn write(&mut self, record: &SinkRecord) -> Result<(), ContractError> {
        let Some(data) = self.encode(record)? else {
            self.skipped += 1;
            debug!(time_ms = record.sample.time, "record lacks visualization columns, skipped");
            return Ok(());
        };

        // best-effort: a failed send is logged, not returned
        match self.socket()?.send(&data).await {
            Ok(sent) => debug!(bytes = sent, "Sent"),
            Err(e) => error!(error = %e, "UDP send failed"),
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.socket = None;
        debug!(sink = %self.name, skipped = self.skipped, "NetworkSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn full_sample() -> Sample {
        Sample::new(1000.0)
            .with_text("name", "CRS-16")
            .with_number("stage", 1.0)
            .with_number("X", 12.0)
            .with_number("Y", 3.0)
            .with_number("angle", 45.0)
            .with_number("velocity", 100.0)
            .with_number("velocity_x", 70.0)
            .with_number("velocity_y", 70.0)
            .with_number("acceleration", 9.8)
            .with_number("altitude", 1.5)
    }

    #[test]
    fn test_config_parsing() {
        let params = HashMap::from([
            ("addr".to_string(), "127.0.0.1:9999".to_string()),
            ("format".to_string(), "visualization".to_string()),
        ]);
        let config = NetworkSinkConfig::from_params(&params).unwrap();
        assert_eq!(config.addr.port(), 9999);
        assert_eq!(config.format, NetworkFormat::Visualization);

        let bad = HashMap::from([
            ("addr".to_string(), "127.0.0.1:9999".to_string()),
            ("format".to_string(), "msgpack".to_string()),
        ]);
        assert!(NetworkSinkConfig::from_params(&bad).is_err());
        assert!(NetworkSinkConfig::from_params(&HashMap::new()).is_err());
    }

    #[test]
    fn test_visualization_projection() {
        let frame = VisualizationFrame::project(&full_sample()).unwrap();
        assert_eq!(frame.angle, -45.0);
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "name": "CRS-16", "stage": 1.0, "x": 12.0, "y": 3.0, "angle": -45.0,
                "velocity": 100.0, "velocity_x": 70.0, "velocity_y": 70.0,
                "acceleration": 9.8, "altitude": 1.5
            })
        );

        let mut partial = full_sample();
        partial.fields.remove("X");
        assert!(VisualizationFrame::project(&partial).is_none());
    }

    #[tokio::test]
    async fn test_datagrams_reach_receiver() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = NetworkSinkConfig {
            addr: receiver.local_addr().unwrap(),
            format: NetworkFormat::Visualization,
            max_packet_size: 65000,
        };
        let mut sink = NetworkSink::new("viz", config).await.unwrap();

        sink.write(&SinkRecord::new("k".into(), Sample::new(0.0)))
            .await
            .unwrap();
        sink.write(&SinkRecord::new("k".into(), full_sample()))
            .await
            .unwrap();
        assert_eq!(sink.skipped(), 1);

        let mut buf = [0u8; 2048];
        let n = receiver.recv(&mut buf).await.unwrap();
        let frame: Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(frame["x"], json!(12.0));
        assert_eq!(frame["angle"], json!(-45.0));
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let config = NetworkSinkConfig {
            addr: "127.0.0.1:19998".parse().unwrap(),
            format: NetworkFormat::Json,
            max_packet_size: 65000,
        };
        let mut sink = NetworkSink::new("net", config).await.unwrap();
        sink.close().await.unwrap();
        let err = sink
            .write(&SinkRecord::new("k".into(), Sample::new(0.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::SinkClosed { .. }));
    }
}
