//! LogSink - logs a one-line record summary via tracing

use contracts::{ContractError, DataSink, SinkRecord};
use tracing::{info, instrument};

/// Sink that logs record summaries
pub struct LogSink {
    name: String,
    written: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, record),
        fields(sink = %self.name, key = %record.key)
    )]
    async fn write(&mut self, record: &SinkRecord) -> Result<(), ContractError> {
        let sample = &record.sample;
        info!(
            time_ms = sample.time,
            fields = sample.fields.len(),
            velocity = sample.number("velocity"),
            altitude = sample.number("altitude"),
            x = sample.number("X"),
            y = sample.number("Y"),
            "record"
        );
        self.written += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, written = self.written, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Sample;

    #[tokio::test]
    async fn test_log_sink_counts_records() {
        let mut sink = LogSink::new("my_logger");
        assert_eq!(sink.name(), "my_logger");

        let record = SinkRecord::new("k".into(), Sample::new(1.0).with_number("velocity", 2.0));
        sink.write(&record).await.unwrap();
        sink.write(&record).await.unwrap();
        assert_eq!(sink.written(), 2);
        assert!(sink.close().await.is_ok());
    }
}
