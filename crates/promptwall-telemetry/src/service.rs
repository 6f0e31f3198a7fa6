//! File-backed log service
//!
//! Records are handed to a dedicated writer thread over an unbounded channel,
//! so recording never blocks a request on disk IO. Queries read the files
//! directly.

use std::sync::Arc;

use promptwall_core::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::persistence::{LogReader, LogWriter, PersistenceConfig};
use crate::record::{LogQuery, LogRecord, MetricsQuery, MetricsSummary};
use crate::sink::ObservabilitySink;

/// Observability sink persisting to JSON-lines files
pub struct LogService {
    sender: mpsc::UnboundedSender<LogCommand>,
    reader: Arc<LogReader>,
    writer: Option<std::thread::JoinHandle<()>>,
}

/// Commands sent to the background writer
enum LogCommand {
    Record(Box<LogRecord>),

    /// Flush to disk, acknowledging once done
    Flush(oneshot::Sender<()>),

    Shutdown,
}

impl LogService {
    /// Start the service and its writer thread
    pub fn new(config: PersistenceConfig) -> std::io::Result<Self> {
        // Open the writer up front so a bad directory fails start-up.
        let writer = LogWriter::new(config.clone())?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let reader = Arc::new(LogReader::new(config.clone()));

        let handle = std::thread::Builder::new()
            .name("promptwall-log-writer".to_string())
            .spawn(move || run_writer(writer, receiver))?;

        info!(dir = %config.log_dir.display(), "Log service started");
        Ok(Self {
            sender,
            reader,
            writer: Some(handle),
        })
    }

    /// Wait until every record sent so far is on disk
    pub async fn sync(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LogCommand::Flush(tx))
            .map_err(|_| Error::sink("log writer has stopped"))?;
        rx.await.map_err(|_| Error::sink("log writer has stopped"))
    }
}

impl ObservabilitySink for LogService {
    fn append(&self, record: LogRecord) -> Result<()> {
        self.sender
            .send(LogCommand::Record(Box::new(record)))
            .map_err(|_| Error::sink("log writer has stopped"))
    }

    fn query(&self, query: &MetricsQuery) -> Result<MetricsSummary> {
        Ok(self.reader.summarize(query)?)
    }

    fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        Ok(self.reader.query_logs(query)?)
    }
}

impl Drop for LogService {
    /// Drains queued records before returning
    fn drop(&mut self) {
        let _ = self.sender.send(LogCommand::Shutdown);
        if let Some(handle) = self.writer.take() {
            if handle.join().is_err() {
                warn!("Log writer thread panicked");
            }
        }
    }
}

fn run_writer(mut writer: LogWriter, mut receiver: mpsc::UnboundedReceiver<LogCommand>) {
    while let Some(cmd) = receiver.blocking_recv() {
        match cmd {
            LogCommand::Record(record) => match writer.write_record(&record) {
                Ok(()) => metrics::counter!("promptwall_log_records_written_total").increment(1),
                Err(e) => {
                    metrics::counter!("promptwall_log_write_errors_total").increment(1);
                    error!(error = %e, record_id = %record.id, "Failed to write log record");
                }
            },
            LogCommand::Flush(ack) => {
                if let Err(e) = writer.flush() {
                    error!(error = %e, "Failed to flush log writer");
                }
                let _ = ack.send(());
            }
            LogCommand::Shutdown => {
                debug!("Log writer shutting down");
                break;
            }
        }
    }

    if let Err(e) = writer.flush() {
        error!(error = %e, "Failed to flush log writer on shutdown");
    }
}
