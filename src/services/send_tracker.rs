use std::fs::OpenOptions;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One line of the durable send-log.
#[derive(Debug, Serialize, Deserialize)]
pub struct SendLogEntry {
    pub email: String,
    pub company: String,
    pub sent_at: String,
}

/// Durable log of every address already contacted, backed by a flat CSV file
/// so it survives across runs.
pub struct SendTracker {
    log_path: PathBuf,
}

impl SendTracker {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        SendTracker {
            log_path: log_path.into(),
        }
    }

    /// True when the address, or any address at the same company, already got
    /// an e-mail. Unreadable logs degrade to "not sent" so a corrupt file
    /// never blocks a run.
    pub fn has_been_sent(&self, email: &str, company: &str) -> bool {
        if !self.log_path.exists() {
            if let Err(e) = self.create_with_header() {
                log::error!("Failed to create the send-log: {}", e);
            }
            return false;
        }

        let mut reader = match csv::Reader::from_path(&self.log_path) {
            Ok(reader) => reader,
            Err(e) => {
                log::error!("Failed to read the send-log: {}", e);
                return false;
            }
        };

        let email_lower = email.to_lowercase();
        let company_lower = company.to_lowercase();

        for entry in reader.deserialize::<SendLogEntry>() {
            match entry {
                Ok(entry) => {
                    if entry.email.to_lowercase() == email_lower
                        || entry.company.to_lowercase() == company_lower
                    {
                        return true;
                    }
                }
                Err(e) => {
                    log::error!("Skipping unreadable send-log line: {}", e);
                }
            }
        }

        false
    }

    /// Appends a send record with the current local timestamp. Returns false
    /// instead of failing the run when the log cannot be written.
    pub fn record_sent(&self, email: &str, company: &str) -> bool {
        let file_exists = self.log_path.exists();

        let file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
        {
            Ok(file) => file,
            Err(e) => {
                log::error!("Failed to open the send-log for appending: {}", e);
                return false;
            }
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);

        let entry = SendLogEntry {
            email: email.to_string(),
            company: company.to_string(),
            sent_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };

        if let Err(e) = writer.serialize(&entry) {
            log::error!("Failed to append to the send-log: {}", e);
            return false;
        }
        if let Err(e) = writer.flush() {
            log::error!("Failed to flush the send-log: {}", e);
            return false;
        }

        log::info!("Tracked: e-mail to {} ({}) recorded", company, email);
        true
    }

    fn create_with_header(&self) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(&self.log_path)?;
        writer.write_record(["email", "company", "sent_at"])?;
        writer.flush()?;
        Ok(())
    }
}
