use crate::error::Result;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Why a session stopped producing frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    EndOfStream,
    Stopped,
    /// Too many consecutive frames could not be decoded
    DecodeFailures,
    Failed(String),
}

/// Summary of a finished counting session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub blobs_observed: u64,
    pub final_count: u64,
    pub end_reason: EndReason,
}

impl SessionReport {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

/// Running tallies for the active session
#[derive(Debug, Clone)]
pub(crate) struct SessionStats {
    pub session_id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub blobs_observed: u64,
}

impl SessionStats {
    pub fn new(source: String) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            source,
            started_at: Utc::now(),
            frames_processed: 0,
            frames_skipped: 0,
            blobs_observed: 0,
        }
    }

    pub fn into_report(self, final_count: u64, end_reason: EndReason) -> SessionReport {
        SessionReport {
            session_id: self.session_id,
            source: self.source,
            started_at: self.started_at,
            finished_at: Utc::now(),
            frames_processed: self.frames_processed,
            frames_skipped: self.frames_skipped,
            blobs_observed: self.blobs_observed,
            final_count,
            end_reason,
        }
    }
}
