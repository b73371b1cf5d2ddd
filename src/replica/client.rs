//! HTTP client for a master node's replication endpoints

use crate::cluster::base_url;
use crate::common::{Error, Result};
use crate::replica::protocol::{NextEntry, RetireParams};
use reqwest::StatusCode;
use std::time::Duration;

pub struct MasterClient {
    client: reqwest::Client,
    master: String,
    base: String,
}

impl MasterClient {
    pub fn new(master: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            master: master.to_string(),
            base: base_url(master),
        })
    }

    pub fn master(&self) -> &str {
        &self.master
    }

    /// Ask the master for its lowest pending entry. `None` when the queue
    /// is empty.
    pub async fn fetch_next(&self) -> Result<Option<NextEntry>> {
        let body = self
            .client
            .get(format!("{}/next", self.base))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let entry: NextEntry = serde_json::from_slice(&body)?;
        if entry.is_empty() {
            Ok(None)
        } else {
            Ok(Some(entry))
        }
    }

    /// Tell the master the entry was applied.
    ///
    /// Returns `Ok(false)` when the master kept the entry because its queued
    /// value changed since the fetch. Any other refusal is an error.
    pub async fn retire(&self, entry: &NextEntry) -> Result<bool> {
        let params = RetireParams {
            key: entry.key.clone(),
            value: entry.value.clone(),
        };
        let response = self
            .client
            .get(format!("{}/del-rep", self.base))
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(true);
        }

        let reason = response.text().await.unwrap_or_default();
        if is_value_mismatch(status, &reason) {
            return Ok(false);
        }

        Err(Error::Internal(format!(
            "retiring {:?} on {}: want status {} got {}: {}",
            entry.key,
            self.master,
            StatusCode::NO_CONTENT.as_u16(),
            status.as_u16(),
            reason.trim()
        )))
    }
}

/// The master answers a stale retire with 500 and the mismatch message.
fn is_value_mismatch(status: StatusCode, body: &str) -> bool {
    status == Error::ValueMismatch.to_http_status()
        && body.trim() == Error::ValueMismatch.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_value_mismatch() {
        let mismatch = Error::ValueMismatch.to_string();
        assert!(is_value_mismatch(StatusCode::INTERNAL_SERVER_ERROR, &mismatch));
        assert!(!is_value_mismatch(
            StatusCode::INTERNAL_SERVER_ERROR,
            &Error::ReadOnly.to_string()
        ));
        assert!(!is_value_mismatch(StatusCode::NOT_FOUND, &mismatch));
    }
}
