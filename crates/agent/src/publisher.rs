//! Location publisher.
//!
//! Delivers one location report to the remote share endpoint and classifies
//! the outcome. There is deliberately no internal retry loop: a failed
//! publish is surfaced to the caller, and the next sampling tick implicitly
//! catches up instead of queuing stale reports. Bounded retry with backoff
//! for unreachable endpoints is a known gap.

use std::time::Duration;

use domain::models::{LocationReport, LocationReportAck};
use reqwest::Client;
use tracing::{info, warn};

/// Default ceiling for one request, connect and transfer included.
const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 30;

/// Outcome of a single publish attempt.
#[derive(Debug)]
pub enum PublishOutcome {
    /// The server acknowledged the report.
    Delivered(LocationReportAck),
    /// The server answered but did not accept the report. Not retried.
    Rejected { status: u16, message: String },
    /// The server could not be reached in time. The caller decides whether
    /// the next tick is retry enough.
    Unreachable(String),
}

/// Publishes location reports to the remote share endpoint.
///
/// Publishing mutates nothing; bookkeeping such as the last successful
/// publish timestamp belongs to the caller.
pub struct LocationPublisher {
    client: Client,
    endpoint: String,
}

impl LocationPublisher {
    /// Creates a publisher with a bounded total request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Creates a publisher with the default 30 second timeout.
    pub fn with_default_timeout(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS))
    }

    /// The configured share endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Publish one report.
    pub async fn publish(&self, report: &LocationReport) -> PublishOutcome {
        let response = match self.client.post(&self.endpoint).json(report).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Share endpoint unreachable");
                metrics::counter!("location_publish_total", "outcome" => "unreachable")
                    .increment(1);
                return PublishOutcome::Unreachable(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), message = %message, "Location report rejected");
            metrics::counter!("location_publish_total", "outcome" => "rejected").increment(1);
            return PublishOutcome::Rejected {
                status: status.as_u16(),
                message,
            };
        }

        match response.json::<LocationReportAck>().await {
            Ok(ack) if ack.success => {
                info!(message = %ack.message, "Location report delivered");
                metrics::counter!("location_publish_total", "outcome" => "delivered")
                    .increment(1);
                PublishOutcome::Delivered(ack)
            }
            // the server spoke but refused the report in the body
            Ok(ack) => {
                warn!(message = %ack.message, "Location report not accepted");
                metrics::counter!("location_publish_total", "outcome" => "rejected").increment(1);
                PublishOutcome::Rejected {
                    status: status.as_u16(),
                    message: ack.message,
                }
            }
            Err(e) => {
                warn!(error = %e, "Malformed acknowledgement from share endpoint");
                metrics::counter!("location_publish_total", "outcome" => "rejected").increment(1);
                PublishOutcome::Rejected {
                    status: status.as_u16(),
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::models::LocationSample;

    fn test_report() -> LocationReport {
        LocationReport::from_sample(
            "+15550100123",
            &LocationSample {
                latitude: 37.7749,
                longitude: -122.4194,
                timestamp: Utc::now(),
                accuracy: Some(8.0),
                speed: None,
                bearing: None,
            },
        )
    }

    #[test]
    fn test_default_timeout_constant() {
        assert_eq!(DEFAULT_PUBLISH_TIMEOUT_SECS, 30);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        // nothing listens on port 1
        let publisher = LocationPublisher::new("http://127.0.0.1:1/api/location/share",
            Duration::from_millis(500));

        let outcome = publisher.publish(&test_report()).await;
        assert!(matches!(outcome, PublishOutcome::Unreachable(_)));
    }

    #[test]
    fn test_endpoint_accessor() {
        let publisher = LocationPublisher::with_default_timeout("https://example.com/share");
        assert_eq!(publisher.endpoint(), "https://example.com/share");
    }
}
