use std::future::Future;

use futures::{Stream, StreamExt};
use relay_core::ApplicationError;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::ApiError;
use crate::people::Person;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub successes: usize,
    pub failures: usize,
    /// Recipients with no address to deliver to.
    pub skipped: usize,
    /// Ids of people who were reached, in listing order.
    pub delivered: Vec<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FanoutError {
    #[error("delivered to {successes} recipient(s), failed for {failures}")]
    PartialFailure { successes: usize, failures: usize, delivered: Vec<String> },
    #[error("delivery failed for all {failures} recipient(s)")]
    AllFailed { failures: usize },
    #[error("recipient listing failed after {successes} deliveries: {source}")]
    Listing {
        successes: usize,
        failures: usize,
        delivered: Vec<String>,
        #[source]
        source: ApiError,
    },
}

impl FanoutError {
    /// Ids of people reached before the error.
    pub fn delivered(&self) -> &[String] {
        match self {
            Self::PartialFailure { delivered, .. } | Self::Listing { delivered, .. } => delivered,
            Self::AllFailed { .. } => &[],
        }
    }
}

impl From<FanoutError> for ApplicationError {
    fn from(error: FanoutError) -> Self {
        match error {
            FanoutError::PartialFailure { successes, failures, .. } => {
                Self::PartialFailure { successes, failures }
            }
            FanoutError::AllFailed { failures } => Self::PartialFailure { successes: 0, failures },
            FanoutError::Listing { successes: 0, failures: 0, source, .. } => source.into(),
            FanoutError::Listing { successes, failures, source, .. } => {
                let reason = match ApplicationError::from(source) {
                    Self::Upstream { status, .. } if status != 0 => format!("status {status}"),
                    Self::Auth(_) => "credentials rejected".to_owned(),
                    _ => "platform unreachable".to_owned(),
                };
                Self::ListingInterrupted { successes, failures, reason }
            }
        }
    }
}

impl FanoutReport {
    fn finish(self) -> Result<Self, FanoutError> {
        match (self.successes, self.failures) {
            (_, 0) => Ok(self),
            (0, failures) => Err(FanoutError::AllFailed { failures }),
            (successes, failures) => {
                Err(FanoutError::PartialFailure { successes, failures, delivered: self.delivered })
            }
        }
    }
}

enum Attempt {
    Delivered(String),
    Failed(String, ApiError),
    Skipped,
    Listing(ApiError),
}

/// Sends to every person the listing yields, at most `concurrency` at a time.
/// One recipient failing never stops the others; a listing failure stops the
/// walk but keeps the counts of what was already attempted.
pub async fn fan_out<S, F, Fut>(
    recipients: S,
    concurrency: usize,
    send: F,
) -> Result<FanoutReport, FanoutError>
where
    S: Stream<Item = Result<Person, ApiError>>,
    F: Fn(Person) -> Fut,
    Fut: Future<Output = Result<(), ApiError>>,
{
    let attempts = recipients
        .map(|recipient| {
            let pending = match recipient {
                Ok(person) if person.primary_email().is_none() => Err(None),
                Ok(person) => {
                    let person_id = person.id.clone();
                    Ok((person_id, send(person)))
                }
                Err(error) => Err(Some(error)),
            };
            async move {
                match pending {
                    Ok((person_id, delivery)) => match delivery.await {
                        Ok(()) => Attempt::Delivered(person_id),
                        Err(error) => Attempt::Failed(person_id, error),
                    },
                    Err(None) => Attempt::Skipped,
                    Err(Some(error)) => Attempt::Listing(error),
                }
            }
        })
        .buffered(concurrency.max(1));
    let mut attempts = std::pin::pin!(attempts);

    let mut report = FanoutReport::default();
    while let Some(attempt) = attempts.next().await {
        match attempt {
            Attempt::Delivered(person_id) => {
                report.successes += 1;
                report.delivered.push(person_id);
            }
            Attempt::Failed(person_id, error) => {
                report.failures += 1;
                warn!(
                    event_name = "webex.fanout.delivery_failed",
                    recipient_id = %person_id,
                    error = %error,
                    "delivery to recipient failed"
                );
            }
            Attempt::Skipped => report.skipped += 1,
            Attempt::Listing(source) => {
                warn!(
                    event_name = "webex.fanout.listing_failed",
                    successes = report.successes,
                    failures = report.failures,
                    error = %source,
                    "recipient listing failed"
                );
                return Err(FanoutError::Listing {
                    successes: report.successes,
                    failures: report.failures,
                    delivered: report.delivered,
                    source,
                });
            }
        }
    }

    info!(
        event_name = "webex.fanout.completed",
        successes = report.successes,
        failures = report.failures,
        skipped = report.skipped,
        "fan-out completed"
    );
    report.finish()
}
