use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{GatewayNotification, IngestOutcome, UserId},
    service::{CreditLedger, WebhookProcessor},
};

/// One line of a capture file: a gateway delivery as the transport would
/// hand it over, signature header plus raw JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedDelivery {
    pub signature: String,
    pub payload: serde_json::Value,
}

/// Tally of a capture replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub processed: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub rejected: usize,
}

/// Replays a captured stream of gateway deliveries through the webhook
/// processor and reports what happened to each.
pub struct Orchestrator {
    ledger: CreditLedger,
    processor: WebhookProcessor,
}

impl Orchestrator {
    pub fn new(ledger: CreditLedger, processor: WebhookProcessor) -> Self {
        Self { ledger, processor }
    }

    /// Ingest every delivery in the capture file, in order, reporting
    /// balances as CSV on stdout.
    pub async fn replay(
        &self,
        file_path: &str,
    ) -> Result<ReplaySummary, Box<dyn std::error::Error>> {
        self.replay_into(file_path, std::io::stdout()).await
    }

    /// As `replay`, with the balance report going to `report`.
    pub async fn replay_into<W: std::io::Write>(
        &self,
        file_path: &str,
        report: W,
    ) -> Result<ReplaySummary, Box<dyn std::error::Error>> {
        let file = File::open(file_path)?;
        let reader = BufReader::new(file);

        let mut summary = ReplaySummary::default();
        let mut users: BTreeSet<String> = BTreeSet::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let delivery: CapturedDelivery = match serde_json::from_str(&line) {
                Ok(delivery) => delivery,
                Err(e) => {
                    tracing::error!("skipping malformed capture line {}: {}", line_num + 1, e);
                    summary.rejected += 1;
                    continue;
                }
            };

            let payload = serde_json::to_vec(&delivery.payload)?;

            match self.processor.ingest(&payload, &delivery.signature).await {
                Ok(outcome) => {
                    match outcome {
                        IngestOutcome::Processed => summary.processed += 1,
                        IngestOutcome::Duplicate => summary.duplicates += 1,
                        IngestOutcome::Failed => summary.failed += 1,
                    }
                    // Only accepted deliveries contribute to the report; a
                    // rejected one must not leak its claimed user id.
                    if let Ok(notification) =
                        serde_json::from_slice::<GatewayNotification>(&payload)
                    {
                        if let Ok(data) = notification.credit_data() {
                            users.insert(data.user_id.as_str().to_string());
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("rejected capture line {}: {}", line_num + 1, e);
                    summary.rejected += 1;
                }
            }
        }

        self.output_csv(&users, report).await?;
        Ok(summary)
    }

    /// Balance report for every user credited or debited by the capture,
    /// sorted by user id for deterministic output.
    async fn output_csv<W: std::io::Write>(
        &self,
        users: &BTreeSet<String>,
        out: W,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record(["user", "balance"])?;

        for user in users {
            let user_id = UserId::new(user.clone());
            let balance = self.ledger.balance(&user_id).await?;
            wtr.write_record([user.as_str(), &balance.to_string()])?;
        }

        wtr.flush()?;
        Ok(())
    }
}
