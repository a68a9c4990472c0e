use std::fs::File;
use std::io::{BufWriter, Write};

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::adapter::HmacSha256Verifier;
use crate::service::CapturedDelivery;

/// Generate a mock capture file of signed gateway deliveries. This is used
/// to exercise the full ingest path from the CLI.
///
/// The mix deliberately includes redeliveries (exact duplicates of earlier
/// events), refunds that may arrive before their purchase, and payment
/// failures, since that is what a real gateway stream looks like.
pub fn generator(
    output: &str,
    count: usize,
    secret: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let signer = HmacSha256Verifier::new(secret);
    let mut rng = rand::rng();

    let num_users = (count / 10).clamp(2, 200);
    let mut deliveries: Vec<CapturedDelivery> = Vec::with_capacity(count);
    let mut event_counter = 0u64;

    for _ in 0..count {
        let user = rng.random_range(1..=num_users);
        event_counter += 1;

        let (event_type, credits) = match rng.random_range(0..10) {
            0..=5 => ("payment.succeeded", rng.random_range(5..=50)),
            6 | 7 => ("subscription.renewed", rng.random_range(10..=30)),
            8 => ("payment.refunded", rng.random_range(1..=10)),
            _ => ("payment.failed", 0),
        };

        let payload = serde_json::json!({
            "id": format!("evt_{:06}", event_counter),
            "type": event_type,
            "data": {
                "user_id": format!("user-{}", user),
                "credits": credits,
            },
        });

        let raw = serde_json::to_vec(&payload)?;
        deliveries.push(CapturedDelivery {
            signature: signer.sign(&raw, Utc::now()),
            payload,
        });
    }

    // Redeliver roughly 10% of events a second time.
    let redeliveries: Vec<CapturedDelivery> = deliveries
        .iter()
        .filter(|_| rng.random_range(0..10) == 0)
        .cloned()
        .collect();
    deliveries.extend(redeliveries);
    deliveries.shuffle(&mut rng);

    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    for delivery in &deliveries {
        serde_json::to_writer(&mut writer, delivery)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    Ok(())
}
