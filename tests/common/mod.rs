//! Shared test doubles for integration tests
#![allow(dead_code)]

pub mod mocks;

pub use mocks::*;

use serde_json::json;

/// Notification document with one object-created record per key
pub fn notification_body(bucket: &str, keys: &[&str]) -> String {
    let records: Vec<_> = keys
        .iter()
        .map(|key| {
            json!({
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "awsRegion": "us-east-1",
                "s3": {
                    "bucket": {"name": bucket, "arn": format!("arn:aws:s3:::{bucket}")},
                    "object": {"key": key, "lastModified": "2024-01-01T00:00:00Z"}
                }
            })
        })
        .collect();

    json!({ "Records": records }).to_string()
}

/// Wrap a notification document in a pub/sub envelope
pub fn envelope(inner: &str) -> String {
    json!({
        "Type": "Notification",
        "TopicArn": "arn:aws:sns:us-east-1:123456789012:object-events",
        "Message": inner,
    })
    .to_string()
}
