//! PGMQ adapter tests. Skipped unless `DATABASE_URL` points at a PostgreSQL
//! instance with the pgmq extension installed.
#![cfg(feature = "postgres")]

use std::time::Duration;

use s3_event_ingest::messaging::providers::PgmqQueueClient;
use s3_event_ingest::messaging::QueueClient;
use sqlx::PgPool;
use uuid::Uuid;

async fn client() -> Option<(PgmqQueueClient, PgPool)> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let queue_name = format!("ingest_test_{}", Uuid::new_v4().simple());

    let client =
        PgmqQueueClient::new_with_pool(pool.clone(), queue_name, Duration::from_secs(30)).await;
    client.ensure_queue().await.ok()?;
    Some((client, pool))
}

async fn send(pool: &PgPool, queue_name: &str, body: serde_json::Value) {
    sqlx::query("SELECT pgmq.send($1::text, $2::jsonb)")
        .bind(queue_name)
        .bind(body)
        .execute(pool)
        .await
        .expect("send");
}

#[tokio::test]
async fn test_receive_reports_attributes_and_leases() {
    let Some((client, pool)) = client().await else {
        return;
    };
    send(&pool, client.queue_name(), serde_json::json!({"Records": []})).await;

    let messages = client.receive(10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].receive_count(), 1);
    assert!(messages[0].sent_timestamp().is_some());
    assert_eq!(messages[0].body, r#"{"Records":[]}"#);

    // Leased
    assert!(client.receive(10).await.unwrap().is_empty());

    client
        .extend_visibility(&messages[0], Duration::from_secs(60))
        .await
        .unwrap();
    client.delete(&messages[0]).await.unwrap();
}

#[tokio::test]
async fn test_operations_on_deleted_message_report_invalid_handle() {
    let Some((client, pool)) = client().await else {
        return;
    };
    send(&pool, client.queue_name(), serde_json::json!({"Records": []})).await;

    let message = client.receive(1).await.unwrap().remove(0);
    client.delete(&message).await.unwrap();

    let err = client.delete(&message).await.unwrap_err();
    assert!(err.is_invalid_receipt_handle());

    let err = client
        .extend_visibility(&message, Duration::from_secs(30))
        .await
        .unwrap_err();
    assert!(err.is_invalid_receipt_handle());
}
