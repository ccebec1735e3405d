//! Runs against a real Kafka broker. Set TEST_KAFKA_BROKERS and run with
//! `--ignored`, e.g. `TEST_KAFKA_BROKERS=localhost:29092`. The broker must
//! allow topic auto-creation with one partition per topic (the default).

use std::time::{Duration, Instant};

use order_pipeline::domain::order::generate_random_order;
use order_pipeline::messaging::{
    InboundMessage, KafkaOrderPublisher, KafkaOrderSource, MessageSource, OrderPublisher,
};

fn brokers() -> String {
    std::env::var("TEST_KAFKA_BROKERS").expect("TEST_KAFKA_BROKERS must be set")
}

async fn poll_until(source: &KafkaOrderSource, within: Duration) -> Option<InboundMessage> {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if let Some(message) = source.poll(Duration::from_millis(500)).await.unwrap() {
            return Some(message);
        }
    }
    None
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore]
async fn test_committed_offset_is_on_the_broker_when_commit_returns() {
    let brokers = brokers();
    let topic = format!("orders-test-{}", uuid::Uuid::new_v4());
    let group = format!("orders-test-group-{}", uuid::Uuid::new_v4());

    let publisher = KafkaOrderPublisher::new(&brokers, &topic).unwrap();
    let first = generate_random_order();
    let second = generate_random_order();
    publisher.publish(&first).await.unwrap();
    publisher.publish(&second).await.unwrap();

    let source = KafkaOrderSource::new(&brokers, &group, "earliest", &topic).unwrap();
    source.subscribe().await.unwrap();
    let message = poll_until(&source, Duration::from_secs(30)).await.expect("first message");
    assert_eq!(message.key.as_deref(), Some(first.order_uid.as_bytes()));

    source.commit(&message).await.unwrap();
    source.close().await;
    drop(source);

    // A fresh member of the same group resumes after the committed offset
    let source = KafkaOrderSource::new(&brokers, &group, "earliest", &topic).unwrap();
    source.subscribe().await.unwrap();
    let message = poll_until(&source, Duration::from_secs(30)).await.expect("second message");

    assert_eq!(message.key.as_deref(), Some(second.order_uid.as_bytes()));
    source.close().await;
}
