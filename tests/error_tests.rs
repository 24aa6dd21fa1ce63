mod common;

use common::{start_broker, TestClient};
use serde_json::json;

#[tokio::test]
async fn malformed_record_does_not_close_the_connection() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _shutdown) = start_broker(dir.path()).await;
    let mut client = TestClient::connect(addr).await;

    client.send_raw("this is not a json record").await;
    let reply = client.recv().await;
    assert_eq!(reply["status"], "error");
    assert!(reply["message"]
        .as_str()
        .unwrap()
        .contains("malformed request"));

    // the same connection keeps working
    let reply = client.request(&json!({"command": "list-topics"})).await;
    assert_eq!(reply["status"], "success");
}

#[tokio::test]
async fn unknown_command_is_malformed_input() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _shutdown) = start_broker(dir.path()).await;
    let mut client = TestClient::connect(addr).await;

    let reply = client
        .request(&json!({"command": "drop-topic", "topic": "orders"}))
        .await;
    assert_eq!(reply["status"], "error");
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _shutdown) = start_broker(dir.path()).await;
    let mut client = TestClient::connect(addr).await;

    let reply = client
        .request(&json!({"command": "create-topic", "topic": "orders"}))
        .await;
    assert_eq!(reply["status"], "success");

    let reply = client
        .request(&json!({"command": "create-topic", "topic": "orders"}))
        .await;
    assert_eq!(reply["status"], "error");
    assert!(reply["message"].as_str().unwrap().contains("already exists"));

    // exactly one topic committed
    let reply = client.request(&json!({"command": "list-topics"})).await;
    assert_eq!(reply["topics"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_with_zero_partitions_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _shutdown) = start_broker(dir.path()).await;
    let mut client = TestClient::connect(addr).await;

    let reply = client
        .request(&json!({"command": "create-topic", "topic": "orders", "partitions": 0}))
        .await;
    assert_eq!(reply["status"], "error");
    assert!(reply["message"].as_str().unwrap().contains("positive"));

    let reply = client.request(&json!({"command": "list-topics"})).await;
    assert!(reply["topics"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn resize_is_validated_against_current_state() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _shutdown) = start_broker(dir.path()).await;
    let mut client = TestClient::connect(addr).await;

    let reply = client
        .request(&json!({
            "command": "resize-partitions",
            "topic": "ghost",
            "newPartitionCount": 4
        }))
        .await;
    assert_eq!(reply["status"], "error");
    assert!(reply["message"].as_str().unwrap().contains("unknown topic"));

    client
        .request(&json!({"command": "create-topic", "topic": "orders", "partitions": 3}))
        .await;

    for non_increasing in [2, 3] {
        let reply = client
            .request(&json!({
                "command": "resize-partitions",
                "topic": "orders",
                "newPartitionCount": non_increasing
            }))
            .await;
        assert_eq!(reply["status"], "error");
        assert!(reply["message"]
            .as_str()
            .unwrap()
            .contains("must be greater than current"));
    }

    // a failed resize is never partially applied
    let reply = client.request(&json!({"command": "list-topics"})).await;
    assert_eq!(reply["topics"][0]["partitions"], 3);
}

#[tokio::test]
async fn produce_to_unknown_topic_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _shutdown) = start_broker(dir.path()).await;
    let mut client = TestClient::connect(addr).await;

    let reply = client
        .request(&json!({"command": "produce", "topic": "missing", "value": "v"}))
        .await;
    assert_eq!(reply["status"], "error");
    assert!(reply["message"]
        .as_str()
        .unwrap()
        .contains("unknown topic 'missing'"));
}

#[tokio::test]
async fn produce_to_out_of_range_partition_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _shutdown) = start_broker(dir.path()).await;
    let mut client = TestClient::connect(addr).await;

    client
        .request(&json!({"command": "create-topic", "topic": "orders", "partitions": 2}))
        .await;

    let reply = client
        .request(&json!({
            "command": "produce",
            "topic": "orders",
            "partition": 9,
            "value": "v"
        }))
        .await;
    assert_eq!(reply["status"], "error");
    assert!(reply["message"].as_str().unwrap().contains("out of range"));
}

#[tokio::test]
async fn produce_without_value_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _shutdown) = start_broker(dir.path()).await;
    let mut client = TestClient::connect(addr).await;

    client
        .request(&json!({"command": "create-topic", "topic": "orders"}))
        .await;

    let reply = client
        .request(&json!({"command": "produce", "topic": "orders"}))
        .await;
    assert_eq!(reply["status"], "error");
    assert!(reply["message"]
        .as_str()
        .unwrap()
        .contains("malformed request"));
}
