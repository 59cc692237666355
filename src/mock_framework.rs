//! # Mock Framework
//!
//! Utilities for testing store callers in isolation.
//!
//! Use [`create_mock_store`] to get a store client and a receiver.
//! Then use helpers like [`expect_get`] or [`expect_update`] to assert on each
//! request and script the store's answer, including failures and silences that
//! a real store only produces under load.

use tokio::sync::mpsc;

use crate::store::{Document, StoreClient, StoreRequest, StoreResponse, StoredDocument};

/// Creates a store client whose requests arrive on the returned receiver.
pub fn create_mock_store(buffer_size: usize) -> (StoreClient, mpsc::Receiver<StoreRequest>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (StoreClient::new(sender), receiver)
}

/// Helper to verify that the next message is an Insert request
pub async fn expect_insert(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(Document, StoreResponse<String>)> {
    match receiver.recv().await {
        Some(StoreRequest::Insert {
            data, respond_to, ..
        }) => Some((data, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Get request
pub async fn expect_get(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(String, StoreResponse<Option<StoredDocument>>)> {
    match receiver.recv().await {
        Some(StoreRequest::Get { id, respond_to, .. }) => Some((id, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is an Update request
pub async fn expect_update(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(String, Document, Option<u64>, StoreResponse<u64>)> {
    match receiver.recv().await {
        Some(StoreRequest::Update {
            id,
            fields,
            expected_version,
            respond_to,
            ..
        }) => Some((id, fields, expected_version, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a ListAll request
pub async fn expect_list_all(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<StoreResponse<Vec<StoredDocument>>> {
    match receiver.recv().await {
        Some(StoreRequest::ListAll { respond_to, .. }) => Some(respond_to),
        _ => None,
    }
}

/// Helper to verify that the next message is a BatchDelete request
pub async fn expect_batch_delete(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(Vec<String>, StoreResponse<usize>)> {
    match receiver.recv().await {
        Some(StoreRequest::BatchDelete { ids, respond_to, .. }) => Some((ids, respond_to)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentStore;

    #[tokio::test]
    async fn test_mock_store() {
        let (client, mut receiver) = create_mock_store(10);

        let insert_task = tokio::spawn(async move {
            let mut data = Document::new();
            data.insert("name".into(), "Test".into());
            client.insert("products", data).await
        });

        let (data, responder) = expect_insert(&mut receiver).await.expect("Expected Insert request");
        assert_eq!(data["name"], "Test");
        responder.send(Ok("doc_1".to_string())).unwrap();

        let result = insert_task.await.unwrap();
        assert_eq!(result, Ok("doc_1".to_string()));
    }
}
