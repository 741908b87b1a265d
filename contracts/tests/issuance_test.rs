//! Integration tests for the issuance pipeline.
//!
//! These tests run the orchestrator end to end over an in-memory content
//! store: seal, publish, record, fetch, open. They also cover what happens
//! when each stage fails.

use std::sync::Arc;
use std::time::Duration;

use credvault_contracts::{
    CredentialRegistry, IssuanceError, Orchestrator, RegistryError, RetryPolicy, SharedRegistry,
};
use credvault_protocol::crypto::keys::EncryptionKeypair;
use credvault_protocol::crypto::sealed::{self, EncryptedRecord, SealedError};
use credvault_protocol::crypto::SigningKeypair;
use credvault_protocol::identity::Address;
use credvault_protocol::storage::{ContentHash, ContentStore, MemoryStore, StoreError};
use serde_json::json;

const DOCUMENT: &[u8] = br#"{"id":"did:x:1"}"#;

struct Fixture {
    store: MemoryStore,
    orchestrator: Orchestrator,
    issuer: Address,
    holder: Address,
    holder_keys: EncryptionKeypair,
    type_id: u64,
}

fn participant(seed: u8) -> Address {
    Address::from_public_key(&SigningKeypair::from_seed(&[seed; 32]).public_key())
}

/// Helper: owner, one issuer with one credential type, one holder.
fn fixture() -> Fixture {
    let owner = participant(1);
    let issuer = participant(2);
    let holder = participant(3);

    let registry = SharedRegistry::new(CredentialRegistry::new(owner));
    registry.add_issuer(&owner, issuer).unwrap();
    let type_id = registry.add_credential_type(&issuer, "VaccineABC").unwrap();

    let store = MemoryStore::new();
    let orchestrator = Orchestrator::new(Arc::new(store.clone()), registry).with_retry_policy(
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        },
    );

    Fixture {
        store,
        orchestrator,
        issuer,
        holder,
        holder_keys: EncryptionKeypair::generate(),
        type_id,
    }
}

#[tokio::test]
async fn issue_then_retrieve_returns_original_document() {
    let f = fixture();
    let id = f
        .orchestrator
        .issue(&f.issuer, f.type_id, f.holder, &f.holder_keys.public_key(), DOCUMENT)
        .await
        .unwrap();

    let plaintext = f.orchestrator.retrieve(id, &f.holder_keys).await.unwrap();
    assert_eq!(plaintext, DOCUMENT);

    let registry = f.orchestrator.registry();
    assert_eq!(registry.get_credentials_by_holder_count(&f.holder), 1);
    assert_eq!(registry.get_credential_by_holder(&f.holder, 0).unwrap().id, id);
}

#[tokio::test]
async fn ledger_references_exactly_the_published_record() {
    let f = fixture();
    let id = f
        .orchestrator
        .issue(&f.issuer, f.type_id, f.holder, &f.holder_keys.public_key(), DOCUMENT)
        .await
        .unwrap();

    let hash = f.orchestrator.registry().get_credential(id).unwrap().content_hash;
    let stored = f.store.fetch(&hash).await.unwrap();
    assert_eq!(ContentHash::of(&stored), hash);

    // What's stored is a sealed record, not the document.
    assert!(!stored.windows(DOCUMENT.len()).any(|w| w == DOCUMENT));
    let record = EncryptedRecord::from_bytes(&stored).unwrap();
    assert_eq!(sealed::decrypt(&f.holder_keys, &record).unwrap(), DOCUMENT);
}

#[tokio::test]
async fn wrong_private_key_fails_at_decryption() {
    let f = fixture();
    let id = f
        .orchestrator
        .issue(&f.issuer, f.type_id, f.holder, &f.holder_keys.public_key(), DOCUMENT)
        .await
        .unwrap();

    let stranger = EncryptionKeypair::generate();
    let err = f.orchestrator.retrieve(id, &stranger).await.unwrap_err();
    assert!(matches!(
        err,
        IssuanceError::Decryption(SealedError::DecryptionFailed)
    ));
}

#[tokio::test]
async fn json_documents_roundtrip() {
    let f = fixture();
    let doc = json!({ "id": "did:x:1", "vaccine": "ABC", "doses": 2 });
    let id = f
        .orchestrator
        .issue_json(&f.issuer, f.type_id, f.holder, &f.holder_keys.public_key(), &doc)
        .await
        .unwrap();
    assert_eq!(f.orchestrator.retrieve_json(id, &f.holder_keys).await.unwrap(), doc);
}

#[tokio::test]
async fn transient_store_failures_are_retried() {
    let f = fixture();
    f.store.fail_next(3);
    let id = f
        .orchestrator
        .issue(&f.issuer, f.type_id, f.holder, &f.holder_keys.public_key(), DOCUMENT)
        .await
        .unwrap();

    f.store.fail_next(2);
    assert_eq!(f.orchestrator.retrieve(id, &f.holder_keys).await.unwrap(), DOCUMENT);
}

#[tokio::test]
async fn publish_failure_past_retry_bound_leaves_ledger_untouched() {
    let f = fixture();
    f.store.fail_next(4);

    let err = f
        .orchestrator
        .issue(&f.issuer, f.type_id, f.holder, &f.holder_keys.public_key(), DOCUMENT)
        .await
        .unwrap_err();
    assert!(matches!(err, IssuanceError::Store(StoreError::StoreUnavailable(_))));

    let registry = f.orchestrator.registry();
    assert_eq!(registry.read().credential_count(), 0);
    assert_eq!(registry.get_credentials_by_holder_count(&f.holder), 0);
    assert!(f.store.is_empty());
}

#[tokio::test]
async fn unauthorized_issuer_publishes_nothing() {
    let f = fixture();
    let outsider = participant(66);

    let err = f
        .orchestrator
        .issue(&outsider, f.type_id, f.holder, &f.holder_keys.public_key(), DOCUMENT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IssuanceError::Registry(RegistryError::PermissionDenied { .. })
    ));
    assert!(f.store.is_empty());
}

#[tokio::test]
async fn retrieving_unknown_credential_is_a_registry_error() {
    let f = fixture();
    let err = f.orchestrator.retrieve(9, &f.holder_keys).await.unwrap_err();
    assert!(matches!(
        err,
        IssuanceError::Registry(RegistryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn tampered_blob_is_caught_by_the_store() {
    let f = fixture();
    let id = f
        .orchestrator
        .issue(&f.issuer, f.type_id, f.holder, &f.holder_keys.public_key(), DOCUMENT)
        .await
        .unwrap();
    let hash = f.orchestrator.registry().get_credential(id).unwrap().content_hash;
    f.store.corrupt(&hash, b"{}".to_vec());

    let err = f.orchestrator.retrieve(id, &f.holder_keys).await.unwrap_err();
    assert!(matches!(err, IssuanceError::Store(StoreError::Corrupted { .. })));
}

#[tokio::test]
async fn non_record_blob_fails_at_record_stage() {
    let f = fixture();
    let registry = f.orchestrator.registry();
    let hash = f.store.publish(b"not a sealed record").await.unwrap();
    let id = registry
        .issue_credential(&f.issuer, f.type_id, f.holder, hash)
        .unwrap();

    let err = f.orchestrator.retrieve(id, &f.holder_keys).await.unwrap_err();
    assert!(matches!(
        err,
        IssuanceError::Record(SealedError::MalformedRecord(_))
    ));
}

#[tokio::test]
async fn concurrent_issuance_allocates_distinct_ids() {
    let f = fixture();
    let pk = f.holder_keys.public_key();

    let futures = (0..16u8).map(|n| {
        let orchestrator = f.orchestrator.clone();
        let issuer = f.issuer;
        let holder = f.holder;
        let type_id = f.type_id;
        async move {
            orchestrator
                .issue(&issuer, type_id, holder, &pk, &[b'{', n, b'}'])
                .await
        }
    });
    let mut ids: Vec<u64> = futures::future::join_all(futures)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..16).collect::<Vec<u64>>());

    for id in ids {
        let doc = f.orchestrator.retrieve(id, &f.holder_keys).await.unwrap();
        assert_eq!(doc.len(), 3);
    }
}
