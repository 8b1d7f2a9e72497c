//! Multi-peer downloads through a live tracker and live chunk servers

use std::time::Duration;

use ferry_core::storage::{ChunkName, sha256_hex};
use ferry_core::{FerryError, StorageError, TransferError};

use crate::support::{patterned_bytes, start_peer, start_tracker};

const CHUNK_SIZE: usize = 1024;

#[tokio::test]
async fn test_two_peer_download_is_byte_identical() {
    let tracker = start_tracker(Duration::from_secs(300)).await;
    let seed = start_peer(&tracker, CHUNK_SIZE).await;
    let leech = start_peer(&tracker, CHUNK_SIZE).await;

    let data = patterned_bytes(CHUNK_SIZE * 3 + 512);
    let source = seed.dir.path().join("source.bin");
    std::fs::write(&source, &data).unwrap();

    seed.peer.register().await.unwrap();
    let entries = seed.peer.split_and_advertise(&source).await.unwrap();
    assert_eq!(entries.len(), 4);
    let file_hash = entries[0].name.file_hash().to_string();
    assert_eq!(file_hash, sha256_hex(&data));

    leech.peer.register().await.unwrap();
    let report = leech
        .peer
        .download_file(&file_hash, entries.len() as u32)
        .await
        .unwrap();
    assert_eq!(report.total_bytes(), data.len() as u64);
    assert!(
        report
            .chunks
            .iter()
            .all(|c| c.holder == seed.peer.address())
    );

    let output = leech.dir.path().join("output.bin");
    leech.peer.combine(&file_hash, &output, true).await.unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

#[tokio::test]
async fn test_downloaded_chunks_are_served_onwards() {
    let tracker = start_tracker(Duration::from_secs(300)).await;
    let seed = start_peer(&tracker, CHUNK_SIZE).await;
    let relay = start_peer(&tracker, CHUNK_SIZE).await;
    let late = start_peer(&tracker, CHUNK_SIZE).await;

    let data = patterned_bytes(CHUNK_SIZE * 2 + 10);
    let source = seed.dir.path().join("source.bin");
    std::fs::write(&source, &data).unwrap();
    let entries = seed.peer.split_and_advertise(&source).await.unwrap();
    let file_hash = entries[0].name.file_hash().to_string();
    let parts = entries.len() as u32;

    relay.peer.download_file(&file_hash, parts).await.unwrap();

    // Seed leaves; the relay re-advertised and is now the only holder
    seed.peer.unregister().await.unwrap();
    let report = late.peer.download_file(&file_hash, parts).await.unwrap();
    assert!(
        report
            .chunks
            .iter()
            .all(|c| c.holder == relay.peer.address())
    );

    let output = late.dir.path().join("output.bin");
    late.peer.combine(&file_hash, &output, true).await.unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

#[tokio::test]
async fn test_missing_chunk_on_holder_fails_only_that_index() {
    let tracker = start_tracker(Duration::from_secs(300)).await;
    let seed = start_peer(&tracker, CHUNK_SIZE).await;
    let leech = start_peer(&tracker, CHUNK_SIZE).await;

    let source = seed.dir.path().join("source.bin");
    std::fs::write(&source, patterned_bytes(CHUNK_SIZE * 4)).unwrap();
    let entries = seed.peer.split_and_advertise(&source).await.unwrap();
    let file_hash = entries[0].name.file_hash().to_string();

    // Still advertised, gone from disk: the holder answers 404
    std::fs::remove_file(seed.peer.store().chunk_path(&entries[2].name)).unwrap();

    let error = leech.peer.download_file(&file_hash, 4).await.unwrap_err();
    let FerryError::Transfer(TransferError::Incomplete { failures }) = &error else {
        panic!("Expected incomplete download, got {error:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 2);
    assert!(matches!(
        failures[0].error,
        TransferError::ChunkNotFound { .. }
    ));

    for index in [0, 1, 3] {
        let name = ChunkName::new(file_hash.as_str(), index).unwrap();
        assert!(leech.peer.store().has_chunk(&name).await);
    }

    let output = leech.dir.path().join("output.bin");
    let result = leech.peer.combine(&file_hash, &output, true).await;
    assert!(matches!(
        result,
        Err(FerryError::Storage(StorageError::FileHashMismatch { .. }))
    ));
}

#[tokio::test]
async fn test_unreachable_holder_is_isolated() {
    let tracker = start_tracker(Duration::from_secs(300)).await;
    let seed = start_peer(&tracker, CHUNK_SIZE).await;
    let leech = start_peer(&tracker, CHUNK_SIZE).await;

    let source = seed.dir.path().join("source.bin");
    std::fs::write(&source, patterned_bytes(CHUNK_SIZE * 2)).unwrap();
    let entries = seed.peer.split_and_advertise(&source).await.unwrap();
    let file_hash = entries[0].name.file_hash().to_string();

    // Only a dead peer claims chunk 1
    seed.peer
        .retract(vec![entries[1].name.to_string()])
        .await
        .unwrap();
    let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_addr = dead.local_addr().unwrap().to_string();
    drop(dead);
    tracker.registry.update_file_parts(
        &dead_addr,
        None,
        [(entries[1].name.to_string(), entries[1].hash.clone())].into(),
    );

    let error = leech.peer.download_file(&file_hash, 2).await.unwrap_err();
    let FerryError::Transfer(TransferError::Incomplete { failures }) = &error else {
        panic!("Expected incomplete download, got {error:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 1);
    assert!(matches!(
        failures[0].error,
        TransferError::HolderUnreachable { .. } | TransferError::Timeout { .. }
    ));
    assert!(
        leech
            .peer
            .store()
            .has_chunk(&entries[0].name)
            .await
    );
}

#[tokio::test]
async fn test_concurrent_downloads_from_one_seed() {
    let tracker = start_tracker(Duration::from_secs(300)).await;
    let seed = start_peer(&tracker, CHUNK_SIZE).await;

    let data = patterned_bytes(CHUNK_SIZE * 6 + 1);
    let source = seed.dir.path().join("source.bin");
    std::fs::write(&source, &data).unwrap();
    let entries = seed.peer.split_and_advertise(&source).await.unwrap();
    let file_hash = entries[0].name.file_hash().to_string();
    let parts = entries.len() as u32;

    let mut leeches = Vec::new();
    for _ in 0..3 {
        leeches.push(start_peer(&tracker, CHUNK_SIZE).await);
    }

    let results = futures::future::join_all(
        leeches
            .iter()
            .map(|leech| leech.peer.download_file(&file_hash, parts)),
    )
    .await;
    for result in results {
        result.unwrap();
    }

    for leech in &leeches {
        let output = leech.dir.path().join("output.bin");
        leech.peer.combine(&file_hash, &output, true).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), data);
    }
}
