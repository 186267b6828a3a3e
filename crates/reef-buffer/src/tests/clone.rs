//! Clone fan-out tests: buffered and streaming splits.

use std::sync::atomic::Ordering;

use bytes::Bytes;

use super::helpers::*;
use crate::{Buffer, BufferError, RepairStrategy};

// -----------------------------------------------------------------------
// clone_copy
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_clone_copy_both_halves_read_the_image() {
    let repair = RepairCounter::new();
    let (buffer, closes) = cas_buffer(&hello_digest(), &[b"Hello"], repair.strategy(&hello_digest()));

    // The scripted source yields its chunks once; both halves succeeding
    // proves the underlying source was read a single time.
    let (half_a, half_b) = buffer.clone_copy(10);
    assert_eq!(
        half_a.to_byte_slice(10).await.unwrap(),
        Bytes::from_static(b"Hello")
    );
    assert_eq!(
        half_b.to_byte_slice(10).await.unwrap(),
        Bytes::from_static(b"Hello")
    );
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(repair.count(), 0);
}

#[tokio::test]
async fn test_clone_copy_size_is_available_without_realizing() {
    let (buffer, closes) = cas_buffer(
        &hello_digest(),
        &[b"Hello"],
        RepairStrategy::Irreparable,
    );

    let (half_a, half_b) = buffer.clone_copy(10);
    assert_eq!(half_a.get_size_bytes().unwrap(), 5);
    assert_eq!(half_b.get_size_bytes().unwrap(), 5);
    assert_eq!(closes.load(Ordering::SeqCst), 0);

    // Dropping both halves releases the never-realized source.
    half_a.discard();
    half_b.discard();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clone_copy_transport_error_is_shared() {
    let source = ScriptedSource::with_error(&[], backend_on_fire());
    let buffer = Buffer::cas_from_chunk_source(
        hello_digest(),
        Box::new(source),
        RepairStrategy::Irreparable,
    );

    let (half_a, half_b) = buffer.clone_copy(10);
    assert_eq!(half_a.to_byte_slice(10).await.unwrap_err(), backend_on_fire());
    assert_eq!(half_b.to_byte_slice(10).await.unwrap_err(), backend_on_fire());
}

#[tokio::test]
async fn test_clone_copy_corruption_is_shared_and_repaired_once() {
    let repair = RepairCounter::new();
    let (buffer, _) = cas_buffer(&hello_digest(), &[], repair.strategy(&hello_digest()));

    let (half_a, half_b) = buffer.clone_copy(10);
    let expected = BufferError::SizeTooSmall {
        actual: 0,
        expected: 5,
    };
    assert_eq!(half_a.to_byte_slice(10).await.unwrap_err(), expected);
    assert_eq!(half_b.to_byte_slice(10).await.unwrap_err(), expected);
    assert_eq!(repair.count(), 1);
}

#[tokio::test]
async fn test_clone_copy_maximum_size_applies_to_both_halves() {
    let (buffer, closes) = cas_buffer(
        &hello_digest(),
        &[b"Hello"],
        RepairStrategy::Irreparable,
    );

    let (half_a, half_b) = buffer.clone_copy(4);
    let expected = "Buffer is 5 bytes in size, while a maximum of 4 bytes is permitted";
    assert_eq!(half_a.to_byte_slice(10).await.unwrap_err().to_string(), expected);
    assert_eq!(half_b.to_byte_slice(10).await.unwrap_err().to_string(), expected);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clone_copy_of_clone() {
    let (buffer, _) = cas_buffer(
        &hello_digest(),
        &[b"Hello"],
        RepairStrategy::Irreparable,
    );

    let (half_a, half_b) = buffer.clone_copy(10);
    let (quarter_a, quarter_b) = half_a.clone_copy(10);

    assert_eq!(
        quarter_a.to_byte_slice(10).await.unwrap(),
        Bytes::from_static(b"Hello")
    );
    assert_eq!(
        quarter_b.to_byte_slice(10).await.unwrap(),
        Bytes::from_static(b"Hello")
    );
    assert_eq!(
        half_b.to_byte_slice(10).await.unwrap(),
        Bytes::from_static(b"Hello")
    );
}

#[tokio::test]
async fn test_clone_copy_of_validated_bytes_is_cheap() {
    let buffer = Buffer::from_validated_byte_slice(Bytes::from_static(b"Hello"));
    let (half_a, half_b) = buffer.clone_copy(10);
    assert_eq!(
        half_a.to_byte_slice(10).await.unwrap(),
        Bytes::from_static(b"Hello")
    );
    assert_eq!(
        half_b.to_byte_slice(10).await.unwrap(),
        Bytes::from_static(b"Hello")
    );
}

// -----------------------------------------------------------------------
// clone_stream
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_clone_stream_concurrent_consumers() {
    let repair = RepairCounter::new();
    let (buffer, closes) = cas_buffer(&hello_digest(), &[b"Hello"], repair.strategy(&hello_digest()));

    let (half_a, half_b) = buffer.clone_stream();
    let task_a = tokio::spawn(async move { half_a.to_byte_slice(10).await });
    let task_b = tokio::spawn(async move { half_b.to_byte_slice(10).await });

    assert_eq!(
        task_a.await.unwrap().unwrap(),
        Bytes::from_static(b"Hello")
    );
    assert_eq!(
        task_b.await.unwrap().unwrap(),
        Bytes::from_static(b"Hello")
    );
    await_closes(&closes, 1).await;
    assert_eq!(repair.count(), 0);
}

#[tokio::test]
async fn test_clone_stream_transport_error_reaches_both() {
    let source = ScriptedSource::with_error(&[], backend_on_fire());
    let buffer = Buffer::cas_from_chunk_source(
        hello_digest(),
        Box::new(source),
        RepairStrategy::Irreparable,
    );

    let (half_a, half_b) = buffer.clone_stream();
    let task_a = tokio::spawn(async move { half_a.to_byte_slice(10).await });
    let task_b = tokio::spawn(async move { half_b.to_byte_slice(10).await });

    assert_eq!(task_a.await.unwrap().unwrap_err(), backend_on_fire());
    assert_eq!(task_b.await.unwrap().unwrap_err(), backend_on_fire());
}

#[tokio::test]
async fn test_clone_stream_corruption_reaches_both_with_one_repair() {
    let repair = RepairCounter::new();
    let (buffer, _) = cas_buffer(&hello_digest(), &[], repair.strategy(&hello_digest()));

    let (half_a, half_b) = buffer.clone_stream();
    let expected = BufferError::SizeTooSmall {
        actual: 0,
        expected: 5,
    };
    assert_eq!(half_a.to_byte_slice(10).await.unwrap_err(), expected);
    assert_eq!(half_b.to_byte_slice(10).await.unwrap_err(), expected);
    assert_eq!(repair.count(), 1);
}

#[tokio::test]
async fn test_clone_stream_consumers_pace_independently() {
    let repair = RepairCounter::new();
    let (buffer, _) = cas_buffer(
        &hello_world_digest(),
        &[b"Hel", b"lo ", b"wor", b"ld"],
        repair.strategy(&hello_world_digest()),
    );

    // One half drains eagerly; the other trickles through a windowed chunk
    // reader afterwards. Both observe the same bytes.
    let (half_a, half_b) = buffer.clone_stream();
    assert_eq!(
        half_a.to_byte_slice(20).await.unwrap(),
        Bytes::from_static(b"Hello world")
    );

    let mut reader = half_b.to_chunk_reader(6, 3);
    assert_eq!(reader.read().await.unwrap(), Some(Bytes::from_static(b"wor")));
    assert_eq!(reader.read().await.unwrap(), Some(Bytes::from_static(b"ld")));
    assert_eq!(reader.read().await.unwrap(), None);
}

#[tokio::test]
async fn test_clone_stream_survives_one_abandoned_half() {
    let repair = RepairCounter::new();
    let (buffer, closes) = cas_buffer(
        &hello_world_digest(),
        &[b"Hel", b"lo ", b"wor", b"ld"],
        repair.strategy(&hello_world_digest()),
    );

    let (half_a, half_b) = buffer.clone_stream();
    half_a.discard();
    assert_eq!(
        half_b.to_byte_slice(20).await.unwrap(),
        Bytes::from_static(b"Hello world")
    );
    await_closes(&closes, 1).await;
}

#[tokio::test]
async fn test_clone_stream_closes_source_when_both_halves_abandon() {
    let (buffer, closes) = cas_buffer(
        &hello_world_digest(),
        &[b"Hel", b"lo ", b"wor", b"ld"],
        RepairStrategy::Irreparable,
    );

    let (half_a, half_b) = buffer.clone_stream();
    half_a.discard();
    half_b.discard();
    await_closes(&closes, 1).await;
}

#[tokio::test]
async fn test_clone_stream_of_byte_slice_buffer() {
    let buffer = Buffer::cas_from_byte_slice(
        hello_digest(),
        Bytes::from_static(b"Hello"),
        RepairStrategy::Irreparable,
    );
    let (half_a, half_b) = buffer.clone_stream();
    assert_eq!(
        half_a.to_byte_slice(10).await.unwrap(),
        Bytes::from_static(b"Hello")
    );
    assert_eq!(
        half_b.to_byte_slice(10).await.unwrap(),
        Bytes::from_static(b"Hello")
    );
}
