//! Tests for the in-process segment and its directory
//!
//! These tests verify:
//! - Cursor start and stop options (TAIL, BATCH, TAILSTOP)
//! - Eviction and overrun
//! - Writer restarts abandon cursors and are reported once
//! - Injected cursor acquisition failures
//! - Segment lookup by name

use bytes::Bytes;
use vslog::record::tags::tag_index;
use vslog::record::{decode, FormatVersion, Side};
use vslog::transport::{
    CursorOptions, CursorStep, Locator, MemorySegment, SegmentDirectory, WriterStatus,
    DEFAULT_SEGMENT,
};
use vslog::VslError;

// =============================================================================
// Helper Functions
// =============================================================================

fn write_cli(segment: &MemorySegment, text: &str) -> u64 {
    segment
        .write(
            FormatVersion::Current,
            tag_index("CLI").unwrap(),
            0,
            Side::None,
            text,
        )
        .unwrap()
}

fn payload(step: CursorStep) -> String {
    match step {
        CursorStep::Record(raw) => decode(&raw).unwrap().payload_text().into_owned(),
        other => panic!("expected a record, got {:?}", other),
    }
}

// =============================================================================
// Cursor Option Tests
// =============================================================================

#[test]
fn test_cursor_reads_from_oldest() {
    let segment = MemorySegment::new();
    write_cli(&segment, "one");
    write_cli(&segment, "two");

    let mut cursor = segment.attach().cursor(CursorOptions::empty()).unwrap();
    assert_eq!(payload(cursor.next()), "one");
    assert_eq!(payload(cursor.next()), "two");
    assert_eq!(cursor.next(), CursorStep::Idle);

    write_cli(&segment, "three");
    assert_eq!(payload(cursor.next()), "three");
}

#[test]
fn test_tail_starts_at_head() {
    let segment = MemorySegment::new();
    write_cli(&segment, "old");

    let mut cursor = segment.attach().cursor(CursorOptions::TAIL).unwrap();
    assert_eq!(cursor.next(), CursorStep::Idle);

    write_cli(&segment, "new");
    assert_eq!(payload(cursor.next()), "new");
}

#[test]
fn test_batch_ends_when_caught_up() {
    let segment = MemorySegment::new();
    write_cli(&segment, "only");

    let mut cursor = segment.attach().cursor(CursorOptions::BATCH).unwrap();
    assert_eq!(payload(cursor.next()), "only");
    assert_eq!(cursor.next(), CursorStep::End);
}

#[test]
fn test_tailstop_ends_at_head_seen_at_creation() {
    let segment = MemorySegment::new();
    write_cli(&segment, "before");

    let mut cursor = segment.attach().cursor(CursorOptions::TAILSTOP).unwrap();
    write_cli(&segment, "after");

    assert_eq!(payload(cursor.next()), "before");
    assert_eq!(cursor.next(), CursorStep::End);
}

#[test]
fn test_cursor_options_combine() {
    let options = CursorOptions::TAIL | CursorOptions::BATCH;
    assert!(options.contains(CursorOptions::TAIL));
    assert!(options.contains(CursorOptions::BATCH));
    assert!(!options.contains(CursorOptions::TAILSTOP));
    assert_eq!(options.bits(), 3);
    assert_eq!(CursorOptions::from_bits_truncate(0xff).bits(), 7);
    assert_eq!(CursorOptions::default(), CursorOptions::empty());

    let mut grown = CursorOptions::empty();
    grown |= CursorOptions::TAILSTOP;
    assert_eq!(format!("{:?}", grown), "CursorOptions(TAILSTOP)");
}

// =============================================================================
// Eviction Tests
// =============================================================================

#[test]
fn test_oldest_records_are_evicted() {
    // CLI "n" is 4 words
    let segment = MemorySegment::with_capacity(8);
    assert_eq!(write_cli(&segment, "a"), 0);
    assert_eq!(write_cli(&segment, "b"), 1);
    assert_eq!(write_cli(&segment, "c"), 2);

    assert_eq!(segment.retained(), 2);
    assert_eq!(segment.first_seq(), 1);

    let mut cursor = segment.attach().cursor(CursorOptions::BATCH).unwrap();
    assert_eq!(payload(cursor.next()), "b");
}

#[test]
fn test_evicted_position_overruns() {
    let segment = MemorySegment::with_capacity(8);
    write_cli(&segment, "a");

    let mut cursor = segment.attach().cursor(CursorOptions::empty()).unwrap();
    write_cli(&segment, "b");
    write_cli(&segment, "c");

    assert_eq!(cursor.next(), CursorStep::Overrun);
}

#[test]
fn test_oversized_record_is_rejected() {
    let segment = MemorySegment::with_capacity(4);
    let err = segment
        .write(FormatVersion::Current, 3, 0, Side::None, "far too long for four words")
        .unwrap_err();
    assert!(matches!(err, VslError::Config(_)));
    assert_eq!(segment.retained(), 0);
}

#[test]
fn test_truncated_append_is_rejected() {
    let segment = MemorySegment::new();
    // Header announces 64 payload bytes, none follow
    let w0: u32 = 3 << 24 | 1 << 16 | 64;
    let mut raw = w0.to_le_bytes().to_vec();
    raw.extend_from_slice(&[0; 8]);

    assert!(matches!(
        segment.append(Bytes::from(raw)),
        Err(VslError::Truncated(_))
    ));
}

#[test]
fn test_unknown_version_is_stored_unchecked() {
    let segment = MemorySegment::new();
    let w0: u32 = 3 << 24 | 2 << 16 | 1;
    assert!(segment.append(Bytes::copy_from_slice(&w0.to_le_bytes())).is_ok());
    assert_eq!(segment.retained(), 1);
}

// =============================================================================
// Writer Restart Tests
// =============================================================================

#[test]
fn test_restart_abandons_existing_cursors() {
    let segment = MemorySegment::new();
    write_cli(&segment, "a");
    let mut cursor = segment.attach().cursor(CursorOptions::empty()).unwrap();

    segment.restart_writer();
    assert_eq!(segment.epoch(), 1);
    assert_eq!(segment.retained(), 0);
    assert_eq!(cursor.next(), CursorStep::Abandoned);
}

#[test]
fn test_cursor_after_restart_reads_new_log() {
    let segment = MemorySegment::new();
    write_cli(&segment, "before");
    segment.restart_writer();
    write_cli(&segment, "after");

    let mut cursor = segment.attach().cursor(CursorOptions::BATCH).unwrap();
    assert_eq!(payload(cursor.next()), "after");
    assert_eq!(cursor.next(), CursorStep::End);
}

#[test]
fn test_status_reports_restart_once() {
    let segment = MemorySegment::new();
    let transport = segment.attach();
    assert_eq!(transport.status(), WriterStatus::Unchanged);

    segment.restart_writer();
    assert_eq!(transport.status(), WriterStatus::Restarted);
    assert_eq!(transport.status(), WriterStatus::Unchanged);
}

#[test]
fn test_injected_cursor_failures() {
    let segment = MemorySegment::new();
    let transport = segment.attach();
    segment.fail_cursors(2);

    for _ in 0..2 {
        match transport.cursor(CursorOptions::empty()) {
            Err(diagnostic) => assert!(diagnostic.contains("not ready")),
            Ok(_) => panic!("cursor acquisition should fail"),
        }
    }
    assert!(transport.cursor(CursorOptions::empty()).is_ok());
}

// =============================================================================
// Directory Tests
// =============================================================================

#[test]
fn test_directory_publish_and_attach() {
    let directory = SegmentDirectory::new();
    let segment = MemorySegment::new();
    write_cli(&segment, "hello");
    directory.publish("node-a", segment);

    let transport = directory.attach("node-a").unwrap();
    let mut cursor = transport.cursor(CursorOptions::BATCH).unwrap();
    assert_eq!(payload(cursor.next()), "hello");
}

#[test]
fn test_directory_unknown_name() {
    let directory = SegmentDirectory::new();
    match directory.attach("/nonexistent/path") {
        Err(diagnostic) => {
            assert!(diagnostic.contains("/nonexistent/path"), "{}", diagnostic)
        }
        Ok(_) => panic!("attach should fail"),
    }
}

#[test]
fn test_directory_default_name() {
    let directory = SegmentDirectory::new();
    directory.publish("", MemorySegment::new());

    assert!(directory.get(DEFAULT_SEGMENT).is_some());
    assert!(directory.attach("").is_ok());

    assert!(directory.withdraw(DEFAULT_SEGMENT).is_some());
    assert!(directory.attach("").is_err());
}
