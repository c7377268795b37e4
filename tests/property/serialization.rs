//! Property-based serialization round-trip tests for the task wire codec.
//!
//! Uses proptest to verify:
//! 1. Any valid `Task` survives encode → decode round-trip.
//! 2. Random bytes never cause a panic in `decode_bytes` (returns `Err` gracefully).
//! 3. Random text never causes a panic in `decode`.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use taskboard_proto::codec;
use taskboard_proto::task::{Task, TaskId, TaskPriority, TaskStatus};

// --- Arbitrary implementations for protocol types ---

/// Strategy for generating arbitrary `TaskStatus` values.
fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Completed),
    ]
}

/// Strategy for generating arbitrary `TaskPriority` values.
fn arb_priority() -> impl Strategy<Value = TaskPriority> {
    prop_oneof![
        Just(TaskPriority::Low),
        Just(TaskPriority::Medium),
        Just(TaskPriority::High),
    ]
}

/// Strategy for timestamps between 1970 and roughly 2100, with nanoseconds.
fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
        Utc.timestamp_opt(secs, nanos)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    })
}

/// Strategy for generating arbitrary `Task` values.
fn arb_task() -> impl Strategy<Value = Task> {
    (
        "[a-zA-Z0-9-]{1,36}",
        ".{0,64}",
        ".{0,256}",
        arb_status(),
        arb_priority(),
        proptest::option::of(arb_timestamp()),
        "[a-z0-9]{1,16}",
        arb_timestamp(),
        any::<bool>(),
    )
        .prop_map(
            |(id, title, description, status, priority, due_date, user_id, created_at, deleted)| {
                Task {
                    id: TaskId::from(id),
                    title,
                    description,
                    status,
                    priority,
                    due_date,
                    user_id,
                    created_at,
                    updated_at: created_at,
                    deleted,
                }
            },
        )
}

// --- Property tests ---

proptest! {
    /// Any valid Task survives an encode → decode round-trip.
    #[test]
    fn task_round_trip(task in arb_task()) {
        let text = codec::encode(&task).expect("encode should succeed");
        let decoded = codec::decode(&text).expect("decode should succeed");
        prop_assert_eq!(task, decoded);
    }

    /// Random bytes never cause a panic when decoded; they return Err gracefully.
    #[test]
    fn random_bytes_decode_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode_bytes(&bytes);
    }

    /// Random text never causes a panic when decoded.
    #[test]
    fn random_text_decode_no_panic(text in ".{0,512}") {
        let _ = codec::decode(&text);
    }
}
