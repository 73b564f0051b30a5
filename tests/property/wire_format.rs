//! Property-based tests for the relay wire format.
//!
//! Uses proptest to verify:
//! 1. Arbitrary text never makes frame decoding panic.
//! 2. Board topics and move destinations parse back to their board.
//! 3. Any task record survives the JSON body encoding unchanged.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use boardsync_proto::relay::{self, RelayFrame};
use boardsync_proto::{BoardId, ColumnId, Position, Priority, Task, TaskId, codec};
use proptest::prelude::*;

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
        Just(Priority::Urgent),
    ]
}

fn task_strategy() -> impl Strategy<Value = Task> {
    (
        any::<i64>(),
        any::<i64>(),
        "[a-zA-Z0-9 ]{1,40}",
        prop::option::of(".{0,80}"),
        -1.0e12_f64..1.0e12,
        any::<u64>(),
        priority_strategy(),
    )
        .prop_map(|(id, column, title, description, position, version, priority)| {
            let mut task = Task::new(
                TaskId::new(id),
                ColumnId::new(column),
                title,
                Position::new(position),
                version,
            );
            task.description = description;
            task.priority = priority;
            task
        })
}

proptest! {
    #[test]
    fn decode_never_panics(text in ".{0,256}") {
        let _ = relay::decode(&text);
        let _ = codec::decode::<Task>(&text);
    }

    #[test]
    fn decode_rejects_unknown_frame_types(kind in "[a-z]{1,12}") {
        prop_assume!(!matches!(
            kind.as_str(),
            "connect" | "connected" | "subscribe" | "subscribed" | "unsubscribe" | "send" | "message" | "error"
        ));
        let text = format!(r#"{{"type":"{kind}"}}"#);
        prop_assert!(relay::decode(&text).is_err());
    }

    #[test]
    fn board_names_parse_back(raw in any::<i64>()) {
        let board = BoardId::new(raw);
        prop_assert_eq!(relay::parse_board_topic(&relay::board_topic(board)), Some(board));
        prop_assert_eq!(relay::parse_move_destination(&relay::move_destination(board)), Some(board));
    }

    #[test]
    fn task_body_survives_a_message_frame(task in task_strategy()) {
        let frame = RelayFrame::Message {
            topic: relay::board_topic(BoardId::new(1)),
            body: codec::encode(&task).unwrap(),
        };
        let RelayFrame::Message { body, .. } = relay::decode(&relay::encode(&frame).unwrap()).unwrap() else {
            panic!("frame type changed in transit");
        };
        prop_assert_eq!(codec::decode::<Task>(&body).unwrap(), task);
    }
}
