use std::sync::Arc;

use proptest::prelude::*;
use tokio::runtime::Runtime;

use crate::recorder::ActivityRecorder;
use crate::rooms::RoomBroker;
use crate::store::{ActivityKind, MemoryStore, SessionRecord, Store};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Capped window: after n appends with cap k, the window holds exactly
    // the last min(n, k) entries in arrival order while the durable log
    // holds all n.
    #[test]
    fn window_keeps_last_cap_entries(
        cap in 1..8usize,
        n in 1..24usize,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let broker = Arc::new(RoomBroker::new());
            store
                .upsert_session(SessionRecord::new("s1", "mobile", None))
                .await
                .unwrap();
            let recorder = ActivityRecorder::new(store.clone(), broker, cap);

            for i in 0..n {
                recorder
                    .record(
                        "s1",
                        ActivityKind::KeyboardEvent,
                        Some(format!("Key: k{i}")),
                        None,
                        None,
                    )
                    .await
                    .unwrap();
            }

            let session = store.find_session("s1").await.unwrap().unwrap();
            let expected = n.min(cap);
            assert_eq!(session.activity_logs.len(), expected);

            let first = n - expected;
            for (offset, entry) in session.activity_logs.iter().enumerate() {
                let i = first + offset;
                assert_eq!(entry.details.as_deref(), Some(format!("Key: k{i}").as_str()));
            }

            assert_eq!(store.activities_for_session("s1").await.unwrap().len(), n);
        });
    }

    // Durable ids are unique and assigned in append order.
    #[test]
    fn durable_ids_monotonic(n in 1..16usize) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let broker = Arc::new(RoomBroker::new());
            store
                .upsert_session(SessionRecord::new("s1", "mobile", None))
                .await
                .unwrap();
            let recorder = ActivityRecorder::new(store.clone(), broker, 500);

            let mut ids = Vec::new();
            for _ in 0..n {
                let stored = recorder
                    .record("s1", ActivityKind::MouseClick, None, Some(1.0), Some(2.0))
                    .await
                    .unwrap();
                ids.push(stored.id.unwrap());
            }

            let mut sorted = ids.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), ids.len());
            assert_eq!(sorted, ids);
        });
    }
}
