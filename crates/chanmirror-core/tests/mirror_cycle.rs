use chanmirror_core::documents::{ChannelRef, ConfigDocument, IdRange};
use chanmirror_core::gateway::{classify, GatewayError};
use chanmirror_core::mirror::{
    MirrorError, MirrorJob, MirrorPolicy, PreCheckOutcome, RepostReport,
};
use chanmirror_core::store::DocumentKey;
use chanmirror_core::testing::{FakeCall, FakeChannels, FakeOp, MemoryStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const MAIN: i64 = -1_001;
const BACKUP: i64 = -1_002;

fn main_chat() -> ChannelRef {
    ChannelRef::Id(MAIN)
}

fn backup_chat() -> ChannelRef {
    ChannelRef::Id(BACKUP)
}

fn fast_policy() -> MirrorPolicy {
    MirrorPolicy {
        pacing: Duration::ZERO,
        other_backoff: Duration::ZERO,
        ..MirrorPolicy::default()
    }
}

fn setup(static_id: i32) -> (Arc<MemoryStore>, Arc<FakeChannels>, MirrorJob) {
    let store = Arc::new(MemoryStore::new());
    store.put(
        DocumentKey::Storage,
        json!({
            "static_channel": MAIN,
            "static_message_id": static_id,
            "forward_channel_id": BACKUP
        }),
    );
    let channels = Arc::new(FakeChannels::new());
    channels.seed(&main_chat(), [static_id]);
    let job = MirrorJob::new(store.clone(), channels.clone()).with_policy(fast_policy());
    (store, channels, job)
}

fn config(store: &MemoryStore) -> ConfigDocument {
    store
        .get(DocumentKey::Config)
        .map(|v| serde_json::from_value(v).expect("config document should decode"))
        .unwrap_or_default()
}

fn copied_from(calls: &[FakeCall], source: &ChannelRef) -> Vec<i32> {
    calls
        .iter()
        .filter_map(|c| match c {
            FakeCall::Copy {
                from, message_id, ..
            } if from == source => Some(*message_id),
            _ => None,
        })
        .collect()
}

fn copied_from_main(calls: &[FakeCall]) -> Vec<i32> {
    copied_from(calls, &main_chat())
}

fn forwarded(calls: &[FakeCall]) -> Vec<i32> {
    calls
        .iter()
        .filter_map(|c| match c {
            FakeCall::Forward { message_id, .. } => Some(*message_id),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_backup_copies_live_posts() {
    let (store, channels, job) = setup(100);
    channels.seed(&main_chat(), 101..=105);
    channels.set_next_id(&backup_chat(), 500);

    let report = job.backup().await.expect("backup should run");

    assert_eq!(report.main_ids, vec![101, 102, 103, 104, 105]);
    assert_eq!(report.backup_ids, vec![500, 501, 502, 503, 504]);
    let config = config(&store);
    assert_eq!(config.main_channel_range, Some(IdRange::new(101, 105)));
    assert_eq!(config.backup_channel_range, Some(IdRange::new(500, 504)));
    assert!(config.last_run.is_some());
    assert_eq!(channels.ids(&backup_chat()), vec![500, 501, 502, 503, 504]);
}

#[tokio::test]
async fn test_backup_stops_after_twenty_missing_ids() {
    let (store, channels, job) = setup(100);
    channels.seed(&main_chat(), [101, 102, 110, 140]);

    let report = job.backup().await.expect("backup should run");

    assert_eq!(report.main_ids, vec![101, 102, 110]);
    assert_eq!(config(&store).main_channel_range, Some(IdRange::new(101, 110)));
    let attempted = copied_from_main(&channels.calls());
    assert_eq!(attempted.last(), Some(&130));
    assert!(!attempted.contains(&140));
}

#[tokio::test]
async fn test_backup_wipes_private_channel_first() {
    let (_, channels, job) = setup(100);
    channels.seed(&backup_chat(), [1, 2, 3]);
    channels.seed(&main_chat(), [101]);

    job.backup().await.expect("backup should run");

    let calls = channels.calls();
    let first_copy = calls
        .iter()
        .position(|c| matches!(c, FakeCall::Copy { .. }))
        .expect("a copy was made");
    let wipes = calls[..first_copy]
        .iter()
        .filter(|c| matches!(c, FakeCall::Delete { chat, .. } if *chat == backup_chat()))
        .count();
    assert_eq!(wipes, 200);
    assert_eq!(channels.ids(&backup_chat()), vec![4]);
}

#[tokio::test(start_paused = true)]
async fn test_backup_retry_policy() {
    let (_, channels, job) = setup(100);
    channels.seed(&main_chat(), 101..=104);
    channels.fail(
        FakeOp::Copy,
        &main_chat(),
        102,
        [GatewayError::RateLimited {
            retry_after_secs: 4,
        }],
    );
    channels.fail(
        FakeOp::Copy,
        &main_chat(),
        103,
        std::iter::repeat_with(|| GatewayError::other("Internal Server Error")).take(5),
    );

    let report = job.backup().await.expect("backup should run");

    assert_eq!(report.main_ids, vec![101, 102, 104]);
    let attempts = copied_from_main(&channels.calls());
    assert_eq!(attempts.iter().filter(|id| **id == 102).count(), 2);
    assert_eq!(attempts.iter().filter(|id| **id == 103).count(), 5);
}

#[tokio::test]
async fn test_backup_resumes_after_watermark() {
    let (store, channels, job) = setup(100);
    channels.seed(&main_chat(), 101..=110);
    store.put(
        DocumentKey::Config,
        json!({ "deleted_main_range": { "start_id": 101, "end_id": 107 } }),
    );

    let report = job.backup().await.expect("backup should run");

    assert_eq!(report.main_ids, vec![108, 109, 110]);
    assert!(copied_from_main(&channels.calls()).iter().all(|id| *id > 107));
}

#[tokio::test]
async fn test_backup_replay_is_stable() {
    let (_, channels, job) = setup(100);
    channels.seed(&main_chat(), 101..=103);

    channels.set_next_id(&backup_chat(), 10);
    let first = job.backup().await.expect("backup should run");
    // fresh private channel numbering
    channels.set_next_id(&backup_chat(), 10);
    let second = job.backup().await.expect("backup should run");

    assert_eq!(first, second);
    assert!(first.backup_ids.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_backup_without_posts_records_zero_ranges() {
    let (store, _, job) = setup(100);

    let report = job.backup().await.expect("backup should run");

    assert!(report.main_ids.is_empty());
    let config = config(&store);
    assert_eq!(config.main_channel_range, Some(IdRange::new(0, 0)));
    assert_eq!(config.backup_channel_range, Some(IdRange::new(0, 0)));
}

#[tokio::test]
async fn test_pre_check_records_watermark() {
    let (store, channels, job) = setup(100);
    channels.seed(&main_chat(), [104, 105]);

    let outcome = job.pre_check().await.expect("pre-check should run");

    assert_eq!(outcome, PreCheckOutcome::Found(104));
    assert_eq!(
        config(&store).deleted_main_range,
        Some(IdRange::new(100, 103))
    );
    assert_eq!(forwarded(&channels.calls()), vec![101, 102, 103, 104]);
}

#[tokio::test]
async fn test_pre_check_exhausts_cap() {
    let (store, channels, job) = setup(100);
    let job = job.with_policy(MirrorPolicy {
        scan_cap: 10,
        ..fast_policy()
    });

    assert_eq!(job.pre_check().await.expect("pre-check should run"), PreCheckOutcome::Exhausted);
    assert_eq!(store.save_count(), 0);
    assert!(channels.calls().iter().all(|c| match c {
        FakeCall::Forward { message_id, .. } => (101..110).contains(message_id),
        _ => true,
    }));
}

#[tokio::test]
async fn test_pre_check_aborts_on_other_error() {
    let (store, channels, job) = setup(100);
    channels.seed(&main_chat(), [103]);
    channels.fail(
        FakeOp::Forward,
        &main_chat(),
        102,
        [GatewayError::other("Forbidden: bot was kicked")],
    );

    assert_eq!(job.pre_check().await.expect("pre-check should run"), PreCheckOutcome::Aborted);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_phase_without_storage_is_not_configured() {
    let job = MirrorJob::new(Arc::new(MemoryStore::new()), Arc::new(FakeChannels::new()));
    assert!(matches!(
        job.backup().await,
        Err(MirrorError::NotConfigured("static_channel"))
    ));
}

#[tokio::test]
async fn test_repost_deletes_before_copying_back() {
    let (store, channels, job) = setup(100);
    channels.seed(&main_chat(), 101..=103);
    channels.set_next_id(&backup_chat(), 500);

    assert_eq!(job.pre_check().await.expect("pre-check should run"), PreCheckOutcome::Found(101));
    job.backup().await.expect("backup should run");
    channels.clear_calls();

    let report = job.repost().await.expect("repost should run");

    assert_eq!(report.deleted_main, vec![101, 102, 103]);
    assert_eq!(
        report.reposted.iter().map(|(from, _)| *from).collect::<Vec<_>>(),
        vec![501, 502, 503]
    );
    assert!(report.failed.is_empty());

    let calls = channels.calls();
    let last_main_delete = calls
        .iter()
        .rposition(|c| matches!(c, FakeCall::Delete { chat, .. } if *chat == main_chat()))
        .expect("main range was deleted");
    let first_copy = calls
        .iter()
        .position(|c| matches!(c, FakeCall::Copy { .. }))
        .expect("a copy was made");
    assert!(last_main_delete < first_copy);

    assert_eq!(config(&store).deleted_main_range, Some(IdRange::new(101, 103)));
    // the pre-check forward at 500 sits just before the backup range
    assert_eq!(report.wiped, vec![500, 501, 502, 503]);
    assert!(channels.ids(&backup_chat()).is_empty());
    assert_eq!(channels.ids(&main_chat()), vec![100, 104, 105, 106]);
}

#[tokio::test]
async fn test_repost_final_wipe_stops_on_missing_message() {
    let (store, channels, job) = setup(100);
    channels.seed(&backup_chat(), [20, 21, 23]);
    store.put(
        DocumentKey::Config,
        json!({
            "main_channel_range": { "start_id": 0, "end_id": 0 },
            "backup_channel_range": { "start_id": 21, "end_id": 23 }
        }),
    );

    let report = job.repost().await.expect("repost should run");

    assert!(report.deleted_main.is_empty());
    assert_eq!(report.failed, vec![22]);
    // 20, 21 deleted; 22 is gone so the wipe stops before 23
    assert_eq!(report.wiped, vec![20, 21, 22]);
    assert_eq!(channels.ids(&backup_chat()), vec![23]);
}

#[tokio::test]
async fn test_repost_before_first_backup_does_nothing() {
    let (store, channels, job) = setup(100);

    let report = job.repost().await.expect("repost should run");

    assert_eq!(report, RepostReport::default());
    assert!(channels.calls().is_empty());
    assert_eq!(store.save_count(), 0);
    assert_eq!(channels.ids(&main_chat()), vec![100]);
}

#[tokio::test]
async fn test_repost_final_wipe_continues_past_other_failures() {
    let (store, channels, job) = setup(100);
    channels.seed(&backup_chat(), 20..=23);
    store.put(
        DocumentKey::Config,
        json!({
            "main_channel_range": { "start_id": 0, "end_id": 0 },
            "backup_channel_range": { "start_id": 21, "end_id": 23 }
        }),
    );
    channels.fail(
        FakeOp::Delete,
        &backup_chat(),
        21,
        [GatewayError::other("Bad Request: message can't be deleted")],
    );
    channels.fail(
        FakeOp::Delete,
        &backup_chat(),
        22,
        [classify("Bad Request: chat not found")],
    );

    let report = job.repost().await.expect("repost should run");

    assert_eq!(report.wiped, vec![20, 21, 22, 23]);
    assert_eq!(channels.ids(&backup_chat()), vec![21, 22]);
}

#[tokio::test(start_paused = true)]
async fn test_repost_copy_back_retry_budget() {
    let (store, channels, job) = setup(100);
    channels.seed(&backup_chat(), 31..=33);
    store.put(
        DocumentKey::Config,
        json!({
            "main_channel_range": { "start_id": 0, "end_id": 0 },
            "backup_channel_range": { "start_id": 31, "end_id": 33 }
        }),
    );
    channels.fail(
        FakeOp::Copy,
        &backup_chat(),
        31,
        [GatewayError::RateLimited {
            retry_after_secs: 2,
        }],
    );
    channels.fail(
        FakeOp::Copy,
        &backup_chat(),
        32,
        std::iter::repeat_with(|| GatewayError::other("Internal Server Error")).take(5),
    );
    // not-found is retried on the way back, then the copy lands
    channels.fail(
        FakeOp::Copy,
        &backup_chat(),
        33,
        std::iter::repeat_with(|| classify("Bad Request: message to copy not found")).take(2),
    );

    let started = tokio::time::Instant::now();
    let report = job.repost().await.expect("repost should run");

    assert_eq!(
        report.reposted.iter().map(|(from, _)| *from).collect::<Vec<_>>(),
        vec![31, 33]
    );
    assert_eq!(report.failed, vec![32]);
    let attempts = copied_from(&channels.calls(), &backup_chat());
    assert_eq!(attempts.iter().filter(|id| **id == 31).count(), 2);
    assert_eq!(attempts.iter().filter(|id| **id == 32).count(), 5);
    assert_eq!(attempts.iter().filter(|id| **id == 33).count(), 3);
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_pre_check_waits_out_rate_limit_on_same_id() {
    let (store, channels, job) = setup(100);
    channels.seed(&main_chat(), [101]);
    channels.fail(
        FakeOp::Forward,
        &main_chat(),
        101,
        [GatewayError::RateLimited {
            retry_after_secs: 3,
        }],
    );

    let started = tokio::time::Instant::now();
    let outcome = job.pre_check().await.expect("pre-check should run");

    assert_eq!(outcome, PreCheckOutcome::Found(101));
    assert!(started.elapsed() >= Duration::from_secs(4));
    assert_eq!(forwarded(&channels.calls()), vec![101, 101]);
    assert_eq!(
        config(&store).deleted_main_range,
        Some(IdRange::new(100, 100))
    );
}

#[tokio::test]
async fn test_backup_given_up_id_keeps_skip_count() {
    let (_, channels, job) = setup(100);
    // 102..=122 are missing; 111 fails every attempt instead of not-found
    channels.seed(&main_chat(), [101, 123]);
    channels.fail(
        FakeOp::Copy,
        &main_chat(),
        111,
        std::iter::repeat_with(|| GatewayError::other("Internal Server Error")).take(5),
    );

    let report = job.backup().await.expect("backup should run");

    // 9 misses before 111 and 11 after it reach the threshold at 122
    assert_eq!(report.main_ids, vec![101]);
    let attempted = copied_from_main(&channels.calls());
    assert_eq!(attempted.iter().filter(|id| **id == 111).count(), 5);
    assert_eq!(attempted.last(), Some(&122));
}

#[tokio::test]
async fn test_ids_near_the_top_do_not_overflow() {
    let (_, _, job) = setup(i32::MAX);
    assert_eq!(
        job.pre_check().await.expect("pre-check should run"),
        PreCheckOutcome::Exhausted
    );

    let (store, channels, job) = setup(100);
    store.put(
        DocumentKey::Config,
        json!({ "deleted_main_range": { "start_id": 1, "end_id": i32::MAX } }),
    );
    let report = job.backup().await.expect("backup should run");
    assert!(report.main_ids.is_empty());
    let attempted = copied_from_main(&channels.calls());
    assert_eq!(attempted.len(), 20);
    assert!(attempted.iter().all(|id| *id == i32::MAX));
}
