use super::fake::*;
use bson::{Bson, Timestamp};
use oplog_sync::{
    CheckpointResolver, CheckpointStore, MongoCheckpointStore, NoopCheckpointStore, OplogSyncer,
    ResumePoint, Shutdown, ShutdownSignal, SyncError,
};

fn applied_ids(client: &FakeClient) -> Vec<Bson> {
    client
        .applied_summary()
        .into_iter()
        .map(|(_, _, id)| id)
        .collect()
}

#[test]
fn test_no_databases() {
    let source = FakeClient::new(&["admin", "other"]).with_oplogs(vec![noop_op(1)]);
    let target = FakeClient::new(&["mirror"]);
    let conf = config(&[]);

    let result = OplogSyncer::new(&source, &target, &conf).sync_forever(&ShutdownSignal::never());
    assert!(matches!(result, Err(SyncError::NoDatabases)));
}

#[test]
fn test_empty_oplog() {
    let source = FakeClient::new(&["shop"]);
    let target = FakeClient::new(&["mirror"]);
    let conf = config(&[]);

    let result = OplogSyncer::new(&source, &target, &conf).sync_forever(&ShutdownSignal::never());
    assert!(matches!(result, Err(SyncError::EmptyOplog)));
}

#[test]
fn test_resolver_without_since_starts_after_head() {
    let source = FakeClient::new(&["shop"]).with_oplogs(vec![noop_op(3), noop_op(8)]);
    let conf = config(&[]);

    let plan = CheckpointResolver::new(&source, conf.get_sync())
        .resolve(&NoopCheckpointStore)
        .unwrap();
    assert_eq!(plan.head, ts(8, 0));
    assert_eq!(plan.backfill_since, None);
    assert_eq!(plan.initial_resume(), ResumePoint::After(ts(8, 0)));
}

#[test]
fn test_resolver_explicit_since_wins_over_store() {
    let source = FakeClient::new(&["shop"]).with_oplogs(vec![noop_op(3), noop_op(8)]);
    let mut conf = config(&[]);
    conf.sync_mut().set_since(5, 2);
    let store = RecordingStore {
        loaded: Some(ts(1, 0)),
        ..RecordingStore::default()
    };

    let plan = CheckpointResolver::new(&source, conf.get_sync())
        .resolve(&store)
        .unwrap();
    assert_eq!(plan.backfill_since, Some(ts(5, 2)));

    let plan = CheckpointResolver::new(&source, config(&[]).get_sync())
        .resolve(&store)
        .unwrap();
    assert_eq!(plan.backfill_since, Some(ts(1, 0)));
}

#[test]
fn test_sync_backfill_then_tail() {
    let (shutdown, signal) = Shutdown::new();
    let source = FakeClient::new(&["admin", "shop"])
        .with_oplogs(vec![
            insert_op(1, "shop.orders", 1),
            insert_op(2, "shop.orders", 2),
            insert_op(3, "shop.items", 3),
            insert_op(4, "shop.orders", 4),
        ])
        // written while backfill is running.
        .arriving(vec![insert_op(5, "shop.orders", 5)])
        .arriving(vec![insert_op(6, "shop.orders", 6)])
        .stop_on_open(4, shutdown);
    let target = FakeClient::new(&["mirror"]);
    let mut conf = config(&["orders"]);
    conf.sync_mut().set_since(1, 0);

    let progress = OplogSyncer::new(&source, &target, &conf)
        .sync_forever(&signal)
        .unwrap();

    assert_eq!(
        applied_ids(&target),
        vec![Bson::Int32(2), Bson::Int32(4), Bson::Int32(5), Bson::Int32(6)]
    );
    assert_eq!(progress.op_count(), 4);
    assert_eq!(progress.last_seen(), Some(ts(6, 0)));

    let queries = source.oplog_queries();
    let backfill = queries[0].get_document("ts").unwrap();
    assert_eq!(backfill.get_timestamp("$gt").unwrap(), ts(1, 0));
    assert_eq!(backfill.get_timestamp("$lte").unwrap(), ts(4, 0));
    // tail continues at the last backfill oplog inclusively.
    let tail = queries[1].get_document("ts").unwrap();
    assert_eq!(tail.get_timestamp("$gte").unwrap(), ts(4, 0));
}

#[test]
fn test_sync_without_since_skips_history() {
    let (shutdown, signal) = Shutdown::new();
    let source = FakeClient::new(&["shop"])
        .with_oplogs(vec![insert_op(1, "shop.orders", 1), insert_op(2, "shop.orders", 2)])
        .arriving(vec![insert_op(3, "shop.orders", 3)])
        .stop_on_open(2, shutdown);
    let target = FakeClient::new(&["mirror"]);
    let conf = config(&[]);

    let progress = OplogSyncer::new(&source, &target, &conf)
        .sync_forever(&signal)
        .unwrap();

    assert_eq!(applied_ids(&target), vec![Bson::Int32(3)]);
    assert_eq!(progress.resume_point(), ResumePoint::From(ts(3, 0)));
    let first = source.oplog_queries()[0].clone();
    assert_eq!(
        first.get_document("ts").unwrap().get_timestamp("$gt").unwrap(),
        ts(2, 0)
    );
}

#[test]
fn test_sync_saves_checkpoint_into_destination() {
    let (shutdown, signal) = Shutdown::new();
    let source = FakeClient::new(&["shop"])
        .with_oplogs(vec![insert_op(1, "shop.orders", 1), insert_op(2, "shop.orders", 2)])
        .stop_on_open(2, shutdown);
    let target = FakeClient::new(&["mirror"]);
    let mut conf = config(&[]);
    conf.sync_mut().set_since(1, 0);
    conf.sync_mut()
        .set_checkpoint_collection("sync_time_record".to_string());

    OplogSyncer::new(&source, &target, &conf)
        .sync_forever(&signal)
        .unwrap();

    let store = MongoCheckpointStore::new(&target, "mirror", "sync_time_record");
    assert_eq!(store.load().unwrap(), Some(ts(2, 0)));
    assert_eq!(target.docs("mirror", "sync_time_record").len(), 1);
}

#[test]
fn test_sync_resumes_from_loaded_checkpoint() {
    let (shutdown, signal) = Shutdown::new();
    let source = FakeClient::new(&["shop"])
        .with_oplogs((1..=3).map(|t| insert_op(t, "shop.orders", t as i32)).collect())
        .stop_on_open(2, shutdown);
    let target = FakeClient::new(&["mirror"]);
    let conf = config(&[]);
    let store = RecordingStore {
        loaded: Some(ts(2, 0)),
        ..RecordingStore::default()
    };

    OplogSyncer::new(&source, &target, &conf)
        .with_checkpoint_store(Box::new(store))
        .sync_forever(&signal)
        .unwrap();

    assert_eq!(applied_ids(&target), vec![Bson::Int32(3)]);
}

#[test]
fn test_mongo_checkpoint_store_overwrites_record() {
    let target = FakeClient::new(&["mirror"]);
    let store = MongoCheckpointStore::new(&target, "mirror", "sync_time_record");
    assert_eq!(store.load().unwrap(), None);

    store.save(ts(5, 1)).unwrap();
    store.save(Timestamp {
        time: 6,
        increment: 0,
    })
    .unwrap();
    assert_eq!(store.load().unwrap(), Some(ts(6, 0)));
    assert_eq!(target.docs("mirror", "sync_time_record").len(), 1);
}

#[test]
fn test_sync_stops_on_interrupt_callback() {
    let (shutdown, signal) = Shutdown::new();
    let source = FakeClient::new(&["shop"])
        .with_oplogs(vec![insert_op(1, "shop.orders", 1)])
        .arriving(vec![insert_op(2, "shop.orders", 2)]);
    let target = FakeClient::new(&["mirror"]);
    let mut conf = config(&[]);
    conf.sync_mut().set_poll_delay_secs(600);

    let mut interrupt = shutdown.into_trigger();
    let interrupter = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(100));
        interrupt();
        interrupt();
    });
    let progress = OplogSyncer::new(&source, &target, &conf)
        .sync_forever(&signal)
        .unwrap();
    interrupter.join().unwrap();

    assert_eq!(applied_ids(&target), vec![Bson::Int32(2)]);
    assert_eq!(progress.op_count(), 1);
    assert_eq!(progress.resume_point(), ResumePoint::From(ts(2, 0)));
}
