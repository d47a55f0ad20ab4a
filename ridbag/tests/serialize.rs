mod common;

use std::sync::Arc;

use common::{contents, counts, record, rid, Test};
use hex_literal::hex;
use ridbag::{
    mem::MemoryElement, wire, Change, ChangeOverlay, CommitAction, Error, RecordElement,
    RecordRef, RidBag,
};

fn round_trip(test: &Test, bag: &mut RidBag) -> RidBag {
    let session = test.session();
    let mut buf = Vec::new();
    let written = bag.serialize(&session, &mut buf, None).unwrap();
    assert_eq!(written, buf.len());
    assert_eq!(written, bag.serialized_size(&session));

    let (restored, read) = RidBag::deserialize(&buf).unwrap();
    assert_eq!(read, written);
    restored
}

#[test]
fn empty_bag_round_trips() {
    let test = Test::inline();
    let session = test.session();

    let mut bag = test.bag();
    let mut restored = round_trip(&test, &mut bag);
    assert!(restored.pointer().is_none());
    assert_eq!(restored.size(&session).unwrap(), 0);
    assert!(contents(&mut restored, &session).is_empty());
}

#[test]
fn pending_records_round_trip_once_saved() {
    let test = Test::inline();
    let session = test.session();
    let a = RecordRef::unsaved();
    let b = RecordRef::unsaved();

    let mut bag = test.bag();
    bag.add(&session, &a);
    bag.add(&session, &a);
    bag.add(&session, &b);

    let mut buf = Vec::new();
    assert!(matches!(
        bag.serialize(&session, &mut buf, None),
        Err(Error::UnresolvedIdentity)
    ));

    a.assign_rid(rid(1));
    b.assign_rid(rid(2));
    bag.apply_new_entries().unwrap();

    let mut restored = round_trip(&test, &mut bag);
    assert_eq!(contents(&mut restored, &session), counts([(1, 2), (2, 1)]));
    assert_eq!(contents(&mut bag, &session), counts([(1, 2), (2, 1)]));
}

#[test]
fn tree_and_overlay_round_trip() {
    let test = Test::inline();
    let pointer = test.manager.insert_tree([(rid(1), 1), (rid(2), 3)]);
    let session = test.session();

    let mut bag = RidBag::with_tree(pointer, ChangeOverlay::new());
    bag.add(&session, &record(1));
    bag.remove(&session, &record(2));
    bag.add(&session, &record(5));
    assert!(bag.contains(&session, &record(2)).unwrap());

    let mut restored = round_trip(&test, &mut bag);
    assert_eq!(restored.pointer(), Some(pointer));
    assert_eq!(restored.to_string(), "[...]");

    let expected = counts([(1, 2), (2, 2), (5, 1)]);
    assert_eq!(contents(&mut restored, &session), expected);
    assert_eq!(contents(&mut bag, &session), expected);
    assert_eq!(restored.size(&session).unwrap(), 5);
}

#[test]
fn inline_layout() {
    let test = Test::inline();
    let session = test.session();

    let mut bag = test.bag();
    bag.add(&session, &record(3));
    bag.add(&session, &record(3));

    let mut buf = Vec::new();
    bag.serialize(&session, &mut buf, None).unwrap();
    assert_eq!(
        buf,
        hex!(
            "ffffffffffffffff ffffffffffffffff ffffffff"
            "00000002"
            "00000001"
            "000a 0000000000000003 00 00000002"
        )
    );
}

#[test]
fn deferred_serialization_queues_the_changes() {
    let test = Test::new();
    let session = test.session();

    let mut bag = test.bag();
    bag.add(&session, &record(1));
    bag.add(&session, &record(1));
    bag.add(&session, &record(4));

    let mut buf = Vec::new();
    let written = bag.serialize(&session, &mut buf, Some(7)).unwrap();
    assert_eq!(written, wire::HEADER_SIZE);
    assert_eq!(bag.serialized_size(&session), wire::HEADER_SIZE);

    let pointer = bag.pointer().expect("tree allocated on first serialization");
    assert_eq!(test.manager.tree(&pointer).unwrap().cluster_id(), 10);

    let (decoded, _) = wire::decode(&buf).unwrap();
    assert_eq!(decoded.pointer, Some(pointer));
    assert!(decoded.changes.is_empty());

    let queue = test.tx.queue().unwrap();
    assert_eq!(queue.len(), 1);
    test.commit(&mut bag);
    assert_eq!(
        test.manager.tree_entries(&pointer).unwrap(),
        vec![(rid(1), 2), (rid(4), 1)]
    );

    let (mut restored, _) = RidBag::deserialize(&buf).unwrap();
    assert_eq!(
        contents(&mut restored, &session),
        counts([(1, 2), (4, 1)])
    );
    assert_eq!(contents(&mut bag, &session), counts([(1, 2), (4, 1)]));
    assert_eq!(bag.size(&session).unwrap(), 3);
}

#[test]
fn deferred_update_captures_a_snapshot() {
    let test = Test::new();
    let session = test.session();

    let mut bag = test.bag();
    bag.add(&session, &record(1));
    bag.serialize(&session, &mut Vec::new(), None).unwrap();
    bag.add(&session, &record(2));

    match &test.tx.queue().unwrap().drain()[..] {
        [CommitAction::UpdateTree { changes, .. }] => {
            assert_eq!(changes.len(), 1);
            assert_eq!(changes.get(&rid(1)), Some(Change::Relative(1)));
        }
        actions => panic!("unexpected actions {actions:?}"),
    }
}

#[test]
fn temporary_rids_are_refreshed_before_deferring() {
    let test = Test::new();
    let session = test.session();
    let temporary = ridbag::Rid::new(10, -5);

    let mut bag = test.bag();
    bag.add(&session, &RecordRef::new(temporary));
    test.tx.map_rid(temporary, rid(8));

    bag.serialize(&session, &mut Vec::new(), None).unwrap();
    test.commit(&mut bag);

    let pointer = bag.pointer().unwrap();
    assert_eq!(test.manager.tree_entries(&pointer).unwrap(), vec![(rid(8), 1)]);
}

#[test]
fn remote_sessions_serialize_inline() {
    let test = Test::new();
    let session = test.session().remote(true);

    let mut bag = test.bag();
    bag.add(&session, &record(1));

    let mut buf = Vec::new();
    let written = bag.serialize(&session, &mut buf, None).unwrap();
    assert_eq!(written, wire::HEADER_SIZE + wire::changes_size(1));
    assert!(bag.pointer().is_none());
    assert!(test.tx.queue().unwrap().is_empty());
}

#[test]
fn serialization_requires_a_transaction() {
    let test = Test::new();
    let session = test.bare_session();

    let mut bag = test.bag();
    bag.add(&session, &record(1));
    assert!(matches!(
        bag.serialize(&session, &mut Vec::new(), None),
        Err(Error::NotInTransaction)
    ));
}

#[test]
fn tree_allocation_needs_an_owner_cluster() {
    let test = Test::new();
    let session = test.session();

    let mut orphan = RidBag::new();
    orphan.add(&session, &record(1));
    assert!(matches!(
        orphan.serialize(&session, &mut Vec::new(), None),
        Err(Error::MissingOwnerCluster)
    ));

    // embedded records allocate in the cluster of the top-level record.
    let top: Arc<dyn RecordElement> = Arc::new(MemoryElement::in_cluster(12));
    let middle: Arc<dyn RecordElement> = Arc::new(MemoryElement::in_cluster(11).with_parent(top));
    let embedded: Arc<dyn RecordElement> = Arc::new(MemoryElement::embedded_in(middle));
    let mut bag = RidBag::new();
    bag.set_owner(Some(embedded.clone())).unwrap();
    bag.add(&session, &record(1));
    bag.serialize(&session, &mut Vec::new(), None).unwrap();

    let pointer = bag.pointer().unwrap();
    assert_eq!(test.manager.tree(&pointer).unwrap().cluster_id(), 12);
}

#[test]
fn tree_allocation_failure() {
    let test = Test::new();
    let session = test.session();

    let mut bag = test.bag();
    bag.add(&session, &record(1));
    test.manager.set_failing(true);

    match bag.serialize(&session, &mut Vec::new(), None) {
        Err(Error::TreeCreation { cluster_id, .. }) => assert_eq!(cluster_id, 10),
        other => panic!("unexpected result {other:?}"),
    }
    assert!(bag.pointer().is_none());
}

#[test]
fn delete_is_confirmed_after_commit() {
    let test = Test::new();
    let session = test.session();

    let mut bag = test.bag();
    bag.add(&session, &record(1));
    bag.serialize(&session, &mut Vec::new(), None).unwrap();
    test.commit(&mut bag);
    let pointer = bag.pointer().unwrap();

    bag.request_delete(&session);
    assert_eq!(test.tx.queue().unwrap().len(), 1);
    test.commit(&mut bag);

    assert!(bag.pointer().is_none());
    assert!(test.manager.tree_entries(&pointer).is_none());
    assert_eq!(bag.size(&session).unwrap(), 0);
    assert!(contents(&mut bag, &session).is_empty());
}

#[test]
fn delete_without_tree_or_queue_does_nothing() {
    let test = Test::new();
    let session = test.session();

    let bag = test.bag();
    bag.request_delete(&session);
    assert!(test.tx.queue().unwrap().is_empty());

    let inline = Test::inline();
    let pointer = inline.manager.insert_tree([(rid(1), 1)]);
    let bag = RidBag::with_tree(pointer, ChangeOverlay::new());
    bag.request_delete(&inline.session());
    assert_eq!(inline.manager.tree_count(), 1);
}

#[test]
fn malformed_input() {
    assert!(matches!(
        RidBag::deserialize(&hex!("ffffffffffffffff")),
        Err(Error::Decode(_))
    ));

    let oversized = hex!(
        "ffffffffffffffff ffffffffffffffff ffffffff"
        "ffffffff"
        "7fffffff"
        "000a 0000000000000003 00"
    );
    assert!(matches!(
        RidBag::deserialize(&oversized),
        Err(Error::Decode(wire::DecodeError::UnexpectedEof { .. }))
    ));
}
