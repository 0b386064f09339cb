//! End-to-end scenarios driving a full `Database` through its public API
//! over `LocalRma`/`LocalProcessGroup`, one peer (or several) at a time.

use std::sync::Arc;

use nod::{CloseMode, Database, DatabaseConfig, Entity, LabelPolicy, LocalProcessGroup, LocalRma, SizeKind, INCOMING, OUTGOING, UNDIRECTED};

fn single_peer_db(block_size: u32, memory_per_peer: u64) -> Database {
    let config = DatabaseConfig::new(block_size, memory_per_peer, 1);
    let rma = Arc::new(
        LocalRma::builder(1)
            .blocks(config.num_blocks_per_peer(), block_size)
            .index(config.index_table_size_per_peer, config.index_heap_size_per_peer)
            .build(),
    );
    let group = LocalProcessGroup::group(1).pop().unwrap();
    Database::open(config, rma, Arc::new(group)).unwrap()
}

fn multi_peer_dbs(num_peers: u32, block_size: u32, memory_per_peer: u64) -> Vec<Database> {
    let config = DatabaseConfig::new(block_size, memory_per_peer, num_peers);
    let rma: Arc<LocalRma> = Arc::new(
        LocalRma::builder(num_peers)
            .blocks(config.num_blocks_per_peer(), block_size)
            .index(config.index_table_size_per_peer, config.index_heap_size_per_peer)
            .build(),
    );
    LocalProcessGroup::group(num_peers)
        .into_iter()
        .map(|group| Database::open(config, Arc::clone(&rma) as Arc<dyn nod::Rma>, Arc::new(group)).unwrap())
        .collect()
}

/// S1: single-process insert/read on one peer.
#[test]
fn s1_single_process_insert_read() {
    let mut db = single_peer_db(512, 64 * 1024);
    let person = db.create_label("Person").unwrap();
    let name = db.create_property_type("name", Entity::Single, SizeKind::Fixed, 4).unwrap();

    let mut txn = db.start_single().unwrap();
    let v = txn.create_vertex(Some(&[0x2A])).unwrap();
    txn.add_label(v, person).unwrap();
    txn.add_property(v, name, &7u32.to_le_bytes()).unwrap();
    txn.close(CloseMode::Commit).unwrap();

    let mut txn = db.start_single().unwrap();
    let locator = txn.translate_vertex_id(person, &[0x2A]).unwrap().expect("vertex found");
    let v = txn.associate_vertex(locator).unwrap();
    let values = txn.vertex(v).properties_of(name);
    assert_eq!(values, vec![7u32.to_le_bytes().to_vec()]);
    txn.close(CloseMode::Commit).unwrap();
}

/// S2: an edge created between vertices that live on two different peers.
#[test]
fn s2_cross_peer_edge() {
    let mut dbs = multi_peer_dbs(2, 512, 64 * 1024);
    for db in &mut dbs {
        db.create_label("Node").unwrap();
    }
    let node_label = dbs[0].registry().label_by_name("Node").unwrap();

    {
        let mut txn = dbs[0].start_single().unwrap();
        let a = txn.create_vertex(Some(&[0x01])).unwrap();
        txn.add_label(a, node_label).unwrap();
        txn.close(CloseMode::Commit).unwrap();
    }
    {
        let mut txn = dbs[1].start_single().unwrap();
        let b = txn.create_vertex(Some(&[0x02])).unwrap();
        txn.add_label(b, node_label).unwrap();
        txn.close(CloseMode::Commit).unwrap();
    }

    let mut txn = dbs[0].start_single().unwrap();
    let a_locator = txn.translate_vertex_id(node_label, &[0x01]).unwrap().unwrap();
    let a = txn.associate_vertex(a_locator).unwrap();
    let b_locator = txn.translate_vertex_id(node_label, &[0x02]).unwrap().unwrap();
    let b = txn.associate_vertex(b_locator).unwrap();
    txn.create_edge(a, b, node_label, UNDIRECTED).unwrap();
    txn.close(CloseMode::Commit).unwrap();

    let mut check = dbs[0].start_single().unwrap();
    let a = check.associate_vertex(a_locator).unwrap();
    assert_eq!(check.vertex(a).total_degree(), 1);
    check.close(CloseMode::Commit).unwrap();

    let mut check = dbs[1].start_single().unwrap();
    let b = check.associate_vertex(b_locator).unwrap();
    assert_eq!(check.vertex(b).total_degree(), 1);
    check.close(CloseMode::Commit).unwrap();
}

/// S3: delete then reinsert under the same key bumps the incarnation and
/// invalidates any transaction still holding the old one.
#[test]
fn s3_delete_and_reinsert_bumps_incarnation() {
    let mut db = single_peer_db(512, 64 * 1024);
    let label = db.create_label("X").unwrap();

    let mut txn = db.start_single().unwrap();
    let v = txn.create_vertex(Some(&[0xAA])).unwrap();
    txn.add_label(v, label).unwrap();
    txn.close(CloseMode::Commit).unwrap();

    let mut txn = db.start_single().unwrap();
    let locator = txn.translate_vertex_id(label, &[0xAA]).unwrap().unwrap();
    let v = txn.associate_vertex(locator).unwrap();
    let incarnation_0 = txn.vertex(v).incarnation;
    txn.free_vertex(v).unwrap();
    txn.close(CloseMode::Commit).unwrap();

    let mut lookup = db.start_single().unwrap();
    assert!(lookup.translate_vertex_id(label, &[0xAA]).unwrap().is_none());
    lookup.close(CloseMode::Commit).unwrap();

    let mut txn = db.start_single().unwrap();
    let v = txn.create_vertex(Some(&[0xAA])).unwrap();
    txn.add_label(v, label).unwrap();
    txn.close(CloseMode::Commit).unwrap();

    let mut txn = db.start_single().unwrap();
    let new_locator = txn.translate_vertex_id(label, &[0xAA]).unwrap().unwrap();
    let v = txn.associate_vertex(new_locator).unwrap();
    assert!(txn.vertex(v).incarnation >= incarnation_0 + 1);
    txn.close(CloseMode::Commit).unwrap();
}

/// S4: a write not yet committed is invisible to a concurrent reader;
/// once committed, a later transaction observes it.
#[test]
fn s4_read_before_commit_isolation() {
    let mut db = single_peer_db(512, 64 * 1024);
    let name = db.create_property_type("name", Entity::Single, SizeKind::Max, 8).unwrap();

    let mut setup = db.start_single().unwrap();
    let v = setup.create_vertex(Some(&[0x10])).unwrap();
    let locator = setup.vertex(v).locator;
    setup.close(CloseMode::Commit).unwrap();

    // T1 and T2 both associate V while it is still unwritten; the write
    // lock only needs to exclude *new* readers once T1 actually upgrades,
    // so T2 must take its read lock before T1 mutates (I2: a writer and a
    // reader can never coexist on the same vertex).
    let mut t1 = db.start_single().unwrap();
    let v1 = t1.associate_vertex(locator).unwrap();

    let mut t2 = db.start_single().unwrap();
    let v2 = t2.associate_vertex(locator).unwrap();
    assert!(t2.vertex(v2).properties_of(name).is_empty(), "no writer has touched the vertex yet");
    t2.close(CloseMode::Commit).unwrap();

    // Only once T2 has released its read lock can T1 upgrade and write;
    // T2 never observed the pending write, since it had already closed.
    t1.add_property(v1, name, b"pending").unwrap();
    t1.close(CloseMode::Commit).unwrap();

    let mut t3 = db.start_single().unwrap();
    let v3 = t3.associate_vertex(locator).unwrap();
    assert_eq!(t3.vertex(v3).properties_of(name), vec![b"pending".to_vec()]);
    t3.close(CloseMode::Commit).unwrap();
}

/// S5: a read lock held by two transactions blocks either from upgrading
/// to write until one of them releases.
#[test]
fn s5_lock_upgrade_contention() {
    let mut db = single_peer_db(512, 64 * 1024);
    let name = db.create_property_type("name", Entity::Single, SizeKind::Max, 8).unwrap();

    let mut setup = db.start_single().unwrap();
    let v = setup.create_vertex(Some(&[0x01])).unwrap();
    let locator = setup.vertex(v).locator;
    setup.close(CloseMode::Commit).unwrap();

    let mut t1 = db.start_single().unwrap();
    let v1 = t1.associate_vertex(locator).unwrap();

    let mut t2 = db.start_single().unwrap();
    let v2 = t2.associate_vertex(locator).unwrap();

    let upgrade_result = t1.add_property(v1, name, b"alice");
    assert!(upgrade_result.is_err());
    assert!(t1.is_critical());
    t1.close(CloseMode::Abort).unwrap();

    t2.add_property(v2, name, b"bob").unwrap();
    t2.close(CloseMode::Commit).unwrap();

    let mut check = db.start_single().unwrap();
    let v = check.associate_vertex(locator).unwrap();
    assert_eq!(check.vertex(v).properties_of(name), vec![b"bob".to_vec()]);
    check.close(CloseMode::Commit).unwrap();
}

/// P7: a directed edge recorded in one endpoint's table is mirrored in
/// the other's with the symmetric orientation and the same label.
#[test]
fn p7_edge_symmetry_across_peers() {
    let mut dbs = multi_peer_dbs(2, 512, 64 * 1024);
    for db in &mut dbs {
        db.create_label("Node").unwrap();
    }
    let label = dbs[0].registry().label_by_name("Node").unwrap();

    let a_locator = {
        let mut txn = dbs[0].start_single().unwrap();
        let a = txn.create_vertex(Some(&[0x01])).unwrap();
        let locator = txn.vertex(a).locator;
        txn.close(CloseMode::Commit).unwrap();
        locator
    };
    let b_locator = {
        let mut txn = dbs[1].start_single().unwrap();
        let b = txn.create_vertex(Some(&[0x02])).unwrap();
        let locator = txn.vertex(b).locator;
        txn.close(CloseMode::Commit).unwrap();
        locator
    };

    let mut txn = dbs[0].start_single().unwrap();
    let a = txn.associate_vertex(a_locator).unwrap();
    let b = txn.associate_vertex(b_locator).unwrap();
    txn.create_edge(a, b, label, OUTGOING).unwrap();
    txn.close(CloseMode::Commit).unwrap();

    let mut check = dbs[0].start_single().unwrap();
    let a = check.associate_vertex(a_locator).unwrap();
    assert_eq!(check.vertex(a).degree(OUTGOING, LabelPolicy::Whitelist(&[label])), 1);
    assert_eq!(check.vertex(a).degree(INCOMING, LabelPolicy::Any), 0);
    check.close(CloseMode::Commit).unwrap();

    let mut check = dbs[1].start_single().unwrap();
    let b = check.associate_vertex(b_locator).unwrap();
    assert_eq!(check.vertex(b).degree(INCOMING, LabelPolicy::Whitelist(&[label])), 1);
    assert_eq!(check.vertex(b).degree(OUTGOING, LabelPolicy::Any), 0);
    check.close(CloseMode::Commit).unwrap();
}

/// B2: creating a vertex when every peer is out of blocks fails with
/// `NoMemory` rather than panicking or silently truncating the segment.
#[test]
fn b2_create_vertex_fails_when_all_peers_full() {
    let mut db = single_peer_db(512, 512); // exactly one block total
    db.create_label("X").unwrap();

    let mut txn = db.start_single().unwrap();
    txn.create_vertex(Some(&[0x01])).unwrap();
    txn.close(CloseMode::Commit).unwrap();

    let mut txn = db.start_single().unwrap();
    assert_eq!(txn.create_vertex(Some(&[0x02])), Err(nod::ErrorKind::NoMemory));
    txn.close(CloseMode::Abort).unwrap();
}

/// R3: aborting a mutating transaction leaves the database exactly as if
/// the transaction had never been started — no index entry, no block
/// consumed, no property visible to a later transaction.
#[test]
fn r3_abort_is_equivalent_to_never_starting() {
    let mut db = single_peer_db(512, 64 * 1024);
    let label = db.create_label("Ghost").unwrap();
    let name = db.create_property_type("name", Entity::Single, SizeKind::Max, 8).unwrap();

    let mut txn = db.start_single().unwrap();
    let v = txn.create_vertex(Some(&[0x77])).unwrap();
    txn.add_label(v, label).unwrap();
    txn.add_property(v, name, b"nope").unwrap();
    txn.close(CloseMode::Abort).unwrap();

    let mut lookup = db.start_single().unwrap();
    assert!(lookup.translate_vertex_id(label, &[0x77]).unwrap().is_none());
    lookup.close(CloseMode::Commit).unwrap();

    // The speculatively allocated block must have been returned: a fresh
    // transaction can still fill the whole peer from empty.
    let mut refill = db.start_single().unwrap();
    for i in 0u8..127 {
        refill.create_vertex(Some(&[i])).unwrap();
    }
    refill.close(CloseMode::Commit).unwrap();
}

/// O2: a vertex created and deleted within the same transaction is
/// suppressed entirely at commit — no index entry survives, and its block
/// is returned to the free list rather than ever being written back.
#[test]
fn o2_create_then_delete_in_same_transaction_is_suppressed() {
    let mut db = single_peer_db(512, 64 * 1024);
    let label = db.create_label("Transient").unwrap();

    let mut txn = db.start_single().unwrap();
    let v = txn.create_vertex(Some(&[0x55])).unwrap();
    txn.add_label(v, label).unwrap();
    txn.free_vertex(v).unwrap();
    txn.close(CloseMode::Commit).unwrap();

    let mut lookup = db.start_single().unwrap();
    assert!(lookup.translate_vertex_id(label, &[0x55]).unwrap().is_none());
    lookup.close(CloseMode::Commit).unwrap();
}

/// `free_vertex` tears down both endpoints of a live edge: deleting one
/// side leaves the survivor with no dangling edge entry.
#[test]
fn free_vertex_tears_down_partner_edges() {
    let mut db = single_peer_db(512, 64 * 1024);
    let label = db.create_label("Node").unwrap();

    let mut txn = db.start_single().unwrap();
    let a = txn.create_vertex(Some(&[0x01])).unwrap();
    let b = txn.create_vertex(Some(&[0x02])).unwrap();
    txn.add_label(a, label).unwrap();
    txn.add_label(b, label).unwrap();
    txn.create_edge(a, b, label, UNDIRECTED).unwrap();
    let b_locator = txn.vertex(b).locator;
    txn.close(CloseMode::Commit).unwrap();

    let mut txn = db.start_single().unwrap();
    let a_locator = txn.translate_vertex_id(label, &[0x01]).unwrap().unwrap();
    let a = txn.associate_vertex(a_locator).unwrap();
    txn.free_vertex(a).unwrap();
    txn.close(CloseMode::Commit).unwrap();

    let mut check = db.start_single().unwrap();
    let b = check.associate_vertex(b_locator).unwrap();
    assert_eq!(check.vertex(b).total_degree(), 0, "partner's mirrored edge must be torn down too");
    check.close(CloseMode::Commit).unwrap();
}

/// S6: a collective, read-only transaction run by every peer, closed with
/// a unanimous commit.
#[test]
fn s6_collective_read_kernel() {
    let mut dbs = multi_peer_dbs(2, 512, 64 * 1024);
    for (rank, db) in dbs.iter_mut().enumerate() {
        let mut txn = db.start_single().unwrap();
        txn.create_vertex(Some(&[rank as u8])).unwrap();
        txn.close(CloseMode::Commit).unwrap();
    }

    std::thread::scope(|scope| {
        for db in &dbs {
            scope.spawn(move || {
                let txn = db.start_collective().unwrap();
                txn.close(CloseMode::Commit).unwrap();
            });
        }
    });
}
