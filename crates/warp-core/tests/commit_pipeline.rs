//! End-to-end pipeline: stage, commit, read back, replay, checkpoint.

use anyhow::Result;
use serde_json::json;
use warp_core::projection::{deserialize_full, serialize_full};
use warp_core::{
    MemoryStore, PatchBuilder, Persistence, SealedPatch, join_states, read_writer_patches, reduce,
    state_hash, writer_ref,
};

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

fn total_order(mut patches: Vec<SealedPatch>) -> Vec<SealedPatch> {
    // The conventional replica-stable total order: lamport, then writer,
    // then patch sha.
    patches.sort_by(|a, b| {
        (a.patch.lamport, &a.patch.writer, &a.sha).cmp(&(b.patch.lamport, &b.patch.writer, &b.sha))
    });
    patches
}

#[test]
fn two_writers_commit_and_replay_to_one_state() -> Result<()> {
    init_tracing();
    let store = MemoryStore::new();

    // Writer alice: a little graph.
    let mut alice = PatchBuilder::new("main", "alice")?;
    alice.add_node("a")?;
    alice.add_node("b")?;
    alice.add_edge("a", "b", "follows")?;
    alice.commit(&store)?;

    let mut alice_again = PatchBuilder::new("main", "alice")?;
    alice_again.set_property("a", "color", json!("green"))?;
    alice_again.commit(&store)?;

    // Writer bob: concurrent additions.
    let mut bob = PatchBuilder::new("main", "bob")?;
    bob.add_node("c")?;
    bob.add_edge("b", "c", "follows")?;
    bob.commit(&store)?;

    // Read both chains back and replay in a total order.
    let mut patches = read_writer_patches(&store, "main", "alice")?;
    patches.extend(read_writer_patches(&store, "main", "bob")?);
    let patches = total_order(patches);
    assert_eq!(patches.len(), 3);

    let state = reduce(&patches, None)?;
    assert!(state.has_node("a"));
    assert!(state.has_node("c"));
    assert!(state.has_edge("a", "b", "follows")?);
    assert!(state.has_edge("b", "c", "follows")?);
    assert_eq!(state.node_prop("a", "color")?, Some(&json!("green")));

    // Lamport sequences continued per writer.
    assert_eq!(patches[0].patch.lamport, 1);
    let alice_lamports: Vec<u64> = patches
        .iter()
        .filter(|sealed| sealed.patch.writer == "alice")
        .map(|sealed| sealed.patch.lamport)
        .collect();
    assert_eq!(alice_lamports, vec![1, 2]);
    Ok(())
}

#[test]
fn replay_order_does_not_change_the_state_hash() -> Result<()> {
    let store = MemoryStore::new();

    let mut alice = PatchBuilder::new("main", "alice")?;
    alice.add_node("x")?;
    alice.commit(&store)?;
    let mut bob = PatchBuilder::new("main", "bob")?;
    bob.add_node("y")?;
    bob.set_property("y", "k", json!(1))?;
    bob.commit(&store)?;

    let mut forward = read_writer_patches(&store, "main", "alice")?;
    forward.extend(read_writer_patches(&store, "main", "bob")?);
    let mut backward = forward.clone();
    backward.reverse();

    let state_forward = reduce(&forward, None)?;
    let state_backward = reduce(&backward, None)?;
    assert_eq!(state_hash(&state_forward)?, state_hash(&state_backward)?);
    Ok(())
}

#[test]
fn removes_observe_state_across_commits() -> Result<()> {
    let store = MemoryStore::new();

    let mut add = PatchBuilder::new("main", "alice")?;
    add.add_node("x")?;
    add.commit(&store)?;

    let state = reduce(&read_writer_patches(&store, "main", "alice")?, None)?;
    assert!(state.has_node("x"));

    let mut remove = PatchBuilder::new("main", "alice")?.with_state(&state);
    remove.remove_node("x")?;
    remove.commit(&store)?;

    let replayed = reduce(&read_writer_patches(&store, "main", "alice")?, None)?;
    assert!(!replayed.has_node("x"));
    Ok(())
}

#[test]
fn join_of_per_writer_states_matches_total_replay() -> Result<()> {
    let store = MemoryStore::new();

    let mut alice = PatchBuilder::new("main", "alice")?;
    alice.add_node("a")?;
    alice.commit(&store)?;
    let mut bob = PatchBuilder::new("main", "bob")?;
    bob.add_node("b")?;
    bob.commit(&store)?;

    let alice_patches = read_writer_patches(&store, "main", "alice")?;
    let bob_patches = read_writer_patches(&store, "main", "bob")?;

    let alice_state = reduce(&alice_patches, None)?;
    let bob_state = reduce(&bob_patches, None)?;
    let joined = join_states(&alice_state, &bob_state);

    let mut all = alice_patches;
    all.extend(bob_patches);
    let total = reduce(&total_order(all), None)?;

    assert_eq!(state_hash(&joined)?, state_hash(&total)?);
    Ok(())
}

#[test]
fn checkpoint_persists_through_the_store() -> Result<()> {
    let store = MemoryStore::new();

    let mut builder = PatchBuilder::new("main", "alice")?;
    builder.add_node("x")?;
    builder.set_property("x", "k", json!({"nested": true}))?;
    builder.commit(&store)?;

    let state = reduce(&read_writer_patches(&store, "main", "alice")?, None)?;

    // Store the checkpoint as a blob and restore it.
    let bytes = serialize_full(&state)?;
    let oid = store.write_blob(&bytes)?;
    let restored = deserialize_full(&store.read_blob(&oid)?)?;
    assert_eq!(restored, state);
    assert_eq!(state_hash(&restored)?, state_hash(&state)?);
    Ok(())
}

#[test]
fn writer_refs_are_isolated_per_graph() -> Result<()> {
    let store = MemoryStore::new();

    let mut main = PatchBuilder::new("main", "alice")?;
    main.add_node("x")?;
    main.commit(&store)?;

    let mut scratch = PatchBuilder::new("scratch", "alice")?;
    scratch.add_node("y")?;
    scratch.commit(&store)?;

    assert_ne!(writer_ref("main", "alice"), writer_ref("scratch", "alice"));
    let main_state = reduce(&read_writer_patches(&store, "main", "alice")?, None)?;
    assert!(main_state.has_node("x"));
    assert!(!main_state.has_node("y"));
    Ok(())
}
