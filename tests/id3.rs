//! End-to-end scenarios: two parties connected by the in-process transport,
//! secure gain computations pipelined through the controllers, and whole
//! trees induced by the recursive builder.

use std::sync::Arc;

use secure_id3::controller::{Error, InitiatorController, TerminalController};
use secure_id3::data::{MemoryDataLayer, Row};
use secure_id3::messages::ClassValue;
use secure_id3::paillier::KeyPair;
use secure_id3::transport::LocalLink;
use secure_id3::tree::{Attribute, Id3Node, SecureId3};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn row(pairs: &[(&str, &str)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Wires an initiator and a terminal party over a [`LocalLink`] and returns
/// the initiator controller.
fn connect(
    initiator_rows: Vec<Row>,
    terminal_rows: Vec<Row>,
    class: Attribute,
    terminal_class: Attribute,
) -> Arc<InitiatorController> {
    let keys = Arc::new(KeyPair::generate(256));
    let link = LocalLink::new();

    let initiator = Arc::new(InitiatorController::new(
        Arc::new(MemoryDataLayer::new(initiator_rows, class)),
        link.initiator_sender(),
        keys.clone(),
    ));
    let terminal = Arc::new(TerminalController::new(
        Arc::new(MemoryDataLayer::new(terminal_rows, terminal_class)),
        link.terminal_receiver(),
        keys.public_key().clone(),
    ));
    link.start(initiator.clone(), terminal);
    initiator
}

/// The two-party count distribution from the protocol's reference scenario:
/// party 1 holds 3 yes / 1 no for a=x and 0 / 2 for a=y; party 2 holds
/// 1 yes / 1 no for a=x and 2 yes / 0 no for a=y.
fn reference_partitions() -> (Vec<Row>, Vec<Row>) {
    let party_1 = vec![
        row(&[("a", "x"), ("c", "yes")]),
        row(&[("a", "x"), ("c", "yes")]),
        row(&[("a", "x"), ("c", "yes")]),
        row(&[("a", "x"), ("c", "no")]),
        row(&[("a", "y"), ("c", "no")]),
        row(&[("a", "y"), ("c", "no")]),
    ];
    let party_2 = vec![
        row(&[("a", "x"), ("c", "yes")]),
        row(&[("a", "x"), ("c", "no")]),
        row(&[("a", "y"), ("c", "yes")]),
        row(&[("a", "y"), ("c", "yes")]),
    ];
    (party_1, party_2)
}

#[tokio::test]
async fn gain_ratios_match_the_combined_counts() {
    init_tracing();
    let class = Attribute::new("c", ["yes", "no"]);
    let (party_1, party_2) = reference_partitions();
    let controller = connect(party_1, party_2, class.clone(), class);

    // a=x: combined yes = 4, no = 2; Z = 4² + 2² = 20, W = 6.
    let result = controller.compute("a", "x", &[]).await.expect("completes");
    assert_eq!(result.ratio, 20.0 / 6.0);
    assert_eq!(result.class_value, Some(ClassValue::from("yes")));

    // a=y: combined yes = 2, no = 2; Z = 8, W = 4.
    let result = controller.compute("a", "y", &[]).await.expect("completes");
    assert_eq!(result.ratio, 2.0);
}

#[tokio::test]
async fn repeated_computations_are_independent() {
    init_tracing();
    let class = Attribute::new("c", ["yes", "no"]);
    let (party_1, party_2) = reference_partitions();
    let controller = connect(party_1, party_2, class.clone(), class);

    // Issue both before awaiting either, so the two computations are in
    // flight concurrently under distinct ids.
    let first = controller.compute("a", "x", &[]);
    let second = controller.compute("a", "x", &[]);
    let (first, second) = tokio::join!(first, second);
    assert_eq!(first.expect("completes").ratio, 20.0 / 6.0);
    assert_eq!(second.expect("completes").ratio, 20.0 / 6.0);
}

#[tokio::test]
async fn unmatched_split_yields_ratio_zero() {
    init_tracing();
    let class = Attribute::new("c", ["yes", "no"]);
    let (party_1, party_2) = reference_partitions();
    let controller = connect(party_1, party_2, class.clone(), class);

    let result = controller.compute("a", "z", &[]).await.expect("completes");
    assert_eq!(result.ratio, 0.0);
    assert_eq!(result.class_value, None);
}

#[tokio::test]
async fn terminal_protocol_violation_fails_the_future() {
    init_tracing();
    let class = Attribute::new("c", ["yes", "no"]);
    // The terminal party enumerates a different class attribute, so every
    // count map it produces is missing the "no" class value.
    let terminal_class = Attribute::new("c", ["yes"]);
    let (party_1, party_2) = reference_partitions();
    let controller = connect(party_1, party_2, class, terminal_class);

    let err = controller
        .compute("a", "x", &[])
        .await
        .expect_err("terminal cannot answer");
    assert!(matches!(err, Error::Aborted { .. }), "got {err:?}");
}

#[tokio::test]
async fn perfectly_separating_attribute_yields_depth_one_tree() {
    init_tracing();
    let class = Attribute::new("c", ["yes", "no"]);
    // Attribute "a" separates the classes perfectly; "b" does not.
    let party_1 = vec![
        row(&[("a", "x"), ("b", "u"), ("c", "yes")]),
        row(&[("a", "x"), ("b", "v"), ("c", "yes")]),
        row(&[("a", "y"), ("b", "u"), ("c", "no")]),
    ];
    let party_2 = vec![
        row(&[("a", "x"), ("b", "u"), ("c", "yes")]),
        row(&[("a", "y"), ("b", "v"), ("c", "no")]),
        row(&[("a", "y"), ("b", "v"), ("c", "no")]),
    ];
    let controller = connect(party_1, party_2, class.clone(), class);

    let attributes = vec![
        Attribute::new("a", ["x", "y"]),
        Attribute::new("b", ["u", "v"]),
    ];
    let tree = SecureId3::new(controller)
        .run(&attributes, Vec::new())
        .await
        .expect("induction completes");

    assert_eq!(tree.label(), "a");
    assert_eq!(tree.depth(), 1);
    assert_eq!(tree.child("x"), Some(&Id3Node::new("yes")));
    assert_eq!(tree.child("y"), Some(&Id3Node::new("no")));
}

#[tokio::test]
async fn failed_subcomputation_aborts_the_run() {
    init_tracing();
    let class = Attribute::new("c", ["yes", "no"]);
    let terminal_class = Attribute::new("c", ["yes"]);
    let (party_1, party_2) = reference_partitions();
    let controller = connect(party_1, party_2, class, terminal_class);

    let attributes = vec![Attribute::new("a", ["x", "y"])];
    let err = SecureId3::new(controller)
        .run(&attributes, Vec::new())
        .await
        .expect_err("induction cannot complete");
    assert!(matches!(err, Error::Aborted { .. }), "got {err:?}");
}
