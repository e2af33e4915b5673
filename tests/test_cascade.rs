//! Integration tests for the resolution cascade
//!
//! The node and both explorers are replaced by in-memory sources that record every call,
//! so tier order, chunking and "no further calls" can be asserted directly.

use addr_balance_monitor::fallback_batch::BatchBalanceLookup;
use addr_balance_monitor::fallback_single::SingleBalanceLookup;
use addr_balance_monitor::orchestrator::ResolutionOrchestrator;
use addr_balance_monitor::primary_source::PrimarySource;
use addr_balance_monitor::settings::Fallback;
use addr_balance_monitor::source_error::SourceError;
use addr_balance_monitor::types::conversions::subunits_to_coin;
use addr_balance_monitor::types::{
    AddressRef, Descriptor, ResolutionMethod, ResolutionOutcome, UnspentRecord,
};
use addr_balance_monitor::utxo_attributor::SubstringAttributor;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn refs(addresses: &[&str]) -> Vec<AddressRef> {
    addresses
        .iter()
        .enumerate()
        .map(|(i, a)| AddressRef::new(i as i64 + 1, *a))
        .collect()
}

/// Full node stand-in. `None` means the node is unavailable.
#[derive(Default)]
struct MockNode {
    batch_records: Option<Vec<UnspentRecord>>,
    single_balance: Option<Decimal>,
    batch_calls: Mutex<Vec<Vec<String>>>,
    single_calls: Mutex<Vec<String>>,
}

impl MockNode {
    fn unavailable() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrimarySource for MockNode {
    async fn query_batch(&self, descriptors: &[Descriptor]) -> Result<Vec<UnspentRecord>, SourceError> {
        self.batch_calls
            .lock()
            .unwrap()
            .push(descriptors.iter().map(|d| d.as_str().to_string()).collect());
        self.batch_records
            .clone()
            .ok_or_else(|| SourceError::transport("node", "connection refused"))
    }

    async fn query_single(&self, descriptor: &Descriptor) -> Result<Decimal, SourceError> {
        self.single_calls
            .lock()
            .unwrap()
            .push(descriptor.as_str().to_string());
        self.single_balance
            .ok_or_else(|| SourceError::transport("node", "connection refused"))
    }
}

/// Multi-address explorer stand-in, balances in subunits like the wire format.
#[derive(Default)]
struct MockBatchExplorer {
    subunits: HashMap<String, i64>,
    calls: Mutex<Vec<Vec<String>>>,
    /// Chunks starting with this address answer late
    slow_chunk: Option<String>,
    /// First address of each chunk, in the order the answers came back
    completed: Mutex<Vec<String>>,
}

impl MockBatchExplorer {
    fn with(entries: &[(&str, i64)]) -> Self {
        Self {
            subunits: entries.iter().map(|(a, s)| (a.to_string(), *s)).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl BatchBalanceLookup for MockBatchExplorer {
    async fn lookup(&self, addresses: &[String]) -> Result<HashMap<String, Decimal>, SourceError> {
        self.calls.lock().unwrap().push(addresses.to_vec());
        if addresses.first() == self.slow_chunk.as_ref() {
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
        if let Some(first) = addresses.first() {
            self.completed.lock().unwrap().push(first.clone());
        }
        Ok(addresses
            .iter()
            .filter_map(|a| {
                let sats = self.subunits.get(a)?;
                Some((a.clone(), subunits_to_coin(*sats).ok()?))
            })
            .collect())
    }
}

#[derive(Default)]
struct MockSingleExplorer {
    subunits: HashMap<String, i64>,
    calls: Mutex<Vec<String>>,
}

impl MockSingleExplorer {
    fn with(entries: &[(&str, i64)]) -> Self {
        Self {
            subunits: entries.iter().map(|(a, s)| (a.to_string(), *s)).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SingleBalanceLookup for MockSingleExplorer {
    async fn lookup(&self, address: &str) -> Result<Decimal, SourceError> {
        self.calls.lock().unwrap().push(address.to_string());
        match self.subunits.get(address) {
            Some(sats) => subunits_to_coin(*sats)
                .map_err(|e| SourceError::protocol("single", e.to_string())),
            None => Err(SourceError::NotFound("single")),
        }
    }
}

struct Harness {
    node: Arc<MockNode>,
    batch: Arc<MockBatchExplorer>,
    single: Arc<MockSingleExplorer>,
    orchestrator: ResolutionOrchestrator,
}

fn harness(
    node: MockNode,
    batch: MockBatchExplorer,
    single: MockSingleExplorer,
    allow_fallback: bool,
) -> Harness {
    harness_with(
        node,
        batch,
        single,
        Fallback {
            allow_fallback,
            ..Fallback::default()
        },
    )
}

fn harness_with(
    node: MockNode,
    batch: MockBatchExplorer,
    single: MockSingleExplorer,
    config: Fallback,
) -> Harness {
    let node = Arc::new(node);
    let batch = Arc::new(batch);
    let single = Arc::new(single);
    let orchestrator = ResolutionOrchestrator::new(
        node.clone(),
        Arc::new(SubstringAttributor),
        batch.clone(),
        single.clone(),
        &config,
    );
    Harness {
        node,
        batch,
        single,
        orchestrator,
    }
}

#[tokio::test]
async fn test_node_batch_sums_records_per_address() {
    let h = harness(
        MockNode {
            batch_records: Some(vec![
                UnspentRecord::new("addr(A)#x", dec("0.5")),
                UnspentRecord::new("addr(B)#y", dec("1.2")),
                UnspentRecord::new("addr(A)#x2", dec("0.1")),
            ]),
            ..MockNode::default()
        },
        MockBatchExplorer::default(),
        MockSingleExplorer::default(),
        true,
    );

    let outcomes = h.orchestrator.resolve(&refs(&["A", "B"])).await;

    assert_eq!(
        outcomes[0].outcome,
        ResolutionOutcome::Resolved {
            balance: dec("0.6"),
            method: ResolutionMethod::PrimaryBatch
        }
    );
    assert_eq!(
        outcomes[1].outcome,
        ResolutionOutcome::Resolved {
            balance: dec("1.2"),
            method: ResolutionMethod::PrimaryBatch
        }
    );
    assert_eq!(
        *h.node.batch_calls.lock().unwrap(),
        vec![vec!["addr(A)".to_string(), "addr(B)".to_string()]]
    );
    assert!(h.batch.calls.lock().unwrap().is_empty());
    assert!(h.single.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_node_down_falls_through_both_explorers() {
    let h = harness(
        MockNode::unavailable(),
        MockBatchExplorer::with(&[("A", 50_000_000)]),
        MockSingleExplorer::with(&[("B", 30_000_000)]),
        true,
    );

    let outcomes = h.orchestrator.resolve(&refs(&["A", "B"])).await;

    assert_eq!(
        outcomes[0].outcome,
        ResolutionOutcome::Resolved {
            balance: dec("0.5"),
            method: ResolutionMethod::FallbackBatch
        }
    );
    assert_eq!(
        outcomes[1].outcome,
        ResolutionOutcome::Resolved {
            balance: dec("0.3"),
            method: ResolutionMethod::FallbackSingle
        }
    );
    assert_eq!(*h.single.calls.lock().unwrap(), vec!["B".to_string()]);
}

#[tokio::test]
async fn test_fallback_disabled_contacts_no_explorer() {
    let h = harness(
        MockNode::unavailable(),
        MockBatchExplorer::with(&[("A", 1), ("B", 1)]),
        MockSingleExplorer::with(&[("A", 1), ("B", 1)]),
        false,
    );

    let outcomes = h.orchestrator.resolve(&refs(&["A", "B"])).await;

    assert!(outcomes
        .iter()
        .all(|o| o.outcome == ResolutionOutcome::Unresolved));
    assert_eq!(h.node.batch_calls.lock().unwrap().len(), 1);
    assert!(h.batch.calls.lock().unwrap().is_empty());
    assert!(h.single.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_single_address_uses_single_query() {
    let h = harness(
        MockNode {
            single_balance: Some(dec("2.34")),
            ..MockNode::default()
        },
        MockBatchExplorer::default(),
        MockSingleExplorer::default(),
        true,
    );

    let outcome = h.orchestrator.resolve_one(&AddressRef::new(9, "A")).await;

    assert_eq!(outcome.address.id, 9);
    assert_eq!(
        outcome.outcome,
        ResolutionOutcome::Resolved {
            balance: dec("2.34"),
            method: ResolutionMethod::Primary
        }
    );
    assert_eq!(*h.node.single_calls.lock().unwrap(), vec!["addr(A)".to_string()]);
    assert!(h.node.batch_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_single_address_fallback_uses_one_element_chunk() {
    let h = harness(
        MockNode::unavailable(),
        MockBatchExplorer::default(),
        MockSingleExplorer::with(&[("A", 0)]),
        true,
    );

    let outcome = h.orchestrator.resolve_one(&AddressRef::new(1, "A")).await;

    assert_eq!(*h.batch.calls.lock().unwrap(), vec![vec!["A".to_string()]]);
    assert_eq!(
        outcome.outcome,
        ResolutionOutcome::Resolved {
            balance: Decimal::ZERO,
            method: ResolutionMethod::FallbackSingle
        }
    );
}

#[tokio::test]
async fn test_fallback_batch_chunks_in_order() {
    let addresses: Vec<String> = (0..120).map(|i| format!("addr{:03}", i)).collect();
    let inputs: Vec<&str> = addresses.iter().map(String::as_str).collect();
    let h = harness(
        MockNode::unavailable(),
        MockBatchExplorer::with(&inputs.iter().map(|a| (*a, 1_000)).collect::<Vec<_>>()),
        MockSingleExplorer::default(),
        true,
    );

    let outcomes = h.orchestrator.resolve(&refs(&inputs)).await;

    let calls = h.batch.calls.lock().unwrap();
    let sizes: Vec<usize> = calls.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![50, 50, 20]);
    assert_eq!(calls.concat(), addresses);
    assert!(outcomes
        .iter()
        .all(|o| o.outcome.method() == Some(ResolutionMethod::FallbackBatch)));
    assert!(h.single.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_every_address_gets_exactly_one_outcome() {
    let h = harness(
        MockNode::unavailable(),
        MockBatchExplorer::with(&[("B", 5)]),
        MockSingleExplorer::with(&[("C", 7)]),
        true,
    );
    let input = refs(&["A", "B", "C", "D"]);

    let first = h.orchestrator.resolve(&input).await;
    let second = h.orchestrator.resolve(&input).await;

    assert_eq!(first.len(), input.len());
    for (outcome, address) in first.iter().zip(&input) {
        assert_eq!(&outcome.address, address);
    }
    assert_eq!(first, second, "same responses must give the same outcomes");
    assert_eq!(first[0].outcome, ResolutionOutcome::Unresolved);
    assert_eq!(first[1].outcome.method(), Some(ResolutionMethod::FallbackBatch));
    assert_eq!(first[2].outcome.method(), Some(ResolutionMethod::FallbackSingle));
    assert_eq!(first[3].outcome, ResolutionOutcome::Unresolved);
}

#[tokio::test]
async fn test_empty_scan_resolves_everything_to_zero() {
    let h = harness(
        MockNode {
            batch_records: Some(Vec::new()),
            ..MockNode::default()
        },
        MockBatchExplorer::with(&[("A", 1)]),
        MockSingleExplorer::default(),
        true,
    );

    let outcomes = h.orchestrator.resolve(&refs(&["A", "B"])).await;

    for outcome in &outcomes {
        assert_eq!(
            outcome.outcome,
            ResolutionOutcome::Resolved {
                balance: Decimal::ZERO,
                method: ResolutionMethod::PrimaryBatch
            }
        );
    }
    assert!(h.batch.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_chunks_keep_attribution() {
    let addresses: Vec<String> = (0..120).map(|i| format!("a{:03}", i)).collect();
    let inputs: Vec<&str> = addresses.iter().map(String::as_str).collect();
    // every 7th address is unknown to the batch explorer
    let batch_known: Vec<(&str, i64)> = inputs
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 7 != 0)
        .map(|(i, a)| (*a, i as i64 + 1))
        .collect();
    let single_known: Vec<(&str, i64)> = inputs
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 7 == 0)
        .map(|(i, a)| (*a, 1_000_000 + i as i64))
        .collect();
    let h = harness_with(
        MockNode::unavailable(),
        MockBatchExplorer {
            slow_chunk: Some("a000".to_string()),
            ..MockBatchExplorer::with(&batch_known)
        },
        MockSingleExplorer::with(&single_known),
        Fallback {
            max_concurrent_requests: 4,
            ..Fallback::default()
        },
    );

    let outcomes = h.orchestrator.resolve(&refs(&inputs)).await;

    let calls = h.batch.calls.lock().unwrap();
    let sizes: Vec<usize> = calls.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![50, 50, 20]);
    assert_eq!(calls.concat(), addresses);
    assert_eq!(
        h.batch.completed.lock().unwrap().last().map(String::as_str),
        Some("a000"),
        "first chunk should answer last"
    );

    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.address.address, addresses[i]);
        let expected = if i % 7 == 0 {
            ResolutionOutcome::Resolved {
                balance: subunits_to_coin(1_000_000 + i as i64).unwrap(),
                method: ResolutionMethod::FallbackSingle,
            }
        } else {
            ResolutionOutcome::Resolved {
                balance: subunits_to_coin(i as i64 + 1).unwrap(),
                method: ResolutionMethod::FallbackBatch,
            }
        };
        assert_eq!(outcome.outcome, expected, "address {}", addresses[i]);
    }

    let leftovers: Vec<String> = addresses.iter().step_by(7).cloned().collect();
    assert_eq!(*h.single.calls.lock().unwrap(), leftovers);
}
