// 🏷️ Annotator - account identity and purpose for a batch of transactions
//
// Collector → Resolver → Distributor. The batch is only mutated after the
// registry lookup has succeeded, so any error leaves it unannotated.

use std::time::Duration;
use tracing::info;

use crate::collector::collect;
use crate::distributor::{distribute, AnnotationSummary};
use crate::error::AnnotateResult;
use crate::registry::{AccountRegistry, LookupContext};
use crate::resolver::resolve;
use crate::transaction::Transaction;

/// Annotate every record controlled by a known account
///
/// Issues exactly one registry lookup, holding each distinct control
/// program once, however many records share it.
pub fn annotate_txs<R>(
    registry: &R,
    ctx: &LookupContext,
    transactions: &mut [Transaction],
) -> AnnotateResult<AnnotationSummary>
where
    R: AccountRegistry + ?Sized,
{
    let collection = collect(transactions)?;
    let resolutions = resolve(registry, ctx, &collection.programs)?;
    let summary = distribute(transactions, &collection, &resolutions);

    info!(
        transactions = summary.transactions,
        programs = summary.programs,
        resolved = summary.programs_resolved,
        records = summary.records_annotated,
        outputs = summary.outputs_labelled,
        "annotated transactions"
    );

    Ok(summary)
}

/// Registry plus lookup settings, for repeated annotation calls
pub struct Annotator<R> {
    registry: R,
    lookup_timeout: Option<Duration>,
}

impl<R: AccountRegistry> Annotator<R> {
    pub fn new(registry: R) -> Self {
        Annotator {
            registry,
            lookup_timeout: None,
        }
    }

    /// Fail lookups that take longer than `timeout`
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Annotate with a fresh context built from the configured timeout
    pub fn annotate(&self, transactions: &mut [Transaction]) -> AnnotateResult<AnnotationSummary> {
        let ctx = match self.lookup_timeout {
            Some(timeout) => LookupContext::with_timeout(timeout),
            None => LookupContext::background(),
        };
        self.annotate_with(&ctx, transactions)
    }

    /// Annotate under a caller-supplied context
    pub fn annotate_with(
        &self,
        ctx: &LookupContext,
        transactions: &mut [Transaction],
    ) -> AnnotateResult<AnnotationSummary> {
        annotate_txs(&self.registry, ctx, transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AnnotateError, RegistryError};
    use crate::registry::{MemoryRegistry, SqliteRegistry};
    use crate::transaction::{transactions_from_json, Purpose, TxInput, TxOutput};
    use proptest::prelude::*;
    use serde_json::json;

    fn registry_with_bob() -> MemoryRegistry {
        let registry = MemoryRegistry::new();
        registry.register_account("acct1", Some("bob"), None);
        registry.add_control_program("acct1", &[0xaa], false);
        registry
    }

    #[test]
    fn test_two_transaction_scenario() {
        let registry = registry_with_bob();
        let mut txs = vec![
            Transaction::new(vec![TxInput::issuance()], vec![TxOutput::to_program("aa")]),
            Transaction::new(
                vec![],
                vec![TxOutput::to_program("aa"), TxOutput::to_program("bb")],
            ),
        ];

        annotate_txs(&registry, &LookupContext::background(), &mut txs).unwrap();

        let first = &txs[0].outputs[0];
        assert_eq!(first.account_id.as_deref(), Some("acct1"));
        assert_eq!(first.account_alias.as_deref(), Some("bob"));
        assert_eq!(first.purpose, Some(Purpose::Receive));
        assert_eq!(txs[0].inputs[0], TxInput::issuance());

        assert_eq!(&txs[1].outputs[0], first);
        assert_eq!(txs[1].outputs[1], TxOutput::to_program("bb"));

        println!("✅ Two-transaction annotation scenario PASSED");
    }

    #[test]
    fn test_hundred_outputs_three_programs_one_lookup() {
        let registry = registry_with_bob();
        let programs = ["aa", "bb", "cc"];
        let outputs: Vec<TxOutput> = (0..100)
            .map(|i| TxOutput::to_program(programs[i % 3]))
            .collect();
        let mut txs = vec![Transaction::new(vec![], outputs)];

        let summary = annotate_txs(&registry, &LookupContext::background(), &mut txs).unwrap();

        let lookups = registry.lookups();
        assert_eq!(lookups.len(), 1);
        assert_eq!(lookups[0].len(), 3);
        assert_eq!(summary.programs, 3);
        assert_eq!(summary.programs_resolved, 1);
        assert_eq!(summary.programs_unknown(), 2);
        assert_eq!(summary.records_annotated, 34);
    }

    #[test]
    fn test_change_program_gets_change_purpose() {
        let registry = registry_with_bob();
        registry.add_control_program("acct1", &[0xcc], true);
        let mut txs = vec![Transaction::new(
            vec![TxInput::spending("aa")],
            vec![TxOutput::to_program("cc"), TxOutput::to_program("aa")],
        )];

        annotate_txs(&registry, &LookupContext::background(), &mut txs).unwrap();

        assert_eq!(txs[0].outputs[0].purpose, Some(Purpose::Change));
        assert_eq!(txs[0].outputs[1].purpose, Some(Purpose::Receive));
        assert_eq!(txs[0].inputs[0].account_id.as_deref(), Some("acct1"));
    }

    #[test]
    fn test_malformed_record_leaves_batch_untouched() {
        let registry = registry_with_bob();
        let mut txs = vec![
            Transaction::new(vec![], vec![TxOutput::to_program("aa")]),
            Transaction::new(vec![TxInput::spending("not-hex")], vec![]),
        ];
        let before = txs.clone();

        let err = annotate_txs(&registry, &LookupContext::background(), &mut txs).unwrap_err();

        assert!(err.is_malformed());
        assert_eq!(txs, before);
        assert_eq!(registry.lookup_count(), 0);
    }

    #[test]
    fn test_registry_failure_propagates_and_leaves_batch_untouched() {
        let registry = registry_with_bob();
        registry.set_unavailable(Some("connection reset"));
        let mut txs = vec![Transaction::new(vec![], vec![TxOutput::to_program("aa")])];
        let before = txs.clone();

        let err = annotate_txs(&registry, &LookupContext::background(), &mut txs).unwrap_err();

        assert!(matches!(
            err,
            AnnotateError::Registry(RegistryError::Unavailable(ref reason)) if reason == "connection reset"
        ));
        assert_eq!(txs, before);
    }

    #[test]
    fn test_corrupt_tags_leave_batch_untouched() {
        let registry = MemoryRegistry::new();
        registry.register_account("acct1", None, Some(b"[broken"));
        registry.add_control_program("acct1", &[0xaa], false);
        let mut txs = vec![Transaction::new(vec![], vec![TxOutput::to_program("aa")])];
        let before = txs.clone();

        let err = annotate_txs(&registry, &LookupContext::background(), &mut txs).unwrap_err();

        assert!(matches!(err, AnnotateError::Registry(RegistryError::CorruptTags { .. })));
        assert_eq!(txs, before);
    }

    #[test]
    fn test_cancelled_context_fails_call() {
        let annotator = Annotator::new(registry_with_bob());
        let ctx = LookupContext::background();
        ctx.cancel_handle().cancel();
        let mut txs = vec![Transaction::new(vec![], vec![TxOutput::to_program("aa")])];

        let err = annotator.annotate_with(&ctx, &mut txs).unwrap_err();

        assert!(matches!(err, AnnotateError::Registry(RegistryError::Cancelled)));
        assert!(!txs[0].outputs[0].has_account());
    }

    #[test]
    fn test_cancel_during_sqlite_lookup_leaves_batch_unannotated() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        registry.upsert_account("acct1", Some("bob"), None).unwrap();
        registry.add_control_program("acct1", &[0xaa], false).unwrap();

        let mut outputs: Vec<TxOutput> = (0..300_000u64)
            .map(|i| TxOutput::to_program(&format!("{:016x}", i)))
            .collect();
        outputs.push(TxOutput::to_program("aa"));
        let mut txs = vec![Transaction::new(vec![TxInput::spending("aa")], outputs)];
        let before = txs.clone();

        let ctx = LookupContext::background();
        let handle = ctx.cancel_handle();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            handle.cancel();
        });

        let err = annotate_txs(&registry, &ctx, &mut txs).unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, AnnotateError::Registry(RegistryError::Cancelled)));
        assert_eq!(txs, before);
        assert!(txs[0].outputs.iter().all(|output| !output.has_account()));
        assert!(!txs[0].inputs[0].has_account());
    }

    #[test]
    fn test_lookup_timeout_on_sqlite_leaves_batch_unannotated() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        registry.upsert_account("acct1", Some("bob"), None).unwrap();
        registry.add_control_program("acct1", &[0xaa], false).unwrap();

        let mut outputs: Vec<TxOutput> = (0..300_000u64)
            .map(|i| TxOutput::to_program(&format!("{:016x}", i)))
            .collect();
        outputs.push(TxOutput::to_program("aa"));
        let mut txs = vec![Transaction::new(vec![], outputs)];

        let annotator = Annotator::new(registry).with_lookup_timeout(Duration::from_millis(5));
        let err = annotator.annotate(&mut txs).unwrap_err();

        assert!(matches!(err, AnnotateError::Registry(RegistryError::DeadlineExceeded)));
        assert!(txs[0].outputs.iter().all(|output| output.purpose.is_none() && !output.has_account()));
    }

    #[test]
    fn test_empty_batch_still_succeeds() {
        let annotator = Annotator::new(registry_with_bob()).with_lookup_timeout(Duration::from_secs(5));
        let mut txs: Vec<Transaction> = Vec::new();

        let summary = annotator.annotate(&mut txs).unwrap();

        assert_eq!(summary, AnnotationSummary::default());
        assert_eq!(annotator.registry().lookup_count(), 1);
    }

    #[test]
    fn test_annotate_against_sqlite_registry() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        registry
            .upsert_account("acct1", Some("bob"), Some(br#"{"desk":"fx"}"#))
            .unwrap();
        registry.add_control_program("acct1", &[0xaa], false).unwrap();
        registry.add_control_program("acct1", &[0xac], true).unwrap();

        let mut txs = transactions_from_json(json!([
            {
                "id": "tx1",
                "inputs": [{"asset_id": "usd", "amount": 10}],
                "outputs": [{"control_program": "aa", "amount": 7}, {"control_program": "ac", "amount": 3}]
            },
            {
                "id": "tx2",
                "inputs": [{"control_program": "ac", "amount": 3}],
                "outputs": [{"control_program": "ee", "amount": 3}]
            }
        ]))
        .unwrap();

        let annotator = Annotator::new(registry);
        let summary = annotator.annotate(&mut txs).unwrap();

        assert_eq!(summary.programs, 3);
        assert_eq!(summary.programs_resolved, 2);

        let value = serde_json::to_value(&txs).unwrap();
        assert_eq!(
            value,
            json!([
                {
                    "id": "tx1",
                    "inputs": [{"asset_id": "usd", "amount": 10}],
                    "outputs": [
                        {"control_program": "aa", "amount": 7, "account_id": "acct1",
                         "account_alias": "bob", "account_tags": {"desk": "fx"}, "purpose": "receive"},
                        {"control_program": "ac", "amount": 3, "account_id": "acct1",
                         "account_alias": "bob", "account_tags": {"desk": "fx"}, "purpose": "change"}
                    ]
                },
                {
                    "id": "tx2",
                    "inputs": [{"control_program": "ac", "amount": 3, "account_id": "acct1",
                                "account_alias": "bob", "account_tags": {"desk": "fx"}}],
                    "outputs": [{"control_program": "ee", "amount": 3}]
                }
            ])
        );
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    fn batch_strategy() -> impl Strategy<Value = Vec<Transaction>> {
        let program = prop_oneof![
            Just(None::<String>),
            (0u8..6).prop_map(|b| Some(hex::encode([b]))),
        ];
        let input = program.clone().prop_map(|p| TxInput {
            control_program: p,
            ..Default::default()
        });
        let output = program.prop_map(|p| TxOutput {
            control_program: p,
            ..Default::default()
        });
        let tx = (
            prop::collection::vec(input, 0..4),
            prop::collection::vec(output, 0..4),
        )
            .prop_map(|(inputs, outputs)| Transaction::new(inputs, outputs));
        prop::collection::vec(tx, 0..8)
    }

    fn seeded_registry() -> MemoryRegistry {
        let registry = MemoryRegistry::new();
        registry.register_account("even", Some("evens"), Some(br#"{"parity":0}"#));
        registry.register_account("odd", None, None);
        for b in 0u8..4 {
            let owner = if b % 2 == 0 { "even" } else { "odd" };
            registry.add_control_program(owner, &[b], b >= 2);
        }
        registry
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn annotation_is_idempotent(batch in batch_strategy()) {
            let registry = seeded_registry();
            let ctx = LookupContext::background();

            let mut once = batch.clone();
            annotate_txs(&registry, &ctx, &mut once).unwrap();
            let mut twice = once.clone();
            annotate_txs(&registry, &ctx, &mut twice).unwrap();

            prop_assert_eq!(once, twice);
        }

        #[test]
        fn identity_is_a_function_of_control_program(batch in batch_strategy()) {
            let registry = seeded_registry();
            let mut txs = batch;
            annotate_txs(&registry, &LookupContext::background(), &mut txs).unwrap();

            let mut seen = std::collections::HashMap::new();
            for tx in &txs {
                let records = tx
                    .inputs
                    .iter()
                    .map(|i| (&i.control_program, (&i.account_id, &i.account_alias, &i.account_tags)))
                    .chain(tx.outputs.iter().map(|o| {
                        (&o.control_program, (&o.account_id, &o.account_alias, &o.account_tags))
                    }));
                for (program, identity) in records {
                    let Some(program) = program else {
                        prop_assert_eq!(identity, (&None, &None, &None));
                        continue;
                    };
                    let previous = seen.entry(program.clone()).or_insert(identity);
                    prop_assert_eq!(*previous, identity);
                }
            }
        }

        #[test]
        fn lookup_keys_are_distinct_programs(batch in batch_strategy()) {
            let registry = seeded_registry();
            let mut txs = batch.clone();
            annotate_txs(&registry, &LookupContext::background(), &mut txs).unwrap();

            let distinct: std::collections::HashSet<&String> = batch
                .iter()
                .flat_map(|tx| {
                    tx.inputs
                        .iter()
                        .filter_map(|i| i.control_program.as_ref())
                        .chain(tx.outputs.iter().filter_map(|o| o.control_program.as_ref()))
                })
                .collect();

            let lookups = registry.lookups();
            prop_assert_eq!(lookups.len(), 1);
            prop_assert_eq!(lookups[0].len(), distinct.len());
        }

        #[test]
        fn purpose_only_on_known_outputs(batch in batch_strategy()) {
            let registry = seeded_registry();
            let mut txs = batch;
            annotate_txs(&registry, &LookupContext::background(), &mut txs).unwrap();

            for tx in &txs {
                for output in &tx.outputs {
                    let known = output
                        .control_program
                        .as_deref()
                        .and_then(|p| hex::decode(p).ok())
                        .map_or(false, |bytes| bytes[0] < 4);
                    prop_assert_eq!(output.purpose.is_some(), known);
                    prop_assert_eq!(output.account_id.is_some(), known);
                }
            }
        }
    }
}
