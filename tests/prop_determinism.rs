use std::sync::Arc;

use proptest::prelude::*;
use runtime_host::commitment::BlockHeader;
use runtime_host::context::CallContext;
use runtime_host::protocol::{Block, Body, ConsensusBlock, ExecuteTxBatchRequest, ExecuteTxBatchResponse};
use runtime_host::storage::MemoryTreeProvider;
use runtime_host::{MockRuntime, Namespace, Runtime};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn previous_block(round: u64, timestamp: u64) -> BlockHeader {
    let mut header = BlockHeader::genesis(Namespace([0x42; 32]), timestamp);
    header.round = round;
    header
}

// Each run gets its own runtime and its own tree store.
fn execute_fresh(previous: &BlockHeader, inputs: &[Vec<u8>], in_msgs: &[Vec<u8>]) -> ExecuteTxBatchResponse {
    block_on(async {
        let rt = MockRuntime::new(previous.namespace).with_tree_provider(Arc::new(MemoryTreeProvider::new()));
        rt.start().await;
        let body = Body::ExecuteTxBatchRequest(ExecuteTxBatchRequest {
            consensus_block: ConsensusBlock { height: 1 },
            block: Block { header: previous.clone() },
            epoch: 0,
            max_messages: 0,
            inputs: inputs.to_vec(),
            in_msgs: in_msgs.to_vec(),
        });
        match rt.call(&CallContext::background(), body).await.unwrap() {
            Body::ExecuteTxBatchResponse(rsp) => rsp,
            other => panic!("unexpected response {}", other.method()),
        }
    })
}

fn distinct_inputs() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::hash_set(prop::collection::vec(any::<u8>(), 0..48), 0..12)
        .prop_map(|set| set.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Two independent executions of the same batch on the same block agree byte for byte.
    #[test]
    fn prop_execution_is_deterministic(
        round in 0u64..u64::MAX,
        timestamp in any::<u64>(),
        inputs in distinct_inputs(),
        in_msgs in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..3),
    ) {
        let previous = previous_block(round, timestamp);
        let first = execute_fresh(&previous, &inputs, &in_msgs);
        let second = execute_fresh(&previous, &inputs, &in_msgs);

        prop_assert_eq!(first.batch.header.encode(), second.batch.header.encode());
        prop_assert_eq!(first.batch.header.encoded_hash(), second.batch.header.encoded_hash());
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.batch.header.round, round + 1);
        prop_assert!(first.batch.header.follows(&previous));
    }

    /// The header never depends on the consensus timestamp except through the previous hash.
    #[test]
    fn prop_previous_hash_tracks_block_header(
        round in 0u64..1_000,
        ts_a in any::<u64>(),
        ts_b in any::<u64>(),
        inputs in distinct_inputs(),
    ) {
        prop_assume!(ts_a != ts_b);
        let a = execute_fresh(&previous_block(round, ts_a), &inputs, &[]);
        let b = execute_fresh(&previous_block(round, ts_b), &inputs, &[]);

        prop_assert_ne!(a.batch.header.previous_hash, b.batch.header.previous_hash);
        prop_assert_eq!(a.batch.header.input_root, b.batch.header.input_root);
        prop_assert_eq!(a.batch.header.io_root, b.batch.header.io_root);
    }
}
