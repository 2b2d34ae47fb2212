#![no_main]

// Any batch of distinct inputs executes, releases its tree, and links to the previous block.

use std::collections::BTreeSet;
use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use runtime_host::commitment::BlockHeader;
use runtime_host::context::CallContext;
use runtime_host::protocol::{Block, Body, ConsensusBlock, ExecuteTxBatchRequest};
use runtime_host::storage::MemoryTreeProvider;
use runtime_host::{MockRuntime, Namespace, Runtime};

#[derive(Arbitrary, Debug)]
struct Batch {
    round: u32,
    timestamp: u64,
    inputs: Vec<Vec<u8>>,
}

fuzz_target!(|batch: Batch| {
    let inputs: Vec<Vec<u8>> = batch.inputs.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    let mut previous = BlockHeader::genesis(Namespace::default(), batch.timestamp);
    previous.round = u64::from(batch.round);

    let provider = Arc::new(MemoryTreeProvider::new());
    let rt = MockRuntime::new(Namespace::default()).with_tree_provider(provider.clone());
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

    let response = runtime.block_on(async {
        rt.start().await;
        let body = Body::ExecuteTxBatchRequest(ExecuteTxBatchRequest {
            consensus_block: ConsensusBlock::default(),
            block: Block { header: previous.clone() },
            epoch: 0,
            max_messages: 0,
            inputs: inputs.clone(),
            in_msgs: Vec::new(),
        });
        rt.call(&CallContext::background(), body).await
    });

    match response {
        Ok(Body::ExecuteTxBatchResponse(rsp)) => {
            assert!(rsp.batch.header.follows(&previous));
            assert_eq!(rsp.tx_hashes.len(), inputs.len());
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(provider.open_trees(), 0);
});
