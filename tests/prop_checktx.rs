use proptest::prelude::*;
use runtime_host::checktx::{
    evaluate_batch, CheckTxPolicy, SentinelPolicy, CHECKTX_FAIL_INPUT, CHECKTX_MODULE, SENTINEL_MODULE,
};

fn tx_input() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        1 => Just(CHECKTX_FAIL_INPUT.to_vec()),
        4 => prop::collection::vec(any::<u8>(), 0..64),
    ]
}

proptest! {
    /// Results for `[A, B]` and `[B, A]` match evaluating `A` and `B` alone.
    #[test]
    fn prop_checktx_is_independent(a in tx_input(), b in tx_input(), limit in prop::option::of(0usize..64)) {
        let policy = SentinelPolicy::with_max_tx_size(limit);
        let alone_a = evaluate_batch(&policy, &[a.clone()]);
        let alone_b = evaluate_batch(&policy, &[b.clone()]);

        let ab = evaluate_batch(&policy, &[a.clone(), b.clone()]);
        let mut ba = evaluate_batch(&policy, &[b, a]);
        ba.reverse();

        prop_assert_eq!(ab.len(), 2);
        prop_assert_eq!(&ab[0], &alone_a[0]);
        prop_assert_eq!(&ab[1], &alone_b[0]);
        prop_assert_eq!(ab, ba);
    }

    /// Only the sentinel input is rejected by the default policy, always with the same module and code.
    #[test]
    fn prop_sentinel_is_the_only_rejection(inputs in prop::collection::vec(tx_input(), 0..16)) {
        let policy = SentinelPolicy::new();
        let results = evaluate_batch(&policy, &inputs);
        prop_assert_eq!(results.len(), inputs.len());

        for (input, result) in inputs.iter().zip(&results) {
            if input.as_slice() == CHECKTX_FAIL_INPUT {
                prop_assert!(!result.is_success());
                prop_assert_eq!(result.error.module.as_str(), SENTINEL_MODULE);
                prop_assert_eq!(result.error.code, 1);
            } else {
                prop_assert!(result.is_success());
                prop_assert_eq!(result.error.code, 0);
            }
        }
    }

    /// The size limit rejects exactly the inputs over the limit, sentinel aside.
    #[test]
    fn prop_size_limit(input in prop::collection::vec(any::<u8>(), 0..64), limit in 0usize..64) {
        prop_assume!(input.as_slice() != CHECKTX_FAIL_INPUT);
        let result = SentinelPolicy::with_max_tx_size(Some(limit)).check(&input);
        if input.len() > limit {
            prop_assert_eq!(result.error.module.as_str(), CHECKTX_MODULE);
            prop_assert_eq!(result.error.code, 2);
        } else {
            prop_assert!(result.is_success());
        }
    }
}
