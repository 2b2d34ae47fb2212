#![no_main]

// Arbitrary bytes either fail to decode or decode to a body that re-encodes to itself.

use libfuzzer_sys::fuzz_target;
use runtime_host::protocol::{Body, Message};

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = Body::decode(data) {
        let encoded = body.encode().expect("decoded body must encode");
        let again = Body::decode(&encoded).expect("re-encoded body must decode");
        assert_eq!(body, again);
    }
    if let Ok(message) = Message::decode(data) {
        let _ = message.into_result();
    }
});
