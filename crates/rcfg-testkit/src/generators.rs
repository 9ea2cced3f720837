//! Proptest generators for property-based testing.

use proptest::prelude::*;

use rcfg_core::{Client, Product};

/// Generate a product name from a small alphabet so sets overlap.
pub fn product() -> impl Strategy<Value = Product> {
    prop_oneof![
        Just(Product::new("APM_SAMPLING")),
        Just(Product::new("ASM_DD")),
        Just(Product::new("LIVE_DEBUGGING")),
        "[A-Z][A-Z_]{0,15}".prop_map(Product::new),
    ]
}

/// Generate a client id from a small pool, so ids repeat.
pub fn client_id() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|n| format!("client-{n}"))
}

/// Generate a client with up to four products.
pub fn client() -> impl Strategy<Value = Client> {
    (client_id(), prop::collection::btree_set(product(), 0..4))
        .prop_map(|(id, products)| Client { id, products })
}

/// Generate a timestamp in Unix milliseconds within a one hour window.
pub fn timestamp() -> impl Strategy<Value = i64> {
    1_700_000_000_000i64..1_700_003_600_000
}

/// A `seen` event: a client observed at a time.
#[derive(Debug, Clone)]
pub struct SeenEvent {
    pub client: Client,
    pub at: i64,
}

impl Arbitrary for SeenEvent {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (client(), timestamp())
            .prop_map(|(client, at)| SeenEvent { client, at })
            .boxed()
    }
}
