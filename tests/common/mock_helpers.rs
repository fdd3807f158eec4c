//! Mock construction helpers

use mockall::mock;
use rivulet::stream::{StreamError, Subscriber, Subscription, UNBOUNDED};

mock! {
    pub Sink {}

    impl Subscriber<i64> for Sink {
        fn on_subscribe(&mut self, subscription: Subscription);
        fn on_next(&mut self, value: i64);
        fn on_complete(&mut self);
        fn on_error(&mut self, error: StreamError);
    }
}

/// Mock sink that requests unbounded demand on subscribe
pub fn unbounded_sink() -> MockSink {
    let mut sink = MockSink::new();
    sink.expect_on_subscribe()
        .times(1)
        .returning(|subscription| subscription.request(UNBOUNDED));
    sink
}
