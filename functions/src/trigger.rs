use crate::config::QueueTriggerConfig;
use crate::errors::FunctionError;
use crate::handler::QueueFunction;
use crate::metrics_defs::{FUNCTION_DURATION, FUNCTION_INVOCATIONS};
use queue::{QueueReceiver, ReceivedMessage};
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

/// Pulls messages for one queue function and settles each delivery.
///
/// At most `max_concurrent_calls` invocations run at once. A message is
/// completed when the function returns `Ok` and abandoned when it fails or
/// times out, so the broker redelivers it or dead-letters it.
pub struct QueueTrigger {
    function: Arc<dyn QueueFunction>,
    receiver: Arc<dyn QueueReceiver>,
    concurrency: Arc<Semaphore>,
    receive_wait: Duration,
    function_timeout: Duration,
}

impl QueueTrigger {
    pub fn new(
        function: Arc<dyn QueueFunction>,
        receiver: Arc<dyn QueueReceiver>,
        config: &QueueTriggerConfig,
        function_timeout: Duration,
    ) -> Self {
        Self {
            function,
            receiver,
            concurrency: Arc::new(Semaphore::new(config.max_concurrent_calls)),
            receive_wait: config.receive_wait(),
            function_timeout,
        }
    }

    /// Runs until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            function = self.function.name(),
            queue = self.receiver.queue_name(),
            "queue trigger started"
        );

        loop {
            let Ok(permit) = self.concurrency.clone().acquire_owned().await else {
                return;
            };

            match self.receiver.receive(self.receive_wait).await {
                Ok(Some(received)) => {
                    let trigger = self.clone();
                    tokio::spawn(async move {
                        trigger.dispatch(received).await;
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        function = self.function.name(),
                        error = %e,
                        "failed to receive from queue"
                    );
                    tokio::time::sleep(RECEIVE_BACKOFF).await;
                }
            }
        }
    }

    async fn dispatch(&self, received: ReceivedMessage) {
        let ReceivedMessage {
            message,
            lock_token,
        } = received;
        let name = self.function.name();
        let span = tracing::info_span!(
            "invocation",
            function = name,
            invocation_id = %Uuid::new_v4(),
            message_id = %message.id,
        );

        async move {
            let start = Instant::now();
            let result = match tokio::time::timeout(
                self.function_timeout,
                self.function.invoke(&message),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(FunctionError::FunctionTimeout {
                    function: name.to_string(),
                    timeout_secs: self.function_timeout.as_secs(),
                }),
            };

            histogram!(FUNCTION_DURATION, "function" => name, "trigger" => "queue")
                .record(start.elapsed().as_secs_f64());

            let settled = match result {
                Ok(()) => {
                    counter!(FUNCTION_INVOCATIONS, "function" => name, "trigger" => "queue", "outcome" => "success")
                        .increment(1);
                    self.receiver.complete(lock_token).await
                }
                Err(e) => {
                    counter!(FUNCTION_INVOCATIONS, "function" => name, "trigger" => "queue", "outcome" => e.kind())
                        .increment(1);
                    tracing::error!(
                        error = %e,
                        delivery_count = message.delivery_count,
                        "Function failed, abandoning message"
                    );
                    self.receiver.abandon(lock_token).await
                }
            };

            if let Err(e) = settled {
                // The lock has most likely expired; the broker redelivers.
                tracing::warn!(error = %e, "failed to settle message");
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use async_trait::async_trait;
    use hyper::body::Bytes;
    use parking_lot::Mutex;
    use queue::config::BrokerSettings;
    use queue::{Broker, QueueClient, QueueMessage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` deliveries, then succeeds.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
        seen: Mutex<Vec<(Bytes, u32)>>,
    }

    impl Flaky {
        fn new(failures: usize) -> Self {
            Flaky {
                failures,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QueueFunction for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn invoke(&self, message: &QueueMessage) -> Result<()> {
            self.seen
                .lock()
                .push((message.body.clone(), message.delivery_count));
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(FunctionError::ConsumerFault("not yet".into()));
            }
            Ok(())
        }
    }

    fn trigger_config() -> QueueTriggerConfig {
        QueueTriggerConfig {
            max_concurrent_calls: 2,
            receive_wait_secs: 1,
        }
    }

    async fn wait_until_drained(broker: &Broker, queue: &str) {
        for _ in 0..100 {
            let stats = broker.stats(queue).unwrap();
            if stats.active == 0 && stats.locked == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("queue {queue} was not drained");
    }

    #[tokio::test]
    async fn test_completes_on_success() {
        let broker = Arc::new(Broker::new(BrokerSettings::default()));
        broker.send("jobs", Bytes::from("one")).unwrap();
        broker.send("jobs", Bytes::from("two")).unwrap();

        let function = Arc::new(Flaky::new(0));
        let trigger = Arc::new(QueueTrigger::new(
            function.clone(),
            Arc::new(QueueClient::in_process(broker.clone(), "jobs")),
            &trigger_config(),
            Duration::from_secs(5),
        ));
        let task = tokio::spawn(trigger.run());

        wait_until_drained(&broker, "jobs").await;
        task.abort();

        let mut bodies: Vec<_> = function.seen.lock().iter().map(|(b, _)| b.clone()).collect();
        bodies.sort();
        assert_eq!(bodies, vec![Bytes::from("one"), Bytes::from("two")]);
        assert!(broker.dead_letters("jobs").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandons_on_failure_and_redelivers() {
        let broker = Arc::new(Broker::new(BrokerSettings::default()));
        broker.send("jobs", Bytes::from("retry me")).unwrap();

        let function = Arc::new(Flaky::new(2));
        let trigger = Arc::new(QueueTrigger::new(
            function.clone(),
            Arc::new(QueueClient::in_process(broker.clone(), "jobs")),
            &trigger_config(),
            Duration::from_secs(5),
        ));
        let task = tokio::spawn(trigger.run());

        wait_until_drained(&broker, "jobs").await;
        task.abort();

        let deliveries: Vec<u32> = function.seen.lock().iter().map(|(_, d)| *d).collect();
        assert_eq!(deliveries, vec![1, 2, 3]);
        assert!(broker.dead_letters("jobs").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dead_letters_after_max_deliveries() {
        let broker = Arc::new(Broker::new(BrokerSettings {
            lock_duration_secs: 30,
            max_delivery_count: 2,
        }));
        broker.send("jobs", Bytes::from("poison")).unwrap();

        let function = Arc::new(Flaky::new(usize::MAX));
        let trigger = Arc::new(QueueTrigger::new(
            function.clone(),
            Arc::new(QueueClient::in_process(broker.clone(), "jobs")),
            &trigger_config(),
            Duration::from_secs(5),
        ));
        let task = tokio::spawn(trigger.run());

        wait_until_drained(&broker, "jobs").await;
        task.abort();

        assert_eq!(function.seen.lock().len(), 2);
        let dead = broker.dead_letters("jobs").unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, Bytes::from("poison"));
    }
}
