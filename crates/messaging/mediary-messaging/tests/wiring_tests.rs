//! End-to-end wiring tests: discovery in, running graph out.

use mediary_messaging::prelude::*;
use mediary_messaging::{async_trait, MessageStream};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct ItemSource(Vec<i64>);

#[async_trait]
impl Component for ItemSource {
    async fn produce(&self) -> MessagingResult<MessageStream> {
        let items: Vec<Message> = self.0.iter().copied().map(Message::from).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

struct AddTen;

#[async_trait]
impl Component for AddTen {
    async fn transform(&self, message: Message) -> MessagingResult<Message> {
        let n = message
            .payload
            .as_i64()
            .ok_or_else(|| MessagingError::InvalidInput("not a number".to_string()))?;
        Ok(Message::from(n + 10))
    }
}

struct Doubler;

#[async_trait]
impl Component for Doubler {
    async fn transform(&self, message: Message) -> MessagingResult<Message> {
        let n = message
            .payload
            .as_i64()
            .ok_or_else(|| MessagingError::InvalidInput("not a number".to_string()))?;
        Ok(Message::from(n * 2))
    }
}

struct Collector(Arc<CollectingConsumer>);

#[async_trait]
impl Component for Collector {
    async fn accept(&self, message: Message) -> MessagingResult<()> {
        self.0.accept(message).await
    }
}

fn name(s: &str) -> ChannelName {
    ChannelName::new(s).unwrap()
}

fn of(component: impl Component + 'static) -> Arc<dyn ComponentProvider> {
    Arc::new(StaticProvider::new(Arc::new(component)))
}

fn payloads_as_i64(collector: &CollectingConsumer) -> Vec<i64> {
    collector
        .snapshot()
        .into_iter()
        .map(|m| m.payload.as_i64().unwrap())
        .collect()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}

#[tokio::test]
async fn single_producer_auto_wires() {
    let collector = Arc::new(CollectingConsumer::new());
    let discovery = StaticDiscovery::new()
        .with_configuration(MediatorConfiguration::publisher(
            "numbers",
            name("A"),
            of(ItemSource(vec![1, 2, 3])),
        ))
        .with_configuration(MediatorConfiguration::subscriber(
            "sink",
            name("A"),
            of(Collector(Arc::clone(&collector))),
        ));

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::strict());
    manager.initialize_and_run(&discovery).await.unwrap();

    assert!(manager.mediator("numbers").unwrap().is_connected());
    assert!(manager.mediator("sink").unwrap().is_connected());

    settle().await;
    assert_eq!(payloads_as_i64(&collector), vec![1, 2, 3]);
}

#[tokio::test]
async fn ambiguous_fan_in_without_merge_policy_fails() {
    let collector = Arc::new(CollectingConsumer::new());
    let discovery = StaticDiscovery::new()
        .with_configuration(MediatorConfiguration::publisher(
            "first",
            name("B"),
            of(ItemSource(vec![1])),
        ))
        .with_configuration(MediatorConfiguration::publisher(
            "second",
            name("B"),
            of(ItemSource(vec![2])),
        ))
        .with_configuration(MediatorConfiguration::subscriber(
            "sink",
            name("B"),
            of(Collector(collector)),
        ));

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::lenient());
    let err = manager.initialize_and_run(&discovery).await.unwrap_err();

    match err {
        MessagingError::AmbiguousWiring { channel, candidates } => {
            assert_eq!(channel, name("B"));
            assert_eq!(candidates, 2);
        }
        other => panic!("expected ambiguous wiring, got {other}"),
    }
}

#[tokio::test]
async fn merge_fan_in_delivers_everything_once() {
    let collector = Arc::new(CollectingConsumer::new());
    let discovery = StaticDiscovery::new()
        .with_configuration(MediatorConfiguration::publisher(
            "tens",
            name("C"),
            of(ItemSource(vec![10, 11, 12])),
        ))
        .with_configuration(MediatorConfiguration::publisher(
            "twenties",
            name("C"),
            of(ItemSource(vec![20, 21])),
        ))
        .with_configuration(MediatorConfiguration::publisher(
            "thirties",
            name("C"),
            of(ItemSource(vec![30])),
        ))
        .with_configuration(
            MediatorConfiguration::subscriber("sink", name("C"), of(Collector(Arc::clone(&collector))))
                .with_merge_policy(MergePolicy::Merge),
        );

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::strict());
    manager.initialize_and_run(&discovery).await.unwrap();

    settle().await;
    let seen = payloads_as_i64(&collector);

    let mut sorted = seen.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![10, 11, 12, 20, 21, 30]);

    // No cross-source order is promised, but per-source order is.
    let tens: Vec<_> = seen.iter().copied().filter(|n| *n / 10 == 1).collect();
    let twenties: Vec<_> = seen.iter().copied().filter(|n| *n / 10 == 2).collect();
    assert_eq!(tens, vec![10, 11, 12]);
    assert_eq!(twenties, vec![20, 21]);
}

#[tokio::test]
async fn concat_fan_in_preserves_registration_order() {
    let collector = Arc::new(CollectingConsumer::new());
    let discovery = StaticDiscovery::new()
        .with_configuration(MediatorConfiguration::publisher(
            "head",
            name("D"),
            of(ItemSource(vec![1, 2, 3])),
        ))
        .with_configuration(MediatorConfiguration::publisher(
            "tail",
            name("D"),
            of(ItemSource(vec![4, 5])),
        ))
        .with_configuration(
            MediatorConfiguration::subscriber("sink", name("D"), of(Collector(Arc::clone(&collector))))
                .with_merge_policy(MergePolicy::Concat),
        );

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::strict());
    manager.initialize_and_run(&discovery).await.unwrap();

    settle().await;
    assert_eq!(payloads_as_i64(&collector), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn chained_mediators_resolve_regardless_of_discovery_order() {
    let collector = Arc::new(CollectingConsumer::new());
    // The downstream processor is discovered first; only the
    // fixed-point loop can connect it, on a later pass.
    let discovery = StaticDiscovery::new()
        .with_configuration(MediatorConfiguration::processor(
            "double",
            name("mid"),
            name("out"),
            of(Doubler),
        ))
        .with_configuration(MediatorConfiguration::processor(
            "add-ten",
            name("in"),
            name("mid"),
            of(AddTen),
        ))
        .with_configuration(MediatorConfiguration::publisher(
            "numbers",
            name("in"),
            of(ItemSource(vec![1, 2])),
        ))
        .with_configuration(MediatorConfiguration::subscriber(
            "sink",
            name("out"),
            of(Collector(Arc::clone(&collector))),
        ));

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::strict());
    manager.initialize_and_run(&discovery).await.unwrap();

    assert!(manager.mediator("double").unwrap().is_connected());
    assert!(manager.mediator("add-ten").unwrap().is_connected());

    settle().await;
    assert_eq!(payloads_as_i64(&collector), vec![22, 24]);
}

#[tokio::test]
async fn strict_mode_reports_unresolved_with_inventory() {
    let collector = Arc::new(CollectingConsumer::new());
    let discovery = StaticDiscovery::new()
        .with_configuration(MediatorConfiguration::publisher(
            "numbers",
            name("known"),
            of(ItemSource(vec![1])),
        ))
        .with_configuration(MediatorConfiguration::subscriber(
            "lonely",
            name("nowhere"),
            of(Collector(collector)),
        ));

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::strict());
    let err = manager.initialize_and_run(&discovery).await.unwrap_err();

    match err {
        MessagingError::UnresolvedWiring { mediators, inventory } => {
            // Each entry names the mediator and the channel it wanted.
            assert_eq!(mediators, vec!["lonely -> nowhere".to_string()]);
            assert!(inventory.publishers.contains(&name("known")));
            assert!(inventory.subscribers.contains(&name("nowhere")));
        }
        other => panic!("expected unresolved wiring, got {other}"),
    }
}

#[tokio::test]
async fn lenient_mode_runs_partially_wired() {
    let collector = Arc::new(CollectingConsumer::new());
    let discovery = StaticDiscovery::new()
        .with_configuration(MediatorConfiguration::publisher(
            "numbers",
            name("A"),
            of(ItemSource(vec![7])),
        ))
        .with_configuration(MediatorConfiguration::subscriber(
            "sink",
            name("A"),
            of(Collector(Arc::clone(&collector))),
        ))
        .with_configuration(MediatorConfiguration::subscriber(
            "lonely",
            name("nowhere"),
            of(Collector(Arc::new(CollectingConsumer::new()))),
        ));

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::lenient());
    manager.initialize_and_run(&discovery).await.unwrap();

    let lonely = manager.mediator("lonely").unwrap();
    assert!(!lonely.is_connected());
    assert!(!lonely.is_started());

    settle().await;
    assert_eq!(payloads_as_i64(&collector), vec![7]);
}

#[tokio::test]
async fn double_start_is_a_state_error() {
    let discovery = StaticDiscovery::new();
    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::strict());

    manager.initialize_and_run(&discovery).await.unwrap();
    assert!(matches!(
        manager.initialize_and_run(&discovery).await,
        Err(MessagingError::IllegalState(_))
    ));
}

#[tokio::test]
async fn failed_strict_resolution_pins_the_manager() {
    let collector = Arc::new(CollectingConsumer::new());
    let discovery = StaticDiscovery::new().with_configuration(
        MediatorConfiguration::subscriber("lonely", name("nowhere"), of(Collector(collector))),
    );

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::strict());
    assert!(manager.initialize_and_run(&discovery).await.is_err());
    assert!(matches!(
        manager.initialize_and_run(&discovery).await,
        Err(MessagingError::IllegalState(_))
    ));
}

#[tokio::test]
async fn invalid_configuration_fails_fast() {
    let mut broken =
        MediatorConfiguration::publisher("broken", name("out"), of(ItemSource(vec![1])));
    broken.incoming = Some(name("in"));
    let discovery = StaticDiscovery::new().with_configuration(broken);

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::lenient());
    assert!(matches!(
        manager.initialize_and_run(&discovery).await,
        Err(MessagingError::Configuration(_))
    ));
}

#[tokio::test]
async fn injected_consumers_fan_out_from_a_mediator_channel() {
    let first = Arc::new(CollectingConsumer::new());
    let second = Arc::new(CollectingConsumer::new());
    let discovery = StaticDiscovery::new().with_configuration(MediatorConfiguration::publisher(
        "numbers",
        name("A"),
        of(ItemSource(vec![1, 2])),
    ));

    let registry = Arc::new(ChannelRegistry::new());
    registry.register_consumer(name("A"), Arc::clone(&first) as Arc<dyn Consumer>);
    registry.register_consumer(name("A"), Arc::clone(&second) as Arc<dyn Consumer>);

    let mut manager = MediatorManager::new(Arc::clone(&registry), WiringConfig::strict());
    manager.initialize_and_run(&discovery).await.unwrap();

    settle().await;
    assert_eq!(payloads_as_i64(&first), vec![1, 2]);
    assert_eq!(payloads_as_i64(&second), vec![1, 2]);
    assert!(first.is_completed());
    assert!(second.is_completed());
}

#[tokio::test]
async fn injected_consumer_without_producer_is_unresolved() {
    let orphan = Arc::new(CollectingConsumer::new());
    let registry = Arc::new(ChannelRegistry::new());
    registry.register_consumer(name("ghost"), orphan);

    let mut manager = MediatorManager::new(registry, WiringConfig::strict());
    let err = manager
        .initialize_and_run(&StaticDiscovery::new())
        .await
        .unwrap_err();

    match err {
        MessagingError::UnresolvedWiring { mediators, .. } => {
            assert_eq!(mediators, vec!["injected-consumer:ghost".to_string()]);
        }
        other => panic!("expected unresolved wiring, got {other}"),
    }
}

#[tokio::test]
async fn contended_merge_channel_reports_the_loser_unresolved() {
    // Streams are consume-once, so two mediators sharing a merged
    // channel contend for it; the first in discovery order wins and
    // the other surfaces through the unresolved-wiring policy.
    let collector = Arc::new(CollectingConsumer::new());
    let discovery = StaticDiscovery::new()
        .with_configuration(MediatorConfiguration::publisher(
            "numbers",
            name("F"),
            of(ItemSource(vec![1, 2])),
        ))
        .with_configuration(
            MediatorConfiguration::subscriber("sink-a", name("F"), of(Collector(Arc::clone(&collector))))
                .with_merge_policy(MergePolicy::Merge),
        )
        .with_configuration(
            MediatorConfiguration::subscriber(
                "sink-b",
                name("F"),
                of(Collector(Arc::new(CollectingConsumer::new()))),
            )
            .with_merge_policy(MergePolicy::Merge),
        );

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::strict());
    let err = manager.initialize_and_run(&discovery).await.unwrap_err();

    match err {
        MessagingError::UnresolvedWiring { mediators, .. } => {
            assert_eq!(mediators, vec!["sink-b -> F".to_string()]);
        }
        other => panic!("expected unresolved wiring, got {other}"),
    }
    assert!(manager.mediator("sink-a").unwrap().is_connected());
    assert!(!manager.mediator("sink-b").unwrap().is_connected());
}

#[tokio::test]
async fn one_policy_takes_first_and_keeps_running() {
    let collector = Arc::new(CollectingConsumer::new());
    let discovery = StaticDiscovery::new()
        .with_configuration(MediatorConfiguration::publisher(
            "first",
            name("E"),
            of(ItemSource(vec![1, 2])),
        ))
        .with_configuration(MediatorConfiguration::publisher(
            "second",
            name("E"),
            of(ItemSource(vec![9])),
        ))
        .with_configuration(
            MediatorConfiguration::subscriber("sink", name("E"), of(Collector(Arc::clone(&collector))))
                .with_merge_policy(MergePolicy::One),
        );

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::strict());
    manager.initialize_and_run(&discovery).await.unwrap();

    settle().await;
    assert_eq!(payloads_as_i64(&collector), vec![1, 2]);
}

#[tokio::test]
async fn metadata_survives_the_pipeline() {
    let collector = Arc::new(CollectingConsumer::new());

    struct Tagged;

    #[async_trait]
    impl Component for Tagged {
        async fn produce(&self) -> MessagingResult<MessageStream> {
            let message = Message::new(json!("payload")).with_metadata("origin", "tagged");
            Ok(Box::pin(futures::stream::iter(vec![message])))
        }
    }

    let discovery = StaticDiscovery::new()
        .with_configuration(MediatorConfiguration::publisher("tagged", name("A"), of(Tagged)))
        .with_configuration(MediatorConfiguration::subscriber(
            "sink",
            name("A"),
            of(Collector(Arc::clone(&collector))),
        ));

    let registry = Arc::new(ChannelRegistry::new());
    let mut manager = MediatorManager::new(registry, WiringConfig::strict());
    manager.initialize_and_run(&discovery).await.unwrap();

    settle().await;
    let received = collector.snapshot();
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0].metadata.get("origin").map(String::as_str),
        Some("tagged")
    );
}
