use std::time::Duration;

use micro_coord::registry::DeregisterOptions;
use micro_coord::registry::LookupOptions;
use micro_coord::registry::Node;
use micro_coord::registry::RegisterOptions;
use micro_coord::registry::Service;
use micro_coord::registry::WatchOptions;
use micro_coord::Error;
use micro_coord::MemStore;
use micro_coord::Registry;
use tracing_test::traced_test;

use crate::common::registry;
use crate::common::within;

fn ttl(secs: u64) -> RegisterOptions {
    RegisterOptions::default().with_ttl(Duration::from_secs(secs))
}

/// Two processes of one service version register separately and are seen
/// as one merged service, in key order.
#[tokio::test]
#[traced_test]
async fn test_instances_merge_into_one_service() {
    let store = MemStore::new();
    let first = registry(&store);
    let second = registry(&store);

    let node1 = Node::new("greeter-1", "10.0.0.1:8080").with_metadata("zone", "a");
    let node2 = Node::new("greeter-2", "10.0.0.2:8080").with_metadata("zone", "b");
    first
        .register(&Service::new("greeter", "1.0.0").with_node(node1.clone()), ttl(15))
        .await
        .unwrap();
    second
        .register(&Service::new("greeter", "1.0.0").with_node(node2.clone()), ttl(15))
        .await
        .unwrap();
    first
        .register(&Service::new("billing", "2.1.0").with_node(Node::new("billing-1", "10.0.1.1:9000")), ttl(15))
        .await
        .unwrap();

    let services = first.get_service("greeter", LookupOptions::default()).await.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].version, "1.0.0");
    assert_eq!(services[0].nodes, vec![node1, node2]);

    let listed = second.list_services(LookupOptions::default()).await.unwrap();
    let names: Vec<_> = listed.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["billing", "greeter"]);
    assert_eq!(listed[1].nodes.len(), 2);
}

#[tokio::test]
async fn test_heartbeat_loop_renews_without_rewriting() {
    let store = MemStore::new();
    let registry = registry(&store);
    let service = Service::new("greeter", "1.0.0").with_node(Node::new("greeter-1", "10.0.0.1:8080"));

    for _ in 0..5 {
        registry.register(&service, ttl(15)).await.unwrap();
    }
    assert_eq!(store.put_count(), 1);

    let moved = Service::new("greeter", "1.0.0").with_node(Node::new("greeter-1", "10.0.0.9:8080"));
    registry.register(&moved, ttl(15)).await.unwrap();
    assert_eq!(store.put_count(), 2);

    let services = registry.get_service("greeter", LookupOptions::default()).await.unwrap();
    assert_eq!(services[0].nodes[0].address, "10.0.0.9:8080");
}

/// A lease that expires while the registrant is alive is replaced on the
/// next heartbeat, and watchers see the instance leave and come back.
#[tokio::test(start_paused = true)]
async fn test_expired_lease_is_replaced_on_next_heartbeat() {
    let store = MemStore::new();
    let registry = registry(&store);
    let service = Service::new("greeter", "1.0.0").with_node(Node::new("greeter-1", "10.0.0.1:8080"));
    let mut watcher = registry.watch(WatchOptions::service("greeter")).await.unwrap();

    registry.register(&service, ttl(10)).await.unwrap();
    let original = store.lease_of("/micro/registry/greeter/greeter-1").unwrap();
    assert!(within(watcher.next()).await.unwrap().is_create());

    tokio::time::advance(Duration::from_secs(11)).await;

    let gone = within(watcher.next()).await.unwrap();
    assert!(gone.is_delete());
    assert_eq!(gone.service.nodes[0].id, "greeter-1");
    assert!(matches!(
        registry.get_service("greeter", LookupOptions::default()).await,
        Err(Error::NotFound(_))
    ));

    registry.register(&service, ttl(10)).await.unwrap();
    let renewed = store.lease_of("/micro/registry/greeter/greeter-1").unwrap();
    assert_ne!(renewed, original);
    assert!(within(watcher.next()).await.unwrap().is_create());

    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn test_deregister_removes_instance_and_notifies_watchers() {
    let store = MemStore::new();
    let registry = registry(&store);
    let node1 = Node::new("greeter-1", "10.0.0.1:8080");
    let node2 = Node::new("greeter-2", "10.0.0.2:8080");
    let service = Service::new("greeter", "1.0.0")
        .with_node(node1.clone())
        .with_node(node2.clone());
    registry.register(&service, ttl(15)).await.unwrap();

    let mut watcher = registry.watch(WatchOptions::default()).await.unwrap();
    registry
        .deregister(
            &Service::new("greeter", "1.0.0").with_node(node1),
            DeregisterOptions::default(),
        )
        .await
        .unwrap();

    let left = within(watcher.next()).await.unwrap();
    assert!(left.is_delete());
    assert_eq!(left.service.nodes[0].id, "greeter-1");

    let services = registry.get_service("greeter", LookupOptions::default()).await.unwrap();
    assert_eq!(services[0].nodes, vec![node2]);

    watcher.stop().await.unwrap();
    assert!(matches!(watcher.next().await, Err(Error::WatcherStopped)));
}

#[tokio::test]
async fn test_empty_namespace() {
    let store = MemStore::new();
    let registry = registry(&store);

    assert!(registry.list_services(LookupOptions::default()).await.unwrap().is_empty());
    assert!(registry
        .get_service("greeter", LookupOptions::default())
        .await
        .unwrap_err()
        .is_not_found());
    assert!(matches!(
        registry.register(&Service::new("greeter", "1.0.0"), ttl(15)).await,
        Err(Error::InvalidArgument(_))
    ));
}
