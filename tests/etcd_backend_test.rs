//! etcd 后端集成测试
//!
//! 这些测试需要运行中的 etcd 服务器实例。
//! 默认情况下，测试会被忽略，需要使用 `cargo test --test etcd_backend_test -- --ignored` 运行。
//!
//! 启动 etcd 服务器：
//! ```bash
//! docker run -d --name etcd-test -p 2379:2379 -p 2380:2380 \
//!   quay.io/coreos/etcd:v3.5.9 \
//!   etcd --advertise-client-urls=http://127.0.0.1:2379 \
//!        --listen-client-urls=http://0.0.0.0:2379
//! ```

mod common;

use common::RecordingConn;
use denny_naming::naming::resolver::ResolverBuilder;
use denny_naming::{
    BackendType, BuildOptions, DialOptions, EtcdRegistry, NamingConfig, NamingFactory, PREFIX,
    Registrar, Registry, Target, dial, service_key,
};
use tokio::time::{Duration, sleep};

/// etcd 服务器地址，多个地址以 `;` 分隔
/// 可以通过环境变量 ETCD_ENDPOINTS 覆盖，默认为 127.0.0.1:2379
fn etcd_endpoints() -> String {
    std::env::var("ETCD_ENDPOINTS").unwrap_or_else(|_| "127.0.0.1:2379".to_string())
}

async fn read_key(registry: &EtcdRegistry, key: &str) -> Option<String> {
    let mut client = registry.client();
    let resp = client.get(key, None).await.unwrap();
    resp.kvs().first().map(|kv| kv.value_str().unwrap().to_string())
}

#[tokio::test]
#[ignore]
async fn test_register_renew_and_unregister() {
    let registry = EtcdRegistry::new(&etcd_endpoints(), "demo-etcd-ab").await.unwrap();
    let key = service_key("demo-etcd-ab", "10.0.0.1:9000");
    assert_eq!(key, "/_DENNY_/demo-etcd-ab/10.0.0.1:9000");

    registry.register("10.0.0.1:9000", 5).await.unwrap();
    assert_eq!(read_key(&registry, &key).await.as_deref(), Some("10.0.0.1:9000"));

    // 超过一个 TTL 后仍然存在
    sleep(Duration::from_secs(6)).await;
    assert_eq!(read_key(&registry, &key).await.as_deref(), Some("10.0.0.1:9000"));

    registry.unregister("10.0.0.1:9000").await.unwrap();
    assert_eq!(read_key(&registry, &key).await, None);

    // 续期任务已经停止，不会重新写入
    sleep(Duration::from_secs(6)).await;
    assert_eq!(read_key(&registry, &key).await, None);
}

#[tokio::test]
#[ignore]
async fn test_registration_restored_after_external_delete() {
    let registry = EtcdRegistry::new(&etcd_endpoints(), "demo-etcd-restore").await.unwrap();
    let key = service_key("demo-etcd-restore", "10.0.0.9:9000");

    registry.register("10.0.0.9:9000", 2).await.unwrap();
    let mut client = registry.client();
    client.delete(key.as_str(), None).await.unwrap();
    assert_eq!(read_key(&registry, &key).await, None);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(read_key(&registry, &key).await.as_deref(), Some("10.0.0.9:9000"));

    registry.unregister("10.0.0.9:9000").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_resolver_converges() {
    let service = "demo-etcd-cde";
    let registry = EtcdRegistry::new(&etcd_endpoints(), service).await.unwrap();
    registry.register("10.0.0.1:9000", 5).await.unwrap();
    registry.register("10.0.0.2:9000", 5).await.unwrap();

    let conn = RecordingConn::new();
    let mut resolver = registry
        .build(Target::new(PREFIX, service), conn.clone(), BuildOptions::default())
        .await
        .unwrap();
    assert_eq!(conn.push_count(), 1);
    assert!(conn.wait_for(&["10.0.0.1:9000", "10.0.0.2:9000"], Duration::from_secs(1)).await);

    registry.register("10.0.0.3:9000", 5).await.unwrap();
    assert!(
        conn.wait_for(
            &["10.0.0.1:9000", "10.0.0.2:9000", "10.0.0.3:9000"],
            Duration::from_secs(5)
        )
        .await
    );

    registry.unregister("10.0.0.2:9000").await.unwrap();
    assert!(conn.wait_for(&["10.0.0.1:9000", "10.0.0.3:9000"], Duration::from_secs(5)).await);

    // 强制刷新不会产生重复推送
    let pushes = conn.push_count();
    resolver.resolve_now(Default::default());
    sleep(Duration::from_millis(500)).await;
    assert_eq!(conn.push_count(), pushes);

    resolver.close().await;
    registry.unregister("10.0.0.1:9000").await.unwrap();
    registry.unregister("10.0.0.3:9000").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_concurrent_registrants() {
    let service = "demo-etcd-p5";
    let first = EtcdRegistry::new(&etcd_endpoints(), service).await.unwrap();
    let second = EtcdRegistry::new(&etcd_endpoints(), service).await.unwrap();

    first.register("10.0.1.1:9000", 5).await.unwrap();
    second.register("10.0.1.2:9000", 5).await.unwrap();

    assert!(read_key(&first, &service_key(service, "10.0.1.1:9000")).await.is_some());
    assert!(read_key(&first, &service_key(service, "10.0.1.2:9000")).await.is_some());

    first.unregister("10.0.1.1:9000").await.unwrap();
    assert!(read_key(&first, &service_key(service, "10.0.1.2:9000")).await.is_some());
    second.unregister("10.0.1.2:9000").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_factory_and_dial() {
    let config = NamingConfig::new(
        BackendType::Etcd,
        NamingConfig::parse_endpoints(&etcd_endpoints()),
        "demo-etcd-dial",
    )
    .with_ttl(5)
    .with_advertise_address("127.0.0.1:50051");

    let registry = NamingFactory::create_resolver(&config).await.unwrap();
    assert_eq!(registry.svc_name(), "_DENNY_:///demo-etcd-dial");
    registry.register("127.0.0.1:50051", config.ttl_secs).await.unwrap();

    let client = dial(&registry.svc_name(), DialOptions::default()).await.unwrap();
    assert_eq!(client.addresses().await.len(), 1);
    assert!(client.channel().await.is_ok());

    client.close().await;
    registry.unregister("127.0.0.1:50051").await.unwrap();
}
