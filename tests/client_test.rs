//! 客户端负载均衡测试

mod common;

use common::StaticBuilder;
use denny_naming::client::{DiscoverConn, Picker};
use denny_naming::naming::resolver::{self, ClientConn, State};
use denny_naming::{
    Address, DEFAULT_BALANCING_POLICY, DialOptions, LoadBalancingPolicy, NamingError, ServiceConfig,
    default_balance_policy, dial,
};
use futures::StreamExt;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tower::discover::Change;

fn state(addrs: &[&str]) -> State {
    State::new(addrs.iter().map(|a| Address::from(*a)).collect())
}

fn new_picker(policy: LoadBalancingPolicy) -> Picker {
    Picker::new(policy, "_DENNY_:///demo", Duration::from_secs(1))
}

#[test]
fn test_default_balance_policy() {
    assert_eq!(DEFAULT_BALANCING_POLICY, r#"{"loadBalancingPolicy":"round_robin"}"#);
    assert_eq!(
        default_balance_policy().load_balancing_policy,
        LoadBalancingPolicy::RoundRobin
    );
    assert_eq!(default_balance_policy().to_json().unwrap(), DEFAULT_BALANCING_POLICY);
}

#[test]
fn test_service_config_parse() {
    let config = ServiceConfig::parse(r#"{"loadBalancingPolicy":"pick_first"}"#).unwrap();
    assert_eq!(config.load_balancing_policy, LoadBalancingPolicy::PickFirst);

    let config = ServiceConfig::parse(r#"{"loadBalancingPolicy":"p2c"}"#).unwrap();
    assert_eq!(config.load_balancing_policy, LoadBalancingPolicy::P2c);

    let config = ServiceConfig::parse("{}").unwrap();
    assert_eq!(config.load_balancing_policy, LoadBalancingPolicy::RoundRobin);

    let result = ServiceConfig::parse(r#"{"loadBalancingPolicy":"weighted"}"#);
    assert!(matches!(result, Err(NamingError::Json(_))));
}

#[tokio::test]
async fn test_picker_round_robin() {
    let picker = new_picker(LoadBalancingPolicy::RoundRobin);
    assert_ok!(picker.update_state(state(&["a:1", "b:1", "c:1"])).await);

    let picked: Vec<String> = (0..6)
        .map(|_| picker.pick().unwrap().0.addr)
        .collect();
    assert_eq!(picked, vec!["a:1", "b:1", "c:1", "a:1", "b:1", "c:1"]);
}

#[tokio::test]
async fn test_picker_pick_first() {
    let picker = new_picker(LoadBalancingPolicy::PickFirst);
    assert_ok!(picker.update_state(state(&["a:1", "b:1"])).await);

    for _ in 0..3 {
        assert_eq!(picker.pick().unwrap().0, Address::from("a:1"));
    }
}

#[tokio::test]
async fn test_picker_replaces_whole_set() {
    let picker = new_picker(LoadBalancingPolicy::RoundRobin);
    assert_ok!(picker.update_state(state(&["a:1", "b:1"])).await);
    assert_ok!(picker.update_state(state(&["c:1", "c:1"])).await);

    assert_eq!(picker.addresses(), vec![Address::from("c:1")]);
    assert_eq!(picker.pick().unwrap().0, Address::from("c:1"));
}

#[tokio::test]
async fn test_picker_empty_set() {
    let picker = new_picker(LoadBalancingPolicy::RoundRobin);
    assert!(matches!(picker.pick(), Err(NamingError::NoAvailableAddress(_))));

    assert_ok!(picker.update_state(state(&["a:1"])).await);
    assert_ok!(picker.update_state(state(&[])).await);
    assert!(matches!(picker.pick(), Err(NamingError::NoAvailableAddress(_))));
}

#[tokio::test]
async fn test_discover_conn_diffs_snapshots() {
    let (conn, mut discover) = DiscoverConn::new("_DENNY_:///demo", Duration::from_secs(1));

    assert_ok!(conn.update_state(state(&["a:1", "b:1"])).await);
    let mut inserted = Vec::new();
    for _ in 0..2 {
        match discover.next().await {
            Some(Ok(Change::Insert(addr, _))) => inserted.push(addr.addr),
            _ => panic!("expected insert"),
        }
    }
    inserted.sort();
    assert_eq!(inserted, vec!["a:1", "b:1"]);

    assert_ok!(conn.update_state(state(&["b:1", "c:1"])).await);
    match discover.next().await {
        Some(Ok(Change::Remove(addr))) => assert_eq!(addr, Address::from("a:1")),
        _ => panic!("expected remove"),
    }
    match discover.next().await {
        Some(Ok(Change::Insert(addr, _))) => assert_eq!(addr, Address::from("c:1")),
        _ => panic!("expected insert"),
    }

    // 相同快照不产生变化
    assert_ok!(conn.update_state(state(&["c:1", "b:1"])).await);
    assert_eq!(
        conn.addresses().await,
        vec![Address::from("b:1"), Address::from("c:1")]
    );

    drop(discover);
    assert_err!(conn.update_state(state(&["d:1"])).await);
}

#[tokio::test]
async fn test_discover_conn_keeps_state_when_balancer_dropped() {
    let (conn, discover) = DiscoverConn::new("_DENNY_:///demo", Duration::from_secs(1));
    assert_ok!(conn.update_state(state(&["a:1", "b:1", "c:1"])).await);
    drop(discover);

    // 删除和新增都不应部分生效
    assert_err!(conn.update_state(state(&["d:1"])).await);
    assert_eq!(
        conn.addresses().await,
        vec![Address::from("a:1"), Address::from("b:1"), Address::from("c:1")]
    );
}

#[tokio::test]
async fn test_dial_unknown_scheme() {
    let result = dial("missing-scheme:///demo", DialOptions::default()).await;
    assert!(matches!(result, Err(NamingError::UnknownScheme(s)) if s == "missing-scheme"));

    let result = dial("not a target", DialOptions::default()).await;
    assert!(matches!(result, Err(NamingError::InvalidTarget { .. })));
}

#[tokio::test]
async fn test_dial_round_robin() {
    let builder = StaticBuilder::new("client-rr", &["a:1", "b:1"]);
    resolver::register(builder.clone());

    let client = dial("client-rr:///demo", DialOptions::default()).await.unwrap();
    assert_eq!(client.policy(), LoadBalancingPolicy::RoundRobin);
    assert_eq!(client.target().endpoint, "demo");
    assert_eq!(client.addresses().await.len(), 2);
    assert_ok!(client.channel().await);

    client.resolve_now();
    assert_eq!(builder.refresh_count(), 1);

    builder.push(&[]).await;
    assert!(matches!(client.channel().await, Err(NamingError::NoAvailableAddress(_))));

    client.close().await;
    resolver::unregister("client-rr");
}

#[tokio::test]
async fn test_dial_p2c() {
    let builder = StaticBuilder::new("client-p2c", &["a:1", "b:1"]);
    resolver::register(builder.clone());

    let opts = DialOptions::default()
        .with_service_config_json(r#"{"loadBalancingPolicy":"p2c"}"#)
        .unwrap()
        .with_pick_timeout(Duration::from_millis(200));
    let client = dial("client-p2c:///demo", opts).await.unwrap();
    assert_eq!(client.policy(), LoadBalancingPolicy::P2c);
    assert_ok!(client.channel().await);

    builder.push(&[]).await;
    assert!(client.addresses().await.is_empty());
    assert!(matches!(client.channel().await, Err(NamingError::NoAvailableAddress(_))));

    client.close().await;
    resolver::unregister("client-p2c");
}
