//! 地址集合测试

use denny_naming::naming::address::{AddressSet, addr_from_key, exist, remove};
use denny_naming::{Address, AddressChange};

#[test]
fn test_duplicate_add_is_noop() {
    let mut set = AddressSet::new();
    assert!(set.apply(AddressChange::Added(Address::from("10.0.0.1:9000"))));
    assert!(!set.apply(AddressChange::Added(Address::from("10.0.0.1:9000"))));
    assert_eq!(set.len(), 1);
}

#[test]
fn test_remove_absent_is_noop() {
    let mut set: AddressSet = ["10.0.0.1:9000"].into_iter().collect();
    assert!(!set.apply(AddressChange::Removed(Address::from("10.0.0.2:9000"))));
    assert_eq!(set.snapshot(), vec![Address::from("10.0.0.1:9000")]);

    assert!(set.apply(AddressChange::Removed(Address::from("10.0.0.1:9000"))));
    assert!(set.is_empty());
    assert!(!set.remove("10.0.0.1:9000"));
}

#[test]
fn test_reconcile_adds_and_removes() {
    let mut set: AddressSet = ["a:1", "b:1"].into_iter().collect();

    assert!(set.reconcile(vec!["b:1", "c:1"]));
    assert!(!set.contains("a:1"));
    assert!(set.contains("b:1"));
    assert!(set.contains("c:1"));
    assert_eq!(set.len(), 2);

    // 相同列举不产生变化
    assert!(!set.reconcile(vec!["c:1", "b:1"]));

    assert!(set.reconcile(Vec::<&str>::new()));
    assert!(set.is_empty());
}

#[test]
fn test_reconcile_collapses_duplicates_in_listing() {
    let mut set = AddressSet::new();
    assert!(set.reconcile(vec!["a:1", "a:1", "b:1"]));
    assert_eq!(set.len(), 2);
}

#[test]
fn test_list_helpers() {
    let mut list = vec![Address::from("a:1"), Address::from("b:1"), Address::from("c:1")];
    assert!(exist(&list, "b:1"));
    assert!(remove(&mut list, "a:1"));
    assert!(!remove(&mut list, "a:1"));
    assert!(!exist(&list, "a:1"));
    assert_eq!(list.len(), 2);
}

#[test]
fn test_addr_from_key() {
    let prefix = "/_DENNY_/demo/";
    assert_eq!(addr_from_key("/_DENNY_/demo/10.0.0.1:9000", prefix), Some("10.0.0.1:9000"));
    assert_eq!(addr_from_key("/_DENNY_/demo/", prefix), None);
    assert_eq!(addr_from_key("/_DENNY_/other/10.0.0.1:9000", prefix), None);
}

#[test]
fn test_grpc_uri() {
    assert_eq!(Address::from("10.0.0.1:9000").to_grpc_uri(), "http://10.0.0.1:9000");
    assert_eq!(Address::from("10.0.0.1:9000").to_string(), "10.0.0.1:9000");
}
