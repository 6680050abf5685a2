use super::*;

#[test]
fn test_service_json_uses_lower_case_names() {
    let mut service = Service::new("greeter", "1.0").with_node(Node::new("g-1", "10.0.0.1:80"));
    service.endpoints.push(Endpoint {
        name: "Greeter.Hello".to_string(),
        request: Some(Value {
            name: "Request".to_string(),
            value_type: "Request".to_string(),
            values: vec![],
        }),
        response: None,
        metadata: Default::default(),
    });

    let json: serde_json::Value = serde_json::to_value(&service).unwrap();
    assert_eq!(json["name"], "greeter");
    assert_eq!(json["nodes"][0]["id"], "g-1");
    assert_eq!(json["nodes"][0]["address"], "10.0.0.1:80");
    assert_eq!(json["endpoints"][0]["request"]["type"], "Request");
    assert!(json["endpoints"][0]["response"].is_null());
}

#[test]
fn test_service_decodes_null_collections() {
    let raw = r#"{"name":"a","version":"1.0","metadata":null,"endpoints":null,
        "nodes":[{"id":"100","address":"127.0.0.1:100","metadata":null}]}"#;

    let service: Service = serde_json::from_str(raw).unwrap();
    assert!(service.metadata.is_empty());
    assert!(service.endpoints.is_empty());
    assert_eq!(service.nodes, vec![Node::new("100", "127.0.0.1:100")]);
}

#[test]
fn test_paths_escape_slashes() {
    assert_eq!(service_path("/micro/registry/", "go.micro/api"), "/micro/registry/go.micro-api/");
    assert_eq!(
        node_path("/micro/registry/", "go.micro/api", "node/1"),
        "/micro/registry/go.micro-api/node-1"
    );
    assert_eq!(node_path("/custom", "svc", "n"), "/custom/svc/n");
}

#[test]
fn test_result_predicates_and_event_conversion() {
    let result = RegistryResult {
        action: Action::Delete,
        service: Service::new("a", "1"),
    };
    assert!(result.is_delete());
    assert!(!result.is_create());
    assert!(!result.is_update());

    let event = result.into_event("store");
    assert_eq!(event.id, "store");
    assert_eq!(event.event_type, EventType::Delete);
    assert_eq!(event.event_type.to_string(), "delete");
    assert_eq!(Action::Update.to_string(), "update");
    assert_eq!(EventType::Create.to_string(), "create");
}

#[test]
fn test_single_node_copies_service_fields() {
    let mut service = Service::new("a", "1")
        .with_node(Node::new("1", "x"))
        .with_node(Node::new("2", "y"));
    service.metadata.insert("team".to_string(), "core".to_string());

    let record = service.single_node(&service.nodes[1]);
    assert_eq!(record.nodes, vec![Node::new("2", "y")]);
    assert_eq!(record.metadata.get("team").map(String::as_str), Some("core"));
}
