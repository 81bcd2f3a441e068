use serde_json::Value;

fn schema_properties<'a>(doc: &'a Value, name: &str) -> &'a serde_json::Map<String, Value> {
    doc.get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(|s| s.get(name))
        .and_then(|t| t.get("properties"))
        .and_then(Value::as_object)
        .unwrap_or_else(|| panic!("components.schemas.{}.properties must exist", name))
}

#[test]
fn openapi_has_access_rule_fields() -> anyhow::Result<()> {
    // Build the OpenAPI document the same way the server does
    let doc = access_rules::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let props = schema_properties(&v, "AccessRule");
    let keys = [
        "rule_type",
        "entity_type",
        "entity_value",
        "access_type",
        "access_value",
        "creatable",
        "readable",
        "updatable",
        "deletable",
        "viewable",
        "row_version",
    ];
    for k in &keys {
        assert!(props.contains_key(*k), "OpenAPI AccessRule schema missing '{}'", k);
    }

    let error_props = schema_properties(&v, "ErrorResponse");
    assert!(error_props.contains_key("code"), "ErrorResponse should expose the validation code");

    Ok(())
}

#[test]
fn openapi_lists_rule_routes_with_bearer_auth() -> anyhow::Result<()> {
    let doc = access_rules::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let paths = v.get("paths").and_then(Value::as_object).expect("paths must exist");
    for p in ["/access-rules", "/access-rules/{id}", "/documents", "/documents/{id}", "/api/health"] {
        assert!(paths.contains_key(p), "OpenAPI missing path '{}'", p);
    }

    let scheme = v
        .get("components")
        .and_then(|c| c.get("securitySchemes"))
        .and_then(|s| s.get("bearerAuth"));
    assert!(scheme.is_some(), "bearerAuth security scheme must be registered");

    Ok(())
}
