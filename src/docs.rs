use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{errors, models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::auth::logout,
		routes::roles::list_roles,
		routes::roles::create_role,
		routes::roles::assign_role,
		routes::roles::revoke_role,
		routes::access_rules::list_rules,
		routes::access_rules::create_rule,
		routes::access_rules::get_rule,
		routes::access_rules::update_rule,
		routes::access_rules::delete_rule,
		routes::documents::list_documents,
		routes::documents::create_document,
		routes::documents::get_document,
		routes::documents::update_document,
		routes::documents::delete_document
	),
	components(
		schemas(
			errors::ErrorCode,
			errors::ErrorResponse,
			routes::health::HealthResponse,
			routes::auth::MessageResponse,
			models::identity::IdentityAccount,
			models::identity::AuthResponse,
			models::identity::LoginRequest,
			models::identity::RegisterRequest,
			models::role::Role,
			models::role::RoleCreateRequest,
			models::role::AssignRoleRequest,
			models::access_rule::RuleType,
			models::access_rule::AccessType,
			models::access_rule::AccessRule,
			models::access_rule::AccessRuleRequest,
			models::document::Document,
			models::document::DocumentCreateRequest,
			models::document::DocumentUpdateRequest
		)
	),
	tags(
		(name = "Health", description = "Service health"),
		(name = "Auth", description = "Identity registration and login"),
		(name = "Roles", description = "Role administration"),
		(name = "Access Rules", description = "Access rule administration"),
		(name = "Documents", description = "Documents guarded by access rules")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn object_entry<'a>(parent: &'a mut Value, key: &str) -> Option<&'a mut Map<String, Value>> {
	parent
		.as_object_mut()?
		.entry(key)
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
}

fn ensure_security_components(doc: &mut Value) {
	let Some(components) = object_entry(doc, "components") else {
		return;
	};

	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));

	if let Some(schemes) = schemes.as_object_mut() {
		schemes.insert(
			"bearerAuth".to_string(),
			json!({
				"type": "http",
				"scheme": "bearer",
				"bearerFormat": "JWT"
			}),
		);
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}
