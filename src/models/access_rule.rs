use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

// =============================================================================
// ENUMS
// =============================================================================

/// Granularity a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum RuleType {
    EntityType,
    PropertyType,
    Entities,
    EntityBy,
    Properties,
    PropertyBy,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::EntityType => "EntityType",
            RuleType::PropertyType => "PropertyType",
            RuleType::Entities => "Entities",
            RuleType::EntityBy => "EntityBy",
            RuleType::Properties => "Properties",
            RuleType::PropertyBy => "PropertyBy",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EntityType" => Ok(RuleType::EntityType),
            "PropertyType" => Ok(RuleType::PropertyType),
            "Entities" => Ok(RuleType::Entities),
            "EntityBy" => Ok(RuleType::EntityBy),
            "Properties" => Ok(RuleType::Properties),
            "PropertyBy" => Ok(RuleType::PropertyBy),
            other => Err(format!("unknown rule type: {other}")),
        }
    }
}

/// Who a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum AccessType {
    Identity,
    IdentityRole,
    Entity,
    CustomRole,
    All,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Identity => "Identity",
            AccessType::IdentityRole => "IdentityRole",
            AccessType::Entity => "Entity",
            AccessType::CustomRole => "CustomRole",
            AccessType::All => "All",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Identity" => Ok(AccessType::Identity),
            "IdentityRole" => Ok(AccessType::IdentityRole),
            "Entity" => Ok(AccessType::Entity),
            "CustomRole" => Ok(AccessType::CustomRole),
            "All" => Ok(AccessType::All),
            other => Err(format!("unknown access type: {other}")),
        }
    }
}

// =============================================================================
// ACCESS RULE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccessRule {
    pub id: Uuid,
    pub rule_type: RuleType,
    #[schema(example = "Document")]
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_value: Option<String>,
    pub access_type: AccessType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_role_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_value: Option<String>,
    pub creatable: bool,
    pub readable: bool,
    pub updatable: bool,
    pub deletable: bool,
    pub viewable: bool,
    pub row_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The columns that identify a rule. GUID access values are compared in
/// canonical form.
pub type RuleKey<'a> = (
    &'a str,
    Option<&'a str>,
    Option<&'a str>,
    AccessType,
    Option<&'a str>,
    Option<String>,
);

impl AccessRule {
    /// A permissive rule with no optional columns set; handy as a builder base.
    pub fn new(rule_type: RuleType, entity_type: impl Into<String>, access_type: AccessType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            rule_type,
            entity_type: entity_type.into(),
            relationship_entity_type: None,
            property_name: None,
            entity_value: None,
            access_type,
            access_role_type: None,
            access_value: None,
            creatable: true,
            readable: true,
            updatable: true,
            deletable: true,
            viewable: true,
            row_version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_entity_value(mut self, value: impl Into<String>) -> Self {
        self.entity_value = Some(value.into());
        self
    }

    pub fn with_access_value(mut self, value: impl Into<String>) -> Self {
        self.access_value = Some(value.into());
        self
    }

    /// Sets all five operation flags at once.
    pub fn with_flags(mut self, creatable: bool, readable: bool, updatable: bool, deletable: bool, viewable: bool) -> Self {
        self.creatable = creatable;
        self.readable = readable;
        self.updatable = updatable;
        self.deletable = deletable;
        self.viewable = viewable;
        self
    }

    pub fn key(&self) -> RuleKey<'_> {
        (
            self.entity_type.as_str(),
            self.entity_value.as_deref(),
            self.relationship_entity_type.as_deref(),
            self.access_type,
            self.access_role_type.as_deref(),
            self.canonical_access_value(),
        )
    }

    /// `access_value` as stored: lowercase hyphenated for `Identity` and
    /// `IdentityRole` targets that parse as a GUID, otherwise unchanged.
    pub fn canonical_access_value(&self) -> Option<String> {
        let value = self.access_value.as_deref()?;
        match self.access_type {
            AccessType::Identity | AccessType::IdentityRole => match Uuid::parse_str(value.trim()) {
                Ok(guid) => Some(guid.hyphenated().to_string()),
                Err(_) => Some(value.to_string()),
            },
            _ => Some(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAccessRule {
    pub id: String,
    pub rule_type: String,
    pub entity_type: String,
    pub relationship_entity_type: Option<String>,
    pub property_name: Option<String>,
    pub entity_value: Option<String>,
    pub access_type: String,
    pub access_role_type: Option<String>,
    pub access_value: Option<String>,
    pub creatable: bool,
    pub readable: bool,
    pub updatable: bool,
    pub deletable: bool,
    pub viewable: bool,
    pub row_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbAccessRule> for AccessRule {
    type Error = AppError;

    fn try_from(value: DbAccessRule) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))?;
        let rule_type = value.rule_type.parse::<RuleType>().map_err(AppError::internal)?;
        let access_type = value.access_type.parse::<AccessType>().map_err(AppError::internal)?;

        Ok(AccessRule {
            id,
            rule_type,
            entity_type: value.entity_type,
            relationship_entity_type: value.relationship_entity_type,
            property_name: value.property_name,
            entity_value: value.entity_value,
            access_type,
            access_role_type: value.access_role_type,
            access_value: value.access_value,
            creatable: value.creatable,
            readable: value.readable,
            updatable: value.updatable,
            deletable: value.deletable,
            viewable: value.viewable,
            row_version: value.row_version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

fn default_flag() -> bool {
    true
}

/// Body of create and update calls. Updates replace every column and must
/// carry the `row_version` they were based on.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AccessRuleRequest {
    #[schema(example = "EntityType")]
    pub rule_type: RuleType,
    #[schema(example = "Document")]
    pub entity_type: String,
    pub relationship_entity_type: Option<String>,
    pub property_name: Option<String>,
    pub entity_value: Option<String>,
    #[schema(example = "IdentityRole")]
    pub access_type: AccessType,
    pub access_role_type: Option<String>,
    #[schema(example = "8a4f9c1e-5d2b-4e7a-9c3f-1b6d8e2a4c70")]
    pub access_value: Option<String>,
    #[serde(default = "default_flag")]
    pub creatable: bool,
    #[serde(default = "default_flag")]
    pub readable: bool,
    #[serde(default = "default_flag")]
    pub updatable: bool,
    #[serde(default = "default_flag")]
    pub deletable: bool,
    #[serde(default = "default_flag")]
    pub viewable: bool,
    #[schema(example = 1)]
    pub row_version: Option<i64>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AccessRuleQuery {
    /// Restrict the listing to one entity type
    pub entity_type: Option<String>,
}
