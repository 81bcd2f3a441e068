use std::collections::HashSet;

use uuid::Uuid;

/// Identity represents the authenticated caller with the roles it holds
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub role_ids: HashSet<Uuid>,
    /// Role designations, used for the admin gate on rule management
    pub role_names: HashSet<String>,
}

impl Identity {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            role_ids: HashSet::new(),
            role_names: HashSet::new(),
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Uuid>) -> Self {
        self.role_ids = roles.into_iter().collect();
        self
    }

    pub fn with_role_names(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.role_names = names.into_iter().collect();
        self
    }

    pub fn has_role(&self, role_id: &Uuid) -> bool {
        self.role_ids.contains(role_id)
    }

    pub fn has_role_named(&self, designation: &str) -> bool {
        self.role_names.contains(designation)
    }

    /// SysAdmin and AppAdmin may manage access rules and roles.
    pub fn is_admin(&self) -> bool {
        self.has_role_named(super::roles::SYS_ADMIN) || self.has_role_named(super::roles::APP_ADMIN)
    }
}

/// Anything the evaluator can be asked about: a type name plus an identifier.
pub trait AccessTarget {
    fn entity_type_name(&self) -> &str;
    fn identifier(&self) -> String;
}

/// Bare reference to an entity instance, for callers without a loaded model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub entity_type: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl AccessTarget for EntityRef {
    fn entity_type_name(&self) -> &str {
        &self.entity_type
    }

    fn identifier(&self) -> String {
        self.id.clone()
    }
}
