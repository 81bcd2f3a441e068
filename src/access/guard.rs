use super::evaluator::{AccessEvaluator, Operation};
use super::identity::{AccessTarget, Identity};
use super::AccessRulesMode;
use crate::errors::{AppError, AppResult};

/// Applies evaluator decisions according to the configured enforcement mode
#[derive(Clone)]
pub struct AccessGuard {
    mode: AccessRulesMode,
    evaluator: AccessEvaluator,
}

impl AccessGuard {
    pub fn new(mode: AccessRulesMode, evaluator: AccessEvaluator) -> Self {
        Self { mode, evaluator }
    }

    pub fn mode(&self) -> AccessRulesMode {
        self.mode
    }

    pub fn evaluator(&self) -> &AccessEvaluator {
        &self.evaluator
    }

    /// Whether the request may go on. Denials only become `false` in strict mode.
    pub async fn allows(
        &self,
        identity: Option<&Identity>,
        entity_type: &str,
        instance: Option<&str>,
        operation: Operation,
    ) -> AppResult<bool> {
        if self.mode == AccessRulesMode::Off {
            return Ok(true);
        }

        let identity = identity.ok_or_else(|| AppError::unauthorized("authentication required"))?;
        let permitted = self
            .evaluator
            .is_permitted(entity_type, instance, operation, identity)
            .await?;

        Ok(self.settle(permitted, identity, entity_type, instance, operation))
    }

    /// Keeps the items `identity` may perform `operation` on, loading the
    /// rules of `entity_type` once for the whole batch.
    pub async fn retain_permitted<T: AccessTarget>(
        &self,
        identity: Option<&Identity>,
        entity_type: &str,
        items: Vec<T>,
        operation: Operation,
    ) -> AppResult<Vec<T>> {
        if self.mode == AccessRulesMode::Off {
            return Ok(items);
        }

        let identity = identity.ok_or_else(|| AppError::unauthorized("authentication required"))?;
        let rules = self.evaluator.store().rules_for_entity_type(entity_type).await?;

        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            let id = item.identifier();
            let permitted = self.evaluator.decide(&rules, Some(&id), operation, identity);
            if self.settle(permitted, identity, entity_type, Some(&id), operation) {
                kept.push(item);
            }
        }

        Ok(kept)
    }

    fn settle(
        &self,
        permitted: bool,
        identity: &Identity,
        entity_type: &str,
        instance: Option<&str>,
        operation: Operation,
    ) -> bool {
        if permitted {
            return true;
        }

        match self.mode {
            AccessRulesMode::Advisory => {
                tracing::warn!(
                    identity_id = %identity.id,
                    entity_type = %entity_type,
                    instance = ?instance,
                    operation = %operation,
                    "access denied (advisory mode, request allowed)"
                );
                true
            }
            _ => {
                tracing::info!(
                    identity_id = %identity.id,
                    entity_type = %entity_type,
                    instance = ?instance,
                    operation = %operation,
                    "access denied"
                );
                false
            }
        }
    }

    pub async fn ensure(
        &self,
        identity: Option<&Identity>,
        entity_type: &str,
        instance: Option<&str>,
        operation: Operation,
    ) -> AppResult<()> {
        if self.allows(identity, entity_type, instance, operation).await? {
            Ok(())
        } else {
            Err(AppError::forbidden(format!("{} on {} is not permitted", operation, entity_type)))
        }
    }

    pub async fn ensure_item<T: AccessTarget + ?Sized>(
        &self,
        identity: Option<&Identity>,
        item: &T,
        operation: Operation,
    ) -> AppResult<()> {
        let id = item.identifier();
        self.ensure(identity, item.entity_type_name(), Some(&id), operation)
            .await
    }
}
