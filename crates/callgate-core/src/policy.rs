//! Redirect policies.
//!
//! A policy is the single authority on whether a call leaves the process
//! over the wire. The router itself has no allow or deny logic.

use crate::context::CallOptions;
use crate::Result;
use serde_json::Value;
use std::collections::HashSet;

/// Decides per call whether to use the wire path.
///
/// An error from the policy is propagated to the caller unchanged.
#[async_trait::async_trait]
pub trait RedirectPolicy: Send + Sync {
    async fn should_redirect(&self, action: &str, params: &Value, opts: &CallOptions)
        -> Result<bool>;
}

/// Policy backed by a synchronous predicate.
pub struct FnPolicy<F> {
    predicate: F,
}

/// Wrap a predicate as a [`RedirectPolicy`].
pub fn redirect_when<F>(predicate: F) -> FnPolicy<F>
where
    F: Fn(&str, &Value, &CallOptions) -> bool + Send + Sync,
{
    FnPolicy { predicate }
}

#[async_trait::async_trait]
impl<F> RedirectPolicy for FnPolicy<F>
where
    F: Fn(&str, &Value, &CallOptions) -> bool + Send + Sync,
{
    async fn should_redirect(
        &self,
        action: &str,
        params: &Value,
        opts: &CallOptions,
    ) -> Result<bool> {
        Ok((self.predicate)(action, params, opts))
    }
}

/// Redirects a fixed set of actions, or every action of a `version.service`.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    actions: HashSet<String>,
    services: HashSet<String>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a single `version.service.action`.
    pub fn allow_action(mut self, action: impl Into<String>) -> Self {
        self.actions.insert(action.into());
        self
    }

    /// Allow every action of a `version.service`.
    pub fn allow_service(mut self, service: impl Into<String>) -> Self {
        self.services.insert(service.into());
        self
    }

    pub fn allows(&self, action: &str) -> bool {
        if self.actions.contains(action) {
            return true;
        }
        action
            .rsplit_once('.')
            .is_some_and(|(service, _)| self.services.contains(service))
    }
}

#[async_trait::async_trait]
impl RedirectPolicy for AllowList {
    async fn should_redirect(
        &self,
        action: &str,
        _params: &Value,
        _opts: &CallOptions,
    ) -> Result<bool> {
        Ok(self.allows(action))
    }
}
