//! Running `validate` hooks.

use crate::error::ResolveError;
use crate::hooks::{HookContext, HookError, HookKind};
use crate::recipe::Recipe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(String),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Run the recipe's `validate` hook for one configuration.
///
/// A declared invalid configuration is a per-node verdict; any other hook
/// failure aborts the resolution.
///
/// # Errors
///
/// Returns `ResolveError::Hook` when the hook fails with something other
/// than [`HookError::Invalid`].
pub fn validate(recipe: &Recipe, ctx: &HookContext<'_>) -> Result<Verdict, ResolveError> {
    let Some(hook) = &recipe.hooks.validate else {
        return Ok(Verdict::Valid);
    };
    match hook(ctx) {
        Ok(()) => Ok(Verdict::Valid),
        Err(HookError::Invalid(reason)) => {
            tracing::debug!("{}: invalid configuration: {reason}", ctx.reference);
            Ok(Verdict::Invalid(reason))
        }
        Err(err) => Err(ResolveError::hook(ctx.reference, HookKind::Validate, err)),
    }
}
