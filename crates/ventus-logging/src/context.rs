//! Run context injection
//!
//! Thread-local storage for the attestation run currently being driven on
//! this thread, so spans opened inside it can be tagged with the run id and
//! key tag without threading them through every call.

use std::cell::RefCell;

use uuid::Uuid;
use ventus_core::KeyTag;

/// Run context stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContextData {
    /// Id of the attestation run
    pub run_id: Uuid,
    /// Tag of the key the run signs with
    pub key_tag: String,
}

thread_local! {
    static RUN_CONTEXT: RefCell<Option<RunContextData>> = const { RefCell::new(None) };
}

/// RAII guard for run context
///
/// Sets the run context for the current thread and restores the previous
/// one when dropped, so guards nest.
///
/// # Example
///
/// ```ignore
/// use ventus_logging::RunContextGuard;
///
/// let _guard = RunContextGuard::new(control.id(), &config.key_tag);
///
/// // Spans opened in this scope carry the run context
/// tracing::info_span!("cli").in_scope(|| tracing::info!("Signing"));
/// ```
pub struct RunContextGuard {
    previous: Option<RunContextData>,
}

impl RunContextGuard {
    pub fn new(run_id: Uuid, key_tag: &KeyTag) -> Self {
        let previous = RUN_CONTEXT.with(|ctx| ctx.borrow().clone());
        let data = RunContextData {
            run_id,
            key_tag: key_tag.to_string(),
        };
        RUN_CONTEXT.with(|ctx| *ctx.borrow_mut() = Some(data));
        Self { previous }
    }

    /// Context for a run that has no id yet
    pub fn fresh(key_tag: &KeyTag) -> Self {
        Self::new(Uuid::new_v4(), key_tag)
    }

    /// Get the current run context (if any)
    pub fn current() -> Option<RunContextData> {
        RUN_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn current_run_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.run_id)
    }
}

impl Drop for RunContextGuard {
    fn drop(&mut self) {
        RUN_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block inside a run context
///
/// # Example
///
/// ```ignore
/// with_run_context!(run_id, &tag, {
///     tracing::info!("Proving");
/// });
/// ```
#[macro_export]
macro_rules! with_run_context {
    ($run_id:expr, $tag:expr, $body:block) => {{
        let _guard = $crate::context::RunContextGuard::new($run_id, $tag);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_context_guard() {
        assert!(RunContextGuard::current().is_none());

        let run_id = Uuid::new_v4();
        {
            let _guard = RunContextGuard::new(run_id, &KeyTag::default());
            let ctx = RunContextGuard::current().unwrap();
            assert_eq!(ctx.run_id, run_id);
            assert_eq!(ctx.key_tag, "com.ventus.securekey");
        }

        assert!(RunContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        let outer = Uuid::new_v4();
        let inner = Uuid::new_v4();
        let tag = KeyTag::default();

        {
            let _a = RunContextGuard::new(outer, &tag);
            {
                let _b = RunContextGuard::new(inner, &tag);
                assert_eq!(RunContextGuard::current_run_id(), Some(inner));
            }
            assert_eq!(RunContextGuard::current_run_id(), Some(outer));
        }

        assert!(RunContextGuard::current_run_id().is_none());
    }

    #[test]
    fn test_macro_scopes_context() {
        let run_id = Uuid::new_v4();
        let seen = with_run_context!(run_id, &KeyTag::default(), {
            RunContextGuard::current_run_id()
        });
        assert_eq!(seen, Some(run_id));
        assert!(RunContextGuard::current().is_none());
    }
}
