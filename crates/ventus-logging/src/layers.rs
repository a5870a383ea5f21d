//! Custom tracing layers for Ventus
//!
//! [`RunContextLayer`] copies the active [`RunContextGuard`] onto every span
//! created while it is set, so later events can be attributed to a run even
//! after the guard has moved on.

use tracing::{Span, Subscriber, info_span, span};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::{LookupSpan, SpanRef},
};

use crate::context::{RunContextData, RunContextGuard};

/// Layer that attaches the current run context to new spans
#[derive(Debug, Default, Clone, Copy)]
pub struct RunContextLayer;

impl RunContextLayer {
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct RunContextExtension {
    pub data: RunContextData,
}

impl<S> Layer<S> for RunContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(run) = RunContextGuard::current() {
                span.extensions_mut().insert(RunContextExtension { data: run });
            }
        }
    }
}

/// Run context recorded on `span` or its nearest ancestor
pub fn run_context_of<'a, S>(span: &SpanRef<'a, S>) -> Option<RunContextData>
where
    S: Subscriber + LookupSpan<'a>,
{
    span.scope().find_map(|s| {
        s.extensions()
            .get::<RunContextExtension>()
            .map(|ext| ext.data.clone())
    })
}

/// Span carrying the current run context as fields
///
/// Formatters only print span fields, not extensions, so this is what puts
/// `run_id` into console and JSONL output. Returns a disabled span when no
/// run context is set.
pub fn run_span() -> Span {
    match RunContextGuard::current() {
        Some(run) => info_span!("run", run_id = %run.run_id, key_tag = %run.key_tag),
        None => Span::none(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::Event;
    use tracing_subscriber::{Registry, layer::SubscriberExt};
    use uuid::Uuid;
    use ventus_core::KeyTag;

    use super::*;

    /// Records the run id seen by each event
    #[derive(Clone, Default)]
    struct Probe {
        seen: Arc<Mutex<Vec<Option<Uuid>>>>,
    }

    impl<S> Layer<S> for Probe
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    {
        fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
            let run_id = ctx
                .event_span(event)
                .and_then(|span| run_context_of(&span))
                .map(|run| run.run_id);
            self.seen.lock().unwrap().push(run_id);
        }
    }

    #[test]
    fn test_spans_capture_run_context() {
        let probe = Probe::default();
        let subscriber = Registry::default().with(RunContextLayer::new()).with(probe.clone());
        let run_id = Uuid::new_v4();

        tracing::subscriber::with_default(subscriber, || {
            let span = {
                let _guard = RunContextGuard::new(run_id, &KeyTag::default());
                tracing::info_span!("stage")
            };
            // The guard is gone but the span remembers the run
            span.in_scope(|| {
                tracing::info_span!("child").in_scope(|| tracing::info!("nested"));
            });

            tracing::info_span!("outside").in_scope(|| tracing::info!("no run"));
        });

        let seen = probe.seen.lock().unwrap();
        assert_eq!(*seen, vec![Some(run_id), None]);
    }

    #[test]
    fn test_run_span_disabled_without_context() {
        assert!(run_span().is_none());
    }
}
