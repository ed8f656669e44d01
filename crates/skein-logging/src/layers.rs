//! Custom tracing layers

use tracing::{Subscriber, span};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::context::{NodeContextData, NodeContextGuard};

/// Layer that attaches the active node context to new spans
///
/// Other layers can read it back through the span's extensions.
#[derive(Debug, Default)]
pub struct NodeContextLayer;

impl NodeContextLayer {
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct NodeContextExtension {
    pub data: NodeContextData,
}

impl<S> Layer<S> for NodeContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id)
            && let Some(node_ctx) = NodeContextGuard::current()
        {
            span.extensions_mut().insert(NodeContextExtension { data: node_ctx });
        }
    }
}

/// JSONL formatting layer for file output
pub fn jsonl_file_layer<S, W>(
    writer: W,
    config: &crate::config::JsonlConfig,
) -> tracing_subscriber::fmt::Layer<
    S,
    tracing_subscriber::fmt::format::JsonFields,
    tracing_subscriber::fmt::format::Format<tracing_subscriber::fmt::format::Json>,
    W,
>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_info)
        .with_thread_names(config.include_thread_info)
        .with_writer(writer)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[derive(Debug, Default)]
    struct Captured(Arc<Mutex<Option<String>>>);

    /// Reads the extension NodeContextLayer left on each new span
    struct Probe(Arc<Mutex<Option<String>>>);

    impl<S> Layer<S> for Probe
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    {
        fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
            let Some(span) = ctx.span(id) else { return };
            if let Some(ext) = span.extensions().get::<NodeContextExtension>() {
                *self.0.lock().unwrap() = Some(ext.data.node_id.clone());
            }
        }
    }

    #[test]
    fn test_layer_attaches_node_context() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry()
            .with(NodeContextLayer::new())
            .with(Probe(captured.0.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let _guard = NodeContextGuard::new("router-b");
            let _span = tracing::info_span!("pipeline").entered();
        });
        assert_eq!(captured.0.lock().unwrap().as_deref(), Some("router-b"));
    }

    #[test]
    fn test_no_context_no_extension() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry()
            .with(NodeContextLayer::new())
            .with(Probe(captured.0.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let _span = tracing::info_span!("pipeline").entered();
        });
        assert!(captured.0.lock().unwrap().is_none());
    }
}
