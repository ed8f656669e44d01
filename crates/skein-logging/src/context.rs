//! Forwarder node context for multi-instance logging
//!
//! Several forwarders may run in one process, e.g. in a topology test.
//! A [`NodeContextGuard`] records which node the current thread is working
//! for, and [`NodeContextLayer`](crate::layers::NodeContextLayer) attaches it
//! to every span opened meanwhile.

use std::cell::RefCell;
use std::fmt;

use uuid::Uuid;

/// Node context stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContextData {
    /// Human-readable node name
    pub node_id: String,
    /// Unique id of this forwarder instance
    pub instance_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Creating the guard sets the node context for the current thread;
/// dropping it restores the previous one.
///
/// ```ignore
/// use skein_logging::NodeContextGuard;
///
/// let _guard = NodeContextGuard::new("router-a");
/// tracing::info!("Forwarder created"); // spans carry node_id = "router-a"
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    /// Enter the context of `node_id` with a fresh instance id
    pub fn new(node_id: impl fmt::Display) -> Self {
        Self::with_instance_id(node_id, Uuid::new_v4())
    }

    /// Enter the context of `node_id` keeping a known instance id
    pub fn with_instance_id(node_id: impl fmt::Display, instance_id: Uuid) -> Self {
        let data = NodeContextData {
            node_id: node_id.to_string(),
            instance_id,
        };
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// Get the current node context (if any)
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn current_node_id() -> Option<String> {
        Self::current().map(|ctx| ctx.node_id)
    }

    /// A span carrying the current node's fields, for output formats that
    /// only print span fields
    pub fn span() -> tracing::Span {
        match Self::current() {
            Some(ctx) => tracing::info_span!("node", node_id = %ctx.node_id, instance_id = %ctx.instance_id),
            None => tracing::Span::none(),
        }
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

impl fmt::Debug for NodeContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContextGuard")
            .field("current", &Self::current())
            .finish()
    }
}

/// Run a block inside a node context
///
/// ```ignore
/// with_node_context!("router-a", {
///     tracing::info!("Processing packet");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($node_id:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($node_id);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_context_guard() {
        assert!(NodeContextGuard::current().is_none());

        {
            let _guard = NodeContextGuard::new("router-a");
            let ctx = NodeContextGuard::current().unwrap();
            assert_eq!(ctx.node_id, "router-a");
        }

        assert!(NodeContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        {
            let _guard_a = NodeContextGuard::new("a");
            assert_eq!(NodeContextGuard::current_node_id(), Some("a".to_string()));

            {
                let _guard_b = NodeContextGuard::new("b");
                assert_eq!(NodeContextGuard::current_node_id(), Some("b".to_string()));
            }

            // restored after the inner guard drops
            assert_eq!(NodeContextGuard::current_node_id(), Some("a".to_string()));
        }

        assert!(NodeContextGuard::current_node_id().is_none());
    }

    #[test]
    fn test_with_instance_id() {
        let instance_id = Uuid::new_v4();
        let _guard = NodeContextGuard::with_instance_id(7, instance_id);
        let ctx = NodeContextGuard::current().unwrap();
        assert_eq!(ctx.node_id, "7");
        assert_eq!(ctx.instance_id, instance_id);
    }

    #[test]
    fn test_macro_scopes_context() {
        let seen = with_node_context!("m", { NodeContextGuard::current_node_id() });
        assert_eq!(seen, Some("m".to_string()));
        assert!(NodeContextGuard::current().is_none());
    }
}
