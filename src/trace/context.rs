//! Per-telemetry trace identity and the LIFO stack of open spans.

use crate::trace::span::{Span, SpanType};

/// Identity and classification of an open span, as observed from outside
/// the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanInfo {
    /// Trace the span belongs to.
    pub trace_id: String,
    /// The span's own id.
    pub span_id: String,
    /// Parent span id, if nested.
    pub parent_span_id: Option<String>,
    /// Operation label.
    pub name: String,
    /// Operation classification.
    pub span_type: SpanType,
}

impl SpanInfo {
    fn from_span(span: &Span) -> Self {
        Self {
            trace_id: span.trace_id().to_string(),
            span_id: span.span_id().to_string(),
            parent_span_id: span.parent_span_id().map(String::from),
            name: span.name().to_string(),
            span_type: span.span_type(),
        }
    }
}

/// Mutable per-instance state: the active trace id and the stack of
/// currently-open spans. The top of the stack is the current span and
/// becomes the parent of the next span opened.
///
/// Safe for cooperative concurrency (the owning mutex is never held across
/// an await); not meant for parallel nesting from multiple threads.
#[derive(Debug, Default)]
pub(crate) struct TraceContext {
    trace_id: Option<String>,
    span_stack: Vec<Span>,
}

impl TraceContext {
    /// The active trace id, created lazily on first access and stable until
    /// [`replace_trace`](TraceContext::replace_trace).
    pub(crate) fn trace_id_or_init(&mut self, fresh: impl FnOnce() -> String) -> String {
        self.trace_id.get_or_insert_with(fresh).clone()
    }

    /// Replace the active trace id. The span stack is left untouched; span
    /// nesting is independent of trace identity switching.
    pub(crate) fn replace_trace(&mut self, trace_id: String) -> String {
        self.trace_id = Some(trace_id.clone());
        trace_id
    }

    /// Identity of the most recently opened span still on the stack.
    pub(crate) fn current(&self) -> Option<SpanInfo> {
        self.span_stack.last().map(SpanInfo::from_span)
    }

    /// Span id of the stack top, the parent for the next span opened.
    pub(crate) fn parent_id(&self) -> Option<String> {
        self.span_stack.last().map(|span| span.span_id().to_string())
    }

    pub(crate) fn push(&mut self, span: Span) {
        self.span_stack.push(span);
    }

    pub(crate) fn pop(&mut self) -> Option<Span> {
        self.span_stack.pop()
    }

    /// Mutate the current span, if one is open.
    pub(crate) fn with_current_mut<R>(&mut self, f: impl FnOnce(&mut Span) -> R) -> Option<R> {
        self.span_stack.last_mut().map(f)
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.span_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::span::SpanAttributes;

    fn open(ctx: &mut TraceContext, span_id: &str) {
        let parent = ctx.parent_id();
        ctx.push(Span::new(
            "0af7651916cd43dd8448eb211c80319c".to_string(),
            span_id.to_string(),
            parent,
            "op".to_string(),
            SpanType::Tool,
            None,
            SpanAttributes::default(),
        ));
    }

    #[test]
    fn trace_id_is_lazy_and_stable() {
        let mut ctx = TraceContext::default();
        let first = ctx.trace_id_or_init(|| "aaaa".to_string());
        let second = ctx.trace_id_or_init(|| "bbbb".to_string());
        assert_eq!(first, "aaaa");
        assert_eq!(second, "aaaa");
        ctx.replace_trace("cccc".to_string());
        assert_eq!(ctx.trace_id_or_init(|| "dddd".to_string()), "cccc");
    }

    #[test]
    fn stack_is_lifo_and_links_parents() {
        let mut ctx = TraceContext::default();
        assert!(ctx.current().is_none());
        open(&mut ctx, "1111111111111111");
        open(&mut ctx, "2222222222222222");
        let current = ctx.current().unwrap();
        assert_eq!(current.span_id, "2222222222222222");
        assert_eq!(current.parent_span_id.as_deref(), Some("1111111111111111"));
        ctx.pop();
        assert_eq!(ctx.current().unwrap().span_id, "1111111111111111");
        ctx.pop();
        assert!(ctx.pop().is_none());
    }
}
