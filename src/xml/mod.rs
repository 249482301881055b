//! Streaming XML decoding
//!
//! Responses are decoded without building a document tree. A pull reader
//! (`quick_xml`) produces tokens and every token is dispatched to a tag
//! handler looked up by element name:
//!
//! - start tag: look up the handler (falling back to the table's unknown
//!   handler), push it, call `on_start`
//! - text: call `on_text` on the top of the stack
//! - end tag: pop the handler and call `on_end`
//!
//! Handlers mutate a context object owned by the decode call. The decoder is
//! generic over the handler type, so listings, error documents and bulk
//! delete results all share this loop.

pub mod datetime;
pub mod delete;
pub mod error;
pub mod list;

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

pub use datetime::parse_timestamp;
pub use delete::{DeleteResultDecoder, DeleteTag};
pub use error::{ErrorDecoder, ErrorTag};
pub use list::{ListTag, ListingDecoder};

/// Errors raised while decoding a response body
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Invalid value for <{tag}>: '{value}'")]
    InvalidValue { tag: &'static str, value: String },

    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// Per-element behaviour over a decode context.
///
/// Handlers are small `Copy` values (one enum variant per known tag) so the
/// stack can compare them when a tag's meaning depends on its parent.
pub trait TagHandler: Copy + Eq + Send + Sync + 'static {
    type Context;

    fn on_start(self, _ctx: &mut Self::Context) -> Result<(), DecodeError> {
        Ok(())
    }

    fn on_text(
        self,
        _ctx: &mut Self::Context,
        _text: &str,
        _stack: &HandlerStack<Self>,
    ) -> Result<(), DecodeError> {
        Ok(())
    }

    fn on_end(self, _ctx: &mut Self::Context) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// Stack of handlers mirroring the current element nesting
#[derive(Debug, Clone)]
pub struct HandlerStack<H> {
    handlers: Vec<H>,
}

impl<H: Copy> HandlerStack<H> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handlers: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, handler: H) {
        self.handlers.push(handler);
    }

    pub fn pop(&mut self) -> Option<H> {
        self.handlers.pop()
    }

    /// Handler of the innermost open element
    pub fn top(&self) -> Option<H> {
        self.handlers.last().copied()
    }

    /// Handler of the parent of the innermost open element
    pub fn top_minus_one(&self) -> Option<H> {
        let len = self.handlers.len();
        if len < 2 {
            return None;
        }
        Some(self.handlers[len - 2])
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl<H: Copy> Default for HandlerStack<H> {
    fn default() -> Self {
        Self::with_capacity(8)
    }
}

/// Tag name → handler map with an unknown-tag fallback
#[derive(Debug, Clone)]
pub struct HandlerTable<H> {
    handlers: HashMap<&'static [u8], H>,
    unknown: H,
}

impl<H: Copy> HandlerTable<H> {
    pub fn new(unknown: H) -> Self {
        Self {
            handlers: HashMap::new(),
            unknown,
        }
    }

    pub fn with(mut self, tag: &'static str, handler: H) -> Self {
        self.handlers.insert(tag.as_bytes(), handler);
        self
    }

    pub fn lookup(&self, tag: &[u8]) -> H {
        self.handlers.get(tag).copied().unwrap_or(self.unknown)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Generic pull-driven decoder over a handler table
#[derive(Debug, Clone)]
pub struct ResponseDecoder<H> {
    table: HandlerTable<H>,
}

impl<H: TagHandler> ResponseDecoder<H> {
    pub fn new(table: HandlerTable<H>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &HandlerTable<H> {
        &self.table
    }

    /// Decode `body` into `ctx` using a fresh handler stack
    pub fn decode(&self, body: &[u8], ctx: &mut H::Context) -> Result<(), DecodeError> {
        let mut stack = HandlerStack::default();
        self.decode_with(body, ctx, &mut stack)
    }

    /// Decode `body` into `ctx`, reusing `stack` (cleared first)
    pub fn decode_with(
        &self,
        body: &[u8],
        ctx: &mut H::Context,
        stack: &mut HandlerStack<H>,
    ) -> Result<(), DecodeError> {
        stack.clear();

        let mut reader = Reader::from_reader(body);
        let mut seen_root = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let handler = self.table.lookup(e.local_name().as_ref());
                    stack.push(handler);
                    handler.on_start(ctx)?;
                    seen_root = true;
                }
                Event::Empty(e) => {
                    let handler = self.table.lookup(e.local_name().as_ref());
                    stack.push(handler);
                    handler.on_start(ctx)?;
                    stack.pop();
                    handler.on_end(ctx)?;
                    seen_root = true;
                }
                Event::Text(e) => {
                    if let Some(top) = stack.top() {
                        let text = e.unescape()?;
                        top.on_text(ctx, &text, stack)?;
                    }
                }
                Event::CData(e) => {
                    if let Some(top) = stack.top() {
                        let raw = e.into_inner();
                        let text = std::str::from_utf8(&raw)?;
                        top.on_text(ctx, text, stack)?;
                    }
                }
                Event::End(_) => {
                    let handler = stack
                        .pop()
                        .ok_or_else(|| DecodeError::Malformed("unbalanced end tag".to_string()))?;
                    handler.on_end(ctx)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(DecodeError::Malformed(format!(
                "document ended with {} unclosed element(s)",
                stack.len()
            )));
        }
        if !seen_root {
            return Err(DecodeError::Malformed("document has no root element".to_string()));
        }

        Ok(())
    }
}

/// Parse a `true`/`false` element value
pub(crate) fn parse_bool(tag: &'static str, text: &str) -> Result<bool, DecodeError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if text.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(invalid(tag, text))
    }
}

/// Parse an unsigned integer element value
pub(crate) fn parse_number<T: std::str::FromStr>(tag: &'static str, text: &str) -> Result<T, DecodeError> {
    text.trim().parse::<T>().map_err(|_| invalid(tag, text))
}

pub(crate) fn invalid(tag: &'static str, value: &str) -> DecodeError {
    DecodeError::InvalidValue {
        tag,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Probe {
        Root,
        Leaf,
        Unknown,
    }

    #[derive(Default)]
    struct Trace {
        events: Vec<String>,
    }

    impl TagHandler for Probe {
        type Context = Trace;

        fn on_start(self, ctx: &mut Trace) -> Result<(), DecodeError> {
            ctx.events.push(format!("start {:?}", self));
            Ok(())
        }

        fn on_text(self, ctx: &mut Trace, text: &str, stack: &HandlerStack<Self>) -> Result<(), DecodeError> {
            ctx.events.push(format!(
                "text {:?} '{}' parent {:?}",
                self,
                text,
                stack.top_minus_one()
            ));
            Ok(())
        }

        fn on_end(self, ctx: &mut Trace) -> Result<(), DecodeError> {
            ctx.events.push(format!("end {:?}", self));
            Ok(())
        }
    }

    fn decoder() -> ResponseDecoder<Probe> {
        ResponseDecoder::new(
            HandlerTable::new(Probe::Unknown)
                .with("Root", Probe::Root)
                .with("Leaf", Probe::Leaf),
        )
    }

    #[test]
    fn test_dispatch_order() {
        let mut trace = Trace::default();
        decoder()
            .decode(b"<Root><Leaf>a &amp; b</Leaf><Other/></Root>", &mut trace)
            .unwrap();

        assert_eq!(
            trace.events,
            vec![
                "start Root",
                "start Leaf",
                "text Leaf 'a & b' parent Some(Root)",
                "end Leaf",
                "start Unknown",
                "end Unknown",
                "end Root",
            ]
        );
    }

    #[test]
    fn test_stack_is_cleared_between_calls() {
        let decoder = decoder();
        let mut stack = HandlerStack::default();
        stack.push(Probe::Leaf);

        let mut trace = Trace::default();
        decoder
            .decode_with(b"<Root><Leaf>x</Leaf></Root>", &mut trace, &mut stack)
            .unwrap();
        assert!(stack.is_empty());
        assert!(trace.events.contains(&"text Leaf 'x' parent Some(Root)".to_string()));
    }

    #[test]
    fn test_malformed_documents() {
        let decoder = decoder();

        let mut trace = Trace::default();
        assert!(decoder.decode(b"<Root><Leaf>x</Root>", &mut trace).is_err());

        let mut trace = Trace::default();
        assert!(matches!(
            decoder.decode(b"<Root><Leaf>x</Leaf>", &mut trace),
            Err(DecodeError::Malformed(_))
        ));

        let mut trace = Trace::default();
        assert!(matches!(
            decoder.decode(b"", &mut trace),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_handler_stack() {
        let mut stack = HandlerStack::with_capacity(2);
        assert_eq!(stack.top(), None);
        stack.push(Probe::Root);
        assert_eq!(stack.top_minus_one(), None);
        stack.push(Probe::Leaf);
        assert_eq!(stack.top(), Some(Probe::Leaf));
        assert_eq!(stack.top_minus_one(), Some(Probe::Root));
        assert_eq!(stack.pop(), Some(Probe::Leaf));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_scalar_parsing() {
        assert!(parse_bool("IsTruncated", "true").unwrap());
        assert!(!parse_bool("IsTruncated", "False").unwrap());
        assert!(parse_bool("IsTruncated", "yes").is_err());
        assert_eq!(parse_number::<u64>("Size", "434234").unwrap(), 434234);
        assert!(parse_number::<u64>("Size", "-1").is_err());
    }
}
