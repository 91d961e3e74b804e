// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`ErrorInfo`]: an application failure carried across the process boundary.

use std::any::Any;
use std::backtrace::BacktraceStatus;
use std::error::Error as StdError;
use std::fmt;

use bridge_wire::wire_message;

wire_message! {
    /// A failure, with its causes, in wire form.
    ///
    /// A populated `ErrorInfo` on a response means the request reached the
    /// server and was handled, but the operation itself failed. The cause chain
    /// is kept as nested `inner` errors; aggregate failures list their parts in
    /// `inner_errors`.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct ErrorInfo {
        /// Human-readable description.
        pub message: Option<String> = 1,
        /// Component or operation that raised the error.
        pub source: Option<String> = 2,
        /// Captured backtrace text, when one was available.
        pub stack: Option<String> = 3,
        /// The error that caused this one.
        pub inner: Option<Box<ErrorInfo>> = 4,
        /// Sibling failures of an aggregate error.
        pub inner_errors: Option<Vec<ErrorInfo>> = 5,
    }
}

impl ErrorInfo {
    /// An error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Set the originating component.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach backtrace text.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Set the direct cause.
    #[must_use]
    pub fn with_inner(mut self, inner: ErrorInfo) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Set the parts of an aggregate failure.
    #[must_use]
    pub fn with_inner_errors(mut self, errors: Vec<ErrorInfo>) -> Self {
        self.inner_errors = Some(errors);
        self
    }

    /// Convert any error and its `source()` chain.
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut messages = Vec::new();
        let mut cur: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(e) = cur {
            messages.push(e.to_string());
            cur = e.source();
        }
        Self::from_chain(messages)
    }

    /// Convert an [`anyhow::Error`], keeping its context chain and, when one
    /// was captured, its backtrace as the stack text.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let mut info = Self::from_chain(err.chain().map(ToString::to_string).collect());
        let backtrace = err.backtrace();
        if backtrace.status() == BacktraceStatus::Captured {
            info.stack = Some(backtrace.to_string());
        }
        info
    }

    /// Describe a caught panic payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(format!("handler panicked: {detail}"))
    }

    fn from_chain(messages: Vec<String>) -> Self {
        messages
            .into_iter()
            .rev()
            .fold(None, |inner: Option<ErrorInfo>, message| {
                let mut info = ErrorInfo::new(message);
                info.inner = inner.map(Box::new);
                Some(info)
            })
            .unwrap_or_default()
    }

    /// The message, or a placeholder when absent.
    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or("unspecified error")
    }

    /// This error followed by each nested `inner` cause.
    pub fn chain(&self) -> impl Iterator<Item = &ErrorInfo> {
        std::iter::successors(Some(self), |e| e.inner.as_deref())
    }

    /// Indented multi-line rendering of the full tree, for CLI output.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        out.push_str(&pad);
        out.push_str(&self.message_or_default());
        if let Some(src) = &self.source {
            out.push_str(&format!(" (in {src})"));
        }
        out.push('\n');
        if let Some(inner) = &self.inner {
            out.push_str(&format!("{pad}caused by:\n"));
            inner.render_into(out, indent + 1);
        }
        for (i, part) in self.inner_errors.iter().flatten().enumerate() {
            out.push_str(&format!("{pad}error {}:\n", i + 1));
            part.render_into(out, indent + 1);
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message_or_default())
    }
}

impl StdError for ErrorInfo {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn anyhow_context_becomes_nested_inner() {
        let err = std::fs::read("/definitely/not/here")
            .context("reading snapshot manifest")
            .unwrap_err();
        let info = ErrorInfo::from_anyhow(&err);
        assert_eq!(info.message.as_deref(), Some("reading snapshot manifest"));
        let inner = info.inner.as_deref().unwrap();
        assert!(inner.message.is_some());
        assert_eq!(info.chain().count(), 2);
    }

    #[test]
    fn error_chain_round_trips_through_source() {
        let info = ErrorInfo::new("outer").with_inner(ErrorInfo::new("inner"));
        let msgs: Vec<String> = std::iter::successors(
            Some(&info as &(dyn StdError + 'static)),
            |e: &&(dyn StdError + 'static)| (*e).source(),
        )
        .map(ToString::to_string)
        .collect();
        assert_eq!(msgs, vec!["outer", "inner"]);
    }

    #[test]
    fn panic_payloads() {
        let s: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(
            ErrorInfo::from_panic(s.as_ref()).message.as_deref(),
            Some("handler panicked: boom")
        );
        let s: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(
            ErrorInfo::from_panic(s.as_ref()).message.as_deref(),
            Some("handler panicked: bang")
        );
    }

    #[test]
    fn render_includes_aggregate_parts() {
        let info = ErrorInfo::new("rescan failed")
            .with_source("StartRescan")
            .with_inner_errors(vec![ErrorInfo::new("a"), ErrorInfo::new("b")]);
        let text = info.render();
        assert!(text.contains("rescan failed (in StartRescan)"));
        assert!(text.contains("error 2:"));
        assert!(text.contains("    b") || text.contains("  b"));
    }

    #[test]
    fn render_layout_is_exact() {
        let info = ErrorInfo::new("cannot rescan /srv")
            .with_source("StartRescan")
            .with_inner(ErrorInfo::new("no such file"));
        assert_eq!(
            info.render(),
            "cannot rescan /srv (in StartRescan)\ncaused by:\n  no such file\n"
        );
    }
}
