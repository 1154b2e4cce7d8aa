//! A single registered route.
//!
//! A [`Layer`] couples a compiled path pattern with the methods it answers
//! and the middleware stack it runs. The pattern is always recompiled from
//! the current path and options together, so the regex and the key list can
//! never drift apart.

use std::fmt;
use std::sync::Arc;

use daedalus_core::{MatchedRoute, Params};
use daedalus_middleware::BoxedMiddleware;
use http::Method;

use crate::error::RouterError;
use crate::handler::{ParamMiddleware, ParamStep};
use crate::path::{self, Key, MatchOptions, PathPattern, UrlOptions, UrlParams};

/// Matching options of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerOptions {
    /// Case-sensitive matching.
    pub sensitive: bool,
    /// Trailing delimiter must match exactly.
    pub strict: bool,
    /// Match the whole path rather than a prefix of it.
    pub end: bool,
    /// Report no captures, so no params are bound.
    pub ignore_captures: bool,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            sensitive: false,
            strict: false,
            end: true,
            ignore_captures: false,
        }
    }
}

impl LayerOptions {
    fn match_options(self) -> MatchOptions {
        MatchOptions {
            sensitive: self.sensitive,
            strict: self.strict,
            end: self.end,
        }
    }
}

/// An entry in a layer's middleware stack.
#[derive(Clone)]
pub(crate) struct StackEntry {
    /// Set for parameter hooks; orders them by the parameter's position.
    pub(crate) param: Option<String>,
    pub(crate) middleware: BoxedMiddleware,
}

impl StackEntry {
    pub(crate) fn plain(middleware: BoxedMiddleware) -> Self {
        Self {
            param: None,
            middleware,
        }
    }

    pub(crate) fn param(name: &str, hook: Arc<dyn ParamMiddleware>) -> Self {
        Self {
            param: Some(name.to_string()),
            middleware: Arc::new(ParamStep {
                name: name.to_string(),
                hook,
            }),
        }
    }
}

/// A registered route.
///
/// # Example
///
/// ```
/// use daedalus_router::{Layer, LayerOptions};
/// use http::Method;
///
/// let layer = Layer::new("/item/:id", [Method::GET], Vec::new(), None, LayerOptions::default()).unwrap();
/// assert_eq!(layer.methods(), [Method::GET, Method::HEAD]);
/// assert!(layer.matches("/item/42"));
///
/// let mut params = daedalus_core::Params::new();
/// layer.params(&layer.captures("/item/42"), &mut params);
/// assert_eq!(params.get("id"), Some("42"));
/// ```
#[derive(Clone)]
pub struct Layer {
    path: String,
    methods: Vec<Method>,
    stack: Vec<StackEntry>,
    name: Option<String>,
    options: LayerOptions,
    pattern: PathPattern,
}

impl Layer {
    /// Creates a layer. Declaring `GET` also declares `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] if `path` does not compile.
    pub fn new(
        path: impl Into<String>,
        methods: impl IntoIterator<Item = Method>,
        middleware: impl IntoIterator<Item = BoxedMiddleware>,
        name: Option<String>,
        options: LayerOptions,
    ) -> Result<Self, RouterError> {
        let stack = middleware.into_iter().map(StackEntry::plain).collect();
        Self::from_entries(path.into(), methods, stack, name, options)
    }

    pub(crate) fn from_entries(
        path: String,
        methods: impl IntoIterator<Item = Method>,
        stack: Vec<StackEntry>,
        name: Option<String>,
        options: LayerOptions,
    ) -> Result<Self, RouterError> {
        let mut normalized: Vec<Method> = Vec::new();
        for method in methods {
            if !normalized.contains(&method) {
                normalized.push(method.clone());
            }
            if method == Method::GET && !normalized.contains(&Method::HEAD) {
                normalized.push(Method::HEAD);
            }
        }

        let pattern = PathPattern::compile(&path, options.match_options())?;
        Ok(Self {
            path,
            methods: normalized,
            stack,
            name,
            options,
            pattern,
        })
    }

    /// The current path pattern, including any prefixes applied.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared methods, in declaration order.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Route name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Matching options.
    #[must_use]
    pub fn options(&self) -> LayerOptions {
        self.options
    }

    /// Declared parameter keys, in path order.
    #[must_use]
    pub fn keys(&self) -> &[Key] {
        self.pattern.keys()
    }

    /// The compiled regex.
    #[must_use]
    pub fn regex(&self) -> &regex::Regex {
        self.pattern.regex()
    }

    /// Number of entries in the middleware stack.
    #[must_use]
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub(crate) fn stack(&self) -> impl Iterator<Item = &BoxedMiddleware> {
        self.stack.iter().map(|entry| &entry.middleware)
    }

    /// Returns true if this layer answers `method`. Layers without declared
    /// methods answer every method.
    #[must_use]
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// Returns true if `path` matches the pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    /// Raw captures for `path`. Empty when captures are ignored.
    #[must_use]
    pub fn captures(&self, path: &str) -> Vec<String> {
        if self.options.ignore_captures {
            return Vec::new();
        }
        self.pattern.captures(path)
    }

    /// Binds each non-empty capture to its key, percent-decoded, replacing
    /// existing values.
    pub fn params(&self, captures: &[String], params: &mut Params) {
        for (capture, key) in captures.iter().zip(self.pattern.keys()) {
            if !capture.is_empty() {
                params.insert(key.name.as_str(), path::decode_component(capture));
            }
        }
    }

    /// Builds a URL for this route.
    ///
    /// # Errors
    ///
    /// See [`path::to_url`].
    pub fn url(&self, params: impl Into<UrlParams>, options: &UrlOptions) -> Result<String, RouterError> {
        let options = UrlOptions {
            sensitive: self.options.sensitive,
            ..options.clone()
        };
        path::to_url(&self.path, &params.into(), &options)
    }

    /// Prepends `prefix` to the path and recompiles.
    ///
    /// Prefixes accumulate: applying `/a` then `/b` yields `/b/a/...`. A
    /// non-strict root route becomes the prefix itself. An empty prefix only
    /// recompiles.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] if the prefixed path does not
    /// compile; the layer is left unchanged.
    pub fn set_prefix(&mut self, prefix: &str) -> Result<(), RouterError> {
        let path = if prefix.is_empty() || self.path.is_empty() {
            self.path.clone()
        } else if self.path != "/" || self.options.strict {
            format!("{prefix}{}", self.path)
        } else {
            prefix.to_string()
        };

        let pattern = PathPattern::compile(&path, self.options.match_options())?;
        self.path = path;
        self.pattern = pattern;
        Ok(())
    }

    /// Inserts a parameter hook into the stack.
    ///
    /// Hooks run before the route's own middleware, and a hook for a
    /// parameter that appears earlier in the path runs before one for a
    /// later parameter. Names the path does not declare are ignored.
    pub fn param(&mut self, name: &str, hook: Arc<dyn ParamMiddleware>) {
        let position_of = |param: &str| self.keys().iter().position(|key| key.name == param);

        let Some(target) = position_of(name) else {
            return;
        };

        let index = self.stack.iter().position(|entry| match &entry.param {
            None => true,
            Some(other) => position_of(other).is_some_and(|i| i > target),
        });

        let entry = StackEntry::param(name, hook);
        match index {
            Some(index) => self.stack.insert(index, entry),
            None => self.stack.push(entry),
        }
    }

    /// Parameter names of the stack entries, in order. Plain entries are
    /// `None`.
    #[must_use]
    pub fn stack_params(&self) -> Vec<Option<&str>> {
        self.stack.iter().map(|entry| entry.param.as_deref()).collect()
    }
}

impl MatchedRoute for Layer {
    fn path(&self) -> &str {
        &self.path
    }

    fn methods(&self) -> &[Method] {
        &self.methods
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("name", &self.name)
            .field("regex", &self.pattern.regex().as_str())
            .field("stack", &self.stack_params())
            .finish()
    }
}
