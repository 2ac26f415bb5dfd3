//! Registered method handlers.
//!
//! A `Handlers` map is built once per responder: method name -> async
//! function taking the request arguments and producing a result or a
//! [`Fault`]. Requests for unregistered methods fail with an
//! `UnknownMethod` fault instead of reaching any handler.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde_json::Value;

use crate::error::Fault;

/// Future returned by a handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value, Fault>>;

type HandlerFn = Arc<dyn Fn(Vec<Value>) -> HandlerFuture + Send + Sync>;

/// Method name -> handler map.
#[derive(Clone, Default)]
pub struct Handlers {
    methods: HashMap<String, HandlerFn>,
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.methods().collect();
        names.sort_unstable();
        f.debug_struct("Handlers").field("methods", &names).finish()
    }
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn on<F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Fault>> + Send + 'static,
    {
        self.insert(method, handler);
        self
    }

    /// Register (or replace) the handler for `method`.
    pub fn insert<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Fault>> + Send + 'static,
    {
        let handler: HandlerFn = Arc::new(move |args| handler(args).boxed());
        self.methods.insert(method.into(), handler);
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Required methods that have no handler, in the order given.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|method| !self.contains(method))
            .collect()
    }

    /// Invoke the handler for `method`.
    pub fn invoke(&self, method: &str, args: Vec<Value>) -> HandlerFuture {
        match self.methods.get(method) {
            Some(handler) => handler(args),
            None => future::ready(Err(Fault::unknown_method(method))).boxed(),
        }
    }
}

/// Take the single options argument of a primary operation.
///
/// Missing arguments read as `null`; extra arguments are rejected.
pub fn single_argument(mut args: Vec<Value>) -> Result<Value, Fault> {
    match args.len() {
        0 => Ok(Value::Null),
        1 => Ok(args.pop().unwrap_or(Value::Null)),
        n => Err(Fault::invalid_arguments(format!(
            "expected a single options argument, got {}",
            n
        ))),
    }
}
