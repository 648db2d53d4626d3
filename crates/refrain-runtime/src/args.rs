#![forbid(unsafe_code)]

//! Call arguments: typed-erased values, call-site collection, and binding.
//!
//! # Design
//!
//! A refreshable function declares its parameter names up front (see
//! [`RefreshableBuilder::params`](crate::refreshable::RefreshableBuilder::params)).
//! Call sites collect values into [`CallArgs`] either positionally or by
//! keyword; [`bind_arguments`] then matches them against the declaration and
//! produces the by-name map a body reads through [`Invocation`]. Validation
//! is explicit and runs before the body: a parameter supplied both ways, an
//! unknown keyword, or positional overflow all fail with a typed
//! [`Error`](crate::error::Error) naming the function and parameter.
//!
//! Values are reference-counted `Any` boxes. Bodies read them back with
//! [`Invocation::arg`], which clones the concrete value out.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::error::Error;
use crate::instance::InstanceId;

/// One type-erased argument value. Cloning shares the underlying allocation.
#[derive(Clone)]
pub struct ArgValue(Rc<dyn Any>);

impl ArgValue {
    #[must_use]
    pub fn new<T: 'static>(value: T) -> Self {
        Self(Rc::new(value))
    }

    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArgValue(..)")
    }
}

/// Arguments collected at a call site, positional and keyword.
///
/// ```
/// use refrain_runtime::args::CallArgs;
///
/// let args = CallArgs::new().pos(7_i64).kw("label", "hits".to_string());
/// assert_eq!(args.positional_len(), 1);
/// assert_eq!(args.keyword_len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub(crate) positional: Vec<ArgValue>,
    pub(crate) keyword: AHashMap<String, ArgValue>,
}

impl CallArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn pos<T: 'static>(mut self, value: T) -> Self {
        self.positional.push(ArgValue::new(value));
        self
    }

    /// Sets a keyword argument, replacing any earlier value for `name`.
    #[must_use]
    pub fn kw<T: 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.keyword.insert(name.into(), ArgValue::new(value));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    #[must_use]
    pub fn positional_len(&self) -> usize {
        self.positional.len()
    }

    #[must_use]
    pub fn keyword_len(&self) -> usize {
        self.keyword.len()
    }
}

/// What a body sees for one run: the bound arguments plus call identity.
#[derive(Clone)]
pub struct Invocation {
    function: Rc<str>,
    instance: Option<InstanceId>,
    args: Rc<AHashMap<String, ArgValue>>,
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("function", &self.function)
            .field("instance", &self.instance)
            .field("bound", &self.args.len())
            .finish()
    }
}

impl Invocation {
    pub(crate) fn new(
        function: Rc<str>,
        instance: Option<InstanceId>,
        args: AHashMap<String, ArgValue>,
    ) -> Self {
        Self { function, instance, args: Rc::new(args) }
    }

    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Identity this run is scoped to, when invoked through a binding.
    #[must_use]
    pub fn instance(&self) -> Option<InstanceId> {
        self.instance
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    /// Reads the bound argument `name`, cloning it out as `T`.
    ///
    /// # Panics
    ///
    /// Panics when `name` was never bound or holds a different type. Use
    /// [`arg_opt`](Self::arg_opt) for parameters that may be absent.
    #[must_use]
    pub fn arg<T: Clone + 'static>(&self, name: &str) -> T {
        let Some(value) = self.args.get(name) else {
            panic!("`{}` was called without an argument for `{name}`", self.function);
        };
        let Some(value) = value.downcast_ref::<T>() else {
            panic!(
                "argument `{name}` of `{}` holds a different type than requested",
                self.function
            );
        };
        value.clone()
    }

    /// Like [`arg`](Self::arg) but `None` on a missing name or type mismatch.
    #[must_use]
    pub fn arg_opt<T: Clone + 'static>(&self, name: &str) -> Option<T> {
        self.args.get(name)?.downcast_ref::<T>().cloned()
    }
}

/// Binds call-site arguments against the declared parameter list.
///
/// Rejections are deterministic: positional overflow first, then a parameter
/// passed both ways (in declaration order), then unknown keywords (first in
/// lexicographic order).
pub(crate) fn bind_arguments(
    function: &str,
    params: &[String],
    positional: &[ArgValue],
    keyword: &AHashMap<String, ArgValue>,
) -> Result<AHashMap<String, ArgValue>, Error> {
    if positional.len() > params.len() {
        return Err(Error::TooManyPositional {
            function: function.to_string(),
            expected: params.len(),
            given: positional.len(),
        });
    }
    for name in &params[..positional.len()] {
        if keyword.contains_key(name.as_str()) {
            return Err(Error::InconsistentArgument {
                function: function.to_string(),
                parameter: name.clone(),
            });
        }
    }
    let mut unknown: Vec<&str> = keyword
        .keys()
        .map(String::as_str)
        .filter(|key| !params.iter().any(|param| param.as_str() == *key))
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(Error::UnknownKeyword {
            function: function.to_string(),
            parameter: unknown[0].to_string(),
        });
    }

    let mut bound = AHashMap::with_capacity(positional.len() + keyword.len());
    for (name, value) in params.iter().zip(positional) {
        bound.insert(name.clone(), value.clone());
    }
    for (name, value) in keyword {
        bound.insert(name.clone(), value.clone());
    }
    Ok(bound)
}

// ─────────────────────────────────── Tests ──────────────────────────────────
