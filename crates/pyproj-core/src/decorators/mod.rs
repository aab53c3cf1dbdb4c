//! Ordered wrappers applied around a hook caller before use.

mod setuptools;

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use tracing::{error, trace};

use crate::hooks::HookCaller;

pub use setuptools::SetuptoolsDecorator;

pub const DEFAULT_PRIORITY: i32 = 100;

pub trait HookCallerDecorator: Send + Sync {
    fn name(&self) -> &str;

    /// Lower values wrap first and therefore sit closest to the backend.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Wrap `caller`, or hand it back untouched when this decorator does
    /// not apply to its backend.
    fn decorate(&self, caller: Arc<dyn HookCaller>) -> anyhow::Result<Arc<dyn HookCaller>>;
}

#[derive(Clone, Default)]
pub struct DecoratorRegistry {
    decorators: Vec<Arc<dyn HookCallerDecorator>>,
}

impl fmt::Debug for DecoratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl DecoratorRegistry {
    /// Registry with the decorators shipped in this crate.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(SetuptoolsDecorator));
        registry
    }

    pub fn register(&mut self, decorator: Arc<dyn HookCallerDecorator>) {
        self.decorators.push(decorator);
        self.decorators
            .sort_by(|a, b| (a.priority(), a.name()).cmp(&(b.priority(), b.name())));
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.decorators.iter().map(|decorator| decorator.name()).collect()
    }

    /// Apply every decorator in order. One that fails or panics is logged
    /// and skipped; the chain continues with the caller it was given.
    pub fn decorate(&self, caller: Arc<dyn HookCaller>) -> Arc<dyn HookCaller> {
        let mut current = caller;
        for decorator in &self.decorators {
            trace!(
                decorator = decorator.name(),
                priority = decorator.priority(),
                backend = current.backend_name(),
                "applying hook caller decorator"
            );
            let attempt =
                panic::catch_unwind(AssertUnwindSafe(|| decorator.decorate(Arc::clone(&current))));
            match attempt {
                Ok(Ok(decorated)) => current = decorated,
                Ok(Err(err)) => {
                    error!(
                        decorator = decorator.name(),
                        "hook caller decorator failed, skipping: {err:#}"
                    );
                }
                Err(_) => {
                    error!(
                        decorator = decorator.name(),
                        "hook caller decorator panicked, skipping"
                    );
                }
            }
        }
        current
    }
}
