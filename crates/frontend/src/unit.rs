use std::sync::{Arc, Mutex, PoisonError};

use ir::MethodBody;
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{analyze, FrontendConfig, FrontendError, MethodDecl};

/// A set of method declarations whose bodies are built on first request.
///
/// Every body is analyzed at most once, and analysis happens under the unit
/// lock, so concurrent requests for the same method observe one result.
pub struct CompilationUnit {
    config: FrontendConfig,
    methods: FxHashMap<SmolStr, LazyBody>,
    lock: Mutex<()>,
}

struct LazyBody {
    decl: MethodDecl,
    body: OnceCell<Arc<MethodBody>>,
}

impl CompilationUnit {
    pub fn new(config: FrontendConfig) -> Self {
        Self {
            config,
            methods: FxHashMap::default(),
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    /// # Panics
    /// Panics if a method with the same name is already declared.
    pub fn declare(&mut self, decl: MethodDecl) {
        let name = decl.name.clone();
        let previous = self.methods.insert(
            name.clone(),
            LazyBody {
                decl,
                body: OnceCell::new(),
            },
        );
        assert!(previous.is_none(), "method `{name}` is declared twice");
    }

    pub fn decl(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.get(name).map(|method| &method.decl)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.methods.keys()
    }

    /// Whether the body of `name` has been built.
    pub fn is_analyzed(&self, name: &str) -> bool {
        self.methods
            .get(name)
            .is_some_and(|method| method.body.get().is_some())
    }

    /// The body of `name`, analyzing its declaration on first use. A failed
    /// analysis is not cached, so a later call reports the error again.
    pub fn body(&self, name: &str) -> Result<Arc<MethodBody>, FrontendError> {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| FrontendError::UnknownMethod(name.to_string()))?;
        if let Some(body) = method.body.get() {
            return Ok(body.clone());
        }

        self.run_exclusively(|| {
            method
                .body
                .get_or_try_init(|| {
                    tracing::debug!(method = name, "analyzing method body");
                    analyze(&method.decl, &self.config).map(Arc::new)
                })
                .cloned()
        })
    }

    /// Runs `f` while holding the unit lock.
    pub fn run_exclusively<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

impl Default for CompilationUnit {
    fn default() -> Self {
        Self::new(FrontendConfig::default())
    }
}
