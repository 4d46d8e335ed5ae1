//! Lexical scopes of table sources
//!
//! A [`ScopeStack`] is populated by the [`binder`] while it walks a script.
//! The bottom frame is the session scope: it lives for the whole script and
//! holds temp tables created with `SELECT ... INTO #name`.

pub mod binder;

use std::ops::{Deref, DerefMut};

use indexmap::IndexMap;
use serde::Serialize;

use crate::settings::DuplicateAliasPolicy;

pub use binder::{bind, Bindings};

/// Where a table name's rows come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    TableOrView,
    CommonTableExpression,
    TempTable,
    DerivedTable,
    Other,
}

/// A table source visible in some scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableBinding {
    pub database: String,
    pub schema: String,
    pub object: String,
    pub alias: Option<String>,
    pub kind: SourceKind,
}

impl TableBinding {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        object: impl Into<String>,
        kind: SourceKind,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            object: object.into(),
            alias: None,
            kind,
        }
    }

    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }

    /// `database.schema.object`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.object)
    }
}

/// One frame of the stack, keyed case-insensitively by alias (or full name when unaliased)
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: IndexMap<String, TableBinding>,
    ctes: Vec<String>,
}

impl Scope {
    pub fn get(&self, key: &str) -> Option<&TableBinding> {
        self.bindings.get(&key.to_lowercase())
    }

    pub fn bindings(&self) -> impl Iterator<Item = &TableBinding> {
        self.bindings.values()
    }

    pub fn defines_cte(&self, name: &str) -> bool {
        self.ctes.iter().any(|cte| cte.eq_ignore_ascii_case(name))
    }

    fn insert(
        &mut self,
        key: &str,
        binding: TableBinding,
        policy: DuplicateAliasPolicy,
    ) -> Registration {
        let key = key.to_lowercase();
        match self.bindings.get_mut(&key) {
            Some(existing) => {
                tracing::debug!(alias = %key, policy = %policy, "duplicate alias in scope");
                if policy == DuplicateAliasPolicy::KeepLast {
                    *existing = binding;
                }
                Registration::Duplicate
            }
            None => {
                self.bindings.insert(key, binding);
                Registration::Inserted
            }
        }
    }
}

/// Outcome of [`ScopeStack::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    /// The key was already taken in the current scope; the policy decided which binding stays
    Duplicate,
}

/// Token returned by [`ScopeStack::begin_scope`]
#[derive(Debug)]
#[must_use = "a scope must be ended with ScopeStack::end_scope"]
pub struct ScopeHandle {
    depth: usize,
}

#[derive(Debug, Clone)]
pub struct ScopeStack {
    frames: Vec<Scope>,
    policy: DuplicateAliasPolicy,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new(DuplicateAliasPolicy::default())
    }
}

impl ScopeStack {
    pub fn new(policy: DuplicateAliasPolicy) -> Self {
        Self {
            frames: vec![Scope::default()],
            policy,
        }
    }

    /// Number of frames, the session scope included
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn begin_scope(&mut self) -> ScopeHandle {
        self.frames.push(Scope::default());
        tracing::trace!(depth = self.frames.len(), "begin scope");
        ScopeHandle {
            depth: self.frames.len() - 1,
        }
    }

    /// Pop the scope `handle` opened, along with any scope opened after it
    pub fn end_scope(&mut self, handle: ScopeHandle) {
        self.frames.truncate(handle.depth.max(1));
        tracing::trace!(depth = self.frames.len(), "end scope");
    }

    /// Begin a scope that ends when the guard is dropped, early returns and panics included
    pub fn scoped(&mut self) -> ScopeGuard<'_> {
        ScopeGuard::enter(self)
    }

    fn current_mut(&mut self) -> &mut Scope {
        // the session frame is never popped
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Register a table source under `key` (its alias, or full name when unaliased)
    pub fn register(&mut self, key: &str, binding: TableBinding) -> Registration {
        let policy = self.policy;
        self.current_mut().insert(key, binding, policy)
    }

    /// Register in the current scope and in the session scope, for temp tables
    /// that stay visible after the creating statement
    pub fn register_session(&mut self, key: &str, binding: TableBinding) -> Registration {
        let policy = self.policy;
        let registration = self.current_mut().insert(key, binding.clone(), policy);
        if self.frames.len() > 1 {
            self.frames[0].insert(key, binding, policy);
        }
        registration
    }

    pub fn register_cte(&mut self, name: &str) {
        self.current_mut().ctes.push(name.to_string());
    }

    /// Whether `name` is a CTE defined in the current or an enclosing scope
    pub fn is_cte(&self, name: &str) -> bool {
        self.frames.iter().rev().any(|frame| frame.defines_cte(name))
    }

    /// Look `alias` up from the innermost scope outwards
    pub fn find(&self, alias: &str) -> Option<&TableBinding> {
        self.frames.iter().rev().find_map(|frame| frame.get(alias))
    }

    /// Look `alias` up in the innermost scope only
    pub fn find_in_current(&self, alias: &str) -> Option<&TableBinding> {
        self.frames.last().and_then(|frame| frame.get(alias))
    }

    pub fn current_scope_bindings(&self) -> Vec<&TableBinding> {
        self.frames
            .last()
            .map(|frame| frame.bindings().collect())
            .unwrap_or_default()
    }

    /// Look `alias` up in the session scope only
    pub fn find_in_session(&self, alias: &str) -> Option<&TableBinding> {
        self.frames[0].get(alias)
    }

    pub fn session_bindings(&self) -> Vec<&TableBinding> {
        self.frames[0].bindings().collect()
    }
}

impl AsMut<ScopeStack> for ScopeStack {
    fn as_mut(&mut self) -> &mut ScopeStack {
        self
    }
}

/// Scope that ends on drop; dereferences to whatever owns the stack
pub struct ScopeGuard<'a, T: AsMut<ScopeStack> = ScopeStack> {
    owner: &'a mut T,
    handle: Option<ScopeHandle>,
}

impl<'a, T: AsMut<ScopeStack>> ScopeGuard<'a, T> {
    /// Begin a scope on the stack `owner` holds
    pub fn enter(owner: &'a mut T) -> Self {
        let handle = owner.as_mut().begin_scope();
        Self {
            owner,
            handle: Some(handle),
        }
    }
}

impl<T: AsMut<ScopeStack>> Deref for ScopeGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.owner
    }
}

impl<T: AsMut<ScopeStack>> DerefMut for ScopeGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.owner
    }
}

impl<T: AsMut<ScopeStack>> Drop for ScopeGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.owner.as_mut().end_scope(handle);
        }
    }
}
