//! Method Registry.
//!
//! Registration happens in two phases:
//!
//! 1. **Load**: a mutable [`Registry`] collects class declarations and
//!    method registrations.
//! 2. **Freeze**: [`Registry::freeze`] resolves every class's inheritance
//!    chain once, flattens inherited methods with override semantics, and
//!    returns an immutable [`Suite`]. Runs only ever see a `Suite`.
//!
//! ## Inheritance
//!
//! A class may extend several parents. Its *lineage* lists the class and
//! all of its ancestors, most ancestral first and the class itself last;
//! every class appears after all of its own parents. Parents are walked
//! right to left, so when two parents declare the same method name, the
//! leftmost parent wins.
//!
//! A method declared under the same name lower in the lineage replaces
//! the ancestor's for every purpose: only the most-derived declaration
//! runs and only its expected count enters the plan.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::RegistrationError;
use crate::method::{MethodDescriptor, MethodKind};

/// A test class as declared, before its methods are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub name: String,
    pub parents: Vec<String>,
    /// When set, the class is never selected to run. It still serves as an
    /// ancestor for other classes.
    pub skip: Option<String>,
}

impl ClassDecl {
    pub fn new(name: impl Into<String>) -> Self {
        ClassDecl {
            name: name.into(),
            parents: Vec::new(),
            skip: None,
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }
}

#[derive(Debug)]
struct DeclaredClass {
    decl: ClassDecl,
    methods: BTreeMap<String, MethodDescriptor>,
}

/// Load-phase registry. Mutable until frozen.
#[derive(Debug, Default)]
pub struct Registry {
    classes: Vec<DeclaredClass>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, decl: ClassDecl) -> Result<(), RegistrationError> {
        if self.index.contains_key(&decl.name) {
            return Err(RegistrationError::DuplicateClass { class: decl.name });
        }
        self.index.insert(decl.name.clone(), self.classes.len());
        self.classes.push(DeclaredClass {
            decl,
            methods: BTreeMap::new(),
        });
        Ok(())
    }

    /// Record `method` on `class`.
    ///
    /// Re-registering a name with the same kind replaces the earlier
    /// descriptor. Re-registering it with a different kind is an error.
    pub fn register(
        &mut self,
        class: &str,
        method: MethodDescriptor,
    ) -> Result<(), RegistrationError> {
        let idx = *self
            .index
            .get(class)
            .ok_or_else(|| RegistrationError::UnknownClass {
                class: class.to_string(),
            })?;
        let methods = &mut self.classes[idx].methods;

        if let Some(existing) = methods.get(&method.name) {
            if existing.kind != method.kind {
                return Err(RegistrationError::DuplicateRegistration {
                    class: class.to_string(),
                    method: method.name,
                    existing: existing.kind,
                    requested: method.kind,
                });
            }
            tracing::warn!(
                class = class,
                method = %method.name,
                "method re-registered, replacing earlier descriptor"
            );
        }
        methods.insert(method.name.clone(), method);
        Ok(())
    }

    /// Declare a class and register all of `methods` on it.
    pub fn add_class(
        &mut self,
        decl: ClassDecl,
        methods: impl IntoIterator<Item = MethodDescriptor>,
    ) -> Result<(), RegistrationError> {
        let name = decl.name.clone();
        self.declare(decl)?;
        for method in methods {
            self.register(&name, method)?;
        }
        Ok(())
    }

    /// Resolve inheritance and produce the read-only suite.
    pub fn freeze(self) -> Result<Suite, RegistrationError> {
        let mut resolved = Vec::with_capacity(self.classes.len());

        for (declared_at, class) in self.classes.iter().enumerate() {
            let lineage = self.lineage(declared_at)?;

            let mut methods: BTreeMap<String, ResolvedMethod> = BTreeMap::new();
            for (depth, &ancestor) in lineage.iter().enumerate() {
                let source = &self.classes[ancestor];
                for (name, descriptor) in &source.methods {
                    methods.insert(
                        name.clone(),
                        ResolvedMethod {
                            descriptor: descriptor.clone(),
                            declared_in: source.decl.name.clone(),
                            depth,
                        },
                    );
                }
            }

            resolved.push(ResolvedClass {
                name: class.decl.name.clone(),
                declared_at,
                skip: class.decl.skip.clone(),
                lineage: lineage
                    .iter()
                    .map(|&i| self.classes[i].decl.name.clone())
                    .collect(),
                methods,
            });
        }

        tracing::debug!(classes = resolved.len(), "registry frozen");
        Ok(Suite {
            classes: resolved,
            index: self.index,
        })
    }

    fn lineage(&self, start: usize) -> Result<Vec<usize>, RegistrationError> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut visiting = HashSet::new();
        self.visit(start, &mut visiting, &mut done, &mut order)?;
        Ok(order)
    }

    // Post-order walk: a class is pushed only after all of its parents.
    fn visit(
        &self,
        idx: usize,
        visiting: &mut HashSet<usize>,
        done: &mut HashSet<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), RegistrationError> {
        if done.contains(&idx) {
            return Ok(());
        }
        let decl = &self.classes[idx].decl;
        if !visiting.insert(idx) {
            return Err(RegistrationError::InheritanceCycle {
                class: decl.name.clone(),
            });
        }
        for parent in decl.parents.iter().rev() {
            let parent_idx =
                *self
                    .index
                    .get(parent)
                    .ok_or_else(|| RegistrationError::UnknownParent {
                        class: decl.name.clone(),
                        parent: parent.clone(),
                    })?;
            self.visit(parent_idx, visiting, done, order)?;
        }
        visiting.remove(&idx);
        done.insert(idx);
        order.push(idx);
        Ok(())
    }
}

/// A method as it applies to a particular class after flattening.
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    descriptor: MethodDescriptor,
    declared_in: String,
    depth: usize,
}

impl ResolvedMethod {
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn kind(&self) -> MethodKind {
        self.descriptor.kind
    }

    /// The class whose declaration won.
    pub fn declared_in(&self) -> &str {
        &self.declared_in
    }

    /// Position of the declaring class in the lineage; 0 is most ancestral.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// A class with its fully resolved method table.
#[derive(Debug, Clone)]
pub struct ResolvedClass {
    name: String,
    declared_at: usize,
    skip: Option<String>,
    lineage: Vec<String>,
    methods: BTreeMap<String, ResolvedMethod>,
}

impl ResolvedClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index in declaration order.
    pub fn declared_at(&self) -> usize {
        self.declared_at
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip.as_deref()
    }

    /// Most ancestral first, this class last.
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    pub fn method(&self, name: &str) -> Option<&ResolvedMethod> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &ResolvedMethod> {
        self.methods.values()
    }

    pub fn methods_of_kind(&self, kind: MethodKind) -> impl Iterator<Item = &ResolvedMethod> {
        self.methods.values().filter(move |m| m.kind() == kind)
    }

    /// Effective test methods in execution order.
    pub fn test_methods(&self) -> Vec<&ResolvedMethod> {
        let mut tests: Vec<&ResolvedMethod> = self.methods_of_kind(MethodKind::Test).collect();
        tests.sort_by(|a, b| a.descriptor.sequence_cmp(&b.descriptor));
        tests
    }

    /// True if the class has at least one effective test method and is not
    /// marked skipped.
    pub fn is_runnable(&self) -> bool {
        self.skip.is_none() && self.methods_of_kind(MethodKind::Test).next().is_some()
    }
}

/// Frozen, read-only set of resolved test classes.
#[derive(Debug, Clone)]
pub struct Suite {
    classes: Vec<ResolvedClass>,
    index: HashMap<String, usize>,
}

impl Suite {
    pub fn class(&self, name: &str) -> Option<&ResolvedClass> {
        self.index.get(name).map(|&i| &self.classes[i])
    }

    /// All classes in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = &ResolvedClass> {
        self.classes.iter()
    }

    /// Classes a default run would select, alphabetically.
    pub fn runnable_classes(&self) -> Vec<&ResolvedClass> {
        let mut runnable: Vec<&ResolvedClass> =
            self.classes.iter().filter(|c| c.is_runnable()).collect();
        runnable.sort_by(|a, b| a.name.cmp(&b.name));
        runnable
    }

    /// Names of the effective test methods of `class`, in execution order.
    pub fn test_methods(&self, class: &str) -> Result<Vec<&str>, RegistrationError> {
        let class = self
            .class(class)
            .ok_or_else(|| RegistrationError::UnknownClass {
                class: class.to_string(),
            })?;
        Ok(class.test_methods().into_iter().map(|m| m.name()).collect())
    }
}
