//! Unary service schemas shared by the generic client and server.

use crate::codec::SharedCodec;
use std::collections::BTreeMap;

/// One unary, non-streaming method.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: String,
    /// `/{name}`
    pub path: String,
    /// Used for both request and response bodies.
    pub codec: SharedCodec,
}

impl MethodDescriptor {
    pub fn unary(name: impl Into<String>, codec: SharedCodec) -> Self {
        let name = name.into();
        Self {
            path: format!("/{}", name),
            name,
            codec,
        }
    }

    /// Streaming is not supported; every method is single request, single response.
    pub fn is_streaming(&self) -> bool {
        false
    }
}

/// Named collection of unary methods, keyed by method name.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub name: String,
    methods: BTreeMap<String, MethodDescriptor>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: BTreeMap::new(),
        }
    }

    /// A service with one unary method per name, all sharing `codec`.
    pub fn unary<I, S>(name: impl Into<String>, methods: I, codec: &SharedCodec) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut service = Self::new(name);
        for method in methods {
            service.add_method(MethodDescriptor::unary(method, codec.clone()));
        }
        service
    }

    pub fn add_method(&mut self, method: MethodDescriptor) {
        self.methods.insert(method.name.clone(), method);
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn method_by_path(&self, path: &str) -> Option<&MethodDescriptor> {
        self.methods.get(path.strip_prefix('/')?)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.values()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
