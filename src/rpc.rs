//! Fully qualified service and method names shared by every RPC surface.

use std::fmt;

/// Prefix for all service names exposed by the node.
pub const SERVICE_PREFIX: &str = "runtime-host";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: &str) -> Self {
        ServiceName(format!("{}.{}", SERVICE_PREFIX, name))
    }

    pub fn method(&self, name: &str) -> MethodName {
        MethodName { service: self.clone(), short: name.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodName {
    service: ServiceName,
    short: String,
}

impl MethodName {
    pub fn short_name(&self) -> &str {
        &self.short
    }

    /// `/<service>/<method>`, as used by gRPC-style routing.
    pub fn full_name(&self) -> String {
        format!("/{}/{}", self.service, self.short)
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
