//! Provider discovery.
//!
//! The host does not know how providers are installed. It asks a
//! [`ProviderDirectory`] which endpoints advertise the card capability, checks
//! each one's declared permissions, and opens a channel to the survivors.

use std::fmt;
use std::sync::Arc;

use cardhost_types::ProviderId;

use crate::channel::Channel;
use crate::error::ConnectError;

/// What a provider declares about its endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub package: String,
    pub endpoint: String,
    /// Component name within the package. Used to resolve enabled state.
    pub name: String,
    pub read_permission: Option<String>,
    pub write_permission: Option<String>,
    pub grant_uri_permissions: bool,
    pub force_uri_permissions: bool,
    pub uri_permission_patterns: Option<Vec<String>>,
    /// Manifest default, consulted when the component state is `Default`.
    pub enabled: bool,
}

impl ProviderInfo {
    /// Enabled, with no permissions declared.
    pub fn new(
        package: impl Into<String>,
        endpoint: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            endpoint: endpoint.into(),
            name: name.into(),
            read_permission: None,
            write_permission: None,
            grant_uri_permissions: false,
            force_uri_permissions: false,
            uri_permission_patterns: None,
            enabled: true,
        }
    }

    /// Guard both read and write access with `permission`.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        let permission = permission.into();
        self.read_permission = Some(permission.clone());
        self.write_permission = Some(permission);
        self
    }

    #[must_use]
    pub fn id(&self) -> ProviderId {
        ProviderId::new(self.package.clone(), self.endpoint.clone())
    }
}

/// Why a discovered provider is not connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ReadPermission,
    WritePermission,
    GrantsUriPermissions,
    ForcesUriPermissions,
    UriPermissionPatterns,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ReadPermission => "read permission does not match",
            Self::WritePermission => "write permission does not match",
            Self::GrantsUriPermissions => "must not grant URI permissions",
            Self::ForcesUriPermissions => "must not force URI permissions",
            Self::UriPermissionPatterns => "must not declare URI permission patterns",
        };
        f.write_str(reason)
    }
}

/// Accept `info` only if both permissions equal `required_permission` and it
/// hands out no URI permissions of any kind.
pub fn check_provider(info: &ProviderInfo, required_permission: &str) -> Result<(), Rejection> {
    if info.read_permission.as_deref() != Some(required_permission) {
        return Err(Rejection::ReadPermission);
    }
    if info.write_permission.as_deref() != Some(required_permission) {
        return Err(Rejection::WritePermission);
    }
    if info.grant_uri_permissions {
        return Err(Rejection::GrantsUriPermissions);
    }
    if info.force_uri_permissions {
        return Err(Rejection::ForcesUriPermissions);
    }
    if info.uri_permission_patterns.is_some() {
        return Err(Rejection::UriPermissionPatterns);
    }
    Ok(())
}

/// Explicit enabled state of a package component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentState {
    Enabled,
    Disabled,
    /// Not overridden; fall back to [`ProviderInfo::enabled`].
    #[default]
    Default,
}

impl ComponentState {
    #[must_use]
    pub fn resolve(self, declared: bool) -> bool {
        match self {
            Self::Enabled => true,
            Self::Disabled => false,
            Self::Default => declared,
        }
    }
}

/// Package lifecycle notifications fed to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEvent {
    PackageAdded {
        package: String,
    },
    PackageRemoved {
        package: String,
    },
    /// Named components of `package` changed enabled state. A name equal to
    /// the package itself means the whole package.
    PackageChanged {
        package: String,
        components: Vec<String>,
    },
}

pub trait ProviderDirectory: Send + Sync {
    /// Every installed endpoint advertising `capability`.
    fn providers(&self, capability: &str) -> Vec<ProviderInfo>;

    /// Every endpoint declared by `package`, whatever its capability.
    fn package_providers(&self, package: &str) -> Vec<ProviderInfo>;

    fn is_package_enabled(&self, package: &str) -> bool;

    fn component_state(&self, package: &str, name: &str) -> ComponentState;

    fn open_channel(&self, provider: &ProviderInfo) -> Result<Arc<dyn Channel>, ConnectError>;
}
