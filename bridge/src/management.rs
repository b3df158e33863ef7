//! Seam to the platform's extension management API.

use parking_lot::RwLock;
use rule_engine::{Extension, ExtensionId};

use crate::errors::ManagementError;

/// Lists installed extensions and switches them on or off
pub trait ManagementApi: Send + Sync {
    /// Every installed extension, including the host extension
    fn installed(&self) -> Vec<Extension>;

    fn set_enabled(&self, id: &ExtensionId, enabled: bool) -> Result<(), ManagementError>;
}

/// Management API over a fixed set of extensions held in memory
#[derive(Debug, Default)]
pub struct InMemoryManagement {
    extensions: RwLock<Vec<Extension>>,
}

impl InMemoryManagement {
    pub fn new(extensions: Vec<Extension>) -> Self {
        Self {
            extensions: RwLock::new(extensions),
        }
    }

    pub fn is_enabled(&self, id: &str) -> Option<bool> {
        self.extensions
            .read()
            .iter()
            .find(|e| e.id.as_str() == id)
            .map(|e| e.enabled)
    }
}

impl ManagementApi for InMemoryManagement {
    fn installed(&self) -> Vec<Extension> {
        self.extensions.read().clone()
    }

    fn set_enabled(&self, id: &ExtensionId, enabled: bool) -> Result<(), ManagementError> {
        let mut extensions = self.extensions.write();
        let extension = extensions
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| ManagementError::NotInstalled(id.clone()))?;
        extension.enabled = enabled;
        Ok(())
    }
}
