use anyhow::{Result, anyhow};

/// The citizen the portal is acting for. Starts unset; whoever needs it
/// receives it explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityContext {
    citizen_id: Option<String>,
}

impl IdentityContext {
    pub fn unset() -> Self {
        Self::default()
    }

    pub fn with_citizen_id(id: impl Into<String>) -> Self {
        let mut context = Self::default();
        context.set_citizen_id(id);
        context
    }

    /// Blank ids leave the context unset.
    pub fn set_citizen_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        let id = id.trim();
        self.citizen_id = if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        };
    }

    pub fn citizen_id(&self) -> Option<&str> {
        self.citizen_id.as_deref()
    }

    pub fn require(&self) -> Result<&str> {
        self.citizen_id()
            .ok_or_else(|| anyhow!("citizen id is not set"))
    }
}
