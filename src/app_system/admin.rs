use subtle::ConstantTimeEq;

use crate::error::CatalogError;

/// Single shared-secret check guarding the admin surface.
#[derive(Clone)]
pub struct AdminGate {
    secret: Option<String>,
}

impl AdminGate {
    /// A blank secret counts as none, which locks the gate for everyone.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn verify(&self, attempt: &str) -> Result<(), CatalogError> {
        match &self.secret {
            Some(secret) if secret.as_bytes().ct_eq(attempt.as_bytes()).unwrap_u8() == 1 => Ok(()),
            _ => Err(CatalogError::Unauthorized),
        }
    }
}

impl std::fmt::Debug for AdminGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminGate")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate() {
        let gate = AdminGate::new(Some("s3cret".into()));
        assert!(gate.verify("s3cret").is_ok());
        assert_eq!(gate.verify("s3cre"), Err(CatalogError::Unauthorized));
        assert_eq!(gate.verify("S3cret"), Err(CatalogError::Unauthorized));
        assert_eq!(gate.verify(""), Err(CatalogError::Unauthorized));
        assert_eq!(gate.verify("x"), Err(CatalogError::Unauthorized));
        assert_eq!(gate.verify("s3cret-and-more"), Err(CatalogError::Unauthorized));
        assert_eq!(gate.verify("s3creT"), Err(CatalogError::Unauthorized));
    }

    #[test]
    fn test_unconfigured_gate_is_locked() {
        assert!(AdminGate::new(None).verify("").is_err());
        assert!(AdminGate::new(Some(String::new())).verify("").is_err());
        let shown = format!("{:?}", AdminGate::new(Some("hunter2".into())));
        assert!(!shown.contains("hunter2"));
    }
}
