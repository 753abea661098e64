/// Operator intent captured before a run starts.
#[derive(Debug, Clone, Default)]
pub struct SafetyContext {
    pub confirmed: bool,
    pub confirmed_device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyDecision {
    Allow,
    Deny(String),
}

impl SafetyContext {
    /// Confirmation for destroying the data on `device`.
    pub fn confirmed_for(device: impl Into<String>) -> Self {
        Self {
            confirmed: true,
            confirmed_device: Some(device.into()),
        }
    }

    pub fn unconfirmed() -> Self {
        Self::default()
    }
}

pub fn can_wipe_disk(ctx: &SafetyContext, device: &str) -> SafetyDecision {
    if !ctx.confirmed {
        return SafetyDecision::Deny(format!(
            "Denied: wiping {} requires explicit confirmation",
            device
        ));
    }

    match ctx.confirmed_device.as_deref() {
        Some(confirmed) if confirmed != device => SafetyDecision::Deny(format!(
            "Denied: confirmation was given for {}, not {}",
            confirmed, device
        )),
        _ => SafetyDecision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_without_confirmation() {
        assert!(matches!(
            can_wipe_disk(&SafetyContext::unconfirmed(), "/dev/sdc"),
            SafetyDecision::Deny(_)
        ));
    }

    #[test]
    fn denies_confirmation_for_other_device() {
        let ctx = SafetyContext::confirmed_for("/dev/sdb");
        assert!(matches!(
            can_wipe_disk(&ctx, "/dev/sdc"),
            SafetyDecision::Deny(_)
        ));
    }

    #[test]
    fn allows_confirmed_device() {
        let ctx = SafetyContext::confirmed_for("/dev/sdc");
        assert_eq!(can_wipe_disk(&ctx, "/dev/sdc"), SafetyDecision::Allow);
    }

    #[test]
    fn allows_blanket_confirmation() {
        let ctx = SafetyContext {
            confirmed: true,
            confirmed_device: None,
        };
        assert_eq!(can_wipe_disk(&ctx, "/dev/nvme1n1"), SafetyDecision::Allow);
    }
}
