//! Configuration loading and representation.

/// Runtime settings for the ledger and production services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Prefix of the reason recorded on production deductions ("production run #7").
    pub production_reason_prefix: String,
    /// Whether waste/expiration write-offs are accepted.
    pub write_off_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            production_reason_prefix: "production run".to_string(),
            write_off_enabled: true,
        }
    }
}

impl Config {
    /// Read `BAKEOPS_PRODUCTION_REASON_PREFIX` and `BAKEOPS_WRITE_OFF_ENABLED`,
    /// falling back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let production_reason_prefix = lookup("BAKEOPS_PRODUCTION_REASON_PREFIX")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.production_reason_prefix);

        let write_off_enabled = lookup("BAKEOPS_WRITE_OFF_ENABLED")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.write_off_enabled);

        Self {
            production_reason_prefix,
            write_off_enabled,
        }
    }

    /// Reason recorded on each ingredient deduction of run `number`.
    pub fn production_reason(&self, number: u64) -> String {
        format!("{} #{number}", self.production_reason_prefix)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
