/// Knobs for a diff run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Create a non-unique index over every foreign key's dependent columns.
    pub index_foreign_keys: bool,
    /// Prefix for placeholder names used while breaking rename cycles.
    pub temp_name_prefix: String,
    /// Replay the produced operations against a simulated schema before
    /// returning them.
    pub verify: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            index_foreign_keys: true,
            temp_name_prefix: "__mig_tmp__".to_string(),
            verify: true,
        }
    }
}

impl DiffOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_foreign_keys(mut self, enabled: bool) -> Self {
        self.index_foreign_keys = enabled;
        self
    }

    pub fn temp_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_name_prefix = prefix.into();
        self
    }

    pub fn verify(mut self, enabled: bool) -> Self {
        self.verify = enabled;
        self
    }
}
